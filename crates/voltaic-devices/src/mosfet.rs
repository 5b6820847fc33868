//! MOSFET level 1 (Shichman-Hodges) device model.
//!
//! A square-law model: cutoff, triode and saturation regions with optional
//! channel-length modulation. Bulk is tied to source; for body-effect
//! accuracy a higher-level model belongs in an external catalog.

use num_complex::Complex;
use voltaic_core::device::{AcBindContext, AcLoadContext, BindContext, Device, LoadContext};
use voltaic_core::error::{Error, Result};
use voltaic_core::{ElemId, VecElemId};

/// MOSFET polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosfetType {
    Nmos,
    Pmos,
}

/// Level 1 model parameters.
#[derive(Debug, Clone)]
pub struct MosfetParams {
    /// Threshold voltage (V). Default: 0.7 (NMOS), -0.7 (PMOS).
    pub vto: f64,
    /// Transconductance parameter (A/V²). Default: 2e-5.
    pub kp: f64,
    /// Channel-length modulation (1/V). Default: 0.0.
    pub lambda: f64,
    /// Channel width (m). Default: 10e-6.
    pub w: f64,
    /// Channel length (m). Default: 1e-6.
    pub l: f64,
    /// Gate-source overlap capacitance (F), for AC. Default: 0.
    pub cgs: f64,
    /// Gate-drain overlap capacitance (F), for AC. Default: 0.
    pub cgd: f64,
}

impl MosfetParams {
    pub fn nmos_default() -> Self {
        Self {
            vto: 0.7,
            kp: 2e-5,
            lambda: 0.0,
            w: 10e-6,
            l: 1e-6,
            cgs: 0.0,
            cgd: 0.0,
        }
    }

    pub fn pmos_default() -> Self {
        Self {
            vto: -0.7,
            kp: 1e-5,
            ..Self::nmos_default()
        }
    }

    /// Effective transconductance factor β = kp·W/L.
    pub fn beta(&self) -> f64 {
        self.kp * self.w / self.l
    }
}

/// Limit a FET gate voltage step, SPICE style.
///
/// Near the threshold the drain current's curvature makes raw Newton steps
/// oscillate; steps are clamped relative to how far the device sits from
/// threshold. Returns the limited voltage and whether limiting fired.
pub fn fetlim(vnew: f64, vold: f64, vto: f64) -> (f64, bool) {
    let vtsthi = 2.0 * (vold - vto).abs() + 2.0;
    let vtstlo = vtsthi / 2.0 + 2.0;
    let vtox = vto + 3.5;
    let delv = vnew - vold;

    let limited = if vold >= vto {
        if vold >= vtox {
            if delv <= 0.0 {
                // Going off.
                if vnew > vtox {
                    (-delv > vtstlo).then(|| vold - vtstlo)
                } else {
                    Some(vnew.max(vto + 2.0)).filter(|v| *v != vnew)
                }
            } else {
                (delv > vtsthi).then(|| vold + vtsthi)
            }
        } else if delv <= 0.0 {
            Some(vnew.max(vto - 0.5)).filter(|v| *v != vnew)
        } else {
            Some(vnew.min(vto + 4.0)).filter(|v| *v != vnew)
        }
    } else if delv <= 0.0 {
        (-delv > vtsthi).then(|| vold - vtsthi)
    } else {
        let vtemp = vto + 0.5;
        if vnew <= vtemp {
            (delv > vtstlo).then(|| vold + vtstlo)
        } else {
            Some(vtemp).filter(|v| *v != vnew)
        }
    };

    match limited {
        Some(v) => (v, true),
        None => (vnew, false),
    }
}

/// A level-1 MOSFET (drain, gate, source).
#[derive(Debug, Clone)]
pub struct Mosfet {
    name: String,
    node_d: String,
    node_g: String,
    node_s: String,
    polarity: MosfetType,
    params: MosfetParams,
    pins: [usize; 3],
    /// Jacobian handles in (d, g, s) order.
    elems: [[ElemId; 3]; 3],
    ac_elems: [[ElemId; 3]; 3],
    rhs_d: VecElemId,
    rhs_s: VecElemId,
    vgs: f64,
    /// Operating-point conductances for AC.
    op_gm: f64,
    op_gds: f64,
}

impl Mosfet {
    pub fn nmos(
        name: impl Into<String>,
        drain: impl Into<String>,
        gate: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::with_params(name, drain, gate, source, MosfetType::Nmos, MosfetParams::nmos_default())
    }

    pub fn pmos(
        name: impl Into<String>,
        drain: impl Into<String>,
        gate: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::with_params(name, drain, gate, source, MosfetType::Pmos, MosfetParams::pmos_default())
    }

    pub fn with_params(
        name: impl Into<String>,
        drain: impl Into<String>,
        gate: impl Into<String>,
        source: impl Into<String>,
        polarity: MosfetType,
        params: MosfetParams,
    ) -> Self {
        Self {
            name: name.into(),
            node_d: drain.into(),
            node_g: gate.into(),
            node_s: source.into(),
            polarity,
            params,
            pins: [0; 3],
            elems: [[ElemId::SINK; 3]; 3],
            ac_elems: [[ElemId::SINK; 3]; 3],
            rhs_d: VecElemId::SINK,
            rhs_s: VecElemId::SINK,
            vgs: 0.0,
            op_gm: 0.0,
            op_gds: 0.0,
        }
    }

    fn sign(&self) -> f64 {
        match self.polarity {
            MosfetType::Nmos => 1.0,
            MosfetType::Pmos => -1.0,
        }
    }

    /// Drain current and partial derivatives at external terminal voltages.
    ///
    /// Returns `(ids, gds, gm)` with `ids` in external polarity;
    /// conductances are polarity-invariant.
    pub fn evaluate(&self, vgs_ext: f64, vds_ext: f64) -> (f64, f64, f64) {
        let sign = self.sign();
        let vgs = sign * vgs_ext;
        let vds = sign * vds_ext;
        let vth = self.params.vto.abs();
        let beta = self.params.beta();
        let lambda = self.params.lambda;

        let vov = vgs - vth;
        let vds = vds.max(0.0);

        let (ids, gds, gm) = if vov <= 0.0 {
            (0.0, 0.0, 0.0)
        } else if vds < vov {
            // Triode.
            let base = beta * (vov * vds - 0.5 * vds * vds);
            (
                base * (1.0 + lambda * vds),
                beta * (vov - vds) * (1.0 + lambda * vds) + base * lambda,
                beta * vds * (1.0 + lambda * vds),
            )
        } else {
            // Saturation.
            let base = 0.5 * beta * vov * vov;
            (
                base * (1.0 + lambda * vds),
                base * lambda,
                beta * vov * (1.0 + lambda * vds),
            )
        };
        (sign * ids, gds, gm)
    }
}

impl Device for Mosfet {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        if self.params.kp <= 0.0 {
            return Err(Error::InvalidParameter {
                device: self.name.clone(),
                param: "kp".into(),
                reason: "transconductance parameter must be positive".into(),
            });
        }
        if self.params.w <= 0.0 || self.params.l <= 0.0 {
            return Err(Error::InvalidParameter {
                device: self.name.clone(),
                param: "w".into(),
                reason: "geometry must be positive".into(),
            });
        }
        self.pins = [
            ctx.node(&self.node_d),
            ctx.node(&self.node_g),
            ctx.node(&self.node_s),
        ];
        for (r, &row) in self.pins.iter().enumerate() {
            for (c, &col) in self.pins.iter().enumerate() {
                self.elems[r][c] = ctx.elem(row, col)?;
            }
        }
        self.rhs_d = ctx.rhs_elem(self.pins[0]);
        self.rhs_s = ctx.rhs_elem(self.pins[2]);
        self.vgs = 0.0;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        let [d, g, s] = self.pins;
        let sol = &ctx.state.solution;
        let vgs_iter = sol[g] - sol[s];
        let vds = sol[d] - sol[s];

        let sign = self.sign();
        let (vgs_int, limited) = fetlim(
            sign * vgs_iter,
            sign * self.vgs,
            self.params.vto.abs(),
        );
        if limited {
            ctx.state.had_noncon = true;
        }
        let vgs = sign * vgs_int;
        self.vgs = vgs;

        let (ids, gds, gm) = self.evaluate(vgs, vds);
        let gds = gds + ctx.state.gmin;
        self.op_gm = gm;
        self.op_gds = gds;

        // Linearized drain current: Ids ≈ gm·vgs + gds·vds + Ieq.
        let ieq = ids - gm * vgs - gds * vds;
        let grid = [
            // row d: +Ids leaves the drain.
            [gds, gm, -(gm + gds)],
            // row g: no DC gate current.
            [0.0, 0.0, 0.0],
            // row s: −Ids.
            [-gds, -gm, gm + gds],
        ];
        for r in 0..3 {
            for c in 0..3 {
                ctx.matrix[self.elems[r][c]] += grid[r][c];
            }
        }
        ctx.rhs[self.rhs_d] -= ieq;
        ctx.rhs[self.rhs_s] += ieq;
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        for (r, &row) in self.pins.iter().enumerate() {
            for (c, &col) in self.pins.iter().enumerate() {
                self.ac_elems[r][c] = ctx.elem(row, col)?;
            }
        }
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        let jw = ctx.laplace();
        let gm = Complex::new(self.op_gm, 0.0);
        let gds = Complex::new(self.op_gds, 0.0);
        let ygs = jw * self.params.cgs;
        let ygd = jw * self.params.cgd;

        let grid = [
            [gds + ygd, gm - ygd, -(gm + gds)],
            [-ygd, ygs + ygd, -ygs],
            [-gds, -(gm + ygs), gm + gds + ygs],
        ];
        for r in 0..3 {
            for c in 0..3 {
                ctx.matrix[self.ac_elems[r][c]] += grid[r][c];
            }
        }
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["vto", "kp", "lambda", "w", "l", "cgs", "cgd"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "vto" => self.params.vto = value,
            "kp" => self.params.kp = value,
            "lambda" => self.params.lambda = value,
            "w" => self.params.w = value,
            "l" => self.params.l = value,
            "cgs" => self.params.cgs = value,
            "cgd" => self.params.cgd = value,
            _ => {
                return Err(Error::UnknownParameter {
                    device: self.name.clone(),
                    param: param.into(),
                })
            }
        }
        Ok(())
    }

    fn get_param(&self, param: &str) -> Option<f64> {
        match param {
            "vto" => Some(self.params.vto),
            "kp" => Some(self.params.kp),
            "lambda" => Some(self.params.lambda),
            "w" => Some(self.params.w),
            "l" => Some(self.params.l),
            "cgs" => Some(self.params.cgs),
            "cgd" => Some(self.params.cgd),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nmos() -> Mosfet {
        Mosfet::nmos("M1", "d", "g", "s")
    }

    #[test]
    fn test_cutoff_below_threshold() {
        let m = nmos();
        let (ids, gds, gm) = m.evaluate(0.3, 5.0);
        assert_eq!(ids, 0.0);
        assert_eq!(gds, 0.0);
        assert_eq!(gm, 0.0);
    }

    #[test]
    fn test_saturation_square_law() {
        let m = nmos();
        // Vgs = 1.7 → Vov = 1.0, Vds = 5 ≥ Vov: saturation.
        let (ids, _, gm) = m.evaluate(1.7, 5.0);
        let beta = m.params.beta();
        assert!((ids - 0.5 * beta).abs() < 1e-12, "ids = {}", ids);
        assert!((gm - beta).abs() < 1e-12, "gm = {}", gm);
    }

    #[test]
    fn test_triode_region() {
        let m = nmos();
        // Vov = 1.0, Vds = 0.5 < Vov: triode.
        let (ids, gds, _) = m.evaluate(1.7, 0.5);
        let beta = m.params.beta();
        let expected = beta * (1.0 * 0.5 - 0.125);
        assert!((ids - expected).abs() < 1e-12);
        assert!(gds > 0.0);
    }

    #[test]
    fn test_pmos_mirrors_nmos() {
        let n = nmos();
        let p = Mosfet::pmos("M2", "d", "g", "s");
        // Same geometry/kp so currents mirror exactly.
        let p = {
            let mut p = p;
            p.params.kp = n.params.kp;
            p
        };
        let (in_, _, _) = n.evaluate(1.7, 5.0);
        let (ip, _, _) = p.evaluate(-1.7, -5.0);
        assert!((in_ + ip).abs() < 1e-15);
    }

    #[test]
    fn test_fetlim_clamps_turn_on_overshoot() {
        // Jumping from far below threshold to far above gets clamped.
        let (v, limited) = fetlim(10.0, 0.0, 0.7);
        assert!(limited);
        assert!(v < 10.0);
    }

    #[test]
    fn test_fetlim_passes_small_steps() {
        let (v, limited) = fetlim(2.05, 2.0, 0.7);
        assert!(!limited);
        assert_eq!(v, 2.05);
    }
}
