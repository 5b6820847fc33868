//! JFET device model (quadratic Shichman-Hodges channel, reverse-biased
//! gate junctions).

use num_complex::Complex;
use voltaic_core::device::{AcBindContext, AcLoadContext, BindContext, Device, LoadContext};
use voltaic_core::error::{Error, Result};
use voltaic_core::{ElemId, VecElemId};

use crate::mosfet::fetlim;

/// JFET polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JfetType {
    /// N-channel.
    Njf,
    /// P-channel.
    Pjf,
}

/// JFET model parameters.
#[derive(Debug, Clone)]
pub struct JfetParams {
    /// Threshold (pinch-off) voltage (V). Default: -2.0 for NJF.
    pub vto: f64,
    /// Transconductance parameter (A/V²). Default: 1e-4.
    pub beta: f64,
    /// Channel-length modulation (1/V). Default: 0.0.
    pub lambda: f64,
    /// Gate-source capacitance (F), for AC. Default: 0.
    pub cgs: f64,
    /// Gate-drain capacitance (F), for AC. Default: 0.
    pub cgd: f64,
}

impl Default for JfetParams {
    fn default() -> Self {
        Self {
            vto: -2.0,
            beta: 1e-4,
            lambda: 0.0,
            cgs: 0.0,
            cgd: 0.0,
        }
    }
}

/// A junction FET (drain, gate, source).
#[derive(Debug, Clone)]
pub struct Jfet {
    name: String,
    node_d: String,
    node_g: String,
    node_s: String,
    polarity: JfetType,
    params: JfetParams,
    pins: [usize; 3],
    elems: [[ElemId; 3]; 3],
    ac_elems: [[ElemId; 3]; 3],
    rhs_d: VecElemId,
    rhs_s: VecElemId,
    vgs: f64,
    op_gm: f64,
    op_gds: f64,
}

impl Jfet {
    pub fn njf(
        name: impl Into<String>,
        drain: impl Into<String>,
        gate: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::with_params(name, drain, gate, source, JfetType::Njf, JfetParams::default())
    }

    pub fn pjf(
        name: impl Into<String>,
        drain: impl Into<String>,
        gate: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::with_params(
            name,
            drain,
            gate,
            source,
            JfetType::Pjf,
            JfetParams {
                vto: 2.0,
                ..Default::default()
            },
        )
    }

    pub fn with_params(
        name: impl Into<String>,
        drain: impl Into<String>,
        gate: impl Into<String>,
        source: impl Into<String>,
        polarity: JfetType,
        params: JfetParams,
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
            JfetType::Njf => 1.0,
            JfetType::Pjf => -1.0,
        }
    }

    /// Drain current and derivatives. `(ids, gds, gm)`; `ids` in external
    /// polarity, conductances polarity-invariant.
    pub fn evaluate(&self, vgs_ext: f64, vds_ext: f64) -> (f64, f64, f64) {
        let sign = self.sign();
        let vgs = sign * vgs_ext;
        let vds = (sign * vds_ext).max(0.0);
        let vp = self.params.vto.abs();
        let beta = self.params.beta;
        let lambda = self.params.lambda;

        // Overdrive above pinch-off; NJF conducts for Vgs > Vto (= −Vp).
        let vov = vgs + vp;
        let (ids, gds, gm) = if vov <= 0.0 {
            (0.0, 0.0, 0.0)
        } else if vds < vov {
            let base = beta * (2.0 * vov * vds - vds * vds);
            (
                base * (1.0 + lambda * vds),
                beta * 2.0 * (vov - vds) * (1.0 + lambda * vds) + base * lambda,
                beta * 2.0 * vds * (1.0 + lambda * vds),
            )
        } else {
            let base = beta * vov * vov;
            (
                base * (1.0 + lambda * vds),
                base * lambda,
                beta * 2.0 * vov * (1.0 + lambda * vds),
            )
        };
        (sign * ids, gds, gm)
    }
}

impl Device for Jfet {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        if self.params.beta <= 0.0 {
            return Err(Error::InvalidParameter {
                device: self.name.clone(),
                param: "beta".into(),
                reason: "transconductance parameter must be positive".into(),
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
        // The limiting runs in the n-channel frame, where the threshold is
        // the negative pinch-off voltage.
        let (vgs_int, limited) = fetlim(sign * vgs_iter, sign * self.vgs, -self.params.vto.abs());
        if limited {
            ctx.state.had_noncon = true;
        }
        let vgs = sign * vgs_int;
        self.vgs = vgs;

        let (ids, gds, gm) = self.evaluate(vgs, vds);
        let gds = gds + ctx.state.gmin;
        // The reverse-biased gate junctions contribute only their gmin
        // leakage at the bias point.
        let ggs = ctx.state.gmin;
        self.op_gm = gm;
        self.op_gds = gds;

        let ieq = ids - gm * vgs - gds * vds;
        let grid = [
            [gds, gm, -(gm + gds)],
            [0.0, ggs, -ggs],
            [-gds, -(gm + ggs), gm + gds + ggs],
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
        &["vto", "beta", "lambda", "cgs", "cgd"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "vto" => self.params.vto = value,
            "beta" => self.params.beta = value,
            "lambda" => self.params.lambda = value,
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
            "beta" => Some(self.params.beta),
            "lambda" => Some(self.params.lambda),
            "cgs" => Some(self.params.cgs),
            "cgd" => Some(self.params.cgd),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_below_pinchoff() {
        let j = Jfet::njf("J1", "d", "g", "s");
        let (ids, _, _) = j.evaluate(-3.0, 5.0);
        assert_eq!(ids, 0.0);
    }

    #[test]
    fn test_saturation_at_zero_vgs() {
        // Idss = beta·Vp² at Vgs = 0 in saturation.
        let j = Jfet::njf("J1", "d", "g", "s");
        let (ids, _, gm) = j.evaluate(0.0, 10.0);
        let expected = 1e-4 * 4.0;
        assert!((ids - expected).abs() < 1e-12, "ids = {}", ids);
        assert!(gm > 0.0);
    }

    #[test]
    fn test_pjf_mirrors_njf() {
        let n = Jfet::njf("J1", "d", "g", "s");
        let p = Jfet::pjf("J2", "d", "g", "s");
        let (in_, _, _) = n.evaluate(-1.0, 5.0);
        let (ip, _, _) = p.evaluate(1.0, -5.0);
        assert!((in_ + ip).abs() < 1e-15);
    }
}
