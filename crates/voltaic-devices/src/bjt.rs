//! Bipolar junction transistor, Gummel-Poon DC core in the Ebers-Moll
//! transport formulation.

use num_complex::Complex;
use voltaic_core::constants::thermal_voltage;
use voltaic_core::device::{AcBindContext, AcLoadContext, BindContext, Device, LoadContext};
use voltaic_core::error::{Error, Result};
use voltaic_core::state::InitMode;
use voltaic_core::{ElemId, VecElemId};

use crate::diode::pnjlim;

/// BJT polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BjtType {
    Npn,
    Pnp,
}

/// BJT model parameters.
#[derive(Debug, Clone)]
pub struct BjtParams {
    /// Transport saturation current (A). Default: 1e-16.
    pub is: f64,
    /// Forward beta. Default: 100.
    pub bf: f64,
    /// Reverse beta. Default: 1.
    pub br: f64,
    /// Forward emission coefficient. Default: 1.0.
    pub nf: f64,
    /// Reverse emission coefficient. Default: 1.0.
    pub nr: f64,
    /// Forward Early voltage (V). Default: infinite (no Early effect).
    pub vaf: f64,
    /// Base-emitter junction capacitance (F), for AC. Default: 0.
    pub cje: f64,
    /// Base-collector junction capacitance (F), for AC. Default: 0.
    pub cjc: f64,
}

impl Default for BjtParams {
    fn default() -> Self {
        Self {
            is: 1e-16,
            bf: 100.0,
            br: 1.0,
            nf: 1.0,
            nr: 1.0,
            vaf: f64::INFINITY,
            cje: 0.0,
            cjc: 0.0,
        }
    }
}

/// Linearized small-signal quantities at one bias point.
#[derive(Debug, Clone, Copy, Default)]
struct BjtOperatingPoint {
    ic: f64,
    ib: f64,
    /// ∂Ic/∂Vbe
    gce: f64,
    /// ∂Ic/∂Vbc
    gcc: f64,
    /// ∂Ib/∂Vbe
    gbe: f64,
    /// ∂Ib/∂Vbc
    gbc: f64,
}

/// A bipolar junction transistor (collector, base, emitter).
#[derive(Debug, Clone)]
pub struct Bjt {
    name: String,
    node_c: String,
    node_b: String,
    node_e: String,
    polarity: BjtType,
    params: BjtParams,
    pins: [usize; 3],
    /// 3×3 Jacobian handles in (c, b, e) order.
    elems: [[ElemId; 3]; 3],
    ac_elems: [[ElemId; 3]; 3],
    rhs: [VecElemId; 3],
    vtf: f64,
    vtr: f64,
    vcrit: f64,
    vbe: f64,
    vbc: f64,
    op: BjtOperatingPoint,
}

impl Bjt {
    pub fn npn(
        name: impl Into<String>,
        collector: impl Into<String>,
        base: impl Into<String>,
        emitter: impl Into<String>,
    ) -> Self {
        Self::with_params(name, collector, base, emitter, BjtType::Npn, BjtParams::default())
    }

    pub fn pnp(
        name: impl Into<String>,
        collector: impl Into<String>,
        base: impl Into<String>,
        emitter: impl Into<String>,
    ) -> Self {
        Self::with_params(name, collector, base, emitter, BjtType::Pnp, BjtParams::default())
    }

    pub fn with_params(
        name: impl Into<String>,
        collector: impl Into<String>,
        base: impl Into<String>,
        emitter: impl Into<String>,
        polarity: BjtType,
        params: BjtParams,
    ) -> Self {
        Self {
            name: name.into(),
            node_c: collector.into(),
            node_b: base.into(),
            node_e: emitter.into(),
            polarity,
            params,
            pins: [0; 3],
            elems: [[ElemId::SINK; 3]; 3],
            ac_elems: [[ElemId::SINK; 3]; 3],
            rhs: [VecElemId::SINK; 3],
            vtf: 0.0,
            vtr: 0.0,
            vcrit: 0.0,
            vbe: 0.0,
            vbc: 0.0,
            op: BjtOperatingPoint::default(),
        }
    }

    fn sign(&self) -> f64 {
        match self.polarity {
            BjtType::Npn => 1.0,
            BjtType::Pnp => -1.0,
        }
    }

    /// Evaluate terminal currents and conductances at external junction
    /// voltages. PNP devices run the NPN equations on flipped voltages;
    /// conductances are polarity-invariant, currents flip back.
    fn evaluate(&self, vbe_ext: f64, vbc_ext: f64) -> BjtOperatingPoint {
        let sign = self.sign();
        let vbe = sign * vbe_ext;
        let vbc = sign * vbc_ext;
        let p = &self.params;

        let exp_be = (vbe / self.vtf).exp();
        let exp_bc = (vbc / self.vtr).exp();
        let gif = p.is * exp_be / self.vtf;
        let gir = p.is * exp_bc / self.vtr;
        let icc = p.is * (exp_be - 1.0);
        let ice = p.is * (exp_bc - 1.0);

        let ibe = icc / p.bf;
        let ibc = ice / p.br;
        let gpi = gif / p.bf;
        let gmu = gir / p.br;

        // Base-width modulation as a first-order factor on the transport
        // current.
        let (fa, dfa_dvbc) = if p.vaf.is_finite() {
            (1.0 - vbc / p.vaf, -1.0 / p.vaf)
        } else {
            (1.0, 0.0)
        };
        let ict = icc - ice;

        let ic = ict * fa - ibc;
        let ib = ibe + ibc;
        let gce = gif * fa;
        let gcc = -gir * fa + ict * dfa_dvbc - gmu;

        BjtOperatingPoint {
            ic: sign * ic,
            ib: sign * ib,
            gce,
            gcc,
            gbe: gpi,
            gbc: gmu,
        }
    }

    /// The 3×3 Jacobian grid in (c, b, e) order for the given conductances.
    fn jacobian(gce: f64, gcc: f64, gbe: f64, gbc: f64) -> [[f64; 3]; 3] {
        [
            // row c: +Ic leaves the collector node.
            [-gcc, gce + gcc, -gce],
            // row b: +Ib leaves the base node.
            [-gbc, gbe + gbc, -gbe],
            // row e: −(Ib + Ic).
            [gbc + gcc, -(gbe + gbc + gce + gcc), gbe + gce],
        ]
    }
}

impl Device for Bjt {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        if self.params.is <= 0.0 {
            return Err(Error::InvalidParameter {
                device: self.name.clone(),
                param: "is".into(),
                reason: "saturation current must be positive".into(),
            });
        }
        if self.params.bf <= 0.0 || self.params.br <= 0.0 {
            return Err(Error::InvalidParameter {
                device: self.name.clone(),
                param: "bf".into(),
                reason: "current gains must be positive".into(),
            });
        }
        self.pins = [
            ctx.node(&self.node_c),
            ctx.node(&self.node_b),
            ctx.node(&self.node_e),
        ];
        for (r, &row) in self.pins.iter().enumerate() {
            for (c, &col) in self.pins.iter().enumerate() {
                self.elems[r][c] = ctx.elem(row, col)?;
            }
            self.rhs[r] = ctx.rhs_elem(row);
        }
        self.vbe = 0.0;
        self.vbc = 0.0;
        self.temperature(voltaic_core::constants::TEMP_NOMINAL)
    }

    fn temperature(&mut self, temp_k: f64) -> Result<()> {
        let vt = thermal_voltage(temp_k);
        self.vtf = self.params.nf * vt;
        self.vtr = self.params.nr * vt;
        self.vcrit = self.vtf * (self.vtf / (std::f64::consts::SQRT_2 * self.params.is)).ln();
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        let [c, b, e] = self.pins;
        let sol = &ctx.state.solution;
        let vbe_iter = sol[b] - sol[e];
        let vbc_iter = sol[b] - sol[c];

        let (vbe, vbc) = match ctx.state.init {
            InitMode::Junction => (self.sign() * self.vcrit.min(0.9), 0.0),
            _ => {
                let sign = self.sign();
                let (vbe_l, lim1) =
                    pnjlim(sign * vbe_iter, sign * self.vbe, self.vtf, self.vcrit);
                let (vbc_l, lim2) =
                    pnjlim(sign * vbc_iter, sign * self.vbc, self.vtr, self.vcrit);
                if lim1 || lim2 {
                    ctx.state.had_noncon = true;
                }
                (sign * vbe_l, sign * vbc_l)
            }
        };
        self.vbe = vbe;
        self.vbc = vbc;

        let op = self.evaluate(vbe, vbc);
        self.op = op;

        let ceqc = op.ic - op.gce * vbe - op.gcc * vbc;
        let ceqb = op.ib - op.gbe * vbe - op.gbc * vbc;

        // gmin shunts across both junctions carry no equivalent current.
        let grid = Self::jacobian(
            op.gce,
            op.gcc,
            op.gbe + ctx.state.gmin,
            op.gbc + ctx.state.gmin,
        );
        for r in 0..3 {
            for c2 in 0..3 {
                ctx.matrix[self.elems[r][c2]] += grid[r][c2];
            }
        }
        ctx.rhs[self.rhs[0]] -= ceqc;
        ctx.rhs[self.rhs[1]] -= ceqb;
        ctx.rhs[self.rhs[2]] += ceqb + ceqc;
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
        // Hybrid-π around the stored operating point, junction capacitances
        // folded into the base-emitter and base-collector admittances.
        let jw = ctx.laplace();
        let ybe = Complex::new(self.op.gbe, 0.0) + jw * self.params.cje;
        let ybc = Complex::new(self.op.gbc, 0.0) + jw * self.params.cjc;
        let gce = Complex::new(self.op.gce, 0.0);
        let gcc = Complex::new(self.op.gcc, 0.0);

        let grid = [
            [-gcc - jw * self.params.cjc, gce + gcc + jw * self.params.cjc, -gce],
            [-ybc, ybe + ybc, -ybe],
            [ybc + gcc, -(ybe + ybc + gce + gcc), ybe + gce],
        ];
        for r in 0..3 {
            for c in 0..3 {
                ctx.matrix[self.ac_elems[r][c]] += grid[r][c];
            }
        }
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["is", "bf", "br", "nf", "nr", "vaf", "cje", "cjc"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "is" => self.params.is = value,
            "bf" => self.params.bf = value,
            "br" => self.params.br = value,
            "nf" => self.params.nf = value,
            "nr" => self.params.nr = value,
            "vaf" => self.params.vaf = value,
            "cje" => self.params.cje = value,
            "cjc" => self.params.cjc = value,
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
            "is" => Some(self.params.is),
            "bf" => Some(self.params.bf),
            "br" => Some(self.params.br),
            "nf" => Some(self.params.nf),
            "nr" => Some(self.params.nr),
            "vaf" => Some(self.params.vaf),
            "cje" => Some(self.params.cje),
            "cjc" => Some(self.params.cjc),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npn() -> Bjt {
        let mut q = Bjt::npn("Q1", "c", "b", "e");
        q.temperature(voltaic_core::constants::TEMP_NOMINAL)
            .unwrap();
        q
    }

    #[test]
    fn test_forward_active_currents() {
        let q = npn();
        // Vbe = 0.65, Vbc = −4.35 (Vce = 5): forward active.
        let op = q.evaluate(0.65, -4.35);
        assert!(op.ic > 0.0, "collector current should be positive");
        assert!(op.ib > 0.0, "base current should be positive");
        let beta = op.ic / op.ib;
        assert!(
            (beta - 100.0).abs() / 100.0 < 0.05,
            "beta = {} (expected ≈ 100)",
            beta
        );
    }

    #[test]
    fn test_cutoff_leakage_only() {
        let q = npn();
        let op = q.evaluate(-1.0, -5.0);
        assert!(op.ic.abs() < 1e-12);
        assert!(op.ib.abs() < 1e-12);
    }

    #[test]
    fn test_pnp_mirrors_npn() {
        let q = npn();
        let mut p = Bjt::pnp("Q2", "c", "b", "e");
        p.temperature(voltaic_core::constants::TEMP_NOMINAL)
            .unwrap();
        let fwd = q.evaluate(0.65, -4.35);
        let rev = p.evaluate(-0.65, 4.35);
        assert!((fwd.ic + rev.ic).abs() < 1e-15);
        assert!((fwd.ib + rev.ib).abs() < 1e-15);
        assert!((fwd.gce - rev.gce).abs() < 1e-15);
    }

    #[test]
    fn test_jacobian_rows_conserve_current() {
        // Each Jacobian column must sum to zero: KCL across the device.
        let grid = Bjt::jacobian(0.1, -0.01, 0.002, 0.001);
        for c in 0..3 {
            let sum: f64 = (0..3).map(|r| grid[r][c]).sum();
            assert!(sum.abs() < 1e-15, "column {} sums to {}", c, sum);
        }
    }

    #[test]
    fn test_param_table_covers_names() {
        let mut q = npn();
        for &p in q.param_names() {
            let v = q.get_param(p).expect("listed parameter must be readable");
            let next = if v.is_finite() { v * 2.0 + 0.25 } else { 50.0 };
            q.set_param(p, next).expect("listed parameter must be writable");
            assert_eq!(q.get_param(p), Some(next));
        }
    }
}
