//! Diode model using the Shockley equation with pn-junction voltage
//! limiting.

use num_complex::Complex;
use voltaic_core::constants::thermal_voltage;
use voltaic_core::device::{
    AcBindContext, AcLoadContext, BindContext, Device, LoadContext, RhsPair, StateInitContext,
    TwoTerminal,
};
use voltaic_core::error::{Error, Result};
use voltaic_core::integration::StateId;
use voltaic_core::state::InitMode;

/// Diode model parameters.
#[derive(Debug, Clone)]
pub struct DiodeParams {
    /// Saturation current (A). Default: 1e-14.
    pub is: f64,
    /// Emission coefficient. Default: 1.0.
    pub n: f64,
    /// Zero-bias junction capacitance (F). Default: 0.0.
    pub cj0: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            n: 1.0,
            cj0: 0.0,
        }
    }
}

/// Limit a pn-junction voltage step, SPICE style.
///
/// Above the critical voltage the exponential is so steep that a raw Newton
/// step overshoots by decades; the step is compressed logarithmically
/// instead. Returns the limited voltage and whether limiting fired.
pub fn pnjlim(vnew: f64, vold: f64, vt: f64, vcrit: f64) -> (f64, bool) {
    if vnew > vcrit && (vnew - vold).abs() > 2.0 * vt {
        if vold > 0.0 {
            let arg = 1.0 + (vnew - vold) / vt;
            if arg > 0.0 {
                (vold + vt * arg.ln(), true)
            } else {
                (vcrit, true)
            }
        } else {
            (vt * (vnew / vt).ln(), true)
        }
    } else {
        (vnew, false)
    }
}

/// A junction diode.
#[derive(Debug, Clone)]
pub struct Diode {
    name: String,
    node_pos: String,
    node_neg: String,
    params: DiodeParams,
    p: usize,
    n: usize,
    stamp: TwoTerminal,
    ieq: RhsPair,
    ac_stamp: TwoTerminal,
    /// n·kT/q at the simulation temperature.
    vte: f64,
    vcrit: f64,
    /// Junction voltage of the previous iterate, for limiting and for the
    /// AC linearization point.
    vd: f64,
    charge: Option<StateId>,
}

impl Diode {
    pub fn new(
        name: impl Into<String>,
        node_pos: impl Into<String>,
        node_neg: impl Into<String>,
    ) -> Self {
        Self::with_params(name, node_pos, node_neg, DiodeParams::default())
    }

    pub fn with_params(
        name: impl Into<String>,
        node_pos: impl Into<String>,
        node_neg: impl Into<String>,
        params: DiodeParams,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos: node_pos.into(),
            node_neg: node_neg.into(),
            params,
            p: 0,
            n: 0,
            stamp: TwoTerminal::UNBOUND,
            ieq: RhsPair::UNBOUND,
            ac_stamp: TwoTerminal::UNBOUND,
            vte: 0.0,
            vcrit: 0.0,
            vd: 0.0,
            charge: None,
        }
    }

    /// Current and conductance at a junction voltage.
    pub fn evaluate(&self, vd: f64) -> (f64, f64) {
        let exp_term = (vd / self.vte).exp();
        let id = self.params.is * (exp_term - 1.0);
        let gd = self.params.is * exp_term / self.vte;
        (id, gd)
    }
}

impl Device for Diode {
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
        if self.params.n <= 0.0 {
            return Err(Error::InvalidParameter {
                device: self.name.clone(),
                param: "n".into(),
                reason: "emission coefficient must be positive".into(),
            });
        }
        self.p = ctx.node(&self.node_pos);
        self.n = ctx.node(&self.node_neg);
        self.stamp = TwoTerminal::bind(ctx.matrix, self.p, self.n)?;
        self.ieq = RhsPair::bind(ctx.rhs, self.p, self.n);
        self.vd = 0.0;
        self.charge = None;
        self.temperature(voltaic_core::constants::TEMP_NOMINAL)
    }

    fn temperature(&mut self, temp_k: f64) -> Result<()> {
        self.vte = self.params.n * thermal_voltage(temp_k);
        self.vcrit = self.vte * (self.vte / (std::f64::consts::SQRT_2 * self.params.is)).ln();
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        let v_iter = ctx.state.solution[self.p] - ctx.state.solution[self.n];
        let vd = match ctx.state.init {
            InitMode::Junction => self.vcrit.min(0.9),
            _ => {
                let (v, limited) = pnjlim(v_iter, self.vd, self.vte, self.vcrit);
                if limited {
                    ctx.state.had_noncon = true;
                }
                v
            }
        };
        self.vd = vd;

        let (id, gd) = self.evaluate(vd);
        let gd = gd + ctx.state.gmin;
        let ieq = id - gd * vd;
        self.stamp.stamp(ctx.matrix, gd);
        self.ieq.stamp(ctx.rhs, ieq);

        if self.params.cj0 > 0.0 {
            if let (Some(integ), Some(q)) = (ctx.integrator.as_deref_mut(), self.charge) {
                let vq = ctx.state.solution[self.p] - ctx.state.solution[self.n];
                integ.set_value(q, self.params.cj0 * vq);
                let iq = integ.integrate(q);
                let geq = self.params.cj0 * integ.slope();
                self.stamp.stamp(ctx.matrix, geq);
                self.ieq.stamp(ctx.rhs, iq - geq * vq);
            }
        }
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        self.ac_stamp = TwoTerminal::bind(ctx.matrix, self.p, self.n)?;
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        // Linearize around the operating point left by the bias solve.
        let (_, gd) = self.evaluate(self.vd);
        let y = Complex::new(gd, 0.0) + ctx.laplace() * self.params.cj0;
        self.ac_stamp.stamp(ctx.matrix, y);
    }

    fn init_states(&mut self, ctx: &mut StateInitContext) {
        if self.params.cj0 > 0.0 {
            let s = ctx.integrator.create_state();
            let v = ctx.solution[self.p] - ctx.solution[self.n];
            ctx.integrator.set_value(s, self.params.cj0 * v);
            self.charge = Some(s);
        }
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["is", "n", "cj0"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "is" => self.params.is = value,
            "n" => self.params.n = value,
            "cj0" => self.params.cj0 = value,
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
            "n" => Some(self.params.n),
            "cj0" => Some(self.params.cj0),
            _ => None,
        }
    }
}
