//! Passive device models: Resistor, Capacitor, Inductor.

use num_complex::Complex;
use voltaic_core::device::{
    AcBindContext, AcLoadContext, BindContext, Device, LoadContext, RhsPair, StateInitContext,
    TwoTerminal,
};
use voltaic_core::error::{Error, Result};
use voltaic_core::integration::StateId;
use voltaic_core::{ElemId, VecElemId};

/// A linear resistor.
#[derive(Debug, Clone)]
pub struct Resistor {
    name: String,
    node_pos: String,
    node_neg: String,
    resistance: f64,
    stamp: TwoTerminal,
    ac_stamp: TwoTerminal,
    p: usize,
    n: usize,
}

impl Resistor {
    pub fn new(
        name: impl Into<String>,
        node_pos: impl Into<String>,
        node_neg: impl Into<String>,
        resistance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos: node_pos.into(),
            node_neg: node_neg.into(),
            resistance,
            stamp: TwoTerminal::UNBOUND,
            ac_stamp: TwoTerminal::UNBOUND,
            p: 0,
            n: 0,
        }
    }

    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }
}

impl Device for Resistor {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        if self.resistance == 0.0 {
            return Err(Error::InvalidParameter {
                device: self.name.clone(),
                param: "resistance".into(),
                reason: "must be non-zero".into(),
            });
        }
        self.p = ctx.node(&self.node_pos);
        self.n = ctx.node(&self.node_neg);
        if self.p == self.n {
            return Err(Error::BadConnection {
                device: self.name.clone(),
                reason: "both terminals on the same node".into(),
            });
        }
        self.stamp = TwoTerminal::bind(ctx.matrix, self.p, self.n)?;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        self.stamp.stamp(ctx.matrix, self.conductance());
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        self.ac_stamp = TwoTerminal::bind(ctx.matrix, self.p, self.n)?;
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        self.ac_stamp
            .stamp(ctx.matrix, Complex::new(self.conductance(), 0.0));
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["resistance"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "resistance" => {
                self.resistance = value;
                Ok(())
            }
            _ => Err(Error::UnknownParameter {
                device: self.name.clone(),
                param: param.into(),
            }),
        }
    }

    fn get_param(&self, param: &str) -> Option<f64> {
        match param {
            "resistance" => Some(self.resistance),
            _ => None,
        }
    }
}

/// A capacitor. Open at DC; in transient its charge is a state variable
/// integrated by the active method.
#[derive(Debug, Clone)]
pub struct Capacitor {
    name: String,
    node_pos: String,
    node_neg: String,
    capacitance: f64,
    stamp: TwoTerminal,
    ieq: RhsPair,
    ac_stamp: TwoTerminal,
    p: usize,
    n: usize,
    charge: Option<StateId>,
}

impl Capacitor {
    pub fn new(
        name: impl Into<String>,
        node_pos: impl Into<String>,
        node_neg: impl Into<String>,
        capacitance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos: node_pos.into(),
            node_neg: node_neg.into(),
            capacitance,
            stamp: TwoTerminal::UNBOUND,
            ieq: RhsPair::UNBOUND,
            ac_stamp: TwoTerminal::UNBOUND,
            p: 0,
            n: 0,
            charge: None,
        }
    }
}

impl Device for Capacitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        if self.capacitance <= 0.0 {
            return Err(Error::InvalidParameter {
                device: self.name.clone(),
                param: "capacitance".into(),
                reason: "must be positive".into(),
            });
        }
        self.p = ctx.node(&self.node_pos);
        self.n = ctx.node(&self.node_neg);
        self.stamp = TwoTerminal::bind(ctx.matrix, self.p, self.n)?;
        self.ieq = RhsPair::bind(ctx.rhs, self.p, self.n);
        self.charge = None;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        let (Some(integ), Some(q)) = (ctx.integrator.as_deref_mut(), self.charge) else {
            // Open circuit at the bias point.
            return Ok(());
        };
        let v = ctx.state.solution[self.p] - ctx.state.solution[self.n];
        integ.set_value(q, self.capacitance * v);
        let id = integ.integrate(q);
        let geq = self.capacitance * integ.slope();
        self.stamp.stamp(ctx.matrix, geq);
        self.ieq.stamp(ctx.rhs, id - geq * v);
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        self.ac_stamp = TwoTerminal::bind(ctx.matrix, self.p, self.n)?;
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        let y = ctx.laplace() * self.capacitance;
        self.ac_stamp.stamp(ctx.matrix, y);
    }

    fn init_states(&mut self, ctx: &mut StateInitContext) {
        let s = ctx.integrator.create_state();
        let v = ctx.solution[self.p] - ctx.solution[self.n];
        ctx.integrator.set_value(s, self.capacitance * v);
        self.charge = Some(s);
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["capacitance"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "capacitance" => {
                self.capacitance = value;
                Ok(())
            }
            _ => Err(Error::UnknownParameter {
                device: self.name.clone(),
                param: param.into(),
            }),
        }
    }

    fn get_param(&self, param: &str) -> Option<f64> {
        match param {
            "capacitance" => Some(self.capacitance),
            _ => None,
        }
    }
}

/// An inductor. Introduces a branch-current unknown; a short at DC, flux
/// state in transient, jωL impedance in AC.
#[derive(Debug, Clone)]
pub struct Inductor {
    name: String,
    node_pos: String,
    node_neg: String,
    inductance: f64,
    p: usize,
    n: usize,
    branch: usize,
    p_br: ElemId,
    br_p: ElemId,
    n_br: ElemId,
    br_n: ElemId,
    br_br: ElemId,
    br_rhs: VecElemId,
    ac_p_br: ElemId,
    ac_br_p: ElemId,
    ac_n_br: ElemId,
    ac_br_n: ElemId,
    ac_br_br: ElemId,
    flux: Option<StateId>,
}

impl Inductor {
    pub fn new(
        name: impl Into<String>,
        node_pos: impl Into<String>,
        node_neg: impl Into<String>,
        inductance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos: node_pos.into(),
            node_neg: node_neg.into(),
            inductance,
            p: 0,
            n: 0,
            branch: 0,
            p_br: ElemId::SINK,
            br_p: ElemId::SINK,
            n_br: ElemId::SINK,
            br_n: ElemId::SINK,
            br_br: ElemId::SINK,
            br_rhs: VecElemId::SINK,
            ac_p_br: ElemId::SINK,
            ac_br_p: ElemId::SINK,
            ac_n_br: ElemId::SINK,
            ac_br_n: ElemId::SINK,
            ac_br_br: ElemId::SINK,
            flux: None,
        }
    }

    /// Index of this inductor's branch-current unknown.
    pub fn branch_index(&self) -> usize {
        self.branch
    }
}

impl Device for Inductor {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext) -> Result<()> {
        if self.inductance <= 0.0 {
            return Err(Error::InvalidParameter {
                device: self.name.clone(),
                param: "inductance".into(),
                reason: "must be positive".into(),
            });
        }
        self.p = ctx.node(&self.node_pos);
        self.n = ctx.node(&self.node_neg);
        self.branch = ctx.branch(&self.name);
        self.p_br = ctx.elem(self.p, self.branch)?;
        self.br_p = ctx.elem(self.branch, self.p)?;
        self.n_br = ctx.elem(self.n, self.branch)?;
        self.br_n = ctx.elem(self.branch, self.n)?;
        self.br_br = ctx.elem(self.branch, self.branch)?;
        self.br_rhs = ctx.rhs_elem(self.branch);
        self.flux = None;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext) -> Result<()> {
        // Branch equation: V(p) − V(n) = dφ/dt (zero at DC: a short).
        ctx.add(self.p_br, 1.0);
        ctx.add(self.br_p, 1.0);
        ctx.add(self.n_br, -1.0);
        ctx.add(self.br_n, -1.0);

        if let (Some(integ), Some(f)) = (ctx.integrator.as_deref_mut(), self.flux) {
            let i = ctx.state.solution[self.branch];
            let flux = self.inductance * i;
            integ.set_value(f, flux);
            let dflux = integ.integrate(f);
            let slope = integ.slope();
            // vp − vn − L·ag0·i = history remainder.
            ctx.matrix[self.br_br] += -self.inductance * slope;
            ctx.rhs[self.br_rhs] += dflux - slope * flux;
        }
        Ok(())
    }

    fn bind_ac(&mut self, ctx: &mut AcBindContext) -> Result<()> {
        self.ac_p_br = ctx.elem(self.p, self.branch)?;
        self.ac_br_p = ctx.elem(self.branch, self.p)?;
        self.ac_n_br = ctx.elem(self.n, self.branch)?;
        self.ac_br_n = ctx.elem(self.branch, self.n)?;
        self.ac_br_br = ctx.elem(self.branch, self.branch)?;
        Ok(())
    }

    fn load_ac(&mut self, ctx: &mut AcLoadContext) {
        let one = Complex::new(1.0, 0.0);
        ctx.add(self.ac_p_br, one);
        ctx.add(self.ac_br_p, one);
        ctx.add(self.ac_n_br, -one);
        ctx.add(self.ac_br_n, -one);
        // V(p) − V(n) = jωL·I on the branch diagonal.
        ctx.add(self.ac_br_br, -ctx.laplace() * self.inductance);
    }

    fn init_states(&mut self, ctx: &mut StateInitContext) {
        let s = ctx.integrator.create_state();
        let i = ctx.solution[self.branch];
        ctx.integrator.set_value(s, self.inductance * i);
        self.flux = Some(s);
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["inductance"]
    }

    fn set_param(&mut self, param: &str, value: f64) -> Result<()> {
        match param {
            "inductance" => {
                self.inductance = value;
                Ok(())
            }
            _ => Err(Error::UnknownParameter {
                device: self.name.clone(),
                param: param.into(),
            }),
        }
    }

    fn get_param(&self, param: &str) -> Option<f64> {
        match param {
            "inductance" => Some(self.inductance),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltaic_core::sparse::{SparseMatrix, SparseVector};
    use voltaic_core::state::BiasState;
    use voltaic_core::variables::VariableMap;

    fn bind_one(dev: &mut dyn Device) -> (SparseMatrix<f64>, SparseVector<f64>, VariableMap) {
        let mut vars = VariableMap::new();
        let mut matrix = SparseMatrix::new();
        let mut rhs = SparseVector::new();
        let mut ctx = BindContext {
            vars: &mut vars,
            matrix: &mut matrix,
            rhs: &mut rhs,
        };
        dev.bind(&mut ctx).unwrap();
        (matrix, rhs, vars)
    }

    #[test]
    fn test_resistor_stamp() {
        let mut r = Resistor::new("R1", "a", "b", 1000.0);
        let (mut matrix, mut rhs, vars) = bind_one(&mut r);
        let mut state = BiasState::new(vars.len());
        let mut ctx = LoadContext {
            matrix: &mut matrix,
            rhs: &mut rhs,
            state: &mut state,
            integrator: None,
            time: 0.0,
        };
        r.load(&mut ctx).unwrap();
        assert!((matrix.value_at(1, 1) - 1e-3).abs() < 1e-15);
        assert!((matrix.value_at(2, 2) - 1e-3).abs() < 1e-15);
        assert!((matrix.value_at(1, 2) + 1e-3).abs() < 1e-15);
    }

    #[test]
    fn test_zero_resistance_rejected() {
        let mut r = Resistor::new("R1", "a", "0", 0.0);
        let mut vars = VariableMap::new();
        let mut matrix = SparseMatrix::new();
        let mut rhs = SparseVector::new();
        let mut ctx = BindContext {
            vars: &mut vars,
            matrix: &mut matrix,
            rhs: &mut rhs,
        };
        assert!(matches!(
            r.bind(&mut ctx),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_shorted_resistor_rejected() {
        let mut r = Resistor::new("R1", "a", "A", 1.0);
        let mut vars = VariableMap::new();
        let mut matrix = SparseMatrix::new();
        let mut rhs = SparseVector::new();
        let mut ctx = BindContext {
            vars: &mut vars,
            matrix: &mut matrix,
            rhs: &mut rhs,
        };
        assert!(matches!(r.bind(&mut ctx), Err(Error::BadConnection { .. })));
    }

    #[test]
    fn test_capacitor_open_at_dc() {
        let mut c = Capacitor::new("C1", "a", "0", 1e-6);
        let (mut matrix, mut rhs, vars) = bind_one(&mut c);
        let mut state = BiasState::new(vars.len());
        let mut ctx = LoadContext {
            matrix: &mut matrix,
            rhs: &mut rhs,
            state: &mut state,
            integrator: None,
            time: 0.0,
        };
        c.load(&mut ctx).unwrap();
        assert_eq!(matrix.value_at(1, 1), 0.0);
    }

    #[test]
    fn test_inductor_short_at_dc() {
        let mut l = Inductor::new("L1", "a", "b", 1e-3);
        let (mut matrix, mut rhs, vars) = bind_one(&mut l);
        let mut state = BiasState::new(vars.len());
        let mut ctx = LoadContext {
            matrix: &mut matrix,
            rhs: &mut rhs,
            state: &mut state,
            integrator: None,
            time: 0.0,
        };
        l.load(&mut ctx).unwrap();
        let br = l.branch_index();
        assert_eq!(matrix.value_at(1, br), 1.0);
        assert_eq!(matrix.value_at(br, 1), 1.0);
        assert_eq!(matrix.value_at(2, br), -1.0);
        assert_eq!(matrix.value_at(br, br), 0.0);
    }

    #[test]
    fn test_capacitor_companion_backward_euler() {
        use voltaic_core::integration::{Integrator, Method};

        let mut c = Capacitor::new("C1", "a", "0", 1e-6);
        let (mut matrix, mut rhs, vars) = bind_one(&mut c);
        let mut state = BiasState::new(vars.len());
        state.solution[1] = 2.5;

        let mut integ = Integrator::new(Method::Gear);
        let mut init = StateInitContext {
            integrator: &mut integ,
            solution: &state.solution,
        };
        c.init_states(&mut init);
        integ.initialize(0.0, 1e-6);
        integ.begin_step(1e-6);

        let mut ctx = LoadContext {
            matrix: &mut matrix,
            rhs: &mut rhs,
            state: &mut state,
            integrator: Some(&mut integ),
            time: 1e-6,
        };
        c.load(&mut ctx).unwrap();

        // Backward Euler companion: Geq = C/h = 1. Held at the DC voltage,
        // the equivalent current keeps the node at 2.5 V: ieq = −Geq·v.
        assert!((matrix.value_at(1, 1) - 1.0).abs() < 1e-12);
        assert!((rhs.value_at(1) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_param_table_covers_names() {
        let mut r = Resistor::new("R1", "a", "0", 50.0);
        for &p in r.param_names() {
            let v = r.get_param(p).expect("listed parameter must be readable");
            r.set_param(p, v + 1.0).expect("listed parameter must be writable");
            assert_eq!(r.get_param(p), Some(v + 1.0));
        }
        assert!(r.set_param("bogus", 1.0).is_err());
    }
}
