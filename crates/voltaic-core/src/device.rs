//! The device behavior protocol.
//!
//! A device participates in an analysis through a small set of typed entry
//! points keyed by phase: `bind` (setup), `temperature`, `load` (bias and
//! transient), `bind_ac`/`load_ac` (frequency), `init_states` and `accept`
//! (time). The trait lives here rather than in the device crate so the
//! solver and the device catalog can stay decoupled.
//!
//! Matrix and RHS access is exclusively through handles cached at bind
//! time; the load path is raw integer indexing with one virtual call per
//! device per iteration.

use num_complex::Complex;

use crate::breakpoints::Breakpoints;
use crate::error::{Error, Result};
use crate::integration::Integrator;
use crate::sparse::{ElemId, Scalar, SparseMatrix, SparseVector, VecElemId};
use crate::state::BiasState;
use crate::variables::VariableMap;

/// Setup-phase context: variable allocation and real-matrix binding.
pub struct BindContext<'a> {
    pub vars: &'a mut VariableMap,
    pub matrix: &'a mut SparseMatrix<f64>,
    pub rhs: &'a mut SparseVector<f64>,
}

impl BindContext<'_> {
    /// Resolve a node name to its variable index (creating it on first use).
    pub fn node(&mut self, name: &str) -> usize {
        self.vars.node(name)
    }

    /// Claim the branch-current equation owned by `device`.
    pub fn branch(&mut self, device: &str) -> usize {
        self.vars.branch(device)
    }

    pub fn elem(&mut self, row: usize, col: usize) -> Result<ElemId> {
        self.matrix.get_element(row, col)
    }

    pub fn rhs_elem(&mut self, row: usize) -> VecElemId {
        self.rhs.get_element(row)
    }
}

/// Setup-phase context for the complex (AC) system.
pub struct AcBindContext<'a> {
    pub matrix: &'a mut SparseMatrix<Complex<f64>>,
    pub rhs: &'a mut SparseVector<Complex<f64>>,
}

impl AcBindContext<'_> {
    pub fn elem(&mut self, row: usize, col: usize) -> Result<ElemId> {
        self.matrix.get_element(row, col)
    }

    pub fn rhs_elem(&mut self, row: usize) -> VecElemId {
        self.rhs.get_element(row)
    }
}

/// Bias/transient load context.
pub struct LoadContext<'a> {
    pub matrix: &'a mut SparseMatrix<f64>,
    pub rhs: &'a mut SparseVector<f64>,
    pub state: &'a mut BiasState,
    /// Present in transient mode only.
    pub integrator: Option<&'a mut Integrator>,
    /// The time being attempted (equals 0 for bias points).
    pub time: f64,
}

impl LoadContext<'_> {
    pub fn add(&mut self, id: ElemId, value: f64) {
        self.matrix[id] += value;
    }

    pub fn add_rhs(&mut self, id: VecElemId, value: f64) {
        self.rhs[id] += value;
    }

    pub fn is_transient(&self) -> bool {
        self.integrator.is_some()
    }
}

/// Frequency-domain load context. `op` is the converged operating point the
/// small-signal parameters linearize around.
pub struct AcLoadContext<'a> {
    pub matrix: &'a mut SparseMatrix<Complex<f64>>,
    pub rhs: &'a mut SparseVector<Complex<f64>>,
    pub omega: f64,
    pub op: &'a [f64],
}

impl AcLoadContext<'_> {
    pub fn add(&mut self, id: ElemId, value: Complex<f64>) {
        self.matrix[id] += value;
    }

    pub fn add_rhs(&mut self, id: VecElemId, value: Complex<f64>) {
        self.rhs[id] += value;
    }

    /// Laplace variable jω.
    pub fn laplace(&self) -> Complex<f64> {
        Complex::new(0.0, self.omega)
    }
}

/// Transient state-declaration context, run once after the operating point.
pub struct StateInitContext<'a> {
    pub integrator: &'a mut Integrator,
    /// The operating-point (or `.IC`-seeded) solution.
    pub solution: &'a [f64],
}

/// Accepted-timepoint context. Breakpoint registration is only possible
/// here, which makes rollback of registrations from rejected steps
/// structural.
pub struct AcceptContext<'a> {
    pub breakpoints: &'a mut Breakpoints,
    pub time: f64,
}

/// A circuit entity.
///
/// Every capability beyond `bind`/`load` has a default no-op body, so a
/// resistor implements exactly as much of the protocol as it needs.
pub trait Device: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Resolve nodes, claim branch equations and cache matrix handles.
    /// Parameter and connection validation happens here, not at solve time.
    fn bind(&mut self, ctx: &mut BindContext) -> Result<()>;

    /// Precompute temperature-dependent quantities. Runs before the first
    /// load pass.
    fn temperature(&mut self, _temp_k: f64) -> Result<()> {
        Ok(())
    }

    /// Stamp the linearized device at the previous iterate.
    fn load(&mut self, ctx: &mut LoadContext) -> Result<()>;

    /// Cache handles into the complex system for AC analysis.
    fn bind_ac(&mut self, _ctx: &mut AcBindContext) -> Result<()> {
        Ok(())
    }

    /// Stamp the small-signal admittance at frequency ω.
    fn load_ac(&mut self, _ctx: &mut AcLoadContext) {}

    /// Declare integration states and write their initial values.
    fn init_states(&mut self, _ctx: &mut StateInitContext) {}

    /// Observe an accepted time point; may register future breakpoints.
    fn accept(&mut self, _ctx: &mut AcceptContext) {}

    /// Names accepted by `set_param`/`get_param`.
    fn param_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn set_param(&mut self, param: &str, _value: f64) -> Result<()> {
        Err(Error::UnknownParameter {
            device: self.name().into(),
            param: param.into(),
        })
    }

    fn get_param(&self, _param: &str) -> Option<f64> {
        None
    }

    /// Independent sources scale with the source-stepping factor.
    fn is_source(&self) -> bool {
        false
    }
}

/// Cached handles for the four positions of a two-terminal admittance
/// stamp. Works for the real and the complex system alike.
#[derive(Debug, Clone, Copy)]
pub struct TwoTerminal {
    pp: ElemId,
    pn: ElemId,
    np: ElemId,
    nn: ElemId,
}

impl TwoTerminal {
    /// Handles pointing at the ground sink; stamps are discarded. Devices
    /// start out unbound and receive real handles at bind time.
    pub const UNBOUND: TwoTerminal = TwoTerminal {
        pp: ElemId::SINK,
        pn: ElemId::SINK,
        np: ElemId::SINK,
        nn: ElemId::SINK,
    };

    pub fn bind<F: Scalar>(matrix: &mut SparseMatrix<F>, p: usize, n: usize) -> Result<Self> {
        Ok(Self {
            pp: matrix.get_element(p, p)?,
            pn: matrix.get_element(p, n)?,
            np: matrix.get_element(n, p)?,
            nn: matrix.get_element(n, n)?,
        })
    }

    /// Stamp admittance `y` between the two terminals.
    pub fn stamp<F: Scalar>(&self, matrix: &mut SparseMatrix<F>, y: F) {
        matrix[self.pp] += y;
        matrix[self.nn] += y;
        matrix[self.pn] -= y;
        matrix[self.np] -= y;
    }
}

/// Cached RHS handles for a current flowing from `p` to `n`.
#[derive(Debug, Clone, Copy)]
pub struct RhsPair {
    p: VecElemId,
    n: VecElemId,
}

impl RhsPair {
    /// Handles pointing at the ground sink; see [`TwoTerminal::UNBOUND`].
    pub const UNBOUND: RhsPair = RhsPair {
        p: VecElemId::SINK,
        n: VecElemId::SINK,
    };

    pub fn bind<F: Scalar>(rhs: &mut SparseVector<F>, p: usize, n: usize) -> Self {
        Self {
            p: rhs.get_element(p),
            n: rhs.get_element(n),
        }
    }

    /// Stamp a current `i` flowing out of `p`, into `n`.
    pub fn stamp<F: Scalar>(&self, rhs: &mut SparseVector<F>, i: F) {
        rhs[self.p] -= i;
        rhs[self.n] += i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_terminal_stamp_pattern() {
        let mut m = SparseMatrix::<f64>::new();
        let t = TwoTerminal::bind(&mut m, 1, 2).unwrap();
        t.stamp(&mut m, 0.5);
        assert_eq!(m.value_at(1, 1), 0.5);
        assert_eq!(m.value_at(2, 2), 0.5);
        assert_eq!(m.value_at(1, 2), -0.5);
        assert_eq!(m.value_at(2, 1), -0.5);
    }

    #[test]
    fn test_two_terminal_to_ground() {
        let mut m = SparseMatrix::<f64>::new();
        let t = TwoTerminal::bind(&mut m, 1, 0).unwrap();
        t.stamp(&mut m, 2.0);
        // Only the (1,1) position lands in the system; the rest hit the sink.
        assert_eq!(m.value_at(1, 1), 2.0);
        assert_eq!(m.order(), 1);
    }

    #[test]
    fn test_rhs_pair_direction() {
        let mut rhs = SparseVector::<f64>::new();
        let pair = RhsPair::bind(&mut rhs, 0, 1);
        pair.stamp(&mut rhs, 1e-3);
        // 1 mA from ground into node 1.
        assert_eq!(rhs.value_at(1), 1e-3);
    }
}
