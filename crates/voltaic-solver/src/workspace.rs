//! The per-analysis workspace: variables, real system and bias state.
//!
//! A workspace is built at setup and dropped at teardown; matrix handles
//! held by devices are only valid for its lifetime, which is why re-running
//! an analysis always re-binds from scratch.

use voltaic_core::circuit::Circuit;
use voltaic_core::device::BindContext;
use voltaic_core::sparse::{SparseMatrix, SparseVector};
use voltaic_core::state::BiasState;
use voltaic_core::variables::VariableMap;

use crate::error::Result;
use crate::newton::Options;

/// Conductance of the Norton clamp enforcing a `.IC` node voltage during
/// the DC solve.
const IC_CLAMP_G: f64 = 1e10;

pub struct Workspace {
    pub vars: VariableMap,
    pub matrix: SparseMatrix<f64>,
    pub rhs: SparseVector<f64>,
    pub state: BiasState,
    /// `.IC` clamps as (variable index, forced voltage); stamped only while
    /// `clamps_active`.
    pub clamps: Vec<(usize, f64)>,
    pub clamps_active: bool,
}

impl Workspace {
    /// Bind every device, reserve the node diagonals the convergence aids
    /// stamp into, freeze the matrix and run the temperature phase.
    pub fn setup(circuit: &mut Circuit, options: &Options) -> Result<Self> {
        let mut vars = VariableMap::new();
        let mut matrix = SparseMatrix::new();
        let mut rhs = SparseVector::new();

        for dev in circuit.devices_mut() {
            let mut ctx = BindContext {
                vars: &mut vars,
                matrix: &mut matrix,
                rhs: &mut rhs,
            };
            dev.bind(&mut ctx)?;
        }

        // Node diagonals must exist for the gmin shunt and `.IC` clamps.
        for i in 1..=vars.len() {
            if !vars.is_current(i) {
                matrix.get_element(i, i)?;
            }
        }
        matrix.fix_equations();

        let mut state = BiasState::new(vars.len());
        state.gmin = options.gmin;
        state.temperature = options.temperature;

        // Temperature precedes every load phase.
        for dev in circuit.devices_mut() {
            dev.temperature(options.temperature)?;
        }

        let clamps = circuit
            .initial_conditions()
            .iter()
            .filter_map(|(node, v)| vars.find_node(node).map(|idx| (idx, *v)))
            .filter(|(idx, _)| *idx > 0)
            .collect();

        Ok(Self {
            vars,
            matrix,
            rhs,
            state,
            clamps,
            clamps_active: false,
        })
    }

    /// Stamp the active convergence aids: the gmin-stepping shunt on every
    /// node diagonal and the `.IC` Norton clamps.
    pub fn stamp_aids(&mut self) -> Result<()> {
        if self.state.gshunt > 0.0 {
            for i in 1..=self.vars.len() {
                if !self.vars.is_current(i) {
                    let d = self.matrix.get_element(i, i)?;
                    self.matrix[d] += self.state.gshunt;
                }
            }
        }
        if self.clamps_active {
            for &(idx, v) in &self.clamps {
                let d = self.matrix.get_element(idx, idx)?;
                self.matrix[d] += IC_CLAMP_G;
                let r = self.rhs.get_element(idx);
                self.rhs[r] += IC_CLAMP_G * v;
            }
        }
        Ok(())
    }
}
