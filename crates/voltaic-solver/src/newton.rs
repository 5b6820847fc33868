//! Newton-Raphson driver: assembly → factor → solve → convergence check,
//! with gmin stepping and source stepping as homotopy fallbacks.

use voltaic_core::circuit::Circuit;
use voltaic_core::constants::TEMP_NOMINAL;
use voltaic_core::device::LoadContext;
use voltaic_core::integration::Integrator;
use voltaic_core::state::InitMode;

use crate::error::{Error, Result};
use crate::workspace::Workspace;

/// Per-analysis solver options, all tunable (SPICE defaults).
#[derive(Debug, Clone)]
pub struct Options {
    /// Absolute branch-current tolerance (A).
    pub abstol: f64,
    /// Relative convergence tolerance.
    pub reltol: f64,
    /// Absolute node-voltage tolerance (V).
    pub vntol: f64,
    /// Minimum junction conductance (S).
    pub gmin: f64,
    /// DC iteration cap.
    pub itl1: usize,
    /// Transient sub-step iteration cap.
    pub itl4: usize,
    /// Truncation-error overestimation factor.
    pub trtol: f64,
    /// Charge tolerance for LTE normalization (C).
    pub chgtol: f64,
    /// Simulation temperature (K).
    pub temperature: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            abstol: 1e-12,
            reltol: 1e-3,
            vntol: 1e-6,
            gmin: 1e-12,
            itl1: 100,
            itl4: 10,
            trtol: 7.0,
            chgtol: 1e-14,
            temperature: TEMP_NOMINAL,
        }
    }
}

/// Initial node-to-ground shunt for gmin stepping.
const GSHUNT_START: f64 = 1e-2;
/// Shunt reduction per successful gmin step.
const GSHUNT_FACTOR: f64 = 0.1;
/// Number of source-stepping increments from 0 to 1.
const SRC_STEPS: usize = 10;

/// One Newton loop at fixed homotopy settings. On success the converged
/// iterate is left in `ws.state.solution` and the iteration count is
/// returned.
pub(crate) fn iterate(
    circuit: &mut Circuit,
    ws: &mut Workspace,
    options: &Options,
    mut integrator: Option<&mut Integrator>,
    time: f64,
    max_iter: usize,
) -> Result<usize> {
    for iter in 1..=max_iter {
        ws.matrix.clear();
        ws.rhs.clear();
        ws.state.had_noncon = false;

        for dev in circuit.devices_mut() {
            let mut ctx = LoadContext {
                matrix: &mut ws.matrix,
                rhs: &mut ws.rhs,
                state: &mut ws.state,
                integrator: integrator.as_deref_mut(),
                time,
            };
            dev.load(&mut ctx)?;
        }
        ws.stamp_aids()?;

        if iter == 1 {
            ws.matrix.order_and_factor()?;
        } else if !ws.matrix.factor() {
            log::debug!("refactor hit a zero pivot; re-ordering");
            ws.matrix.set_needs_reordering();
            ws.matrix.order_and_factor()?;
        }

        // x_next lands in the old buffer, then the roles swap.
        ws.matrix.solve(&ws.rhs, &mut ws.state.old_solution)?;

        let converged = !ws.state.had_noncon && iter > 1 && check_convergence(ws, options);

        // After the first iteration the junction seeds (and `.IC` fixing)
        // give way to plain iteration from the previous iterate.
        if ws.state.init != InitMode::Float {
            ws.state.init = InitMode::Float;
        }
        ws.state.swap();

        if converged {
            return Ok(iter);
        }
    }
    Err(Error::NoConvergence {
        iterations: max_iter,
        time: integrator.is_some().then_some(time),
    })
}

/// Component-wise convergence test between the previous iterate
/// (`solution`) and the new one (`old_solution`, pre-swap).
fn check_convergence(ws: &Workspace, options: &Options) -> bool {
    for i in 1..=ws.vars.len() {
        let old = ws.state.solution[i];
        let new = ws.state.old_solution[i];
        let abs = if ws.vars.is_current(i) {
            options.abstol
        } else {
            options.vntol
        };
        let tol = options.reltol * new.abs().max(old.abs()) + abs;
        if (new - old).abs() > tol {
            return false;
        }
    }
    true
}

/// Solve a bias point, escalating through the convergence aids on failure:
/// plain Newton with device limiting, then gmin stepping, then source
/// stepping.
pub(crate) fn solve_bias(
    circuit: &mut Circuit,
    ws: &mut Workspace,
    options: &Options,
) -> Result<usize> {
    ws.state.init = if ws.clamps_active {
        InitMode::Fix
    } else {
        InitMode::Junction
    };
    ws.state.gshunt = 0.0;
    ws.state.source_factor = 1.0;

    match iterate(circuit, ws, options, None, 0.0, options.itl1) {
        Ok(n) => return Ok(n),
        Err(Error::NoConvergence { .. }) => {}
        Err(e) => return Err(e),
    }

    log::warn!("operating point did not converge; trying gmin stepping");
    if let Ok(n) = gmin_stepping(circuit, ws, options) {
        return Ok(n);
    }

    log::warn!("gmin stepping failed; trying source stepping");
    source_stepping(circuit, ws, options)
}

fn gmin_stepping(circuit: &mut Circuit, ws: &mut Workspace, options: &Options) -> Result<usize> {
    ws.state.solution.fill(0.0);
    ws.state.init = InitMode::Junction;
    let mut gshunt = GSHUNT_START;
    let mut total = 0;

    while gshunt >= options.gmin {
        ws.state.gshunt = gshunt;
        total += iterate(circuit, ws, options, None, 0.0, options.itl1)?;
        log::debug!("gmin step converged at gshunt = {gshunt:e}");
        gshunt *= GSHUNT_FACTOR;
    }
    // Final clean solve with the shunt removed.
    ws.state.gshunt = 0.0;
    total += iterate(circuit, ws, options, None, 0.0, options.itl1)?;
    Ok(total)
}

fn source_stepping(circuit: &mut Circuit, ws: &mut Workspace, options: &Options) -> Result<usize> {
    ws.state.solution.fill(0.0);
    ws.state.gshunt = 0.0;
    ws.state.init = InitMode::Junction;
    let mut total = 0;

    for step in 0..=SRC_STEPS {
        ws.state.source_factor = step as f64 / SRC_STEPS as f64;
        total += iterate(circuit, ws, options, None, 0.0, options.itl1)?;
        log::debug!(
            "source step converged at factor = {}",
            ws.state.source_factor
        );
    }
    ws.state.source_factor = 1.0;
    Ok(total)
}
