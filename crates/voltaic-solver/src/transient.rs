//! Transient analysis: the variable-step integration driver.
//!
//! Each step: propose a step size bounded by the breakpoint table, run the
//! Newton sub-iteration (halving the step on non-convergence), estimate the
//! local truncation error, then accept or reject. Accepted points stream to
//! the caller's callback, which can cancel the run between steps.

use voltaic_core::breakpoints::Breakpoints;
use voltaic_core::circuit::Circuit;
use voltaic_core::device::{AcceptContext, StateInitContext};
use voltaic_core::integration::{Integrator, Method};
use voltaic_core::variables::VariableMap;

use crate::error::{Error, Result};
use crate::export::ExportPoint;
use crate::newton::{iterate, solve_bias, Options};
use crate::workspace::Workspace;

/// Transient analysis configuration.
#[derive(Debug, Clone)]
pub struct TransientConfig {
    /// First emitted time point.
    pub tstart: f64,
    /// Final time point.
    pub tstop: f64,
    /// Suggested output step.
    pub tstep: f64,
    /// Hard step ceiling; defaults to `(tstop − tstart) / 50`.
    pub max_step: Option<f64>,
    /// Integration method.
    pub method: Method,
    /// Skip the operating point and start from the declared `.IC` values.
    pub use_ic: bool,
}

impl TransientConfig {
    pub fn new(tstep: f64, tstop: f64) -> Self {
        Self {
            tstart: 0.0,
            tstop,
            tstep,
            max_step: None,
            method: Method::Trapezoidal,
            use_ic: false,
        }
    }

    fn max_step(&self) -> f64 {
        self.max_step
            .unwrap_or((self.tstop - self.tstart) / 50.0)
            .min(self.tstop - self.tstart)
    }
}

/// Smallest representable step relative to the step ceiling.
const DELTA_MIN_FACTOR: f64 = 1e-13;
/// Newton failures tolerated per step before giving up.
const MAX_HALVINGS: usize = 10;
/// Step growth cap between accepted points.
const MAX_GROWTH: f64 = 2.0;

/// One accepted time point.
#[derive(Debug, Clone)]
pub struct TimePoint {
    pub time: f64,
    /// Unknown vector, 1-based (slot 0 is ground).
    pub solution: Vec<f64>,
}

/// Result of a transient run.
#[derive(Debug)]
pub struct TransientResult {
    vars: VariableMap,
    pub points: Vec<TimePoint>,
    /// Attempted steps, accepted or not.
    pub total_steps: usize,
    /// Steps rejected by the truncation-error test.
    pub rejected_steps: usize,
    /// `true` when the callback cancelled the run early.
    pub cancelled: bool,
}

impl TransientResult {
    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.time).collect()
    }

    /// `(time, voltage)` pairs for a named node.
    pub fn voltage_waveform(&self, node: &str) -> Vec<(f64, f64)> {
        let Some(i) = self.vars.find_node(node) else {
            return Vec::new();
        };
        self.points
            .iter()
            .map(|p| (p.time, p.solution[i]))
            .collect()
    }

    /// `(time, current)` pairs for a named branch device.
    pub fn current_waveform(&self, device: &str) -> Vec<(f64, f64)> {
        let Some(i) = self.vars.find_branch(device) else {
            return Vec::new();
        };
        self.points
            .iter()
            .map(|p| (p.time, p.solution[i]))
            .collect()
    }

    /// Linearly interpolate the node voltage at an arbitrary time inside
    /// the simulated span.
    pub fn voltage_at(&self, node: &str, time: f64) -> Option<f64> {
        let i = self.vars.find_node(node)?;
        if self.points.is_empty() {
            return None;
        }
        if time <= self.points[0].time {
            return Some(self.points[0].solution[i]);
        }
        if time >= self.points.last()?.time {
            return Some(self.points.last()?.solution[i]);
        }
        for w in self.points.windows(2) {
            let (t0, t1) = (w[0].time, w[1].time);
            if time >= t0 && time <= t1 {
                let alpha = (time - t0) / (t1 - t0);
                return Some(w[0].solution[i] * (1.0 - alpha) + w[1].solution[i] * alpha);
            }
        }
        None
    }
}

/// Transient analysis driver.
#[derive(Debug)]
pub struct Transient {
    pub config: TransientConfig,
    pub options: Options,
}

impl Transient {
    pub fn new(config: TransientConfig) -> Self {
        Self {
            config,
            options: Options::default(),
        }
    }

    /// Run to completion, collecting every accepted point.
    pub fn run(&self, circuit: &mut Circuit) -> Result<TransientResult> {
        self.run_with(circuit, |_| true)
    }

    /// Run, streaming each accepted point. Returning `false` from the
    /// callback cancels the run after the current point; the partial result
    /// is still returned.
    pub fn run_with(
        &self,
        circuit: &mut Circuit,
        mut on_point: impl FnMut(&ExportPoint) -> bool,
    ) -> Result<TransientResult> {
        let cfg = &self.config;
        if cfg.tstop <= cfg.tstart {
            return Err(Error::InvalidConfig("tstop must exceed tstart".into()));
        }
        if cfg.tstep <= 0.0 {
            return Err(Error::InvalidConfig("tstep must be positive".into()));
        }

        let max_step = cfg.max_step();
        let delta_min = DELTA_MIN_FACTOR * max_step;

        let mut ws = Workspace::setup(circuit, &self.options)?;

        // Initial state: a full operating point, or the declared `.IC`
        // values verbatim when `use_ic` is set.
        if cfg.use_ic {
            for &(idx, v) in &ws.clamps {
                ws.state.solution[idx] = v;
            }
            ws.state.old_solution.copy_from_slice(&ws.state.solution);
            ws.state.init = voltaic_core::state::InitMode::Float;
        } else {
            ws.clamps_active = !ws.clamps.is_empty();
            solve_bias(circuit, &mut ws, &self.options)?;
            ws.clamps_active = false;
        }

        // Integration states seeded from the initial solution.
        let mut integ = Integrator::new(cfg.method);
        for dev in circuit.devices_mut() {
            let mut ctx = StateInitContext {
                integrator: &mut integ,
                solution: &ws.state.solution,
            };
            dev.init_states(&mut ctx);
        }
        let first_delta = (cfg.tstep.min(max_step) / 100.0).max(delta_min);
        integ.initialize(cfg.tstart, first_delta);

        let mut breakpoints = Breakpoints::new(delta_min);
        let mut result = TransientResult {
            vars: VariableMap::new(),
            points: Vec::new(),
            total_steps: 0,
            rejected_steps: 0,
            cancelled: false,
        };

        // The initial point is an accepted point: devices observe it and
        // seed the breakpoint table with their upcoming discontinuities.
        for dev in circuit.devices_mut() {
            let mut ctx = AcceptContext {
                breakpoints: &mut breakpoints,
                time: cfg.tstart,
            };
            dev.accept(&mut ctx);
        }
        result.points.push(TimePoint {
            time: cfg.tstart,
            solution: ws.state.solution.clone(),
        });
        let continue_run = {
            let point = ExportPoint::new(&ws.vars, &ws.state.solution).at_time(cfg.tstart);
            on_point(&point)
        };
        if !continue_run {
            result.cancelled = true;
            result.vars = ws.vars;
            return Ok(result);
        }

        let mut proposed = first_delta;
        let mut rollback = ws.state.solution.clone();

        while integ.time() < cfg.tstop - delta_min {
            let t_now = integ.time();

            // Step proposal, clamped by the ceiling, the stop time and the
            // next breakpoint; never step across a breakpoint.
            let mut delta = proposed.min(max_step).min(cfg.tstop - t_now);
            let mut on_breakpoint = false;
            if let Some(bp) = breakpoints.next_after(t_now) {
                if t_now + delta >= bp - delta_min {
                    delta = bp - t_now;
                    on_breakpoint = true;
                }
            }
            if delta < delta_min {
                return Err(Error::TimestepTooSmall {
                    delta,
                    time: t_now,
                });
            }
            if on_breakpoint {
                // Waveform discontinuity: restart the multistep formula.
                integ.reset_order();
            }

            rollback.copy_from_slice(&ws.state.solution);
            let mut halvings = 0;
            let tau = loop {
                result.total_steps += 1;
                integ.begin_step(delta);
                match iterate(
                    circuit,
                    &mut ws,
                    &self.options,
                    Some(&mut integ),
                    t_now + delta,
                    self.options.itl4,
                ) {
                    Ok(_) => {}
                    Err(Error::NoConvergence { .. }) => {
                        halvings += 1;
                        if halvings > MAX_HALVINGS {
                            return Err(Error::NoConvergence {
                                iterations: self.options.itl4 * halvings,
                                time: Some(t_now + delta),
                            });
                        }
                        ws.state.solution.copy_from_slice(&rollback);
                        delta *= 0.5;
                        on_breakpoint = false;
                        if delta < delta_min {
                            return Err(Error::TimestepTooSmall {
                                delta,
                                time: t_now,
                            });
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                }

                let tau = integ.max_local_error(
                    self.options.reltol,
                    self.options.chgtol,
                    self.options.trtol,
                );
                if tau > 1.0 && delta > delta_min * 2.0 {
                    // Reject: restore and shrink.
                    result.rejected_steps += 1;
                    let order = integ.order();
                    integ.reject();
                    ws.state.solution.copy_from_slice(&rollback);
                    let shrink = 0.9 * tau.powf(-1.0 / (order as f64 + 1.0));
                    delta = (delta * shrink).max(delta_min);
                    on_breakpoint = false;
                    log::trace!("step rejected at t = {:e}, tau = {}", t_now, tau);
                    continue;
                }
                break tau;
            };

            // Accept: commit history, let devices observe the point.
            let order = integ.order();
            integ.accept();
            let t_accepted = integ.time();
            if on_breakpoint {
                breakpoints.clear_passed(t_accepted);
            }
            for dev in circuit.devices_mut() {
                let mut ctx = AcceptContext {
                    breakpoints: &mut breakpoints,
                    time: t_accepted,
                };
                dev.accept(&mut ctx);
            }
            result.points.push(TimePoint {
                time: t_accepted,
                solution: ws.state.solution.clone(),
            });

            // Cooperative cancellation between accepted steps.
            let keep_going = {
                let point = ExportPoint::new(&ws.vars, &ws.state.solution).at_time(t_accepted);
                on_point(&point)
            };
            if !keep_going {
                result.cancelled = true;
                break;
            }

            // Next step proposal from the error estimate.
            let grow = if tau > 1e-12 {
                (0.9 * tau.powf(-1.0 / (order as f64 + 1.0))).min(MAX_GROWTH)
            } else {
                MAX_GROWTH
            };
            proposed = (delta * grow).min(max_step);
        }

        result.vars = ws.vars;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use voltaic_core::Circuit;
    use voltaic_devices::{Capacitor, Resistor, VoltageSource};

    use super::*;

    fn rc_circuit(v: f64, r: f64, c: f64) -> Circuit {
        let mut ckt = Circuit::new();
        ckt.add(VoltageSource::new("V1", "in", "0", v));
        ckt.add(Resistor::new("R1", "in", "out", r));
        ckt.add(Capacitor::new("C1", "out", "0", c));
        ckt
    }

    #[test]
    fn test_rc_at_equilibrium_stays_flat() {
        // Starting from the DC solution with a DC source, nothing moves.
        let mut ckt = rc_circuit(10.0, 10.0, 20.0);
        let tran = Transient::new(TransientConfig::new(1.0, 10.0));
        let result = tran.run(&mut ckt).unwrap();
        assert!(result.points.len() > 2);
        for p in &result.points {
            let v = p.solution[result.vars.find_node("out").unwrap()];
            assert!(
                (v - 10.0).abs() < 1e-9,
                "V(out) drifted to {} at t = {}",
                v,
                p.time
            );
        }
    }

    #[test]
    fn test_rc_charges_from_ic_zero() {
        // τ = 1 ms; from V(out) = 0 the capacitor charges toward 5 V.
        let mut ckt = rc_circuit(5.0, 1e3, 1e-6);
        ckt.set_initial_condition("out", 0.0);
        let mut config = TransientConfig::new(1e-4, 5e-3);
        config.use_ic = true;
        let result = Transient::new(config).run(&mut ckt).unwrap();

        let v_end = result.voltage_at("out", 5e-3).unwrap();
        assert!((v_end - 5.0).abs() < 0.05, "V(out) at 5τ = {}", v_end);

        let v_tau = result.voltage_at("out", 1e-3).unwrap();
        let expected = 5.0 * (1.0 - (-1.0f64).exp());
        assert!(
            (v_tau - expected).abs() < 0.1,
            "V(out) at τ = {} (expected ≈ {})",
            v_tau,
            expected
        );
    }

    #[test]
    fn test_times_strictly_increasing() {
        let mut ckt = rc_circuit(1.0, 1e3, 1e-6);
        let result = Transient::new(TransientConfig::new(1e-4, 2e-3))
            .run(&mut ckt)
            .unwrap();
        let times = result.times();
        assert!(times.windows(2).all(|w| w[1] > w[0]));
        assert!((times[0] - 0.0).abs() < 1e-15);
        assert!((times.last().unwrap() - 2e-3).abs() < 1e-12);
    }

    #[test]
    fn test_cancellation_between_steps() {
        let mut ckt = rc_circuit(1.0, 1e3, 1e-6);
        let mut seen = 0;
        let result = Transient::new(TransientConfig::new(1e-4, 2e-3))
            .run_with(&mut ckt, |_| {
                seen += 1;
                seen < 3
            })
            .unwrap();
        assert!(result.cancelled);
        assert_eq!(result.points.len(), 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut ckt = rc_circuit(1.0, 1e3, 1e-6);
        let bad = Transient::new(TransientConfig::new(0.0, 1e-3));
        assert!(matches!(
            bad.run(&mut ckt),
            Err(Error::InvalidConfig(_))
        ));
    }
}
