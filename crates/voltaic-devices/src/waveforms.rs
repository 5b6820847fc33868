//! Time-varying source waveforms for transient analysis.

use std::f64::consts::PI;

use voltaic_core::breakpoints::Breakpoints;
use voltaic_core::error::{Error, Result};

/// A time-varying waveform specification.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Waveform {
    /// Constant DC value (time-independent).
    Dc(f64),

    /// Pulse waveform: PULSE(V1 V2 TD TR TF PW PER)
    ///
    /// - V1: initial value
    /// - V2: pulsed value
    /// - TD: delay before the first pulse
    /// - TR: rise time
    /// - TF: fall time
    /// - PW: pulse width (at V2)
    /// - PER: period (0 for a single pulse)
    Pulse {
        v1: f64,
        v2: f64,
        td: f64,
        tr: f64,
        tf: f64,
        pw: f64,
        per: f64,
    },

    /// Damped sinusoid: SIN(VO VA FREQ TD THETA PHASE)
    Sin {
        vo: f64,
        va: f64,
        freq: f64,
        td: f64,
        theta: f64,
        phase: f64,
    },

    /// Piecewise linear waveform: PWL(T1 V1 T2 V2 ...)
    Pwl {
        /// Time-value pairs, sorted by time.
        points: Vec<(f64, f64)>,
    },
}

impl Waveform {
    pub fn dc(value: f64) -> Self {
        Waveform::Dc(value)
    }

    pub fn pulse(v1: f64, v2: f64, td: f64, tr: f64, tf: f64, pw: f64, per: f64) -> Self {
        Waveform::Pulse {
            v1,
            v2,
            td,
            tr,
            tf,
            pw,
            per,
        }
    }

    pub fn sin(vo: f64, va: f64, freq: f64) -> Self {
        Waveform::Sin {
            vo,
            va,
            freq,
            td: 0.0,
            theta: 0.0,
            phase: 0.0,
        }
    }

    pub fn pwl(points: Vec<(f64, f64)>) -> Self {
        Waveform::Pwl { points }
    }

    /// Parameter sanity checks, run once at device bind time.
    pub fn validate(&self, device: &str) -> Result<()> {
        let fail = |param: &str, reason: &str| {
            Err(Error::InvalidParameter {
                device: device.into(),
                param: param.into(),
                reason: reason.into(),
            })
        };
        match self {
            Waveform::Dc(_) => Ok(()),
            Waveform::Pulse {
                td, tr, tf, pw, per, ..
            } => {
                if *tr < 0.0 {
                    return fail("tr", "rise time must be non-negative");
                }
                if *tf < 0.0 {
                    return fail("tf", "fall time must be non-negative");
                }
                if *pw < 0.0 {
                    return fail("pw", "pulse width must be non-negative");
                }
                if *td < 0.0 {
                    return fail("td", "delay must be non-negative");
                }
                if *per < 0.0 {
                    return fail("per", "period must be non-negative");
                }
                if *per > 0.0 && *per < tr + tf + pw {
                    return fail("per", "period shorter than the pulse itself");
                }
                Ok(())
            }
            Waveform::Sin { freq, .. } => {
                if *freq < 0.0 {
                    return fail("freq", "frequency must be non-negative");
                }
                Ok(())
            }
            Waveform::Pwl { points } => {
                if points.windows(2).any(|w| w[1].0 <= w[0].0) {
                    return fail("pwl", "time points must be strictly increasing");
                }
                Ok(())
            }
        }
    }

    /// Evaluate the waveform at a given time.
    pub fn value_at(&self, time: f64) -> f64 {
        match self {
            Waveform::Dc(v) => *v,
            Waveform::Pulse {
                v1,
                v2,
                td,
                tr,
                tf,
                pw,
                per,
            } => eval_pulse(*v1, *v2, *td, *tr, *tf, *pw, *per, time),
            Waveform::Sin {
                vo,
                va,
                freq,
                td,
                theta,
                phase,
            } => eval_sin(*vo, *va, *freq, *td, *theta, *phase, time),
            Waveform::Pwl { points } => eval_pwl(points, time),
        }
    }

    /// The value used for operating-point calculation.
    ///
    /// For PULSE this is V1, for SIN the offset VO, for PWL the first value.
    pub fn dc_value(&self) -> f64 {
        match self {
            Waveform::Dc(v) => *v,
            Waveform::Pulse { v1, .. } => *v1,
            Waveform::Sin { vo, .. } => *vo,
            Waveform::Pwl { points } => points.first().map(|(_, v)| *v).unwrap_or(0.0),
        }
    }

    /// Register the waveform's upcoming discontinuities after `now`.
    ///
    /// Called from the accepted-point hook, so registrations made while a
    /// step was being rejected never survive.
    pub fn register_breakpoints(&self, breakpoints: &mut Breakpoints, now: f64) {
        match self {
            Waveform::Dc(_) | Waveform::Sin { .. } => {}
            Waveform::Pulse {
                td,
                tr,
                tf,
                pw,
                per,
                ..
            } => {
                let edges = [0.0, *tr, tr + pw, tr + pw + tf];
                // Corners of the current and the next period cover every
                // reachable edge before the next accepted point.
                let cycle = if *per > 0.0 {
                    ((now - td) / per).floor().max(0.0)
                } else {
                    0.0
                };
                for k in 0..2u32 {
                    let base = td + (cycle + f64::from(k)) * per.max(0.0);
                    for e in edges {
                        breakpoints.set_breakpoint(base + e, now);
                    }
                    if *per == 0.0 {
                        break;
                    }
                }
            }
            Waveform::Pwl { points } => {
                for &(t, _) in points {
                    breakpoints.set_breakpoint(t, now);
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn eval_pulse(v1: f64, v2: f64, td: f64, tr: f64, tf: f64, pw: f64, per: f64, t: f64) -> f64 {
    if t < td {
        return v1;
    }
    let t_rel = if per > 0.0 { (t - td) % per } else { t - td };

    if t_rel < tr {
        if tr == 0.0 {
            v2
        } else {
            v1 + (v2 - v1) * t_rel / tr
        }
    } else if t_rel < tr + pw {
        v2
    } else if t_rel < tr + pw + tf {
        if tf == 0.0 {
            v1
        } else {
            v2 - (v2 - v1) * (t_rel - tr - pw) / tf
        }
    } else {
        v1
    }
}

fn eval_sin(vo: f64, va: f64, freq: f64, td: f64, theta: f64, phase: f64, t: f64) -> f64 {
    if t < td {
        return vo;
    }
    let t_rel = t - td;
    let phase_rad = phase * PI / 180.0;
    let damping = if theta > 0.0 {
        (-theta * t_rel).exp()
    } else {
        1.0
    };
    vo + va * damping * (2.0 * PI * freq * t_rel + phase_rad).sin()
}

fn eval_pwl(points: &[(f64, f64)], t: f64) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    if t <= points[0].0 {
        return points[0].1;
    }
    if t >= points[points.len() - 1].0 {
        return points[points.len() - 1].1;
    }
    for w in points.windows(2) {
        let (t0, v0) = w[0];
        let (t1, v1) = w[1];
        if t >= t0 && t <= t1 {
            return v0 + (v1 - v0) * (t - t0) / (t1 - t0);
        }
    }
    0.0
}
