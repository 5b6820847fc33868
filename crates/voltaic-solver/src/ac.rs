//! AC small-signal analysis.
//!
//! The complex system is bound once around the converged operating point;
//! each frequency point is one load, one factor and one solve of the
//! complex matrix.

use std::f64::consts::PI;

use num_complex::Complex;
use voltaic_core::circuit::Circuit;
use voltaic_core::device::{AcBindContext, AcLoadContext};
use voltaic_core::sparse::{SparseMatrix, SparseVector};
use voltaic_core::variables::VariableMap;

use crate::error::{Error, Result};
use crate::newton::{solve_bias, Options};
use crate::workspace::Workspace;

/// Frequency spacing of an AC sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcSweepType {
    /// Linear spacing; `points` is the total count.
    Linear,
    /// Logarithmic spacing; `points` per decade.
    Decade,
    /// Logarithmic spacing; `points` per octave.
    Octave,
}

/// An AC sweep specification, enumerable as a lazy sequence of points.
#[derive(Debug, Clone)]
pub struct FrequencySweep {
    pub sweep_type: AcSweepType,
    pub points: usize,
    pub fstart: f64,
    pub fstop: f64,
}

impl FrequencySweep {
    pub fn linear(points: usize, fstart: f64, fstop: f64) -> Self {
        Self {
            sweep_type: AcSweepType::Linear,
            points,
            fstart,
            fstop,
        }
    }

    pub fn decade(points_per_decade: usize, fstart: f64, fstop: f64) -> Self {
        Self {
            sweep_type: AcSweepType::Decade,
            points: points_per_decade,
            fstart,
            fstop,
        }
    }

    pub fn octave(points_per_octave: usize, fstart: f64, fstop: f64) -> Self {
        Self {
            sweep_type: AcSweepType::Octave,
            points: points_per_octave,
            fstart,
            fstop,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.points == 0 {
            return Err(Error::InvalidConfig("sweep needs at least one point".into()));
        }
        if self.fstart <= 0.0 || self.fstop < self.fstart {
            return Err(Error::InvalidConfig(
                "frequency range must be positive and ascending".into(),
            ));
        }
        Ok(())
    }

    /// Lazily enumerate the sweep frequencies in hertz.
    pub fn iter(&self) -> FrequencyIter {
        FrequencyIter {
            sweep: self.clone(),
            index: 0,
            done: false,
        }
    }
}

/// Iterator over the frequencies of a [`FrequencySweep`].
#[derive(Debug, Clone)]
pub struct FrequencyIter {
    sweep: FrequencySweep,
    index: usize,
    done: bool,
}

impl Iterator for FrequencyIter {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.done {
            return None;
        }
        let s = &self.sweep;
        let f = match s.sweep_type {
            AcSweepType::Linear => {
                if self.index >= s.points {
                    self.done = true;
                    return None;
                }
                if s.points == 1 {
                    s.fstart
                } else {
                    s.fstart + (s.fstop - s.fstart) * self.index as f64 / (s.points - 1) as f64
                }
            }
            AcSweepType::Decade => s.fstart * 10f64.powf(self.index as f64 / s.points as f64),
            AcSweepType::Octave => s.fstart * 2f64.powf(self.index as f64 / s.points as f64),
        };
        // Log sweeps stop once the next point passes fstop (with a little
        // slack so the endpoint itself survives rounding).
        if f > s.fstop * (1.0 + 1e-9) {
            self.done = true;
            return None;
        }
        self.index += 1;
        Some(f)
    }
}

/// AC analysis configuration and driver.
#[derive(Debug)]
pub struct AcAnalysis {
    pub sweep: FrequencySweep,
    /// Retain the operating-point solution in the result.
    pub keep_op_info: bool,
    pub options: Options,
}

impl AcAnalysis {
    pub fn new(sweep: FrequencySweep) -> Self {
        Self {
            sweep,
            keep_op_info: false,
            options: Options::default(),
        }
    }

    /// Run the sweep, collecting every point.
    pub fn run(&self, circuit: &mut Circuit) -> Result<AcResult> {
        self.run_with(circuit, |_| true)
    }

    /// Run the sweep, streaming each solved frequency point. Returning
    /// `false` cancels the remaining points.
    pub fn run_with(
        &self,
        circuit: &mut Circuit,
        mut on_point: impl FnMut(&AcPointView) -> bool,
    ) -> Result<AcResult> {
        self.sweep.validate()?;

        // Phase order is strict: bias first, frequency second.
        let mut ws = Workspace::setup(circuit, &self.options)?;
        solve_bias(circuit, &mut ws, &self.options)?;

        let mut cmatrix: SparseMatrix<Complex<f64>> = SparseMatrix::new();
        let mut crhs: SparseVector<Complex<f64>> = SparseVector::new();
        for dev in circuit.devices_mut() {
            let mut ctx = AcBindContext {
                matrix: &mut cmatrix,
                rhs: &mut crhs,
            };
            dev.bind_ac(&mut ctx)?;
        }
        // Variables with no AC stamp still need their equation present.
        for i in 1..=ws.vars.len() {
            cmatrix.get_element(i, i)?;
        }
        cmatrix.fix_equations();

        let mut result = AcResult {
            vars: ws.vars,
            points: Vec::new(),
            op: self.keep_op_info.then(|| ws.state.solution.clone()),
        };
        let mut csol = vec![Complex::new(0.0, 0.0); result.vars.len() + 1];

        for (i, freq) in self.sweep.iter().enumerate() {
            let omega = 2.0 * PI * freq;
            cmatrix.clear();
            crhs.clear();
            for dev in circuit.devices_mut() {
                let mut ctx = AcLoadContext {
                    matrix: &mut cmatrix,
                    rhs: &mut crhs,
                    omega,
                    op: &ws.state.solution,
                };
                dev.load_ac(&mut ctx);
            }
            if i == 0 {
                cmatrix.order_and_factor()?;
            } else if !cmatrix.factor() {
                cmatrix.set_needs_reordering();
                cmatrix.order_and_factor()?;
            }
            cmatrix.solve(&crhs, &mut csol)?;
            let keep_going = {
                let view = AcPointView {
                    vars: &result.vars,
                    solution: &csol,
                    frequency: freq,
                };
                on_point(&view)
            };
            result.points.push(AcPoint {
                frequency: freq,
                solution: csol.clone(),
            });
            if !keep_going {
                break;
            }
        }
        Ok(result)
    }
}

/// A read-only view of one solved frequency point.
pub struct AcPointView<'a> {
    vars: &'a VariableMap,
    solution: &'a [Complex<f64>],
    frequency: f64,
}

impl AcPointView<'_> {
    pub fn voltage(&self, node: &str) -> Option<Complex<f64>> {
        self.vars.find_node(node).map(|i| self.solution[i])
    }

    pub fn current(&self, device: &str) -> Option<Complex<f64>> {
        self.vars.find_branch(device).map(|i| self.solution[i])
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }
}

/// One frequency point of an AC sweep.
#[derive(Debug, Clone)]
pub struct AcPoint {
    pub frequency: f64,
    solution: Vec<Complex<f64>>,
}

/// Result of an AC analysis.
#[derive(Debug)]
pub struct AcResult {
    vars: VariableMap,
    pub points: Vec<AcPoint>,
    /// Operating-point solution, kept when `keep_op_info` is set.
    pub op: Option<Vec<f64>>,
}

impl AcResult {
    pub fn frequencies(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.frequency).collect()
    }

    /// Complex node voltage at sweep point `idx`.
    pub fn voltage(&self, node: &str, idx: usize) -> Option<Complex<f64>> {
        let i = self.vars.find_node(node)?;
        self.points.get(idx).map(|p| p.solution[i])
    }

    /// Complex branch current at sweep point `idx`.
    pub fn current(&self, device: &str, idx: usize) -> Option<Complex<f64>> {
        let i = self.vars.find_branch(device)?;
        self.points.get(idx).map(|p| p.solution[i])
    }

    /// |V(node)| across the sweep as `(frequency, magnitude)` pairs.
    pub fn magnitude_waveform(&self, node: &str) -> Vec<(f64, f64)> {
        let Some(i) = self.vars.find_node(node) else {
            return Vec::new();
        };
        self.points
            .iter()
            .map(|p| (p.frequency, p.solution[i].norm()))
            .collect()
    }

    /// Magnitude in dB at one sweep point.
    pub fn magnitude_db(&self, node: &str, idx: usize) -> Option<f64> {
        self.voltage(node, idx).map(|v| 20.0 * v.norm().log10())
    }

    /// Phase in degrees at one sweep point.
    pub fn phase_deg(&self, node: &str, idx: usize) -> Option<f64> {
        self.voltage(node, idx).map(|v| v.arg().to_degrees())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_sweep_endpoints() {
        let s = FrequencySweep::linear(5, 100.0, 500.0);
        let f: Vec<_> = s.iter().collect();
        assert_eq!(f.len(), 5);
        assert!((f[0] - 100.0).abs() < 1e-9);
        assert!((f[4] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_decade_sweep_points_per_decade() {
        let s = FrequencySweep::decade(10, 1.0, 100.0);
        let f: Vec<_> = s.iter().collect();
        // Two decades at 10 points each, endpoint included.
        assert_eq!(f.len(), 21);
        assert!((f[10] - 10.0).abs() < 1e-9);
        assert!((f[20] - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_octave_sweep_doubles() {
        let s = FrequencySweep::octave(1, 1.0, 8.0);
        let f: Vec<_> = s.iter().collect();
        assert_eq!(f.len(), 4);
        assert!((f[3] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_sweep_is_lazy() {
        // An enormous sweep costs nothing until consumed.
        let s = FrequencySweep::decade(1_000_000, 1.0, 1e12);
        let mut it = s.iter();
        assert!(it.next().is_some());
        assert!(it.next().is_some());
    }

    #[test]
    fn test_invalid_range_rejected() {
        let s = FrequencySweep::linear(10, 0.0, 100.0);
        assert!(s.validate().is_err());
    }
}
