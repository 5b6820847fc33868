//! DC operating point and DC sweep analysis.

use nalgebra::DVector;
use voltaic_core::circuit::Circuit;
use voltaic_core::variables::VariableMap;

use crate::error::{Error, Result};
use crate::export::ExportPoint;
use crate::newton::{solve_bias, Options};
use crate::workspace::Workspace;

/// A converged bias solution with named accessors.
#[derive(Debug)]
pub struct BiasSolution {
    vars: VariableMap,
    solution: Vec<f64>,
    /// Newton iterations spent, including homotopy steps.
    pub iterations: usize,
}

impl BiasSolution {
    pub fn voltage(&self, node: &str) -> Option<f64> {
        self.vars.find_node(node).map(|i| self.solution[i])
    }

    pub fn current(&self, device: &str) -> Option<f64> {
        self.vars.find_branch(device).map(|i| self.solution[i])
    }

    /// The raw unknown vector (1-based; slot 0 is ground).
    pub fn raw(&self) -> &[f64] {
        &self.solution
    }

    /// Node voltages and branch currents as a dense vector, ground dropped.
    pub fn to_dvector(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.vars.len(),
            self.solution.iter().skip(1).copied(),
        )
    }
}

/// Operating-point analysis: all capacitors open, inductors short.
#[derive(Debug, Default)]
pub struct OperatingPoint {
    pub options: Options,
}

impl OperatingPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self, circuit: &mut Circuit) -> Result<BiasSolution> {
        let mut ws = Workspace::setup(circuit, &self.options)?;
        // Declared `.IC` voltages clamp the DC solve.
        ws.clamps_active = !ws.clamps.is_empty();
        let iterations = solve_bias(circuit, &mut ws, &self.options)?;
        Ok(BiasSolution {
            vars: ws.vars,
            solution: ws.state.solution,
            iterations,
        })
    }
}

/// DC sweep of one independent source's `dc` parameter.
#[derive(Debug)]
pub struct DcSweep {
    /// Name of the swept source.
    pub source: String,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
    pub options: Options,
}

impl DcSweep {
    pub fn new(source: impl Into<String>, start: f64, stop: f64, step: f64) -> Self {
        Self {
            source: source.into(),
            start,
            stop,
            step,
            options: Options::default(),
        }
    }

    /// Run the sweep, collecting every point.
    pub fn run(&self, circuit: &mut Circuit) -> Result<DcSweepResult> {
        self.run_with(circuit, |_| true)
    }

    /// Run the sweep, streaming each converged point to `on_point`. A
    /// `false` return cancels the remaining points.
    pub fn run_with(
        &self,
        circuit: &mut Circuit,
        mut on_point: impl FnMut(&ExportPoint) -> bool,
    ) -> Result<DcSweepResult> {
        if self.step == 0.0 {
            return Err(Error::InvalidConfig("sweep step must be non-zero".into()));
        }
        if circuit.device(&self.source).is_none() {
            return Err(Error::UnknownSource(self.source.clone()));
        }

        // The step sign decides whether the sweep marches up or down.
        let mut values = Vec::new();
        let dir = self.step.signum();
        let mut v = self.start;
        while dir * v <= dir * self.stop * (1.0 + 1e-12) + f64::EPSILON {
            values.push(v);
            v += self.step;
        }

        let original = circuit
            .device(&self.source)
            .and_then(|d| d.get_param("dc"));

        let mut ws = Workspace::setup(circuit, &self.options)?;
        let mut result = DcSweepResult {
            source: self.source.clone(),
            sweep_values: Vec::with_capacity(values.len()),
            solutions: Vec::with_capacity(values.len()),
            vars: None,
        };

        for &value in &values {
            if let Some(dev) = circuit.device_mut(&self.source) {
                dev.set_param("dc", value)?;
            }
            solve_bias(circuit, &mut ws, &self.options)?;

            let point = ExportPoint::new(&ws.vars, &ws.state.solution).at_sweep(value);
            let keep_going = on_point(&point);
            result.sweep_values.push(value);
            result.solutions.push(ws.state.solution.clone());
            if !keep_going {
                break;
            }
        }

        // Leave the circuit as we found it.
        if let (Some(v), Some(dev)) = (original, circuit.device_mut(&self.source)) {
            dev.set_param("dc", v)?;
        }
        result.vars = Some(ws.vars);
        Ok(result)
    }
}

/// Result of a DC sweep.
#[derive(Debug)]
pub struct DcSweepResult {
    pub source: String,
    pub sweep_values: Vec<f64>,
    solutions: Vec<Vec<f64>>,
    vars: Option<VariableMap>,
}

impl DcSweepResult {
    /// `(sweep value, node voltage)` pairs across the sweep.
    pub fn voltage_waveform(&self, node: &str) -> Vec<(f64, f64)> {
        let Some(idx) = self.vars.as_ref().and_then(|v| v.find_node(node)) else {
            return Vec::new();
        };
        self.sweep_values
            .iter()
            .zip(&self.solutions)
            .map(|(&sv, sol)| (sv, sol[idx]))
            .collect()
    }

    /// `(sweep value, branch current)` pairs across the sweep.
    pub fn current_waveform(&self, device: &str) -> Vec<(f64, f64)> {
        let Some(idx) = self.vars.as_ref().and_then(|v| v.find_branch(device)) else {
            return Vec::new();
        };
        self.sweep_values
            .iter()
            .zip(&self.solutions)
            .map(|(&sv, sol)| (sv, sol[idx]))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sweep_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sweep_values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use voltaic_devices::{CurrentSource, Diode, Resistor, VoltageSource};

    use super::*;

    #[test]
    fn test_voltage_divider() {
        let mut ckt = Circuit::new();
        ckt.add(VoltageSource::new("V1", "in", "0", 10.0));
        ckt.add(Resistor::new("R1", "in", "out", 1e3));
        ckt.add(Resistor::new("R2", "out", "0", 1e3));

        let sol = OperatingPoint::new().run(&mut ckt).unwrap();
        assert!((sol.voltage("in").unwrap() - 10.0).abs() < 1e-9);
        assert!((sol.voltage("out").unwrap() - 5.0).abs() < 1e-9);
        // Branch current through V1: 10 V across 2 kΩ, into the source.
        assert!((sol.current("V1").unwrap() + 5e-3).abs() < 1e-9);
    }

    #[test]
    fn test_diode_resistor_converges() {
        let mut ckt = Circuit::new();
        ckt.add(VoltageSource::new("V1", "in", "0", 5.0));
        ckt.add(Resistor::new("R1", "in", "a", 1e3));
        ckt.add(Diode::new("D1", "a", "0"));

        let sol = OperatingPoint::new().run(&mut ckt).unwrap();
        let vd = sol.voltage("a").unwrap();
        assert!(vd > 0.5 && vd < 0.8, "V(diode) = {} (expected 0.5-0.8)", vd);
    }

    #[test]
    fn test_current_source_into_resistor() {
        let mut ckt = Circuit::new();
        ckt.add(CurrentSource::new("I1", "0", "out", 2e-3));
        ckt.add(Resistor::new("R1", "out", "0", 500.0));

        let sol = OperatingPoint::new().run(&mut ckt).unwrap();
        assert!((sol.voltage("out").unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_voltage_sources_singular() {
        // Two ideal sources with different values across the same node
        // pair: no consistent solution, the factorization must fail.
        let mut ckt = Circuit::new();
        ckt.add(VoltageSource::new("V1", "a", "0", 5.0));
        ckt.add(VoltageSource::new("V2", "a", "0", 3.0));

        let err = OperatingPoint::new().run(&mut ckt).unwrap_err();
        assert!(
            matches!(
                err,
                Error::Core(voltaic_core::Error::SingularMatrix { .. })
            ),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_dc_sweep_linear_resistor() {
        let mut ckt = Circuit::new();
        ckt.add(VoltageSource::new("V1", "in", "0", 0.0));
        ckt.add(Resistor::new("R1", "in", "out", 1e3));
        ckt.add(Resistor::new("R2", "out", "0", 1e3));

        let sweep = DcSweep::new("V1", 0.0, 4.0, 1.0);
        let result = sweep.run(&mut ckt).unwrap();
        assert_eq!(result.len(), 5);
        let wf = result.voltage_waveform("out");
        for (i, &(sv, v)) in wf.iter().enumerate() {
            assert!((sv - i as f64).abs() < 1e-12);
            assert!((v - sv / 2.0).abs() < 1e-9, "V(out) at {} = {}", sv, v);
        }
    }

    #[test]
    fn test_dc_sweep_unknown_source() {
        let mut ckt = Circuit::new();
        ckt.add(Resistor::new("R1", "a", "0", 1.0));
        let err = DcSweep::new("VX", 0.0, 1.0, 0.5).run(&mut ckt).unwrap_err();
        assert!(matches!(err, Error::UnknownSource(_)));
    }

    #[test]
    fn test_rerun_is_bitwise_identical() {
        let mut ckt = Circuit::new();
        ckt.add(VoltageSource::new("V1", "in", "0", 5.0));
        ckt.add(Resistor::new("R1", "in", "a", 1e3));
        ckt.add(Diode::new("D1", "a", "0"));

        let first = OperatingPoint::new().run(&mut ckt).unwrap();
        let second = OperatingPoint::new().run(&mut ckt).unwrap();
        assert_eq!(first.raw(), second.raw());
        assert_eq!(first.iterations, second.iterations);
    }
}
