//! Export surface: per-point data views handed to streaming callbacks and
//! lazy property probes.

use std::cell::OnceCell;

use voltaic_core::circuit::Circuit;
use voltaic_core::variables::VariableMap;

/// A read-only view of one solution point, emitted once per accepted point.
pub struct ExportPoint<'a> {
    vars: &'a VariableMap,
    solution: &'a [f64],
    time: f64,
    sweep_value: f64,
}

impl<'a> ExportPoint<'a> {
    pub(crate) fn new(vars: &'a VariableMap, solution: &'a [f64]) -> Self {
        Self {
            vars,
            solution,
            time: 0.0,
            sweep_value: 0.0,
        }
    }

    pub(crate) fn at_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    pub(crate) fn at_sweep(mut self, value: f64) -> Self {
        self.sweep_value = value;
        self
    }

    /// Voltage of a named node; `None` for unknown nodes, 0 for ground.
    pub fn voltage(&self, node: &str) -> Option<f64> {
        self.vars.find_node(node).map(|i| self.solution[i])
    }

    /// Branch current of a named device (voltage sources, inductors and
    /// other branch-equation owners).
    pub fn current(&self, device: &str) -> Option<f64> {
        self.vars.find_branch(device).map(|i| self.solution[i])
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn sweep_value(&self) -> f64 {
        self.sweep_value
    }
}

/// A lazy handle on `(entity, parameter)`, resolved against the circuit on
/// first read and cached afterwards.
#[derive(Debug)]
pub struct PropertyProbe {
    entity: String,
    property: String,
    cached: OnceCell<Option<f64>>,
}

impl PropertyProbe {
    pub fn new(entity: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            property: property.into(),
            cached: OnceCell::new(),
        }
    }

    /// Resolve the probe. The first read walks the circuit; later reads are
    /// served from the cache.
    pub fn read(&self, circuit: &Circuit) -> Option<f64> {
        *self.cached.get_or_init(|| {
            circuit
                .device(&self.entity)
                .and_then(|d| d.get_param(&self.property))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_point_accessors() {
        let mut vars = VariableMap::new();
        let n = vars.node("out");
        let b = vars.branch("V1");
        let mut solution = vec![0.0; vars.len() + 1];
        solution[n] = 5.0;
        solution[b] = -1e-3;

        let point = ExportPoint::new(&vars, &solution).at_time(1e-6);
        assert_eq!(point.voltage("out"), Some(5.0));
        assert_eq!(point.voltage("0"), Some(0.0));
        assert_eq!(point.voltage("missing"), None);
        assert_eq!(point.current("v1"), Some(-1e-3));
        assert_eq!(point.time(), 1e-6);
    }
}
