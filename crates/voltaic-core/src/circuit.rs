//! The entity collection handed to an analysis.

use crate::device::Device;

/// A circuit: named devices plus optional `.IC` initial conditions.
///
/// The engine assumes sole ownership from setup to teardown; independent
/// circuits may run on independent threads.
#[derive(Debug, Default)]
pub struct Circuit {
    title: Option<String>,
    devices: Vec<Box<dyn Device>>,
    ics: Vec<(String, f64)>,
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Add a device. Builder-style so circuits read like netlists.
    pub fn add(&mut self, device: impl Device + 'static) -> &mut Self {
        self.devices.push(Box::new(device));
        self
    }

    /// Declare a `.IC` node voltage for transient analysis.
    pub fn set_initial_condition(&mut self, node: impl Into<String>, voltage: f64) -> &mut Self {
        self.ics.push((node.into(), voltage));
        self
    }

    pub fn initial_conditions(&self) -> &[(String, f64)] {
        &self.ics
    }

    /// Case-insensitive device lookup.
    pub fn device(&self, name: &str) -> Option<&dyn Device> {
        self.devices
            .iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
            .map(|d| d.as_ref())
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut Box<dyn Device>> {
        self.devices
            .iter_mut()
            .find(|d| d.name().eq_ignore_ascii_case(name))
    }

    pub fn devices(&self) -> &[Box<dyn Device>] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [Box<dyn Device>] {
        &mut self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BindContext, LoadContext};
    use crate::error::Result;

    #[derive(Debug)]
    struct Dummy {
        name: String,
    }

    impl Device for Dummy {
        fn name(&self) -> &str {
            &self.name
        }

        fn bind(&mut self, _ctx: &mut BindContext) -> Result<()> {
            Ok(())
        }

        fn load(&mut self, _ctx: &mut LoadContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let mut ckt = Circuit::new();
        ckt.add(Dummy { name: "R1".into() });
        assert!(ckt.device("r1").is_some());
        assert!(ckt.device("R2").is_none());
    }

    #[test]
    fn test_initial_conditions_recorded() {
        let mut ckt = Circuit::new();
        ckt.set_initial_condition("out", 2.5);
        assert_eq!(ckt.initial_conditions(), &[("out".to_string(), 2.5)]);
    }
}
