//! Analysis drivers for voltaic.
//!
//! This crate turns a [`Circuit`](voltaic_core::Circuit) into numbers:
//!
//! - [`OperatingPoint`] — DC bias solve with gmin/source stepping fallbacks
//! - [`DcSweep`] — operating point across a swept source value
//! - [`AcAnalysis`] — small-signal response over a lazy frequency sweep
//! - [`Transient`] — variable-step time-domain integration with breakpoint
//!   handling and truncation-error step control
//!
//! # Example: resistor divider operating point
//!
//! ```rust
//! use voltaic_core::Circuit;
//! use voltaic_devices::{Resistor, VoltageSource};
//! use voltaic_solver::OperatingPoint;
//!
//! let mut ckt = Circuit::new();
//! ckt.add(VoltageSource::new("V1", "in", "0", 10.0));
//! ckt.add(Resistor::new("R1", "in", "out", 1e3));
//! ckt.add(Resistor::new("R2", "out", "0", 1e3));
//!
//! let solution = OperatingPoint::new().run(&mut ckt).unwrap();
//! assert!((solution.voltage("out").unwrap() - 5.0).abs() < 1e-9);
//! ```

pub mod ac;
pub mod error;
pub mod export;
pub mod newton;
pub mod op;
pub mod transient;
mod workspace;

pub use ac::{
    AcAnalysis, AcPoint, AcPointView, AcResult, AcSweepType, FrequencyIter, FrequencySweep,
};
pub use error::{Error, Result};
pub use export::{ExportPoint, PropertyProbe};
pub use newton::Options;
pub use op::{BiasSolution, DcSweep, DcSweepResult, OperatingPoint};
pub use transient::{TimePoint, Transient, TransientConfig, TransientResult};
