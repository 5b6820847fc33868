//! # Voltaic
//!
//! A SPICE-class analog circuit simulation engine.
//!
//! Voltaic is a library: build an entity collection, attach parameters and
//! request an analysis. The engine assembles the modified-nodal-analysis
//! system through a doubly-linked sparse matrix, iterates Newton-Raphson
//! with damping and homotopy fallbacks, and integrates stiff circuits with
//! Trapezoidal or Gear formulas under local-truncation-error step control.
//!
//! ## Quick start
//!
//! ```rust
//! use voltaic::prelude::*;
//!
//! // Voltage divider: V1 = 10 V through two 1 kΩ resistors.
//! let mut ckt = Circuit::new();
//! ckt.add(VoltageSource::new("V1", "in", "0", 10.0));
//! ckt.add(Resistor::new("R1", "in", "out", 1e3));
//! ckt.add(Resistor::new("R2", "out", "0", 1e3));
//!
//! let op = OperatingPoint::new().run(&mut ckt).unwrap();
//! assert!((op.voltage("out").unwrap() - 5.0).abs() < 1e-9);
//! ```
//!
//! ## Analyses
//!
//! - [`OperatingPoint`](solver::OperatingPoint) — DC bias point
//! - [`DcSweep`](solver::DcSweep) — bias point across a source sweep
//! - [`AcAnalysis`](solver::AcAnalysis) — small-signal frequency response
//! - [`Transient`](solver::Transient) — time-domain simulation with
//!   breakpoint-aware variable steps

pub use voltaic_core as core;
pub use voltaic_devices as devices;
pub use voltaic_solver as solver;

pub use voltaic_core::{Circuit, Device};
pub use voltaic_solver::{
    AcAnalysis, AcSweepType, BiasSolution, DcSweep, FrequencySweep, OperatingPoint, Options,
    PropertyProbe, Transient, TransientConfig,
};

/// Common imports for building and simulating circuits.
pub mod prelude {
    pub use voltaic_core::integration::Method;
    pub use voltaic_core::Circuit;
    pub use voltaic_devices::{
        Bjt, Capacitor, Cccs, Ccvs, CurrentSource, Diode, Inductor, Jfet, Mosfet, Resistor,
        Vccs, Vcvs, VoltageSource, Waveform,
    };
    pub use voltaic_solver::{
        AcAnalysis, AcSweepType, DcSweep, FrequencySweep, OperatingPoint, Options, PropertyProbe,
        Transient, TransientConfig,
    };
}
