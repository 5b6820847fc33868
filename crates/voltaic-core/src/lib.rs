//! Core engine for voltaic: sparse MNA linear algebra, the circuit graph,
//! shared simulation state, the device behavior protocol, multistep
//! integration and the breakpoint table.
//!
//! # Overview
//!
//! The central abstractions are:
//!
//! - [`SparseMatrix`](sparse::SparseMatrix) — doubly-linked sparse matrix
//!   with Markowitz-pivoted LU factorization, generic over real and complex
//!   scalars
//! - [`VariableMap`](variables::VariableMap) — symbolic node names mapped
//!   onto 1-based unknown indices (ground is 0 and never enters the matrix)
//! - [`Device`](device::Device) — the stamp contract every entity
//!   implements
//! - [`Integrator`](integration::Integrator) — Trapezoidal / Gear history
//!   and coefficients for transient analysis
//!
//! # Example: assembling and solving a small system
//!
//! ```rust
//! use voltaic_core::sparse::{SparseMatrix, SparseVector};
//!
//! // Voltage divider seen by the solver: 10 V through two 1 kΩ resistors.
//! let mut m = SparseMatrix::<f64>::new();
//! let g = 1.0 / 1000.0;
//! for (r, c, v) in [
//!     (1, 1, g),
//!     (1, 2, -g),
//!     (2, 1, -g),
//!     (2, 2, 2.0 * g),
//!     (1, 3, 1.0),
//!     (3, 1, 1.0),
//! ] {
//!     let id = m.get_element(r, c).unwrap();
//!     m[id] += v;
//! }
//! m.order_and_factor().unwrap();
//!
//! let mut rhs = SparseVector::new();
//! let b = rhs.get_element(3);
//! rhs[b] = 10.0;
//!
//! let mut x = vec![0.0; 4];
//! m.solve(&rhs, &mut x).unwrap();
//! assert!((x[1] - 10.0).abs() < 1e-9);
//! assert!((x[2] - 5.0).abs() < 1e-9);
//! ```

pub mod breakpoints;
pub mod circuit;
pub mod constants;
pub mod device;
pub mod error;
pub mod integration;
pub mod sparse;
pub mod state;
pub mod variables;

pub use breakpoints::Breakpoints;
pub use circuit::Circuit;
pub use device::{
    AcBindContext, AcLoadContext, AcceptContext, BindContext, Device, LoadContext, RhsPair,
    StateInitContext, TwoTerminal,
};
pub use error::{Error, Result};
pub use integration::{Integrator, Method, StateId};
pub use sparse::{ElemId, Scalar, SparseMatrix, SparseVector, VecElemId};
pub use state::{BiasState, InitMode};
pub use variables::{Variable, VariableMap};
