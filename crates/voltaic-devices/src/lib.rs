//! Device model catalog for voltaic.
//!
//! Every model implements the [`Device`](voltaic_core::device::Device)
//! protocol from `voltaic-core`: it resolves its nodes and caches matrix
//! handles once at bind time, then stamps through raw handles on every
//! load. The catalog covers:
//!
//! - Passives: [`Resistor`], [`Capacitor`], [`Inductor`]
//! - Independent sources: [`VoltageSource`], [`CurrentSource`] with
//!   DC/PULSE/SIN/PWL [`Waveform`]s
//! - Controlled sources: [`Vcvs`], [`Vccs`], [`Cccs`], [`Ccvs`]
//! - Semiconductors: [`Diode`], [`Bjt`], [`Jfet`], [`Mosfet`] (level 1)

pub mod bjt;
pub mod controlled;
pub mod diode;
pub mod jfet;
pub mod mosfet;
pub mod passive;
pub mod sources;
pub mod waveforms;

pub use bjt::{Bjt, BjtParams, BjtType};
pub use controlled::{Cccs, Ccvs, Vccs, Vcvs};
pub use diode::{Diode, DiodeParams, pnjlim};
pub use jfet::{Jfet, JfetParams, JfetType};
pub use mosfet::{Mosfet, MosfetParams, MosfetType, fetlim};
pub use passive::{Capacitor, Inductor, Resistor};
pub use sources::{CurrentSource, VoltageSource};
pub use waveforms::Waveform;
