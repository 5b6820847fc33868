//! Physical constants used by device models.

/// Boltzmann constant (J/K).
pub const K_BOLTZMANN: f64 = 1.380649e-23;

/// Elementary charge (C).
pub const Q_ELECTRON: f64 = 1.602176634e-19;

/// Nominal simulation temperature: 27 °C in kelvin.
pub const TEMP_NOMINAL: f64 = 300.15;

/// Thermal voltage kT/q at a given temperature.
pub fn thermal_voltage(temp_k: f64) -> f64 {
    K_BOLTZMANN * temp_k / Q_ELECTRON
}
