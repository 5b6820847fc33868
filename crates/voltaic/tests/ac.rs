//! End-to-end AC analysis scenarios.

use std::f64::consts::PI;

use voltaic::prelude::*;

/// RC low-pass: V1 in 0 AC 1; R1 in out 1k; C1 out 0 1u.
fn lowpass() -> Circuit {
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("V1", "in", "0", 0.0).ac(1.0, 0.0));
    ckt.add(Resistor::new("R1", "in", "out", 1e3));
    ckt.add(Capacitor::new("C1", "out", "0", 1e-6));
    ckt
}

#[test]
fn lowpass_matches_single_pole_response() {
    let mut ckt = lowpass();
    let analysis = AcAnalysis::new(FrequencySweep::decade(10, 1.0, 1e6));
    let result = analysis.run(&mut ckt).unwrap();

    let fc = 1.0 / (2.0 * PI * 1e3 * 1e-6); // ≈ 159.155 Hz
    for (f, mag) in result.magnitude_waveform("out") {
        let expected = 1.0 / (1.0 + (f / fc).powi(2)).sqrt();
        assert!(
            (mag - expected).abs() / expected < 0.01,
            "|V(out)| at {} Hz = {} (expected {})",
            f,
            mag,
            expected
        );
    }

    // The −3 dB point sits at the corner frequency.
    let (idx, _) = result
        .frequencies()
        .iter()
        .enumerate()
        .min_by(|a, b| {
            (a.1 - fc).abs().partial_cmp(&(b.1 - fc).abs()).unwrap()
        })
        .unwrap();
    let mag = result.voltage("out", idx).unwrap().norm();
    assert!(
        (mag - 1.0 / 2f64.sqrt()).abs() < 0.03,
        "|V(out)| near fc = {}",
        mag
    );
}

#[test]
fn lowpass_phase_rolls_to_minus_90() {
    let mut ckt = lowpass();
    let analysis = AcAnalysis::new(FrequencySweep::decade(10, 1.0, 1e6));
    let result = analysis.run(&mut ckt).unwrap();

    let first = result.phase_deg("out", 0).unwrap();
    let last = result.phase_deg("out", result.len() - 1).unwrap();
    assert!(first > -5.0, "phase at 1 Hz = {first}");
    assert!(last < -85.0, "phase at 1 MHz = {last}");
}

#[test]
fn rl_highpass_corner() {
    // L in series from source, R to ground: |V(out)| = f/sqrt(f² + fc²).
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("V1", "in", "0", 0.0).ac(1.0, 0.0));
    ckt.add(Inductor::new("L1", "in", "out", 1e-3));
    ckt.add(Resistor::new("R1", "out", "0", 100.0));

    let fc = 100.0 / (2.0 * PI * 1e-3); // R/(2πL) ≈ 15.9 kHz
    let analysis = AcAnalysis::new(FrequencySweep::decade(20, 100.0, 10e6));
    let result = analysis.run(&mut ckt).unwrap();
    for (f, mag) in result.magnitude_waveform("out") {
        let expected = f / (f * f + fc * fc).sqrt();
        assert!(
            (mag - expected).abs() < 0.01,
            "|V(out)| at {} Hz = {} (expected {})",
            f,
            mag,
            expected
        );
    }
}

#[test]
fn keep_op_info_retains_bias() {
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("V1", "in", "0", 2.0).ac(1.0, 0.0));
    ckt.add(Resistor::new("R1", "in", "out", 1e3));
    ckt.add(Resistor::new("R2", "out", "0", 1e3));

    let mut analysis = AcAnalysis::new(FrequencySweep::linear(3, 10.0, 1000.0));
    analysis.keep_op_info = true;
    let result = analysis.run(&mut ckt).unwrap();
    let op = result.op.as_ref().expect("operating point retained");
    // V(out) = 1 V at the bias point (indices follow bind order).
    assert!(op.iter().any(|&v| (v - 1.0).abs() < 1e-9));
}

#[test]
fn ac_linearizes_diode_around_bias() {
    // Diode biased at ~0.65 V through 1 kΩ; the small-signal division
    // between R and rd = vt/Id must come out consistent.
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("V1", "in", "0", 5.0).ac(1.0, 0.0));
    ckt.add(Resistor::new("R1", "in", "a", 1e3));
    ckt.add(Diode::new("D1", "a", "0"));

    let analysis = AcAnalysis::new(FrequencySweep::linear(1, 1e3, 1e3));
    let result = analysis.run(&mut ckt).unwrap();
    let gain = result.voltage("a", 0).unwrap().norm();
    // rd ≈ vt/Id with Id ≈ 4.3 mA: a few ohms against 1 kΩ.
    assert!(gain > 0.001 && gain < 0.05, "small-signal gain = {}", gain);
}
