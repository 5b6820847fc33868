//! End-to-end DC analysis scenarios.

use voltaic::prelude::*;

#[test]
fn resistor_divider_halves_the_source() {
    // V1 in 0 10; R1 in out 1k; R2 out 0 1k
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("V1", "in", "0", 10.0));
    ckt.add(Resistor::new("R1", "in", "out", 1e3));
    ckt.add(Resistor::new("R2", "out", "0", 1e3));

    let op = OperatingPoint::new().run(&mut ckt).unwrap();
    assert!(
        (op.voltage("out").unwrap() - 5.0).abs() < 1e-9,
        "V(out) = {:?}",
        op.voltage("out")
    );
}

#[test]
fn diode_forward_current_matches_shockley() {
    // V1 a 0 0.7; D1 a 0 (Is = 1e-14, N = 1)
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("V1", "a", "0", 0.7));
    ckt.add(Diode::new("D1", "a", "0"));

    let op = OperatingPoint::new().run(&mut ckt).unwrap();
    // The source supplies the diode: I(V1) = −Id.
    let i_v1 = op.current("V1").unwrap();
    let vt = voltaic::core::constants::thermal_voltage(300.15);
    let expected = 1e-14 * ((0.7 / vt).exp() - 1.0);
    assert!(
        (-i_v1 - expected).abs() / expected < 0.05,
        "I(V1) = {} (expected ≈ −{})",
        i_v1,
        expected
    );
    // Order-of-magnitude sanity independent of the formula.
    assert!(-i_v1 > 1e-3 && -i_v1 < 1e-1);
}

#[test]
fn parallel_voltage_sources_report_singular() {
    // Two ideal sources with different values in parallel.
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("V1", "a", "0", 5.0));
    ckt.add(VoltageSource::new("V2", "a", "0", 3.0));

    let err = OperatingPoint::new().run(&mut ckt).unwrap_err();
    assert!(
        matches!(
            err,
            voltaic::solver::Error::Core(voltaic::core::Error::SingularMatrix { .. })
        ),
        "unexpected error: {err}"
    );
}

#[test]
fn bridge_with_controlled_source() {
    // A VCCS loads the divider midpoint: gm = 1 mS sensing V(out) drives
    // 1 V·gm into a 1 kΩ resistor at node x.
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("V1", "in", "0", 10.0));
    ckt.add(Resistor::new("R1", "in", "out", 1e3));
    ckt.add(Resistor::new("R2", "out", "0", 1e3));
    ckt.add(Vccs::new("G1", "0", "x", "out", "0", 1e-3));
    ckt.add(Resistor::new("R3", "x", "0", 1e3));

    let op = OperatingPoint::new().run(&mut ckt).unwrap();
    // V(x) = gm · V(out) · R3 = 1e-3 · 5 · 1e3 = 5 V.
    assert!((op.voltage("x").unwrap() - 5.0).abs() < 1e-9);
}

#[test]
fn cccs_mirrors_source_current() {
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("V1", "in", "0", 10.0));
    ckt.add(Resistor::new("R1", "in", "0", 1e3));
    // F1 mirrors I(V1) = −10 mA with gain 2 into R2.
    ckt.add(Cccs::new("F1", "0", "x", "V1", 2.0));
    ckt.add(Resistor::new("R2", "x", "0", 100.0));

    let op = OperatingPoint::new().run(&mut ckt).unwrap();
    // I(V1) = −10 mA, mirrored current 2·(−10 mA) out of x: V(x) = −2 V.
    assert!(
        (op.voltage("x").unwrap() + 2.0).abs() < 1e-9,
        "V(x) = {:?}",
        op.voltage("x")
    );
}

#[test]
fn nmos_inverter_operating_point() {
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("VDD", "vdd", "0", 5.0));
    ckt.add(VoltageSource::new("VIN", "g", "0", 0.0));
    ckt.add(Resistor::new("RL", "vdd", "d", 10e3));
    ckt.add(Mosfet::nmos("M1", "d", "g", "0"));

    // Gate off: no drain current, output pulled to VDD.
    let op = OperatingPoint::new().run(&mut ckt).unwrap();
    assert!((op.voltage("d").unwrap() - 5.0).abs() < 1e-6);

    // Gate on: the device sinks current and the output drops.
    ckt.device_mut("VIN").unwrap().set_param("dc", 5.0).unwrap();
    let op = OperatingPoint::new().run(&mut ckt).unwrap();
    assert!(op.voltage("d").unwrap() < 1.0, "V(d) = {:?}", op.voltage("d"));
}

#[test]
fn bjt_common_emitter_bias() {
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("VCC", "vcc", "0", 12.0));
    ckt.add(VoltageSource::new("VBB", "vb", "0", 0.7));
    ckt.add(Resistor::new("RB", "vb", "b", 10e3));
    ckt.add(Resistor::new("RC", "vcc", "c", 100e3));
    ckt.add(Bjt::npn("Q1", "c", "b", "0"));

    let op = OperatingPoint::new().run(&mut ckt).unwrap();
    let vc = op.voltage("c").unwrap();
    let vbe = op.voltage("b").unwrap();
    assert!(vbe > 0.5 && vbe < 0.75, "Vbe = {}", vbe);
    // Forward active with a visible drop across the collector load.
    assert!(vc > 2.0 && vc < 11.0, "Vc = {} (device should conduct)", vc);
}

#[test]
fn dc_sweep_diode_current_is_monotonic() {
    let mut ckt = Circuit::new();
    ckt.add(VoltageSource::new("V1", "in", "0", 0.0));
    ckt.add(Resistor::new("R1", "in", "a", 100.0));
    ckt.add(Diode::new("D1", "a", "0"));

    let sweep = DcSweep::new("V1", 0.0, 1.0, 0.1);
    let result = sweep.run(&mut ckt).unwrap();
    let wf = result.current_waveform("V1");
    assert_eq!(wf.len(), 11);
    // Supplied current grows monotonically with drive (I(V1) goes more
    // negative).
    for w in wf.windows(2) {
        assert!(w[1].1 <= w[0].1 + 1e-12, "non-monotonic: {:?}", w);
    }
}

#[test]
fn property_probe_resolves_lazily() {
    let mut ckt = Circuit::new();
    ckt.add(Resistor::new("R1", "a", "0", 4.7e3));

    let probe = PropertyProbe::new("R1", "resistance");
    assert_eq!(probe.read(&ckt), Some(4.7e3));
    let missing = PropertyProbe::new("R1", "bogus");
    assert_eq!(missing.read(&ckt), None);
}
