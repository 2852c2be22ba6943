//! CC/CV knee behavior: the phase is re-derived from the live sample, so
//! the engine self-corrects when voltage crosses the target in either
//! direction. The invoked sub-step is observed through the duty delta,
//! which differs between the current and voltage tiers in these setups.

use std::time::Duration;

use charger_core::mocks::RecordingPwm;
use charger_core::{
    ControlCfg, ControlTarget, ControlTuning, Mode, RegulationEngine, SafetyLimits, TargetHandle,
};
use charger_traits::Sample;

fn cc_cv_engine() -> RegulationEngine<RecordingPwm> {
    let control = ControlCfg {
        target_voltage: 8.4,
        target_current: 700.0,
        ..ControlCfg::default()
    };
    let targets = TargetHandle::new(
        ControlTuning {
            target: ControlTarget {
                target_voltage: control.target_voltage,
                target_current: control.target_current,
                voltage_tolerance: control.voltage_tolerance,
                current_tolerance: control.current_tolerance,
            },
            duty_step: control.duty_step,
            actuation_interval: Duration::from_millis(1),
        },
        SafetyLimits::default(),
    );
    let mut engine = RegulationEngine::new(RecordingPwm::new(), &control, targets);
    engine.set_duty_cycle(1000).expect("manual duty");
    engine.start(Mode::CcCv, 0).expect("start");
    engine
}

#[test]
fn below_voltage_target_runs_the_current_step() {
    let mut engine = cc_cv_engine();

    // 7.0 V < 8.4 V target: constant-current phase. Current 900 mA against
    // 700 +- 50: err 200 -> 2x base step, duty raised by 4.
    engine
        .apply_step(&Sample::new(7.0, 900.0, 0))
        .expect("step");
    assert_eq!(engine.duty(), 1004);
}

#[test]
fn at_or_above_voltage_target_runs_the_voltage_step() {
    let mut engine = cc_cv_engine();

    // 8.5 V >= 8.4 V: constant-voltage phase. err 0.1 -> 1x base step up,
    // even though the current error alone would have asked for 2x.
    engine
        .apply_step(&Sample::new(8.5, 900.0, 0))
        .expect("step");
    assert_eq!(engine.duty(), 1002);
}

#[test]
fn knee_self_corrects_when_voltage_sags_back() {
    let mut engine = cc_cv_engine();

    // CV phase first.
    engine
        .apply_step(&Sample::new(8.5, 900.0, 0))
        .expect("step");
    assert_eq!(engine.duty(), 1002);

    // Voltage sags below target: back to the current step (2x tier).
    engine
        .apply_step(&Sample::new(8.0, 900.0, 1))
        .expect("step");
    assert_eq!(engine.duty(), 1006);
}

#[test]
fn cc_phase_raises_delivered_current_when_low() {
    let mut engine = cc_cv_engine();

    // Current 400 mA is 300 below target: 4x base step, duty lowered by 8
    // (lower duty means more delivered power on this topology).
    engine
        .apply_step(&Sample::new(7.0, 400.0, 0))
        .expect("step");
    assert_eq!(engine.duty(), 992);
}

#[test]
fn cc_phase_in_band_holds_duty() {
    let mut engine = cc_cv_engine();

    engine
        .apply_step(&Sample::new(7.0, 720.0, 0))
        .expect("step");
    assert_eq!(engine.duty(), 1000, "|err| 20 mA within 50 mA tolerance");
}
