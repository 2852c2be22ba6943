//! Property tests for the engine's duty invariants.

use std::time::Duration;

use charger_core::mocks::RecordingPwm;
use charger_core::{
    ControlCfg, ControlTarget, ControlTuning, Mode, RegulationEngine, SafetyLimits, TargetHandle,
};
use charger_traits::Sample;
use proptest::prelude::*;

fn engine_with(control: ControlCfg) -> (RegulationEngine<RecordingPwm>, RecordingPwm) {
    let pwm = RecordingPwm::new();
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
    let engine = RegulationEngine::new(pwm.clone(), &control, targets);
    (engine, pwm)
}

proptest! {
    /// Every write the engine ever issues stays inside [min_duty, max_duty],
    /// for any sample sequence and any starting duty.
    #[test]
    fn duty_writes_always_stay_in_range(
        initial in 100u16..=4000,
        voltages in proptest::collection::vec(-20.0f32..40.0, 1..60),
    ) {
        let control = ControlCfg { min_duty: 100, max_duty: 4000, ..ControlCfg::default() };
        let (mut engine, pwm) = engine_with(control);
        engine.set_duty_cycle(initial).expect("initial duty in range");
        engine.start(Mode::VoltageRegulation, 0).expect("start");

        for (i, v) in voltages.iter().enumerate() {
            engine.apply_step(&Sample::new(*v, 500.0, i as u64)).expect("step");
            prop_assert!((100..=4000).contains(&engine.duty()));
        }
        for w in pwm.writes() {
            prop_assert!((100..=4000).contains(&w));
        }
    }

    /// For a fixed starting duty, the step size is monotonically
    /// non-decreasing in the error magnitude.
    #[test]
    fn step_size_is_monotone_in_error(
        e1 in 0.0f32..4.0,
        e2 in 0.0f32..4.0,
    ) {
        let (small, large) = if e1 <= e2 { (e1, e2) } else { (e2, e1) };
        let delta_for = |err: f32| {
            let (mut engine, _) = engine_with(ControlCfg::default());
            engine.set_duty_cycle(2000).expect("duty");
            engine.start(Mode::VoltageRegulation, 0).expect("start");
            engine
                .apply_step(&Sample::new(7.2 + err, 500.0, 0))
                .expect("step");
            engine.duty() - 2000
        };
        prop_assert!(delta_for(small) <= delta_for(large));
    }

    /// Any sample within the voltage tolerance leaves duty untouched.
    /// (The range stays a hair inside the band so f32 rounding of the
    /// generated sample cannot push it over the edge.)
    #[test]
    fn in_band_samples_never_actuate(err in -0.049f32..=0.049) {
        let (mut engine, pwm) = engine_with(ControlCfg::default());
        engine.set_duty_cycle(2000).expect("duty");
        engine.start(Mode::VoltageRegulation, 0).expect("start");

        engine
            .apply_step(&Sample::new(7.2 + err, 500.0, 0))
            .expect("step");
        prop_assert_eq!(engine.duty(), 2000);
        prop_assert_eq!(pwm.write_count(), 1);
    }

    /// CC/CV picks the current step strictly below the voltage target and
    /// the voltage step at or above it. The sample's current error sits in
    /// the 2x tier (delta 4) while its voltage error stays in the 0x/1x
    /// band (delta 0 or 2), so the write delta identifies the sub-step.
    #[test]
    fn cc_cv_substep_selection(voltage in 4.0f32..8.6) {
        let control = ControlCfg {
            target_voltage: 8.4,
            target_current: 700.0,
            ..ControlCfg::default()
        };
        let (mut engine, _) = engine_with(control);
        engine.set_duty_cycle(2000).expect("duty");
        engine.start(Mode::CcCv, 0).expect("start");

        engine
            .apply_step(&Sample::new(voltage, 900.0, 0))
            .expect("step");
        let delta = engine.duty() as i32 - 2000;
        if voltage < 8.4 {
            prop_assert_eq!(delta, 4, "expected the current step below target");
        } else {
            prop_assert!(delta == 0 || delta == 2,
                "expected the voltage step at/above target, got delta {delta}");
        }
    }
}
