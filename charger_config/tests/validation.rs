use charger_config::{ModeCfg, load_toml, profiles};
use rstest::rstest;

const MINIMAL: &str = r#"
[[controller]]
name = "battery-1"
"#;

fn with_extra(extra: &str) -> String {
    format!("{MINIMAL}\n{extra}")
}

#[test]
fn minimal_config_parses_with_defaults() {
    let cfg = load_toml(MINIMAL).expect("parse");
    cfg.validate().expect("valid");

    let c = &cfg.controllers[0];
    assert_eq!(c.name, "battery-1");
    assert_eq!(c.mode, ModeCfg::VoltageRegulation);
    assert_eq!(c.control.target_voltage, 7.2);
    assert_eq!(c.control.max_duty, 4095);
    assert_eq!(c.timing.update_interval_ms, 10);
    assert!(!c.timing.is_hybrid());
    assert_eq!(cfg.safety.max_voltage, 30.0);
    assert_eq!(cfg.pwm.frequency_hz, 1526);
    assert_eq!(cfg.status_interval_ms, 1000);
}

#[test]
fn hybrid_timing_is_selected_by_the_interval_pair() {
    let text = r#"
[[controller]]
name = "fast"

[controller.timing]
sensor_read_interval_ms = 10
actuation_interval_ms = 1
"#;
    let cfg = load_toml(text).expect("parse");
    cfg.validate().expect("valid");
    assert!(cfg.controllers[0].timing.is_hybrid());
}

#[test]
fn half_a_hybrid_pair_is_rejected() {
    let text = r#"
[[controller]]
name = "fast"

[controller.timing]
sensor_read_interval_ms = 10
"#;
    let cfg = load_toml(text).expect("parse");
    let err = cfg.validate().expect_err("half pair");
    assert!(format!("{err}").contains("hybrid timing"), "{err}");
}

#[test]
fn empty_controller_list_is_rejected() {
    let cfg = load_toml("status_interval_ms = 1000\ncontroller = []").expect("parse");
    assert!(cfg.validate().is_err());
}

#[test]
fn duplicate_names_and_channels_are_rejected() {
    let dup_name = r#"
[[controller]]
name = "cell"
sensor_channel = 0
pwm_channel = 0

[[controller]]
name = "cell"
sensor_channel = 1
pwm_channel = 1
"#;
    let err = load_toml(dup_name).expect("parse").validate().expect_err("dup name");
    assert!(format!("{err}").contains("duplicate controller name"), "{err}");

    let dup_channel = r#"
[[controller]]
name = "a"
sensor_channel = 0
pwm_channel = 0

[[controller]]
name = "b"
sensor_channel = 0
pwm_channel = 1
"#;
    let err = load_toml(dup_channel)
        .expect("parse")
        .validate()
        .expect_err("dup sensor channel");
    assert!(format!("{err}").contains("already in use"), "{err}");
}

#[rstest]
#[case("sensor_channel = 12", "out of range")]
#[case("pwm_channel = 16", "out of range")]
fn channel_ranges_are_enforced(#[case] line: &str, #[case] needle: &str) {
    let text = format!(
        r#"
[[controller]]
name = "cell"
{line}
"#
    );
    let err = load_toml(&text).expect("parse").validate().expect_err("range");
    assert!(format!("{err}").contains(needle), "{err}");
}

#[test]
fn targets_must_stay_inside_safety_limits() {
    let text = r#"
[safety]
max_voltage = 10.0

[[controller]]
name = "cell"

[controller.control]
target_voltage = 12.6
"#;
    let err = load_toml(text).expect("parse").validate().expect_err("target");
    assert!(format!("{err}").contains("target_voltage"), "{err}");
}

#[test]
fn profile_overrides_targets_and_unknown_profile_fails() {
    let text = r#"
[[controller]]
name = "pack"
profile = "li_ion_2s"
"#;
    let cfg = load_toml(text).expect("parse");
    cfg.validate().expect("valid");
    let control = cfg.controllers[0].resolved_control().expect("profile");
    assert_eq!(control.target_voltage, 8.4);
    assert_eq!(control.target_current, 2000.0);

    let text = r#"
[[controller]]
name = "pack"
profile = "unobtainium"
"#;
    let err = load_toml(text).expect("parse").validate().expect_err("unknown");
    assert!(format!("{err}").contains("unknown battery profile"), "{err}");
}

#[test]
fn zero_duty_step_is_rejected() {
    let err = load_toml(&with_extra("[controller.control]\nduty_step = 0"))
        .expect("parse")
        .validate()
        .expect_err("zero step");
    assert!(format!("{err}").contains("duty_step"), "{err}");
}

#[test]
fn inverted_duty_range_is_rejected() {
    let text = r#"
[[controller]]
name = "cell"

[controller.control]
min_duty = 4095
max_duty = 100
"#;
    let err = load_toml(text).expect("parse").validate().expect_err("range");
    assert!(format!("{err}").contains("min_duty"), "{err}");
}

#[test]
fn all_profiles_are_well_formed() {
    for p in &profiles::PROFILES {
        assert!(profiles::lookup(p.key).is_some());
        assert!(p.voltage > 0.0 && p.voltage <= 30.0);
        assert!(p.current_ma > 0.0 && p.current_ma <= 5000.0);
    }
    assert!(profiles::lookup("does_not_exist").is_none());
}

#[test]
fn mode_names_parse_in_snake_case() {
    let text = r#"
[[controller]]
name = "cell"
mode = "cc_cv"
"#;
    let cfg = load_toml(text).expect("parse");
    assert_eq!(cfg.controllers[0].mode, ModeCfg::CcCv);

    let text = r#"
[[controller]]
name = "cell"
mode = "charge_fast"
"#;
    assert!(load_toml(text).is_err(), "unknown mode must fail to parse");
}
