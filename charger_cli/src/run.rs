//! Command implementations: config mapping, hardware assembly, and runs.

use std::time::Duration;

use charger_core::{
    ChargerController, ControlCfg, ControllerReport, Coordinator, RunOutcome, SafetyLimits,
    TimingCfg,
};
use charger_traits::{PowerSensor, PwmOutput};
use eyre::{Result, WrapErr};

use crate::cli::{Cli, RunOpts};
use crate::heartbeat::Heartbeat;

/// Builds sensor/PWM pairs. One factory per process so every adapter on a
/// real deployment shares the same physical I2C bus.
#[cfg(all(feature = "hardware", target_os = "linux"))]
struct HwFactory {
    bus: charger_hardware::bus::I2cBus,
    pwm_chip: charger_hardware::pca9685::Pca9685,
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
impl HwFactory {
    fn new(pwm: &charger_config::Pwm) -> Result<Self> {
        let bus = charger_hardware::bus::I2cBus::open().wrap_err("opening I2C bus")?;
        let pwm_chip =
            charger_hardware::pca9685::Pca9685::new(bus.clone(), pwm.address, pwm.frequency_hz)
                .wrap_err("initializing PCA9685")?;
        tracing::info!(
            address = format_args!("{:#04x}", pwm.address),
            freq_hz = pwm.frequency_hz,
            "hardware backend ready"
        );
        Ok(Self { bus, pwm_chip })
    }

    fn make(
        &self,
        sensor_channel: u8,
        pwm_channel: u8,
    ) -> Result<(Box<dyn PowerSensor>, Box<dyn PwmOutput>)> {
        let sensor = charger_hardware::ina3221::Ina3221Sensor::for_logical_channel(
            self.bus.clone(),
            sensor_channel,
            0.1,
        )
        .wrap_err("initializing INA3221 channel")?;
        let pwm = self
            .pwm_chip
            .channel(pwm_channel)
            .wrap_err("binding PWM channel")?;
        Ok((Box::new(sensor), Box::new(pwm)))
    }
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
struct HwFactory;

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
impl HwFactory {
    fn new(_pwm: &charger_config::Pwm) -> Result<Self> {
        tracing::info!("using simulated charging circuit");
        Ok(Self)
    }

    fn make(
        &self,
        _sensor_channel: u8,
        _pwm_channel: u8,
    ) -> Result<(Box<dyn PowerSensor>, Box<dyn PwmOutput>)> {
        let circuit = charger_hardware::SimulatedCircuit::default();
        Ok((Box::new(circuit.sensor()), Box::new(circuit.pwm())))
    }
}

/// Load and validate the config file when it exists.
fn load_config(cli: &Cli) -> Result<Option<charger_config::Config>> {
    if !cli.config.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("reading {}", cli.config.display()))?;
    let cfg = charger_config::load_toml(&text)
        .wrap_err_with(|| format!("parsing {}", cli.config.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("validating {}", cli.config.display()))?;
    Ok(Some(cfg))
}

fn outcome_label(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Cancelled => "cancelled".to_string(),
        RunOutcome::SafetyTrip(reason) => format!("safety_trip: {reason}"),
    }
}

pub fn run_single(cli: &Cli, opts: &RunOpts) -> Result<()> {
    let cfg = load_config(cli)?;
    let (limits, pwm_cfg): (SafetyLimits, charger_config::Pwm) = match &cfg {
        Some(c) => ((&c.safety).into(), c.pwm),
        None => (SafetyLimits::default(), charger_config::Pwm::default()),
    };

    let mut control = ControlCfg::default();
    if let Some(key) = &opts.profile {
        let p = charger_config::profiles::lookup(key)
            .ok_or_else(|| eyre::eyre!("unknown battery profile '{key}'"))?;
        control.target_voltage = p.voltage;
        control.target_current = p.current_ma;
        tracing::info!(
            profile = p.name,
            voltage = p.voltage,
            current_ma = p.current_ma,
            "battery profile selected"
        );
    }
    if let Some(v) = opts.target_voltage {
        control.target_voltage = v;
    }
    if let Some(ma) = opts.target_current {
        control.target_current = ma;
    }
    if let Some(step) = opts.duty_step {
        control.duty_step = step;
    }

    let timing = match (opts.sensor_interval_ms, opts.actuation_interval_ms) {
        (Some(sensor), Some(actuation)) => TimingCfg::hybrid(
            Duration::from_millis(sensor),
            Duration::from_millis(actuation),
        ),
        _ => TimingCfg::uniform(Duration::from_millis(opts.update_interval_ms.unwrap_or(10))),
    };

    let factory = HwFactory::new(&pwm_cfg)?;
    let (sensor, pwm) = factory.make(opts.sensor_channel, opts.pwm_channel)?;
    let mut controller = ChargerController::builder()
        .with_sensor(sensor)
        .with_pwm(pwm)
        .with_control(control)
        .with_timing(timing)
        .with_limits(limits)
        .build()
        .wrap_err("building controller")?;

    let token = controller.cancel_token();
    ctrlc::set_handler(move || token.cancel()).wrap_err("installing signal handler")?;

    let _heartbeat =
        (opts.heartbeat_ms > 0).then(|| Heartbeat::start(Duration::from_millis(opts.heartbeat_ms)));

    tracing::info!("press Ctrl-C to stop");
    let outcome = controller.run(opts.mode.into())?;

    if opts.json_status {
        let status = controller.status();
        println!(
            "{}",
            serde_json::json!({
                "outcome": outcome_label(&outcome),
                "mode": status.mode.as_str(),
                "duty": status.duty,
                "cycles": status.cycle_count,
                "runtime_s": status.runtime_seconds,
                "voltage": status.last_sample.map(|s| s.voltage),
                "current_ma": status.last_sample.map(|s| s.current_ma),
            })
        );
    }

    match outcome {
        RunOutcome::Cancelled => Ok(()),
        RunOutcome::SafetyTrip(reason) => {
            eyre::bail!("regulation halted by safety trip: {reason}")
        }
    }
}

pub fn run_multi(cli: &Cli) -> Result<()> {
    let cfg = load_config(cli)?
        .ok_or_else(|| eyre::eyre!("config file {} not found", cli.config.display()))?;
    let limits: SafetyLimits = (&cfg.safety).into();
    let factory = HwFactory::new(&cfg.pwm)?;

    let mut coordinator = Coordinator::new();
    coordinator.set_status_interval(Duration::from_millis(cfg.status_interval_ms));
    for c in &cfg.controllers {
        let control: ControlCfg = (&c.resolved_control()?).into();
        let timing: TimingCfg = (&c.timing).into();
        let (sensor, pwm) = factory.make(c.sensor_channel, c.pwm_channel)?;
        let controller = ChargerController::builder()
            .with_sensor(sensor)
            .with_pwm(pwm)
            .with_control(control)
            .with_timing(timing)
            .with_limits(limits)
            .build()
            .wrap_err_with(|| format!("building controller '{}'", c.name))?;
        coordinator.add(c.name.clone(), controller.into_scheduler(), c.mode.into());
    }

    let stop = coordinator.stop_token();
    ctrlc::set_handler(move || stop.cancel()).wrap_err("installing signal handler")?;

    tracing::info!(
        controllers = coordinator.controller_count(),
        "press Ctrl-C to stop all controllers"
    );
    let reports = coordinator.run_all();

    let mut failures = 0usize;
    for (name, report) in &reports {
        match report {
            ControllerReport::Finished(outcome) => {
                tracing::info!(controller = %name, outcome = %outcome_label(outcome), "final");
            }
            ControllerReport::Failed(err) => {
                failures += 1;
                tracing::error!(controller = %name, error = %err, "final");
            }
        }
    }
    if failures > 0 {
        eyre::bail!("{failures} controller(s) failed");
    }
    Ok(())
}

pub fn self_check() -> Result<()> {
    // Exercise the measurement and actuation path end to end on whatever
    // backend is compiled in.
    let factory = HwFactory::new(&charger_config::Pwm::default())?;
    let (mut sensor, mut pwm) = factory.make(0, 0)?;
    pwm.write_duty(4095)
        .map_err(|e| eyre::eyre!("pwm write failed: {e}"))?;
    let sample = sensor.read(Duration::from_millis(150));
    if !sample.is_valid() {
        eyre::bail!("sensor returned invalid sample");
    }
    tracing::info!(
        voltage = sample.voltage,
        current_ma = sample.current_ma,
        "self-check ok"
    );
    println!("self-check ok");
    Ok(())
}
