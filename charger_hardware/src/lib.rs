//! Hardware adapters for the charge regulator.
//!
//! The default build ships a deterministic simulated charging circuit so
//! the control loop runs end-to-end without hardware. The `hardware`
//! feature (Linux) adds INA3221 and PCA9685 adapters over a shared I2C bus.

pub mod error;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod bus;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod ina3221;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod pca9685;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use charger_traits::{PowerSensor, PwmOutput, Sample};

/// Shared state of the simulated circuit: a buck-style stage where a higher
/// duty cycle means a lower delivered voltage, feeding a cell whose voltage
/// creeps up while current flows into it.
#[derive(Debug)]
struct CircuitState {
    duty: u16,
    max_duty: u16,
    supply_voltage: f32,
    cell_voltage: f32,
    series_ohms: f32,
}

impl CircuitState {
    fn output_voltage(&self) -> f32 {
        let span = f32::from(self.max_duty).max(1.0);
        self.supply_voltage * (1.0 - f32::from(self.duty) / span)
    }

    fn current_ma(&self) -> f32 {
        ((self.output_voltage() - self.cell_voltage) / self.series_ohms * 1000.0).max(0.0)
    }
}

/// Handle constructing linked sensor/PWM pairs over one simulated circuit.
pub struct SimulatedCircuit {
    state: Rc<RefCell<CircuitState>>,
}

impl SimulatedCircuit {
    pub fn new(supply_voltage: f32, cell_voltage: f32) -> Self {
        Self {
            state: Rc::new(RefCell::new(CircuitState {
                duty: 4095,
                max_duty: 4095,
                supply_voltage,
                cell_voltage,
                series_ohms: 2.0,
            })),
        }
    }

    pub fn sensor(&self) -> SimulatedPowerSensor {
        SimulatedPowerSensor {
            state: self.state.clone(),
            epoch: Instant::now(),
        }
    }

    pub fn pwm(&self) -> SimulatedPwm {
        SimulatedPwm {
            state: self.state.clone(),
        }
    }
}

impl Default for SimulatedCircuit {
    fn default() -> Self {
        Self::new(12.0, 6.0)
    }
}

/// Simulated measurement source. Each read advances the cell voltage a
/// little when charge current is flowing.
pub struct SimulatedPowerSensor {
    state: Rc<RefCell<CircuitState>>,
    epoch: Instant,
}

impl PowerSensor for SimulatedPowerSensor {
    fn read(&mut self, _timeout: Duration) -> Sample {
        let ts = self.epoch.elapsed().as_millis() as u64;
        let mut st = self.state.borrow_mut();
        let voltage = st.output_voltage();
        let current = st.current_ma();
        // 1 mAh-ish of charge nudges the cell by a tiny fraction
        st.cell_voltage += current * 2e-7;
        tracing::trace!(voltage, current_ma = current, "simulated sensor read");
        Sample::new(voltage, current, ts)
    }
}

/// Simulated PWM output sharing the circuit with its sensor.
pub struct SimulatedPwm {
    state: Rc<RefCell<CircuitState>>,
}

impl PwmOutput for SimulatedPwm {
    fn write_duty(
        &mut self,
        duty: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state.borrow_mut().duty = duty;
        tracing::trace!(duty, "simulated pwm write");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raising_duty_lowers_delivered_voltage() {
        let circuit = SimulatedCircuit::default();
        let mut sensor = circuit.sensor();
        let mut pwm = circuit.pwm();

        pwm.write_duty(0).unwrap();
        let full = sensor.read(Duration::from_millis(10));
        pwm.write_duty(2048).unwrap();
        let half = sensor.read(Duration::from_millis(10));
        pwm.write_duty(4095).unwrap();
        let off = sensor.read(Duration::from_millis(10));

        assert!(full.voltage > half.voltage);
        assert!(half.voltage > off.voltage);
        assert!(off.voltage.abs() < 0.02);
    }

    #[test]
    fn samples_are_always_valid() {
        let circuit = SimulatedCircuit::default();
        let mut sensor = circuit.sensor();
        for _ in 0..50 {
            assert!(sensor.read(Duration::from_millis(10)).is_valid());
        }
    }

    #[test]
    fn cell_voltage_creeps_up_while_charging() {
        let circuit = SimulatedCircuit::new(12.0, 6.0);
        let mut sensor = circuit.sensor();
        let mut pwm = circuit.pwm();
        pwm.write_duty(0).unwrap();

        let first = sensor.read(Duration::from_millis(10)).current_ma;
        for _ in 0..1000 {
            let _ = sensor.read(Duration::from_millis(10));
        }
        let later = sensor.read(Duration::from_millis(10)).current_ma;
        assert!(later < first, "charge current should taper: {later} vs {first}");
    }

    #[test]
    fn no_reverse_current_when_output_below_cell() {
        let circuit = SimulatedCircuit::new(12.0, 6.0);
        let mut sensor = circuit.sensor();
        let mut pwm = circuit.pwm();
        pwm.write_duty(4095).unwrap();
        let s = sensor.read(Duration::from_millis(10));
        assert_eq!(s.current_ma, 0.0);
    }
}
