//! INA3221 three-channel power monitor.
//!
//! Each adapter reads one device channel. Logical channels 0..=11 map
//! across up to four chips on the same bus (0x40..=0x43, three channels
//! each). Transport failures yield the NaN sentinel sample per the
//! `PowerSensor` contract.

use std::time::{Duration, Instant};

use charger_traits::{PowerSensor, Sample};

use crate::bus::I2cBus;
use crate::error::{HwError, Result};

const REG_SHUNT_BASE: u8 = 0x01; // + 2 * channel
const REG_BUS_BASE: u8 = 0x02; // + 2 * channel
const REG_MANUFACTURER_ID: u8 = 0xFE;
const REG_DIE_ID: u8 = 0xFF;

const EXPECTED_MANUFACTURER_ID: u16 = 0x5449;
const EXPECTED_DIE_ID: u16 = 0x3220;

// Register LSB weights; both registers left-justify a 13-bit value.
const BUS_LSB_MV: f32 = 8.0;
const SHUNT_LSB_UV: f32 = 40.0;

pub struct Ina3221Sensor {
    bus: I2cBus,
    address: u8,
    channel: u8,
    shunt_ohms: f32,
    epoch: Instant,
}

impl Ina3221Sensor {
    /// Adapter for device channel 0..=2 at an explicit address.
    pub fn new(bus: I2cBus, address: u8, channel: u8, shunt_ohms: f32) -> Result<Self> {
        if channel > 2 {
            return Err(HwError::InvalidChannel(channel));
        }
        let sensor = Self {
            bus,
            address,
            channel,
            shunt_ohms,
            epoch: Instant::now(),
        };
        sensor.probe()?;
        Ok(sensor)
    }

    /// Map a logical channel 0..=11 across chip addresses 0x40..=0x43.
    pub fn for_logical_channel(bus: I2cBus, logical: u8, shunt_ohms: f32) -> Result<Self> {
        if logical > 11 {
            return Err(HwError::InvalidChannel(logical));
        }
        Self::new(bus, 0x40 + logical / 3, logical % 3, shunt_ohms)
    }

    fn probe(&self) -> Result<()> {
        let mfg = self.bus.read_reg_u16(self.address, REG_MANUFACTURER_ID)?;
        let die = self.bus.read_reg_u16(self.address, REG_DIE_ID)?;
        if mfg != EXPECTED_MANUFACTURER_ID || die != EXPECTED_DIE_ID {
            tracing::warn!(
                address = format_args!("{:#04x}", self.address),
                mfg = format_args!("{mfg:#06x}"),
                die = format_args!("{die:#06x}"),
                "device ids do not match an INA3221"
            );
        } else {
            tracing::debug!(
                address = format_args!("{:#04x}", self.address),
                channel = self.channel,
                "ina3221 present"
            );
        }
        Ok(())
    }

    fn read_pair(&self) -> Result<(f32, f32)> {
        let bus_raw = self
            .bus
            .read_reg_u16(self.address, REG_BUS_BASE + 2 * self.channel)? as i16;
        let shunt_raw = self
            .bus
            .read_reg_u16(self.address, REG_SHUNT_BASE + 2 * self.channel)? as i16;

        let volts = f32::from(bus_raw >> 3) * BUS_LSB_MV / 1000.0;
        let shunt_mv = f32::from(shunt_raw >> 3) * SHUNT_LSB_UV / 1000.0;
        let current_ma = shunt_mv / self.shunt_ohms;
        Ok((volts, current_ma))
    }
}

impl PowerSensor for Ina3221Sensor {
    fn read(&mut self, _timeout: Duration) -> Sample {
        let ts = self.epoch.elapsed().as_millis() as u64;
        match self.read_pair() {
            Ok((voltage, current_ma)) => {
                tracing::trace!(voltage, current_ma, channel = self.channel, "ina3221 sample");
                Sample::new(voltage, current_ma, ts)
            }
            Err(e) => {
                tracing::warn!(error = %e, channel = self.channel, "sensor read failed");
                Sample::invalid(ts)
            }
        }
    }
}
