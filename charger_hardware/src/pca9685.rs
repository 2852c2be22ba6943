//! PCA9685 16-channel, 12-bit PWM controller.

use charger_traits::PwmOutput;

use crate::bus::I2cBus;
use crate::error::{HwError, Result};

const REG_MODE1: u8 = 0x00;
const REG_PRESCALE: u8 = 0xFE;
const REG_LED0_ON_L: u8 = 0x06; // + 4 * channel

const MODE1_SLEEP: u8 = 0x10;
const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_RESTART: u8 = 0x80;

const OSCILLATOR_HZ: f32 = 25_000_000.0;

#[derive(Clone)]
pub struct Pca9685 {
    bus: I2cBus,
    address: u8,
}

impl Pca9685 {
    /// Initialize the chip at `address` with the given output frequency.
    pub fn new(bus: I2cBus, address: u8, freq_hz: u16) -> Result<Self> {
        let chip = Self { bus, address };
        chip.set_frequency(freq_hz)?;
        Ok(chip)
    }

    /// Program the prescaler. The chip must sleep while it changes.
    fn set_frequency(&self, freq_hz: u16) -> Result<()> {
        let prescale =
            (OSCILLATOR_HZ / (4096.0 * f32::from(freq_hz.max(24))) - 1.0).round() as u8;
        let prescale = prescale.max(3);
        self.bus.write_reg_u8(self.address, REG_MODE1, MODE1_SLEEP)?;
        self.bus.write_reg_u8(self.address, REG_PRESCALE, prescale)?;
        self.bus.write_reg_u8(
            self.address,
            REG_MODE1,
            MODE1_RESTART | MODE1_AUTO_INCREMENT,
        )?;
        tracing::debug!(
            address = format_args!("{:#04x}", self.address),
            freq_hz,
            prescale,
            "pca9685 configured"
        );
        Ok(())
    }

    /// A `PwmOutput` bound to one of the 16 channels.
    pub fn channel(&self, channel: u8) -> Result<PwmChannel> {
        if channel > 15 {
            return Err(HwError::InvalidChannel(channel));
        }
        Ok(PwmChannel {
            chip: self.clone(),
            channel,
        })
    }

    fn set_duty(&self, channel: u8, duty: u16) -> Result<()> {
        let duty = duty.min(4095);
        let reg = REG_LED0_ON_L + 4 * channel;
        // ON at count 0, OFF at `duty`; auto-increment writes all four
        // registers in one transaction.
        let [off_l, off_h] = duty.to_le_bytes();
        self.bus.transaction(self.address, |i2c| {
            i2c.write(&[reg, 0x00, 0x00, off_l, off_h]).map(|_| ())
        })
    }
}

/// One PWM output bound to a chip channel at construction.
pub struct PwmChannel {
    chip: Pca9685,
    channel: u8,
}

impl PwmOutput for PwmChannel {
    fn write_duty(
        &mut self,
        duty: u16,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.chip
            .set_duty(self.channel, duty)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}
