//! Shared I2C bus handle.
//!
//! One `I2cBus` is constructed per physical bus and cloned into every
//! adapter on it; an interior mutex serializes transactions, so sensors and
//! PWM chips at different addresses can share the wires. Lifetime is the
//! process lifetime.

use std::sync::{Arc, Mutex, MutexGuard};

use rppal::i2c::I2c;

use crate::error::{HwError, Result};

#[derive(Clone)]
pub struct I2cBus {
    inner: Arc<Mutex<I2c>>,
}

impl I2cBus {
    /// Open the default I2C bus for this board.
    pub fn open() -> Result<Self> {
        let i2c = I2c::new().map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(i2c)),
        })
    }

    /// Open a specific bus number (e.g. 0 or 1 on a Pi).
    pub fn with_bus(bus: u8) -> Result<Self> {
        let i2c = I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(i2c)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, I2c> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run one transaction against `addr` with exclusive bus access.
    pub fn transaction<T>(
        &self,
        addr: u8,
        f: impl FnOnce(&mut I2c) -> std::result::Result<T, rppal::i2c::Error>,
    ) -> Result<T> {
        let mut guard = self.lock();
        guard
            .set_slave_address(u16::from(addr))
            .map_err(|e| HwError::I2c(e.to_string()))?;
        f(&mut guard).map_err(|e| HwError::I2c(e.to_string()))
    }

    /// Read a big-endian 16-bit register.
    pub fn read_reg_u16(&self, addr: u8, reg: u8) -> Result<u16> {
        self.transaction(addr, |i2c| {
            let mut buf = [0u8; 2];
            i2c.write_read(&[reg], &mut buf)?;
            Ok(u16::from_be_bytes(buf))
        })
    }

    /// Write one byte to a register.
    pub fn write_reg_u8(&self, addr: u8, reg: u8, value: u8) -> Result<()> {
        self.transaction(addr, |i2c| i2c.write(&[reg, value]).map(|_| ()))
    }
}
