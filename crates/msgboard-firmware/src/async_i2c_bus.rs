//! Shared async I2C bus
//!
//! The power controller, the GPIO expander and the touch controller all sit
//! on the system I2C bus. Each gets its own [`AsyncI2cDevice`] handle; the
//! embassy mutex serialises transactions and is held across the awaits of a
//! single transaction only.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

/// Bus shared between devices.
pub type SharedI2c<T> = Mutex<CriticalSectionRawMutex, T>;

/// One device's handle onto a [`SharedI2c`] bus.
pub struct AsyncI2cDevice<'a, T> {
    bus: &'a SharedI2c<T>,
}

impl<'a, T> AsyncI2cDevice<'a, T> {
    #[inline]
    pub const fn new(bus: &'a SharedI2c<T>) -> Self {
        Self { bus }
    }
}

impl<T> ErrorType for AsyncI2cDevice<'_, T>
where
    T: ErrorType,
{
    type Error = T::Error;
}

impl<T> I2c for AsyncI2cDevice<'_, T>
where
    T: I2c,
{
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.read(address, read).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.write(address, write).await
    }

    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.write_read(address, write, read).await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}
