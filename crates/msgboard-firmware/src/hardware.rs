//! Board bring-up for the M5Stack CoreS3
//!
//! The panel and the touch controller are powered through the AXP2101, so
//! the power rails must be up before either is touched. The AW9523 expander
//! carries the touch interrupt line.

use axp2101_embedded::AsyncAxp2101;
use aw9523_embedded::r#async::Aw9523Async;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use log::{info, warn};
use static_cell::StaticCell;
use thiserror_no_std::Error;

use crate::async_i2c_bus::{AsyncI2cDevice, SharedI2c};

/// The system I2C bus (SDA GPIO12, SCL GPIO11).
pub type SystemI2c = I2c<'static, esp_hal::Async>;

/// Device handle on the system bus.
pub type BusDevice = AsyncI2cDevice<'static, SystemI2c>;

const AW9523_ADDR: u8 = 0x58;
/// P1_2 on the expander, wired to the touch controller's INT.
const TOUCH_INT_PIN: u8 = 10;
const PANEL_RAIL_MV: u16 = 3300;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("I2C bus configuration rejected")]
    I2cConfig,
    #[error("SPI bus configuration rejected")]
    SpiConfig,
    #[error("Display did not initialise")]
    Display,
}

/// Chips that must stay alive for the lifetime of the firmware.
pub struct BoardPower {
    pub power_mgmt: AsyncAxp2101<BusDevice>,
    pub gpio_expander: Aw9523Async<embedded_hal::i2c::SevenBitAddress, BusDevice>,
}

pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO12<'static>,
    scl: esp_hal::peripherals::GPIO11<'static>,
) -> Result<SystemI2c, HardwareError> {
    let bus = I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(400)))
        .map_err(|_| HardwareError::I2cConfig)?;
    Ok(bus.with_sda(sda).with_scl(scl).into_async())
}

/// Bring up power and the expander, returning them with a bus handle for
/// the touch controller.
///
/// Individual register failures are logged and skipped; the board usually
/// still boots far enough to show an error on screen.
pub async fn init_board(i2c0: SystemI2c) -> (BoardPower, BusDevice) {
    static I2C0_BUS: StaticCell<SharedI2c<SystemI2c>> = StaticCell::new();
    let bus = I2C0_BUS.init(SharedI2c::new(i2c0));

    info!("Configuring power management");
    let mut power_mgmt = AsyncAxp2101::new(AsyncI2cDevice::new(bus));
    match power_mgmt.init().await {
        Ok(_) => info!("Power management ready"),
        Err(e) => warn!("Power init failed: {:?}", e),
    }

    if let Err(e) = power_mgmt
        .set_charging_led_mode(axp2101_embedded::ChargeLedMode::On)
        .await
    {
        warn!("Charge LED: {:?}", e);
    }

    let rails = [
        power_mgmt.enable_aldo1().await,
        power_mgmt.enable_aldo2().await,
        power_mgmt.enable_aldo3().await,
        power_mgmt.enable_aldo4().await,
        power_mgmt.enable_bldo1().await,
        power_mgmt.enable_bldo2().await,
        power_mgmt.enable_dldo1().await,
    ];
    for (index, result) in rails.iter().enumerate() {
        if let Err(e) = result {
            warn!("Power rail {} not enabled: {:?}", index, e);
        }
    }

    if let Err(e) = power_mgmt.set_aldo4_voltage(PANEL_RAIL_MV).await {
        warn!("Panel rail voltage: {:?}", e);
    }

    info!("Configuring GPIO expander");
    let mut gpio_expander = Aw9523Async::new(AsyncI2cDevice::new(bus), AW9523_ADDR);
    if let Err(e) = gpio_expander.init().await {
        warn!("GPIO expander init failed: {:?}", e);
    }
    if let Err(e) = gpio_expander
        .pin_mode(TOUCH_INT_PIN, aw9523_embedded::PinMode::Input)
        .await
    {
        warn!("Touch interrupt pin: {:?}", e);
    }
    if let Err(e) = gpio_expander.enable_interrupt(TOUCH_INT_PIN, true).await {
        warn!("Touch interrupt enable: {:?}", e);
    }

    let power = BoardPower {
        power_mgmt,
        gpio_expander,
    };
    (power, AsyncI2cDevice::new(bus))
}
