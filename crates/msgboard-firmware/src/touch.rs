//! FT6336U touch controller, read as three buttons
//!
//! The CoreS3 has no front buttons. The bottom strip of the panel is split
//! into three touch zones instead, one per [`ButtonSlot`].

use embedded_hal_async::i2c::I2c;
use log::warn;
use msgboard_core::buttons::ButtonSlot;
use msgboard_core::input::ButtonPanel;
use msgboard_core::runtime::ButtonInput;

pub const I2C_ADDR: u8 = 0x38;

const ADDR_TD_STATUS: u8 = 0x02;
const ADDR_TOUCH1_X: u8 = 0x03;
const ADDR_TOUCH1_Y: u8 = 0x05;

/// Minimal polling driver: only the first touch point is read.
pub struct Ft6336u<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Ft6336u<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Number of active touch points (0..=2).
    pub async fn touch_count(&mut self) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(I2C_ADDR, &[ADDR_TD_STATUS], &mut buf)
            .await?;
        Ok(buf[0] & 0x0F)
    }

    async fn read_coordinate(&mut self, register: u8) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(I2C_ADDR, &[register], &mut buf).await?;
        Ok((((buf[0] & 0x0F) as u16) << 8) | buf[1] as u16)
    }

    /// Position of the first touch point, if the panel is being touched.
    pub async fn first_touch(&mut self) -> Result<Option<(u16, u16)>, I2C::Error> {
        if self.touch_count().await? == 0 {
            return Ok(None);
        }
        let x = self.read_coordinate(ADDR_TOUCH1_X).await?;
        let y = self.read_coordinate(ADDR_TOUCH1_Y).await?;
        Ok(Some((x, y)))
    }
}

/// Touch zones debounced into button releases.
pub struct TouchButtons<I2C> {
    touch: Ft6336u<I2C>,
    panel: ButtonPanel,
}

impl<I2C: I2c> TouchButtons<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self {
            touch: Ft6336u::new(i2c),
            panel: ButtonPanel::new(),
        }
    }
}

impl<I2C> ButtonInput for TouchButtons<I2C>
where
    I2C: I2c,
    I2C::Error: core::fmt::Debug,
{
    async fn poll_release(&mut self, now_ms: u64) -> Option<ButtonSlot> {
        let touched = match self.touch.first_touch().await {
            Ok(point) => point.and_then(|(x, y)| ButtonSlot::at_touch(x, y)),
            Err(e) => {
                // A failed read counts as nothing held.
                warn!("Touch read failed: {:?}", e);
                None
            }
        };
        let pressed = ButtonSlot::ALL.map(|slot| touched == Some(slot));
        self.panel.update(pressed, now_ms)
    }
}
