//! Desktop simulator for the msgboard MQTT status display.
//!
//! Runs the same [`DeviceRuntime`] as the firmware inside an SDL2 window via
//! `embedded-graphics-simulator`. The broker is an in-process loopback that
//! delivers every publish on the subscribed topic back to the device, so
//! pressing a button shows its status template as if another board had
//! sent it.
//!
//! # Key bindings
//!
//! | Key | Action                                    |
//! |-----|-------------------------------------------|
//! | 1   | Button A                                  |
//! | 2   | Button B                                  |
//! | 3   | Button C                                  |
//! | M   | Deliver a malformed payload               |
//! | D   | Drop the broker link (next 2 connects fail) |
//! | Q   | Quit                                      |
//!
//! Clicks in the bottom strip of the window press the matching button.
//!
//! An optional first argument names a JSON config file.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_graphics_simulator::{
    OutputSettingsBuilder, SimulatorDisplay, SimulatorEvent, Window, sdl2::Keycode,
};
use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use msgboard_core::buttons::ButtonSlot;
use msgboard_core::config::Config;
use msgboard_core::display_manager::Surface;
use msgboard_core::input::ButtonPanel;
use msgboard_core::link::{LinkError, Transport, WifiLink};
use msgboard_core::ntp::NtpClock;
use msgboard_core::runtime::{ButtonInput, DeviceRuntime};
use msgboard_core::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX};

/// Pixel scale factor for the simulator window.
const WINDOW_SCALE: u32 = 2;

/// Pause between run loop iterations.
const FRAME_DURATION: Duration = Duration::from_millis(33);

/// Connect attempts refused after the link is dropped with `D`.
const REFUSED_AFTER_DROP: u32 = 2;

const MALFORMED_PAYLOAD: &[u8] = b"{\"textMain\": ";

/// Keyboard and mouse state shared between the window and the collaborators.
#[derive(Debug, Default)]
struct Controls {
    held: [bool; 3],
    inject_malformed: bool,
    drop_link: bool,
}

impl Controls {
    fn apply(&mut self, event: SimulatorEvent) {
        match event {
            SimulatorEvent::Quit => {
                info!("Simulator exiting");
                std::process::exit(0);
            }
            SimulatorEvent::KeyDown { keycode, .. } => match keycode {
                Keycode::Q | Keycode::Escape => {
                    info!("Simulator exiting");
                    std::process::exit(0);
                }
                Keycode::M => self.inject_malformed = true,
                Keycode::D => self.drop_link = true,
                other => {
                    if let Some(slot) = keycode_to_slot(other) {
                        self.held[slot as usize] = true;
                    }
                }
            },
            SimulatorEvent::KeyUp { keycode, .. } => {
                if let Some(slot) = keycode_to_slot(keycode) {
                    self.held[slot as usize] = false;
                }
            }
            SimulatorEvent::MouseButtonDown { point, .. } => {
                let touched = ButtonSlot::at_touch(point.x.max(0) as u16, point.y.max(0) as u16);
                if let Some(slot) = touched {
                    self.held[slot as usize] = true;
                }
            }
            SimulatorEvent::MouseButtonUp { .. } => self.held = [false; 3],
            _ => {}
        }
    }
}

fn keycode_to_slot(keycode: Keycode) -> Option<ButtonSlot> {
    match keycode {
        Keycode::Num1 | Keycode::Kp1 => Some(ButtonSlot::A),
        Keycode::Num2 | Keycode::Kp2 => Some(ButtonSlot::B),
        Keycode::Num3 | Keycode::Kp3 => Some(ButtonSlot::C),
        _ => None,
    }
}

/// SDL window as a [`Surface`]; presenting also pumps window events.
struct WindowSurface {
    display: SimulatorDisplay<Rgb565>,
    window: Window,
    controls: Rc<RefCell<Controls>>,
}

impl OriginDimensions for WindowSurface {
    fn size(&self) -> Size {
        self.display.size()
    }
}

impl DrawTarget for WindowSurface {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.display.draw_iter(pixels)
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.display.fill_solid(area, color)
    }
}

impl Surface for WindowSurface {
    fn present(&mut self) -> Result<(), Self::Error> {
        // The SDL window is created lazily by the first `update()`, which
        // must happen before `events()`.
        self.window.update(&self.display);
        let mut controls = self.controls.borrow_mut();
        for event in self.window.events() {
            controls.apply(event);
        }
        Ok(())
    }
}

/// In-process broker that echoes publishes back to the subscriber.
struct LoopbackBroker {
    controls: Rc<RefCell<Controls>>,
    connected: bool,
    subscribed: Option<String>,
    inbound: VecDeque<Vec<u8>>,
    refuse_connects: u32,
}

impl LoopbackBroker {
    fn new(controls: Rc<RefCell<Controls>>) -> Self {
        Self {
            controls,
            connected: false,
            subscribed: None,
            inbound: VecDeque::new(),
            refuse_connects: 0,
        }
    }
}

impl Transport for LoopbackBroker {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, client_id: &str) -> Result<(), LinkError> {
        if self.refuse_connects > 0 {
            self.refuse_connects -= 1;
            return Err(LinkError::ConnectFailed);
        }
        info!("Loopback broker: {} connected", client_id);
        self.connected = true;
        self.subscribed = None;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        info!("Loopback broker: subscribed to {}", topic);
        self.subscribed = Some(topic.to_string());
        Ok(())
    }

    async fn poll(&mut self, _now_ms: u64) -> Result<Option<Vec<u8>>, LinkError> {
        {
            let mut controls = self.controls.borrow_mut();
            if controls.drop_link {
                controls.drop_link = false;
                warn!("Loopback broker: dropping the link");
                self.connected = false;
                self.refuse_connects = REFUSED_AFTER_DROP;
                return Err(LinkError::ConnectionLost);
            }
            if controls.inject_malformed {
                controls.inject_malformed = false;
                self.inbound.push_back(MALFORMED_PAYLOAD.to_vec());
            }
        }
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        Ok(self.inbound.pop_front())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        info!(
            "Loopback broker: {} <- {}",
            topic,
            String::from_utf8_lossy(payload)
        );
        if self.subscribed.as_deref() == Some(topic) {
            self.inbound.push_back(payload.to_vec());
        }
        Ok(())
    }
}

/// Pretends to join a network, succeeding on the second check.
struct LoopbackWifi {
    checks: u32,
}

impl WifiLink for LoopbackWifi {
    async fn begin(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn is_associated(&mut self) -> bool {
        self.checks += 1;
        self.checks > 1
    }

    fn local_address(&self) -> heapless::String<40> {
        let mut address = heapless::String::new();
        let _ = address.push_str("127.0.0.1");
        address
    }
}

struct KeyboardButtons {
    controls: Rc<RefCell<Controls>>,
    panel: ButtonPanel,
}

impl ButtonInput for KeyboardButtons {
    async fn poll_release(&mut self, now_ms: u64) -> Option<ButtonSlot> {
        let held = self.controls.borrow().held;
        self.panel.update(held, now_ms)
    }
}

/// Blocking delay; the device also stalls during these waits.
struct SleepDelay;

impl DelayNs for SleepDelay {
    async fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }
}

fn system_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn main() {
    env_logger::init();
    info!("Starting msgboard simulator");
    info!(
        "Display: {}×{} (scale {}×)",
        DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX, WINDOW_SCALE
    );
    info!("Keys: 1/2/3=Buttons  M=Malformed payload  D=Drop link  Q=Quit");

    let config_text = std::env::args().nth(1).and_then(|path| {
        std::fs::read_to_string(&path)
            .inspect_err(|e| error!("Cannot read {}: {}", path, e))
            .ok()
    });
    let config = match config_text.as_deref().map(serde_json::from_str::<Config>) {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            error!("Invalid config, using defaults: {}", e);
            Config::default()
        }
        None => Config::default(),
    };

    let controls = Rc::new(RefCell::new(Controls::default()));
    let surface = WindowSurface {
        display: SimulatorDisplay::new(Size::new(
            DISPLAY_WIDTH_PX as u32,
            DISPLAY_HEIGHT_PX as u32,
        )),
        window: Window::new(
            "Msgboard Simulator",
            &OutputSettingsBuilder::new().scale(WINDOW_SCALE).build(),
        ),
        controls: controls.clone(),
    };
    let buttons = KeyboardButtons {
        controls: controls.clone(),
        panel: ButtonPanel::new(),
    };

    let started = Instant::now();
    let now_ms = || started.elapsed().as_millis() as u64;

    let mut clock = NtpClock::new(config.time.utc_offset_secs);
    clock.sync(system_unix_secs(), now_ms());

    let mut runtime = DeviceRuntime::new(
        &config,
        surface,
        LoopbackBroker::new(controls),
        clock,
        buttons,
        SleepDelay,
        system_unix_secs() as u32,
    );

    embassy_futures::block_on(async {
        let ssid = if config.internet.ssid.is_empty() {
            "simulator"
        } else {
            config.internet.ssid
        };
        let mut wifi = LoopbackWifi { checks: 0 };
        if let Err(e) = runtime.associate(&mut wifi, ssid).await {
            error!("Association failed: {}", e);
            return;
        }

        loop {
            let now = now_ms();
            if runtime.time_mut().needs_resync(now) {
                runtime.time_mut().sync(system_unix_secs(), now);
            }
            runtime.step(now).await;
            std::thread::sleep(FRAME_DURATION);
        }
    });
}
