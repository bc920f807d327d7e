//! Cooperative run loop
//!
//! [`DeviceRuntime`] owns the device state and every hardware collaborator.
//! Each call to [`DeviceRuntime::step`] performs one loop iteration, in a
//! fixed order:
//!
//! 1. Clock tick, then render.
//! 2. If the broker session is down, reconnect. This blocks (retrying every
//!    five seconds) until the broker is reachable again; the clock and the
//!    buttons are not serviced meanwhile.
//! 3. Drain every pending inbound payload, rendering after each.
//! 4. Poll one button release: color the status bar, render, publish once.

use alloc::format;
use alloc::string::String;
use core::fmt::Debug;
use core::future::Future;

use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use crate::app_state::{AppRunState, DeviceState};
use crate::buttons::ButtonSlot;
use crate::clock::ClockReading;
use crate::color::ColorValue;
use crate::config::Config;
use crate::display_manager::{DisplayManager, Surface};
use crate::link::{
    ASSOCIATION_MAX_POLLS, ASSOCIATION_POLL_MS, ASSOCIATION_SUCCESS_PAUSE_MS, ClientIdGenerator,
    LinkError, RECONNECT_FAILURE_FLASH_MS, RECONNECT_RETRY_DELAY_MS, RECONNECT_SUCCESS_PAUSE_MS,
    Transport, WifiLink,
};
use crate::region::{LinkRegion, RegionSet};

pub const RECONNECT_ATTEMPT_TEXT: &str = "Attempting MQTT connection...";
pub const RECONNECT_SUCCESS_TEXT: &str = "Connected";

/// Info line shown after a failed broker attempt.
pub fn reconnect_failure_text(error: LinkError) -> String {
    format!(
        "failed, rc={} try again in {} seconds",
        error.state_code(),
        RECONNECT_RETRY_DELAY_MS / 1000
    )
}

/// Wall-clock time of day, if known.
pub trait TimeSource {
    fn now(&mut self, now_ms: u64) -> Option<ClockReading>;
}

/// Debounced physical buttons.
pub trait ButtonInput {
    /// The slot whose release edge was seen since the last poll, if any.
    fn poll_release(&mut self, now_ms: u64) -> impl Future<Output = Option<ButtonSlot>>;
}

/// What one loop iteration did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub clock: RegionSet,
    pub reconnected: bool,
    pub messages: usize,
    pub published: Option<ButtonSlot>,
}

pub struct DeviceRuntime<'a, S, T, C, B, D>
where
    S: Surface,
    T: Transport,
    C: TimeSource,
    B: ButtonInput,
    D: DelayNs,
{
    topic: &'a str,
    client_id_prefix: &'a str,
    state: DeviceState,
    renderer: DisplayManager,
    client_ids: ClientIdGenerator,
    surface: S,
    transport: T,
    time: C,
    buttons: B,
    delay: D,
}

impl<'a, S, T, C, B, D> DeviceRuntime<'a, S, T, C, B, D>
where
    S: Surface,
    S::Error: Debug,
    T: Transport,
    C: TimeSource,
    B: ButtonInput,
    D: DelayNs,
{
    /// `seed` varies the client id suffixes between boots.
    pub fn new(
        config: &Config<'a>,
        surface: S,
        transport: T,
        time: C,
        buttons: B,
        delay: D,
        seed: u32,
    ) -> Self {
        Self {
            topic: config.broker.topic,
            client_id_prefix: config.broker.client_id_prefix,
            state: DeviceState::new(&config.variant),
            renderer: DisplayManager::new(),
            client_ids: ClientIdGenerator::new(seed),
            surface,
            transport,
            time,
            buttons,
            delay,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn time_mut(&mut self) -> &mut C {
        &mut self.time
    }

    pub fn buttons_mut(&mut self) -> &mut B {
        &mut self.buttons
    }

    pub fn set_run_state(&mut self, state: AppRunState) {
        self.state.set_run_state(state);
    }

    /// Render dirty regions and present. A failed frame is logged and the
    /// next refresh repaints the whole screen.
    fn refresh(&mut self) {
        let result = self
            .renderer
            .render(&mut self.state.screen, &mut self.surface)
            .and_then(|_| self.surface.present());
        if let Err(e) = result {
            error!("Display render error: {:?}", e);
            self.state.screen.mark_all_dirty();
        }
    }

    fn show_link_text(&mut self, text: &str, foreground: ColorValue, background: ColorValue) {
        self.state
            .screen
            .partition::<LinkRegion>()
            .apply_text(LinkRegion::EnvInfo, text, foreground, background);
        self.refresh();
    }

    fn fill_link(&mut self, background: ColorValue) {
        self.state
            .screen
            .partition::<LinkRegion>()
            .apply_fill(LinkRegion::EnvInfo, background);
        self.refresh();
    }

    /// Join the network, reporting progress on the info line.
    ///
    /// Gives up with [`LinkError::AssociationExhausted`] once more than
    /// [`ASSOCIATION_MAX_POLLS`] checks have failed; the caller restarts the
    /// device.
    pub async fn associate<W: WifiLink>(&mut self, wifi: &mut W, ssid: &str) -> Result<(), LinkError> {
        self.state.set_run_state(AppRunState::WifiConnecting);
        self.state.publisher.draw_button_bar(&mut self.state.screen);
        self.show_link_text(&format!("Connecting to {ssid}"), ColorValue::CYAN, ColorValue::BLACK);

        if let Err(e) = wifi.begin().await {
            error!("WiFi begin failed: {}", e);
            self.state.set_run_state(AppRunState::Error);
            return Err(LinkError::AssociationExhausted);
        }

        let mut failed_polls = 0;
        while !wifi.is_associated() {
            failed_polls += 1;
            if failed_polls > ASSOCIATION_MAX_POLLS {
                error!("WiFi association gave up after {} polls", ASSOCIATION_MAX_POLLS);
                self.state.set_run_state(AppRunState::Error);
                return Err(LinkError::AssociationExhausted);
            }
            self.delay.delay_ms(ASSOCIATION_POLL_MS).await;
            self.state
                .screen
                .partition::<LinkRegion>()
                .append_text(LinkRegion::EnvInfo, ".");
            self.refresh();
        }

        let address = wifi.local_address();
        info!("WiFi connected, address {}", address);
        self.show_link_text(
            &format!("Connected. IP address: {address}"),
            ColorValue::BLACK,
            ColorValue::CYAN,
        );
        self.delay.delay_ms(ASSOCIATION_SUCCESS_PAUSE_MS).await;
        self.state.set_run_state(AppRunState::WifiConnected);
        Ok(())
    }

    /// Connect and subscribe, retrying until both succeed.
    pub async fn reconnect(&mut self) {
        self.state.set_run_state(AppRunState::BrokerConnecting);
        loop {
            self.show_link_text(RECONNECT_ATTEMPT_TEXT, ColorValue::WHITE, ColorValue::BLACK);
            let client_id = self.client_ids.next(self.client_id_prefix);
            info!("Connecting to broker as {}", client_id);

            let result = match self.transport.connect(&client_id).await {
                Ok(()) => self.transport.subscribe(self.topic).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    self.show_link_text(RECONNECT_SUCCESS_TEXT, ColorValue::GREEN, ColorValue::BLACK);
                    self.delay.delay_ms(RECONNECT_SUCCESS_PAUSE_MS).await;
                    self.fill_link(ColorValue::BLACK);
                    self.state.set_run_state(AppRunState::Running);
                    return;
                }
                Err(e) => {
                    warn!("Broker connection failed: {}", e);
                    self.fill_link(ColorValue::RED);
                    self.delay.delay_ms(RECONNECT_FAILURE_FLASH_MS).await;
                    let text = reconnect_failure_text(e);
                    self.show_link_text(&text, ColorValue::WHITE, ColorValue::RED);
                    self.delay.delay_ms(RECONNECT_RETRY_DELAY_MS).await;
                }
            }
        }
    }

    /// One loop iteration.
    pub async fn step(&mut self, now_ms: u64) -> StepReport {
        let mut report = StepReport::default();

        if let Some(reading) = self.time.now(now_ms) {
            report.clock = self.state.clock.tick(reading, &mut self.state.screen);
        }
        self.refresh();

        if !self.transport.is_connected() {
            self.reconnect().await;
            report.reconnected = true;
        }

        loop {
            match self.transport.poll(now_ms).await {
                Ok(Some(payload)) => {
                    // Failures are already shown on the error bar.
                    let _ = self.state.messages.apply(&payload, &mut self.state.screen);
                    self.refresh();
                    report.messages += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Broker poll failed: {}", e);
                    break;
                }
            }
        }

        if let Some(slot) = self.buttons.poll_release(now_ms).await {
            let (bar_color, message) = self.state.publisher.on_edge(slot);
            self.state.publisher.apply_bar(bar_color, &mut self.state.screen);
            self.refresh();
            info!("Button {:?} released, publishing status", slot);
            if let Err(e) = self.transport.publish(self.topic, &message.to_payload()).await {
                warn!("Publish failed: {}", e);
            }
            report.published = Some(slot);
        }

        report
    }
}
