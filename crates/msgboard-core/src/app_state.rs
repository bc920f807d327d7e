//! Application-wide state for msgboard

use log::info;

use crate::buttons::ButtonEventPublisher;
use crate::clock::ClockTicker;
use crate::config::VariantConfig;
use crate::message::StatusMessageHandler;
use crate::region::ScreenModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    Uninitialized,
    WifiConnecting,
    WifiConnected,
    TimeSyncing,
    TimeKnown,
    BrokerConnecting,
    Running,
    Error,
}

/// Everything the run loop mutates.
///
/// Owned by the runtime and handed by `&mut` to each component, so no
/// state lives in statics.
#[derive(Debug)]
pub struct DeviceState {
    pub run_state: AppRunState,
    pub screen: ScreenModel,
    pub clock: ClockTicker,
    pub messages: StatusMessageHandler,
    pub publisher: ButtonEventPublisher,
}

impl DeviceState {
    pub fn new(variant: &VariantConfig) -> Self {
        Self {
            run_state: AppRunState::Uninitialized,
            screen: ScreenModel::new(),
            clock: ClockTicker::default(),
            messages: StatusMessageHandler::new(variant.consume_english_text),
            publisher: ButtonEventPublisher,
        }
    }

    pub fn set_run_state(&mut self, state: AppRunState) {
        if self.run_state != state {
            info!("Run state {:?} -> {:?}", self.run_state, state);
            self.run_state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;

    #[test]
    fn test_new_state_is_blank() {
        let state = DeviceState::new(&VariantConfig::default());
        assert_eq!(state.run_state, AppRunState::Uninitialized);
        assert_eq!(state.screen.dirty().len(), Region::ALL.len());
        assert_eq!(state.clock.last_rendered(), None);
    }

    #[test]
    fn test_variant_reaches_handler() {
        let variant = VariantConfig {
            consume_english_text: true,
        };
        let mut state = DeviceState::new(&variant);
        state
            .messages
            .apply(br#"{"textMain":"a", "textEng":"b"}"#, &mut state.screen)
            .unwrap();
        assert_eq!(state.screen.get(Region::MainMessage).text, "b");
    }
}
