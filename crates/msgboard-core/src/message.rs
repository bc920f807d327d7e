//! Inbound status messages
//!
//! A status message is a flat JSON object:
//!
//! ```json
//! {
//!     "FGColor"  : "WHITE",
//!     "BGColor"  : "RED",
//!     "textEng"  : "Primary text (English)",
//!     "textMain" : "Primary text",
//!     "textSub"  : "Sub text"
//! }
//! ```
//!
//! Every key is optional, keys are case-sensitive and unknown keys are
//! ignored. When a key repeats, its first value is kept. `textEng` is only
//! a hint, so a non-string value there is dropped instead of rejecting the
//! message. [`StatusMessageHandler`] applies a parsed message to the message
//! regions; a payload that fails to parse is reported on the error bar and
//! leaves the message regions untouched.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use log::{debug, warn};
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror_no_std::Error;

use crate::color::{self, ColorValue};
use crate::region::{MessageRegion, Region, RegionSet, ScreenModel};

/// Prefix written to the error bar ahead of the offending payload.
pub const PARSE_FAILURE_TEXT: &str = "Parsing input failed! ";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Payload is not a flat status object")]
    MalformedPayload,
}

/// Decoded status message.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMessage {
    #[serde(rename = "FGColor")]
    pub foreground_name: String,
    #[serde(rename = "BGColor")]
    pub background_name: String,
    #[serde(rename = "textMain")]
    pub main_text: String,
    #[serde(rename = "textSub")]
    pub sub_text: String,
    #[serde(rename = "textEng", skip_serializing_if = "Option::is_none")]
    pub english_text: Option<String>,
}

impl StatusMessage {
    /// Parse a raw payload.
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        serde_json::from_slice(payload).map_err(|e| {
            debug!("Status payload rejected: {}", e);
            ParseError::MalformedPayload
        })
    }

    /// Serialize for publication.
    pub fn to_payload(&self) -> Vec<u8> {
        // Plain string fields cannot fail to serialize.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

impl<'de> Deserialize<'de> for StatusMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(StatusMessageVisitor)
    }
}

struct StatusMessageVisitor;

impl<'de> Visitor<'de> for StatusMessageVisitor {
    type Value = StatusMessage;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a flat status object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut foreground = None;
        let mut background = None;
        let mut main = None;
        let mut sub = None;
        let mut english: Option<Option<String>> = None;

        while let Some(key) = map.next_key::<String>()? {
            let slot = match key.as_str() {
                "FGColor" => &mut foreground,
                "BGColor" => &mut background,
                "textMain" => &mut main,
                "textSub" => &mut sub,
                "textEng" if english.is_none() => {
                    let value = map.next_value::<serde_json::Value>()?;
                    english = Some(match value {
                        serde_json::Value::String(text) => Some(text),
                        other => {
                            debug!("Ignoring non-string textEng: {:?}", other);
                            None
                        }
                    });
                    continue;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                    continue;
                }
            };
            if slot.is_some() {
                map.next_value::<IgnoredAny>()?;
            } else {
                *slot = Some(map.next_value::<String>()?);
            }
        }

        Ok(StatusMessage {
            foreground_name: foreground.unwrap_or_default(),
            background_name: background.unwrap_or_default(),
            main_text: main.unwrap_or_default(),
            sub_text: sub.unwrap_or_default(),
            english_text: english.flatten(),
        })
    }
}

/// Applies inbound status messages to the message regions.
#[derive(Debug, Clone, Default)]
pub struct StatusMessageHandler {
    consume_english_text: bool,
}

impl StatusMessageHandler {
    pub fn new(consume_english_text: bool) -> Self {
        Self {
            consume_english_text,
        }
    }

    /// Parse and apply a raw payload.
    ///
    /// On a parse failure the raw payload is shown on the error bar and the
    /// main and sub message regions are left as they were.
    pub fn apply(
        &self,
        payload: &[u8],
        screen: &mut ScreenModel,
    ) -> Result<RegionSet, ParseError> {
        match StatusMessage::parse(payload) {
            Ok(message) => Ok(self.apply_message(&message, screen)),
            Err(e) => {
                warn!("Parsing input failed ({} bytes)", payload.len());
                let mut text = String::from(PARSE_FAILURE_TEXT);
                text.push_str(&String::from_utf8_lossy(payload));
                screen.partition::<MessageRegion>().apply_text(
                    MessageRegion::Error,
                    &text,
                    ColorValue::RED,
                    ColorValue::BLACK,
                );
                Err(e)
            }
        }
    }

    /// Apply an already parsed message.
    pub fn apply_message(&self, message: &StatusMessage, screen: &mut ScreenModel) -> RegionSet {
        let foreground = color::resolve(&message.foreground_name);
        let background = color::resolve(&message.background_name);
        let mut written = RegionSet::empty();
        let mut regions = screen.partition::<MessageRegion>();

        let main_text = match &message.english_text {
            Some(english) if self.consume_english_text && !english.is_empty() => english,
            _ => &message.main_text,
        };
        if !main_text.is_empty() {
            regions.apply_text(MessageRegion::Main, main_text, foreground, background);
            written.insert(Region::MainMessage);
        }

        // The sub line always renders white on black, whatever the message asks for.
        if !message.sub_text.is_empty() {
            regions.apply_text(
                MessageRegion::Sub,
                &message.sub_text,
                ColorValue::WHITE,
                ColorValue::BLACK,
            );
            written.insert(Region::SubMessage);
        }

        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(payload: &str) -> (ScreenModel, Result<RegionSet, ParseError>) {
        let mut screen = ScreenModel::new();
        let result = StatusMessageHandler::default().apply(payload.as_bytes(), &mut screen);
        (screen, result)
    }

    #[test]
    fn test_parse_full_message() {
        let message = StatusMessage::parse(
            br#"{"FGColor":"WHITE", "BGColor":"RED", "textMain":"main", "textSub":"sub", "textEng":"eng"}"#,
        )
        .unwrap();
        assert_eq!(message.foreground_name, "WHITE");
        assert_eq!(message.background_name, "RED");
        assert_eq!(message.main_text, "main");
        assert_eq!(message.sub_text, "sub");
        assert_eq!(message.english_text.as_deref(), Some("eng"));
    }

    #[test]
    fn test_missing_and_unknown_keys() {
        let message = StatusMessage::parse(br#"{"textSub":"only", "extra":42}"#).unwrap();
        assert_eq!(message.main_text, "");
        assert_eq!(message.foreground_name, "");
        assert_eq!(message.sub_text, "only");
        assert_eq!(message.english_text, None);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let message = StatusMessage::parse(br#"{"fgcolor":"RED", "TEXTMAIN":"x"}"#).unwrap();
        assert_eq!(message, StatusMessage::default());
    }

    #[test]
    fn test_repeated_key_keeps_first_value() {
        let message =
            StatusMessage::parse(br#"{"textMain":"a", "textMain":"b", "FGColor":"RED", "FGColor":7}"#)
                .unwrap();
        assert_eq!(message.main_text, "a");
        assert_eq!(message.foreground_name, "RED");
    }

    #[test]
    fn test_non_string_english_text_is_dropped() {
        let payload = br#"{"textMain":"main", "textEng":42}"#;
        let message = StatusMessage::parse(payload).unwrap();
        assert_eq!(message.main_text, "main");
        assert_eq!(message.english_text, None);

        for consume_english_text in [false, true] {
            let mut screen = ScreenModel::new();
            let written = StatusMessageHandler::new(consume_english_text)
                .apply(payload, &mut screen)
                .unwrap();
            assert!(written.contains(Region::MainMessage));
            assert_eq!(screen.get(Region::MainMessage).text, "main");
            assert_eq!(screen.get(Region::ErrorBar).text, "");
        }
    }

    #[test]
    fn test_malformed_payloads() {
        for payload in [
            "{not json",
            "",
            "[1, 2]",
            "\"text\"",
            r#"{"textMain": 5}"#,
        ] {
            assert_eq!(
                StatusMessage::parse(payload.as_bytes()),
                Err(ParseError::MalformedPayload),
                "payload {payload:?}"
            );
        }
    }

    #[test]
    fn test_sub_text_ignores_message_colors() {
        let (screen, result) =
            apply(r#"{"textMain":"X", "textSub":"Y", "FGColor":"RED", "BGColor":"BLUE"}"#);
        let written = result.unwrap();
        assert!(written.contains(Region::MainMessage));
        assert!(written.contains(Region::SubMessage));

        let main = screen.get(Region::MainMessage);
        assert_eq!(main.text, "X");
        assert_eq!(main.foreground, ColorValue::RED);
        assert_eq!(main.background, ColorValue::BLUE);

        let sub = screen.get(Region::SubMessage);
        assert_eq!(sub.text, "Y");
        assert_eq!(sub.foreground, ColorValue::WHITE);
        assert_eq!(sub.background, ColorValue::BLACK);
    }

    #[test]
    fn test_empty_main_text_leaves_main_region() {
        let mut screen = ScreenModel::new();
        let handler = StatusMessageHandler::default();
        handler
            .apply(br#"{"textMain":"keep", "FGColor":"RED", "BGColor":"BLUE"}"#, &mut screen)
            .unwrap();
        let before = screen.get(Region::MainMessage).clone();

        let written = handler
            .apply(br#"{"textMain":"", "textSub":"Z", "FGColor":"GREEN", "BGColor":"CYAN"}"#, &mut screen)
            .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(screen.get(Region::MainMessage), &before);
        assert_eq!(screen.get(Region::SubMessage).text, "Z");
    }

    #[test]
    fn test_apply_is_idempotent() {
        let payload = br#"{"FGColor":"BLACK", "BGColor":"YELLOW", "textMain":"a", "textSub":"b"}"#;
        let handler = StatusMessageHandler::default();

        let mut once = ScreenModel::new();
        handler.apply(payload, &mut once).unwrap();

        let mut twice = ScreenModel::new();
        handler.apply(payload, &mut twice).unwrap();
        handler.apply(payload, &mut twice).unwrap();

        for region in Region::ALL {
            assert_eq!(once.get(region), twice.get(region), "{region:?}");
        }
    }

    #[test]
    fn test_unknown_colors_fall_back() {
        let (screen, result) = apply(r#"{"textMain":"X", "FGColor":"orange"}"#);
        assert!(result.is_ok());
        let main = screen.get(Region::MainMessage);
        assert_eq!(main.foreground, ColorValue::PURPLE);
        assert_eq!(main.background, ColorValue::PURPLE);
    }

    #[test]
    fn test_malformed_payload_goes_to_error_bar() {
        let mut screen = ScreenModel::new();
        let handler = StatusMessageHandler::default();
        handler
            .apply(br#"{"textMain":"before", "textSub":"sub"}"#, &mut screen)
            .unwrap();
        let main = screen.get(Region::MainMessage).clone();
        let sub = screen.get(Region::SubMessage).clone();

        let result = handler.apply(b"{not json", &mut screen);
        assert_eq!(result, Err(ParseError::MalformedPayload));
        assert_eq!(screen.get(Region::MainMessage), &main);
        assert_eq!(screen.get(Region::SubMessage), &sub);

        let error = screen.get(Region::ErrorBar);
        assert!(error.text.starts_with(PARSE_FAILURE_TEXT));
        assert!(error.text.ends_with("{not json"));
        assert_eq!(error.foreground, ColorValue::RED);
    }

    #[test]
    fn test_english_text_variant() {
        let payload = r#"{"textMain":"会議中", "textEng":"In a meeting"}"#.as_bytes();

        let mut screen = ScreenModel::new();
        StatusMessageHandler::new(true).apply(payload, &mut screen).unwrap();
        assert_eq!(screen.get(Region::MainMessage).text, "In a meeting");

        let mut screen = ScreenModel::new();
        StatusMessageHandler::new(false).apply(payload, &mut screen).unwrap();
        assert_eq!(screen.get(Region::MainMessage).text, "会議中");
    }

    #[test]
    fn test_payload_serialization_uses_wire_keys() {
        let message = StatusMessage {
            foreground_name: "WHITE".into(),
            background_name: "RED".into(),
            main_text: "m".into(),
            sub_text: "s".into(),
            english_text: None,
        };
        let payload = message.to_payload();
        let text = core::str::from_utf8(&payload).unwrap();
        assert_eq!(
            text,
            r#"{"FGColor":"WHITE","BGColor":"RED","textMain":"m","textSub":"s"}"#
        );
        assert_eq!(StatusMessage::parse(&payload).unwrap(), message);
    }
}
