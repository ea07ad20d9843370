use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer};

/// What the receiver does with a message after it arrived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverAction {
    #[default]
    Acknowledge,
    Reject,
    Release,
    /// Leave the delivery unsettled.
    Noack,
}

/// What the sender does when the broker releases a delivery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseAction {
    #[default]
    Ignore,
    Retry,
    Fail,
}

/// Textual encodings of printed messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Body,
    Dict,
    Interop,
    Json,
    Upstream,
}

bitflags! {
    /// Which objects the connector creates and tears down: `C`onnection, s`E`ssion, `S`ender,
    /// `R`eceiver.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ObjectControl: u8 {
        const CONNECTION = 0b0001;
        const SESSION    = 0b0010;
        const SENDER     = 0b0100;
        const RECEIVER   = 0b1000;
    }
}

impl Default for ObjectControl {
    fn default() -> Self {
        ObjectControl::CONNECTION
    }
}

impl FromStr for ObjectControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = ObjectControl::empty();

        for c in s.chars() {
            match c.to_ascii_uppercase() {
                'C' => flags |= ObjectControl::CONNECTION,
                'E' => flags |= ObjectControl::SESSION,
                'S' => flags |= ObjectControl::SENDER,
                'R' => flags |= ObjectControl::RECEIVER,
                other => return Err(format!("unknown object control flag '{other}'")),
            }
        }

        Ok(flags)
    }
}

impl<'de> Deserialize<'de> for ObjectControl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        s.parse().map_err(serde::de::Error::custom)
    }
}
