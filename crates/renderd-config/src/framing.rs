use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How message boundaries are recovered from the socket byte stream.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FramingMode {
    /// A read shorter than the chunk size ends the message. Messages whose
    /// length is an exact multiple of the chunk size stay pending until more
    /// bytes arrive.
    #[default]
    ShortRead,
    /// Each message carries a 4-byte big-endian length header. Both peers
    /// must opt in.
    LengthPrefixed,
}

/// Errors encountered while parsing a [`FramingMode`] from text.
pub type FramingModeParseError = strum::ParseError;
