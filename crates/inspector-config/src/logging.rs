use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Log output format for the daemon.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Single-line human-readable output.
    Compact,
}

/// Error returned when a [`LogFormat`] name is not recognised.
pub type LogFormatParseError = strum::ParseError;
