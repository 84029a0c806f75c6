use std::path::PathBuf;
use std::time::Duration;

/// Header fields requested for every message by the fetch pipeline.
pub const DEFAULT_HEADER_FIELDS: &[&str] = &[
    "DATE",
    "FROM",
    "TO",
    "CC",
    "SUBJECT",
    "MESSAGE-ID",
    "IN-REPLY-TO",
    "REFERENCES",
];

/// Tunables of a [`Session`](crate::Session).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Minimum delay between two `NOOP` polls issued by
    /// [`check_mailbox`](crate::Session::check_mailbox). `None` polls every time.
    pub check_interval: Option<Duration>,
    /// Longest response line accepted, literals excluded. A longer line is a fatal error.
    pub max_line_length: usize,
    /// Header field names fetched for each message.
    pub header_fields: Vec<String>,
    /// How many times [`authenticate`](crate::Session::authenticate) asks for credentials.
    pub max_login_attempts: u32,
    /// Directory for cached message bodies. The system temp directory is used when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            check_interval: None,
            max_line_length: 64 * 1024,
            header_fields: DEFAULT_HEADER_FIELDS.iter().map(|s| s.to_string()).collect(),
            max_login_attempts: 3,
            temp_dir: None,
        }
    }
}
