//! Parsing of `{host[:port]}mailbox` paths.

use crate::error::{Error, ParseError};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// The port used when a path does not name one.
pub const DEFAULT_PORT: u16 = 143;

lazy_static! {
    static ref PATH_RE: Regex = Regex::new(r"^\{([^}:]+)(?::(\d+))?\}(.*)$").unwrap();
}

/// A mailbox on a particular server, written `{host[:port]}mailbox`.
///
/// ```
/// # use imap_engine::MailboxPath;
/// let path: MailboxPath = "{imap.example.com:1143}lists/rust".parse().unwrap();
/// assert_eq!(path.host, "imap.example.com");
/// assert_eq!(path.port, 1143);
/// assert_eq!(path.mailbox, "lists/rust");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MailboxPath {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Mailbox name. An empty name means `INBOX`.
    pub mailbox: String,
}

impl MailboxPath {
    /// The mailbox name to select.
    pub fn mailbox_or_inbox(&self) -> &str {
        if self.mailbox.is_empty() {
            "INBOX"
        } else {
            &self.mailbox
        }
    }
}

impl FromStr for MailboxPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Parse(ParseError::Path(s.to_string()));
        let caps = PATH_RE.captures(s).ok_or_else(invalid)?;
        let port = match caps.get(2) {
            Some(p) => p.as_str().parse().map_err(|_| invalid())?,
            None => DEFAULT_PORT,
        };
        Ok(MailboxPath {
            host: caps[1].to_string(),
            port,
            mailbox: caps[3].to_string(),
        })
    }
}

impl fmt::Display for MailboxPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == DEFAULT_PORT {
            write!(f, "{{{}}}{}", self.host, self.mailbox)
        } else {
            write!(f, "{{{}:{}}}{}", self.host, self.port, self.mailbox)
        }
    }
}
