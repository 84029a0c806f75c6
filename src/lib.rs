//! This crate is a blocking IMAP4 client engine. It keeps a local copy of the headers of the
//! selected mailbox in sync with the server: new mail is fetched as it is announced, expunges
//! trigger a reconciliation that preserves unsynchronized flag edits, and local flag changes are
//! pushed back with minimal `STORE` commands.
//!
//! To connect, use the [`ClientBuilder`]. This gives you a [`Session`] that has read the server
//! greeting. Log in with [`Session::authenticate`] or [`Session::login`], then open a mailbox
//! with [`Session::select`].
//!
//! Below is a basic client example.
//!
//! ```no_run
//! # use imap_engine::{ClientBuilder, ConnectionMode, Credentials, Flag};
//! fn read_first_message() -> imap_engine::Result<Option<String>> {
//!     let mut session = ClientBuilder::new("imap.example.com", 993)
//!         .mode(ConnectionMode::Tls)
//!         .connect()?;
//!     session.authenticate(&mut Credentials::new("me@example.com", "password"))?;
//!
//!     let ctx = session.select("INBOX")?;
//!     let subject = match ctx.get(0) {
//!         Some(header) => header.envelope.subject.clone(),
//!         None => return Ok(None),
//!     };
//!
//!     session.set_flag(0, Flag::Flagged, true)?;
//!     session.sync_mailbox(false)?;
//!     session.logout()?;
//!     Ok(subject)
//! }
//! ```
//!
//! Every command returns once its tagged completion has been read. Errors that leave the
//! connection in an unknown state tear the session down before they are returned; see
//! [`Error::is_fatal`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod parse;

pub mod types;
pub use crate::types::*;

mod cache;
mod client_builder;
mod command;
mod config;
mod conn;
mod credentials;
pub mod error;
pub mod fetch;
mod path;
mod pool;
pub mod reconcile;
mod session;
pub mod sync;
mod unsolicited_responses;
mod utils;

pub use crate::cache::{BodyCache, CACHE_LEN};
pub use crate::client_builder::{ClientBuilder, ConnectionMode};
pub use crate::command::Response;
pub use crate::config::{Config, DEFAULT_HEADER_FIELDS};
pub use crate::conn::{Connection, ImapConnection, SetReadTimeout};
pub use crate::credentials::{CredentialSource, Credentials};
pub use crate::error::{Error, Result};
pub use crate::path::{MailboxPath, DEFAULT_PORT};
pub use crate::pool::ConnectionPool;
pub use crate::session::{Session, SessionState};

#[cfg(test)]
mod mock_stream;
