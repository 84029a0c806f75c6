//! Reuse of authenticated connections.

use std::collections::HashMap;

use log::{debug, warn};

use crate::client_builder::ClientBuilder;
use crate::conn::Connection;
use crate::credentials::CredentialSource;
use crate::error::Result;
use crate::session::{Session, SessionState};

type Connector = Box<dyn FnMut(&str, u16) -> Result<Session<Connection>> + Send>;

/// Idle authenticated sessions, keyed by server.
///
/// A session is checked out for the duration of an operation and checked back in afterwards.
/// Sessions that died in the meantime are discarded on check-in, so the pool only ever hands out
/// sessions that were usable when last seen.
pub struct ConnectionPool {
    idle: HashMap<(String, u16), Vec<Session<Connection>>>,
    connector: Connector,
}

impl ConnectionPool {
    /// A pool that opens plaintext connections with [`ClientBuilder`].
    pub fn new() -> ConnectionPool {
        ConnectionPool::with_connector(|host, port| ClientBuilder::new(host, port).connect())
    }

    /// A pool that opens connections with `connector`, which must return a greeted session.
    pub fn with_connector<F>(connector: F) -> ConnectionPool
    where
        F: FnMut(&str, u16) -> Result<Session<Connection>> + Send + 'static,
    {
        ConnectionPool {
            idle: HashMap::new(),
            connector: Box::new(connector),
        }
    }

    /// An authenticated session to `host:port`, reused if one is idle.
    pub fn checkout<C>(&mut self, host: &str, port: u16, source: &mut C) -> Result<Session<Connection>>
    where
        C: CredentialSource + ?Sized,
    {
        if let Some(sessions) = self.idle.get_mut(&(host.to_string(), port)) {
            while let Some(session) = sessions.pop() {
                if session.state() >= SessionState::Authenticated {
                    debug!("reusing connection to {}:{}", host, port);
                    return Ok(session);
                }
            }
        }

        debug!("opening connection to {}:{}", host, port);
        let mut session = (self.connector)(host, port)?;
        session.authenticate(source)?;
        Ok(session)
    }

    /// Return a session to the pool. Its mailbox is closed; dead sessions are dropped.
    pub fn checkin(&mut self, host: &str, port: u16, mut session: Session<Connection>) {
        session.fastclose_mailbox();
        if session.state() < SessionState::Authenticated {
            debug!("dropping unusable connection to {}:{}", host, port);
            return;
        }
        self.idle
            .entry((host.to_string(), port))
            .or_default()
            .push(session);
    }

    /// Log out of every idle session.
    pub fn logout_all(&mut self) {
        for ((host, port), sessions) in self.idle.drain() {
            for mut session in sessions {
                if let Err(e) = session.logout() {
                    warn!("logout from {}:{} failed: {}", host, port, e);
                }
            }
        }
    }

    /// Number of idle sessions to `host:port`.
    pub fn idle_count(&self, host: &str, port: u16) -> usize {
        self.idle
            .get(&(host.to_string(), port))
            .map_or(0, Vec::len)
    }
}

impl Default for ConnectionPool {
    fn default() -> ConnectionPool {
        ConnectionPool::new()
    }
}
