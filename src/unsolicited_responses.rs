//! Handling of untagged responses that change session state, whatever command they arrive
//! during.

use std::io::{Read, Write};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::parse::{self, Untagged};
use crate::session::{Session, SessionState};
use crate::types::{Capabilities, Rights};

/// Data responses that belong to the command in flight.
const COMMAND_DATA: &[&str] = &[
    "OK", "BAD", "PREAUTH", "FETCH", "LIST", "LSUB", "STATUS", "SEARCH", "FLAGS", "RECENT",
];

impl<T: Read + Write> Session<T> {
    /// Apply an untagged response to the session.
    ///
    /// Returns `Ok(true)` if the response was consumed here and `Ok(false)` if it is data for
    /// the command in flight. Unknown responses are logged and consumed.
    pub(crate) fn handle_unsolicited(&mut self, u: &Untagged<'_>) -> Result<bool> {
        match (u.number, u.keyword.as_str()) {
            (Some(n), "EXISTS") => self.handle_exists(n).map(|_| true),
            (Some(n), "EXPUNGE") => {
                debug!("message {} expunged", n);
                self.pending.expunge = true;
                Ok(true)
            }
            (_, "BYE") => {
                if self.logging_out {
                    debug!("server said goodbye: {}", u.text());
                    Ok(true)
                } else {
                    Err(Error::Bye(u.text()))
                }
            }
            (_, "CAPABILITY") => {
                let text = u.text();
                self.capabilities = Capabilities::from_atoms(text.split_whitespace());
                debug!("capabilities: {:?}", self.capabilities);
                Ok(true)
            }
            (_, "MYRIGHTS") => {
                self.rights = Rights::from(parse::myrights(u.rest).as_str());
                debug!("rights: {}", self.rights);
                Ok(true)
            }
            (_, "NO") => {
                warn!("server: {}", u.text());
                Ok(true)
            }
            (_, keyword) if COMMAND_DATA.contains(&keyword) => Ok(false),
            _ => {
                warn!("unhandled untagged response: {} {}", u.keyword, u.text());
                Ok(true)
            }
        }
    }

    fn handle_exists(&mut self, count: usize) -> Result<()> {
        let expunge_pending = self.pending.expunge;
        let selected = match self.selected.as_mut() {
            Some(s) if self.state == SessionState::Selected => s,
            _ => {
                self.pending.exists = Some(count);
                return Ok(());
            }
        };

        if count < selected.exists {
            if !expunge_pending {
                return Err(Error::Desync {
                    known: selected.exists,
                    reported: count,
                });
            }
            debug!("{} messages left after expunge", count);
            selected.exists = count;
        } else if count == selected.exists {
            debug!("superfluous EXISTS {}", count);
        } else {
            info!("{} now has {} messages", selected.name, count);
            selected.context.new_mail_count = count;
            self.pending.exists = Some(count);
        }
        Ok(())
    }
}
