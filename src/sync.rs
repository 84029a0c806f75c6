//! Local flag edits and their synchronization to the server.

use std::io::{Read, Write};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::session::{Session, SessionState};
use crate::types::{Flag, HeaderRecord, Right, Rights};
use crate::utils::iter_join;

/// The flags that must be added and removed on the server to bring it in line with `record`.
///
/// Only flags the session has the right to change are considered: `\Seen` needs `s`, `\Deleted`
/// needs `d`, and `\Flagged`/`\Answered` need `w`.
pub fn flag_changes(record: &HeaderRecord, rights: &Rights) -> (Vec<Flag>, Vec<Flag>) {
    let local = &record.flags;
    let server = &record.server_flags;
    let candidates = [
        (Right::Seen, Flag::Seen, local.read, server.read),
        (Right::Write, Flag::Flagged, local.flagged, server.flagged),
        (Right::Write, Flag::Answered, local.replied, server.replied),
        (Right::Delete, Flag::Deleted, local.deleted, server.deleted),
    ];

    let mut set = Vec::new();
    let mut unset = Vec::new();
    for (right, flag, want, have) in candidates {
        if want == have || !rights.has(right) {
            continue;
        }
        if want {
            set.push(flag);
        } else {
            unset.push(flag);
        }
    }
    (set, unset)
}

impl<T: Read + Write> Session<T> {
    /// Change a flag of a message locally.
    ///
    /// Nothing is sent; the edit is pushed by the next [`sync_mailbox`](Self::sync_mailbox).
    /// Returns `Ok(false)` if the flag already had that value or is not one the engine mirrors.
    pub fn set_flag(&mut self, index: usize, flag: Flag, value: bool) -> Result<bool> {
        let selected = self.selected.as_mut().ok_or(Error::NotSelected)?;
        let record = selected
            .context
            .headers
            .get_mut(index)
            .ok_or(Error::NoSuchMessage(index))?;
        let slot = match record.flags.slot(&flag) {
            Some(slot) => slot,
            None => return Ok(false),
        };
        if *slot == value {
            return Ok(false);
        }
        *slot = value;
        record.changed = true;
        selected.context.update_counts();
        Ok(true)
    }

    /// Push local flag edits to the server, then optionally expunge deleted messages.
    ///
    /// Each changed message gets at most one `STORE +FLAGS.SILENT` and one
    /// `STORE -FLAGS.SILENT`. The first failing command aborts the synchronization; edits that
    /// were not stored stay pending. `EXPUNGE` is only sent with the delete right.
    ///
    /// If the server reports an expunge in the middle, the mailbox is reconciled before the next
    /// `STORE`, since the remaining sequence numbers are stale. With reopening deferred (see
    /// [`allow_reopen`](Self::allow_reopen)) the synchronization stops there instead and the
    /// remaining edits stay pending.
    pub fn sync_mailbox(&mut self, expunge: bool) -> Result<()> {
        let selected = self.selected.as_ref().ok_or(Error::NotSelected)?;
        if selected.context.read_only {
            return Err(Error::ReadOnly);
        }

        let result = self.store_flags(expunge);
        if self.state != SessionState::Disconnected {
            self.finish()?;
        }
        result
    }

    fn pending_stores(&self) -> Vec<(usize, Vec<Flag>, Vec<Flag>)> {
        let headers = match &self.selected {
            Some(selected) => &selected.context.headers,
            None => return Vec::new(),
        };
        headers
            .iter()
            .filter(|h| h.changed)
            .map(|h| {
                let (set, unset) = flag_changes(h, &self.rights);
                (h.index, set, unset)
            })
            .collect()
    }

    fn store_flags(&mut self, expunge: bool) -> Result<()> {
        let mut stores = 0;
        'resync: loop {
            for (index, set, unset) in self.pending_stores() {
                for (sign, flags, value) in [('+', &set, true), ('-', &unset, false)] {
                    if flags.is_empty() {
                        continue;
                    }
                    if self.pending.expunge {
                        if !self.reopen_allowed {
                            info!("mailbox changed during synchronization, stopping");
                            return Ok(());
                        }
                        debug!("sequence numbers moved, reconciling before the next STORE");
                        self.finish()?;
                        continue 'resync;
                    }
                    self.run(&format!(
                        "STORE {} {}FLAGS.SILENT ({})",
                        index + 1,
                        sign,
                        iter_join(flags, " ")
                    ))?;
                    self.settle(index, flags, value)?;
                    stores += 1;
                }
                // edits that were reverted or that we lack the rights for
                self.settle(index, &[], false)?;
            }
            break;
        }
        if stores > 0 {
            info!("synchronized flags with {} STORE commands", stores);
        }

        if expunge {
            if self.rights.has(Right::Delete) {
                self.run("EXPUNGE")?;
            } else {
                debug!("no delete right, not expunging");
            }
        }
        Ok(())
    }

    /// Record that `flags` now have `value` on the server. The message stays changed while its
    /// local flags differ from the server's.
    fn settle(&mut self, index: usize, flags: &[Flag], value: bool) -> Result<()> {
        let selected = self.selected.as_mut().ok_or(Error::NotSelected)?;
        if let Some(record) = selected.context.headers.get_mut(index) {
            for flag in flags {
                if let Some(slot) = record.server_flags.slot(flag) {
                    *slot = value;
                }
            }
            record.changed = record.flags.differs(&record.server_flags);
        }
        selected.context.update_counts();
        Ok(())
    }
}
