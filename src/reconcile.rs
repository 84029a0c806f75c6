//! Rebuilding the selected mailbox after messages were expunged.
//!
//! Sequence numbers shift when messages disappear, so the engine re-selects the mailbox,
//! downloads every header again and matches the fresh records against the old ones by identity
//! (see [`HeaderRecord::same_message`]). Matched records inherit unsynchronized local flag edits;
//! unmatched old records are dropped.

use std::io::{Read, Write};
use std::mem;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::{Pending, Session};
use crate::types::HeaderRecord;
use crate::utils::validate_str;

/// Match every record of `new` to at most one record of `old`.
///
/// The returned vector has one entry per new record: the index of the old record describing the
/// same message, or `None` if the message is new. The search for new record `i` starts at old
/// index `i` and wraps around to the front, so a mailbox that merely lost a few messages is
/// matched in close to linear time.
///
/// Each old record is matched at most once, unlike a plain first-match search. Identical
/// duplicates are therefore paired off in order: with two copies on both sides, the first new
/// copy takes the first old one and the second takes the second, and a copy only inherits the
/// edits made to its own counterpart. A third new copy with no old counterpart is new.
pub fn reconcile(old: &[HeaderRecord], new: &[HeaderRecord]) -> Vec<Option<usize>> {
    let mut taken = vec![false; old.len()];
    new.iter()
        .enumerate()
        .map(|(i, record)| {
            let start = i.min(old.len());
            let found = (start..old.len())
                .chain(0..start)
                .find(|&j| !taken[j] && old[j].same_message(record));
            if let Some(j) = found {
                taken[j] = true;
            }
            found
        })
        .collect()
}

/// Carry local state from `old` over to `new` according to `mapping`.
///
/// Records with pending flag edits keep their local flags and stay marked as changed; the server
/// flags are the freshly fetched ones, so the next synchronization sends exactly the difference.
/// Returns the new index of the old record `hint`, if it survived.
pub fn apply(
    old: &[HeaderRecord],
    new: &mut [HeaderRecord],
    mapping: &[Option<usize>],
    hint: Option<usize>,
) -> Option<usize> {
    let mut remapped = None;
    for (i, m) in mapping.iter().enumerate() {
        let j = match *m {
            Some(j) => j,
            None => continue,
        };
        if old[j].changed {
            new[i].flags = old[j].flags;
            new[i].changed = true;
        }
        if hint == Some(j) {
            remapped = Some(i);
        }
    }
    remapped
}

impl<T: Read + Write> Session<T> {
    /// Re-select the mailbox and reconcile, then apply anything the server reported meanwhile.
    ///
    /// `hint` is the index of a message the caller cares about; its new index is returned, or
    /// `None` if it is gone.
    pub fn reopen_mailbox(&mut self, hint: Option<usize>) -> Result<Option<usize>> {
        if self.selected.is_none() {
            return Err(Error::NotSelected);
        }
        let remapped = self.reopen(hint)?;
        self.finish()?;
        Ok(remapped)
    }

    pub(crate) fn reopen(&mut self, hint: Option<usize>) -> Result<Option<usize>> {
        let selected = self.selected.as_mut().ok_or(Error::NotSelected)?;
        let name = selected.name.clone();
        let verb = if selected.context.read_only {
            "EXAMINE"
        } else {
            "SELECT"
        };
        let old = mem::take(&mut selected.context.headers);
        // every EXISTS from the re-select counts as news
        selected.exists = 0;
        selected.cache.clear();
        self.pending = Pending::default();
        debug!("reopening {} with {} known messages", name, old.len());

        if let Err(e) = self.run(&format!("{} {}", verb, validate_str(&name)?)) {
            self.fastclose_mailbox();
            return Err(e);
        }
        let count = self.pending.exists.take().unwrap_or(0);
        if count > 0 {
            if let Err(e) = self.download_headers(0, count - 1) {
                self.restore(old);
                return Err(e);
            }
        }

        let selected = self.selected.as_mut().ok_or(Error::NotSelected)?;
        let headers = &mut selected.context.headers;
        let mapping = reconcile(&old, headers);
        let remapped = apply(&old, headers, &mapping, hint);
        selected.context.update_counts();
        self.pending.expunge = false;

        let kept = mapping.iter().flatten().count();
        info!(
            "reopened {}: {} messages, {} gone, {} new",
            name,
            mapping.len(),
            old.len() - kept,
            mapping.len() - kept
        );
        Ok(remapped)
    }

    /// Put back the records of a reopen that could not complete. The expunge stays pending, so
    /// the next command retries.
    fn restore(&mut self, old: Vec<HeaderRecord>) {
        // a fatal error has already torn the mailbox down
        if let Some(selected) = self.selected.as_mut() {
            warn!("reopening {} failed, keeping {} known messages", selected.name, old.len());
            selected.exists = old.len();
            selected.context.headers = old;
            selected.context.update_counts();
            self.pending.expunge = true;
        }
    }
}
