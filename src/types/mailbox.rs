use super::HeaderRecord;
use std::fmt;

/// The in-memory state of the selected mailbox.
///
/// Only the owning [`Session`](crate::Session) mutates a context; callers get shared references
/// and request changes through session operations such as
/// [`set_flag`](crate::Session::set_flag).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailboxContext {
    pub(crate) headers: Vec<HeaderRecord>,
    pub(crate) new_mail_count: usize,
    pub(crate) read_only: bool,
    flagged: usize,
    deleted: usize,
    new: usize,
    unread: usize,
    changed: usize,
}

impl MailboxContext {
    pub(crate) fn new(read_only: bool) -> MailboxContext {
        MailboxContext {
            read_only,
            ..Default::default()
        }
    }

    /// The header records, in sequence order.
    pub fn headers(&self) -> &[HeaderRecord] {
        &self.headers
    }

    /// The header record at the given zero-based index.
    pub fn get(&self, index: usize) -> Option<&HeaderRecord> {
        self.headers.get(index)
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if the mailbox holds no messages.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Number of messages marked `\Flagged`.
    pub fn flagged(&self) -> usize {
        self.flagged
    }

    /// Number of messages marked `\Deleted`.
    pub fn deleted(&self) -> usize {
        self.deleted
    }

    /// Number of unread messages that arrived since the mailbox was last looked at.
    pub fn new_messages(&self) -> usize {
        self.new
    }

    /// Number of messages without `\Seen`.
    pub fn unread(&self) -> usize {
        self.unread
    }

    /// Number of messages with unsynchronized flag edits.
    pub fn changed(&self) -> usize {
        self.changed
    }

    /// The message count most recently announced by an `EXISTS` response.
    pub fn new_mail_count(&self) -> usize {
        self.new_mail_count
    }

    /// Returns true if the mailbox was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Recompute the counters from the header records.
    pub(crate) fn update_counts(&mut self) {
        let mut counts = (0, 0, 0, 0, 0);
        for h in &self.headers {
            counts.0 += h.flags.flagged as usize;
            counts.1 += h.flags.deleted as usize;
            counts.2 += (!h.flags.read && !h.flags.old) as usize;
            counts.3 += !h.flags.read as usize;
            counts.4 += h.changed as usize;
        }
        self.flagged = counts.0;
        self.deleted = counts.1;
        self.new = counts.2;
        self.unread = counts.3;
        self.changed = counts.4;
    }
}

/// The answer to a `STATUS` command.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct MailboxStatus {
    /// `MESSAGES`
    pub messages: u32,
    /// `RECENT`
    pub recent: u32,
    /// `UNSEEN`
    pub unseen: Option<u32>,
    /// `UIDNEXT`
    pub uid_next: Option<u32>,
    /// `UIDVALIDITY`
    pub uid_validity: Option<u32>,
}

impl fmt::Display for MailboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "messages: {}, recent: {}, unseen: {:?}, uid_next: {:?}, uid_validity: {:?}",
            self.messages, self.recent, self.unseen, self.uid_next, self.uid_validity
        )
    }
}

/// Outcome of [`Session::check_mailbox`](crate::Session::check_mailbox).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckStatus {
    /// Nothing changed.
    Unchanged,
    /// New messages were appended to the context.
    NewMail,
    /// Messages were expunged and the context was reconciled.
    Reopened,
}
