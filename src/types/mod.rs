//! This module contains types used throughout the IMAP engine.

/// From section [2.3.1.2 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.2).
///
/// A relative position from 1 to the number of messages in the mailbox.
/// This position is ordered by ascending unique identifier.  As
/// each new message is added, it is assigned a message sequence number
/// that is 1 higher than the number of messages in the mailbox before
/// that new message was added.
///
/// Message sequence numbers can be reassigned during the session.  For
/// example, when a message is permanently removed (expunged) from the
/// mailbox, the message sequence number for all subsequent messages is
/// decremented.  The number of messages in the mailbox is also
/// decremented.  Similarly, a new message can be assigned a message
/// sequence number that was once held by some other message prior to an
/// expunge.
///
/// Header records use zero-based indices; the sequence number of the record at index `i` is
/// `i + 1`.
pub type Seq = u32;

mod flag;
pub use self::flag::Flag;

mod capabilities;
pub use self::capabilities::{Capabilities, Capability};

mod acls;
pub use self::acls::{Right, Rights};

mod header;
pub(crate) use self::header::parse_internal_date;
pub use self::header::{Envelope, HeaderRecord, MessageFlags};

mod mailbox;
pub use self::mailbox::{CheckStatus, MailboxContext, MailboxStatus};

mod name;
pub use self::name::Name;
