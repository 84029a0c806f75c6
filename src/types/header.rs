use super::Flag;
use chrono::DateTime;
use log::warn;
use mailparse::MailHeaderMap;

/// The envelope fields of a message that take part in identifying it.
///
/// Built from the header subset requested by the fetch pipeline. A header the server did not
/// send is `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    /// `Date:` as a UNIX timestamp.
    pub date: Option<i64>,
    /// `From:`
    pub from: Option<String>,
    /// `To:`
    pub to: Option<String>,
    /// `Cc:`
    pub cc: Option<String>,
    /// `Subject:`
    pub subject: Option<String>,
    /// `Message-ID:`
    pub message_id: Option<String>,
    /// `In-Reply-To:`
    pub in_reply_to: Option<String>,
    /// `References:`
    pub references: Option<String>,
}

impl Envelope {
    /// Parse an envelope from a block of RFC 822 header lines.
    ///
    /// Malformed header blocks yield an empty envelope rather than an error, since the record is
    /// still usable for display and flag handling.
    pub fn parse(raw: &[u8]) -> Envelope {
        let headers = match mailparse::parse_headers(raw) {
            Ok((headers, _)) => headers,
            Err(e) => {
                warn!("unparseable message header: {}", e);
                return Envelope::default();
            }
        };
        let value = |name: &str| headers.get_first_value(name);
        Envelope {
            date: value("Date").and_then(|d| mailparse::dateparse(&d).ok()),
            from: value("From"),
            to: value("To"),
            cc: value("Cc"),
            subject: value("Subject"),
            message_id: value("Message-ID"),
            in_reply_to: value("In-Reply-To"),
            references: value("References"),
        }
    }
}

/// The flags of a message that the engine mirrors locally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageFlags {
    /// `\Seen`
    pub read: bool,
    /// The message was not `\Recent` when fetched.
    pub old: bool,
    /// `\Deleted`
    pub deleted: bool,
    /// `\Flagged`
    pub flagged: bool,
    /// `\Answered`
    pub replied: bool,
}

impl MessageFlags {
    /// Interpret the flag list of a `FETCH` response.
    pub fn from_flags<'a, I>(flags: I) -> MessageFlags
    where
        I: IntoIterator<Item = &'a Flag>,
    {
        let mut f = MessageFlags {
            old: true,
            ..Default::default()
        };
        for flag in flags {
            match flag {
                Flag::Seen => f.read = true,
                Flag::Deleted => f.deleted = true,
                Flag::Flagged => f.flagged = true,
                Flag::Answered => f.replied = true,
                Flag::Recent => f.old = false,
                _ => {}
            }
        }
        f
    }

    /// Read a mirrored flag.
    ///
    /// Returns `None` for flags that are not mirrored.
    pub fn get(&self, flag: &Flag) -> Option<bool> {
        match flag {
            Flag::Seen => Some(self.read),
            Flag::Deleted => Some(self.deleted),
            Flag::Flagged => Some(self.flagged),
            Flag::Answered => Some(self.replied),
            _ => None,
        }
    }

    /// Whether any flag that can be stored on the server differs from `other`.
    pub(crate) fn differs(&self, other: &MessageFlags) -> bool {
        [Flag::Seen, Flag::Deleted, Flag::Flagged, Flag::Answered]
            .iter()
            .any(|f| self.get(f) != other.get(f))
    }

    pub(crate) fn slot(&mut self, flag: &Flag) -> Option<&mut bool> {
        match flag {
            Flag::Seen => Some(&mut self.read),
            Flag::Deleted => Some(&mut self.deleted),
            Flag::Flagged => Some(&mut self.flagged),
            Flag::Answered => Some(&mut self.replied),
            _ => None,
        }
    }
}

/// One message of the selected mailbox, as the engine knows it.
///
/// `received`, `size` and `envelope` are fixed once fetched and together act as the identity of
/// the message when the mailbox is reconciled. Two messages that agree on all three cannot be
/// told apart.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Zero-based position in the mailbox; the sequence number is `index + 1`.
    pub index: usize,
    /// `INTERNALDATE` as a UNIX timestamp.
    pub received: i64,
    /// `RFC822.SIZE`
    pub size: usize,
    /// Parsed envelope headers.
    pub envelope: Envelope,
    /// Current local flags, including edits not yet synchronized.
    pub flags: MessageFlags,
    /// Flags as last reported by, or stored to, the server.
    pub server_flags: MessageFlags,
    /// A local flag edit is pending synchronization.
    pub changed: bool,
}

impl HeaderRecord {
    /// Returns true if both records describe the same message.
    pub fn same_message(&self, other: &HeaderRecord) -> bool {
        self.received == other.received && self.size == other.size && self.envelope == other.envelope
    }
}

/// Parse an `INTERNALDATE` value such as `17-Jul-1996 02:44:25 -0700`.
pub(crate) fn parse_internal_date(s: &str) -> Option<i64> {
    DateTime::parse_from_str(s.trim(), "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .map(|d| d.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_from_header_block() {
        let raw = b"Date: Wed, 17 Jul 1996 02:23:25 -0700\r\n\
                    From: Terry Gray <gray@cac.washington.edu>\r\n\
                    Subject: IMAP4rev1 WG mtg summary and minutes\r\n\
                    Message-ID: <B27397-0100000@cac.washington.edu>\r\n\r\n";
        let env = Envelope::parse(raw);
        assert_eq!(env.from.as_deref(), Some("Terry Gray <gray@cac.washington.edu>"));
        assert_eq!(
            env.subject.as_deref(),
            Some("IMAP4rev1 WG mtg summary and minutes")
        );
        assert_eq!(env.date, Some(837_595_405));
        assert_eq!(env.to, None);
    }

    #[test]
    fn internal_date_with_padded_day() {
        assert_eq!(parse_internal_date("17-Jul-1996 02:44:25 -0700"), Some(837_596_665));
        assert_eq!(parse_internal_date(" 1-Feb-2000 00:00:00 +0000"), Some(949_363_200));
        assert_eq!(parse_internal_date("yesterday"), None);
    }

    #[test]
    fn recent_means_not_old() {
        let f = MessageFlags::from_flags(&[Flag::Seen, Flag::Recent]);
        assert!(f.read);
        assert!(!f.old);
        let f = MessageFlags::from_flags(&[Flag::Answered, Flag::Custom("$Forwarded".into())]);
        assert!(f.old);
        assert!(f.replied);
        assert!(!f.read);
    }

    #[test]
    fn identity_ignores_flags() {
        let a = HeaderRecord {
            received: 10,
            size: 100,
            ..Default::default()
        };
        let mut b = a.clone();
        b.index = 3;
        b.flags.read = true;
        b.changed = true;
        assert!(a.same_message(&b));
        b.size = 101;
        assert!(!a.same_message(&b));
    }
}
