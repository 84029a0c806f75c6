use std::collections::HashSet;
use std::fmt::{Display, Formatter};

/// From [RFC 2086](https://tools.ietf.org/html/rfc2086#section-3).
///
/// A single access right on the selected mailbox.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Right {
    /// `l`: the mailbox is visible to `LIST`.
    Lookup,
    /// `r`: `SELECT` and read messages.
    Read,
    /// `s`: keep `\Seen` across sessions.
    Seen,
    /// `w`: write flags other than `\Seen` and `\Deleted`.
    Write,
    /// `i`: `APPEND` and `COPY` into the mailbox.
    Insert,
    /// `p`: send mail to the submission address of the mailbox.
    Post,
    /// `c`: create child mailboxes.
    Create,
    /// `d`: store `\Deleted` and `EXPUNGE`.
    Delete,
    /// `a`: administer the ACL.
    Admin,
}

impl Right {
    const ALL: [Right; 9] = [
        Right::Lookup,
        Right::Read,
        Right::Seen,
        Right::Write,
        Right::Insert,
        Right::Post,
        Right::Create,
        Right::Delete,
        Right::Admin,
    ];

    /// Map a rights character from a `MYRIGHTS` response to a [`Right`].
    pub fn from_char(c: char) -> Option<Right> {
        Right::ALL.iter().copied().find(|r| char::from(*r) == c)
    }
}

impl From<Right> for char {
    fn from(r: Right) -> char {
        match r {
            Right::Lookup => 'l',
            Right::Read => 'r',
            Right::Seen => 's',
            Right::Write => 'w',
            Right::Insert => 'i',
            Right::Post => 'p',
            Right::Create => 'c',
            Right::Delete => 'd',
            Right::Admin => 'a',
        }
    }
}

/// Helpful wrapper around the set of rights held on the selected mailbox.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Rights {
    pub(crate) data: HashSet<Right>,
}

impl Rights {
    /// Every right; assumed when the server has no ACL support.
    pub fn all() -> Rights {
        Right::ALL.iter().copied().collect::<HashSet<_>>().into()
    }

    /// Returns if the set holds the given right.
    pub fn has(&self, right: Right) -> bool {
        self.data.contains(&right)
    }

    /// Returns true if no right is held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Display for Rights {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut v: Vec<Right> = self.data.iter().copied().collect();
        v.sort_unstable();
        write!(f, "{}", v.into_iter().map(char::from).collect::<String>())
    }
}

impl From<HashSet<Right>> for Rights {
    fn from(data: HashSet<Right>) -> Self {
        Rights { data }
    }
}

impl From<&str> for Rights {
    /// Characters that do not name a known right (RFC 4314 additions such as `k` or `x`) are
    /// ignored.
    fn from(i: &str) -> Self {
        i.chars()
            .filter_map(Right::from_char)
            .collect::<HashSet<Right>>()
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rights_to_string() {
        let rights: Rights = "srl".into();
        assert_eq!(rights.to_string(), "lrs");
    }

    #[test]
    fn str_to_rights_skips_unknown() {
        let rights: Rights = "lrskxd".into();
        assert!(rights.has(Right::Lookup));
        assert!(rights.has(Right::Delete));
        assert!(!rights.has(Right::Write));
        assert_eq!(rights.to_string(), "lrsd");
    }

    #[test]
    fn all_rights() {
        assert_eq!(Rights::all().to_string(), "lrswipcda");
    }
}
