use std::collections::hash_set::Iter;
use std::collections::HashSet;

/// The capabilities the engine cares about.
///
/// Servers may advertise many more; those are ignored as
/// [RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.2.1) requires of clients.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Capability {
    /// Plain `IMAP4`, the predecessor of `IMAP4rev1`.
    Imap4,
    /// `IMAP4rev1`; enables `BODY.PEEK[...]` fetches.
    Imap4rev1,
    /// The `STATUS` command.
    Status,
    /// [RFC 2086](https://tools.ietf.org/html/rfc2086) ACLs; enables `MYRIGHTS`.
    Acl,
    /// [RFC 2342](https://tools.ietf.org/html/rfc2342) namespaces.
    Namespace,
    /// `AUTH=CRAM-MD5`
    AuthCramMd5,
    /// `AUTH=GSSAPI`
    AuthGssapi,
    /// `AUTH=ANONYMOUS`
    AuthAnonymous,
    /// `STARTTLS`
    StartTls,
    /// `LOGINDISABLED`: the `LOGIN` command must not be used.
    LoginDisabled,
    /// `IDLE`
    Idle,
    /// `UIDPLUS`
    UidPlus,
}

impl Capability {
    /// Look up a capability atom, ignoring case.
    pub fn from_atom(atom: &str) -> Option<Capability> {
        let c = match atom.to_ascii_uppercase().as_str() {
            "IMAP4" => Capability::Imap4,
            "IMAP4REV1" => Capability::Imap4rev1,
            "STATUS" => Capability::Status,
            "ACL" => Capability::Acl,
            "NAMESPACE" => Capability::Namespace,
            "AUTH=CRAM-MD5" => Capability::AuthCramMd5,
            "AUTH=GSSAPI" => Capability::AuthGssapi,
            "AUTH=ANONYMOUS" => Capability::AuthAnonymous,
            "STARTTLS" => Capability::StartTls,
            "LOGINDISABLED" => Capability::LoginDisabled,
            "IDLE" => Capability::Idle,
            "UIDPLUS" => Capability::UidPlus,
            _ => return None,
        };
        Some(c)
    }
}

/// From [section 7.2.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.2.1).
///
/// The set of known capabilities the server advertised in its most recent `CAPABILITY` response
/// (or greeting response code).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities(pub(crate) HashSet<Capability>);

impl Capabilities {
    /// Build a capability set from the atoms of a `CAPABILITY` response.
    pub fn from_atoms<'a, I>(atoms: I) -> Capabilities
    where
        I: IntoIterator<Item = &'a str>,
    {
        Capabilities(atoms.into_iter().filter_map(Capability::from_atom).collect())
    }

    /// Check if the server has the given capability.
    pub fn has(&self, c: Capability) -> bool {
        self.0.contains(&c)
    }

    /// Iterate over all the known capabilities of the server.
    pub fn iter(&self) -> Iter<'_, Capability> {
        self.0.iter()
    }

    /// Returns how many known capabilities the server has.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no capability has been discovered yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_atoms_are_ignored() {
        let caps = Capabilities::from_atoms(
            "IMAP4rev1 STARTTLS AUTH=GSSAPI LOGINDISABLED XYZZY".split(' '),
        );
        assert_eq!(caps.len(), 4);
        assert!(caps.has(Capability::Imap4rev1));
        assert!(caps.has(Capability::LoginDisabled));
        assert!(!caps.has(Capability::Acl));
    }

    #[test]
    fn atoms_are_case_insensitive() {
        let caps = Capabilities::from_atoms(["imap4REV1", "acl"]);
        assert!(caps.has(Capability::Imap4rev1));
        assert!(caps.has(Capability::Acl));
    }
}
