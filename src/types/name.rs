/// A name that matches a `LIST` command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Name {
    pub(crate) attributes: Vec<String>,
    pub(crate) delimiter: Option<String>,
    pub(crate) name: String,
}

impl Name {
    /// Attributes of this name, such as `\Noselect` or `\HasChildren`.
    pub fn attributes(&self) -> &[String] {
        &self.attributes[..]
    }

    /// Returns true if the name carries the given attribute, ignoring case.
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(attribute))
    }

    /// The hierarchy delimiter is a character used to delimit levels of hierarchy in a mailbox
    /// name.  A client can use it to create child mailboxes, and to search higher or lower levels
    /// of naming hierarchy.  All children of a top-level hierarchy node use the same
    /// separator character.  `None` means that no hierarchy exists; the name is a "flat" name.
    pub fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    /// The name represents an unambiguous left-to-right hierarchy, and are valid for use as a
    /// reference in `LIST` command.  Unless `\Noselect` is indicated, the name is also valid as
    /// an argument for commands, such as `SELECT`, that accept mailbox names.
    pub fn name(&self) -> &str {
        &self.name
    }
}
