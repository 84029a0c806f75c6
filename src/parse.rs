//! Line-level response parsing.
//!
//! Framing (tags, untagged keywords, literal markers, response codes) is parsed here with `nom`.
//! Structured data responses (`LIST`, `STATUS`) are handed to `imap-proto`.

use imap_proto::{MailboxDatum, Response, StatusAttribute};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit1},
    combinator::{map_res, opt, value},
    sequence::terminated,
    IResult,
};

use crate::error::{Error, ParseError, Result};
use crate::types::{MailboxStatus, Name};

/// Completion result carried by a tagged response line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Status {
    Ok,
    No,
    Bad,
}

/// An untagged (`*`) response line, split into its leading parts.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Untagged<'a> {
    /// The message number of `* <n> KEYWORD` responses.
    pub(crate) number: Option<usize>,
    /// The keyword, upper-cased.
    pub(crate) keyword: String,
    /// Everything after the keyword, without the line terminator.
    pub(crate) rest: &'a [u8],
}

impl Untagged<'_> {
    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(self.rest).into_owned()
    }
}

/// How a response line relates to the command in flight.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineKind<'a> {
    Untagged(Untagged<'a>),
    Continuation,
    Tagged(Status, String),
}

fn is_atom_char(c: u8) -> bool {
    !matches!(c, b' ' | b'\r' | b'\n' | b'(' | b')' | b'{' | b'"')
}

pub(crate) fn number(i: &[u8]) -> IResult<&[u8], usize> {
    map_res(map_res(digit1, std::str::from_utf8), |s: &str| {
        s.parse::<usize>()
    })(i)
}

fn trim_crlf(i: &[u8]) -> &[u8] {
    let i = i.strip_suffix(b"\n").unwrap_or(i);
    i.strip_suffix(b"\r").unwrap_or(i)
}

pub(crate) fn untagged(i: &[u8]) -> IResult<&[u8], Untagged<'_>> {
    let (i, _) = tag("* ")(i)?;
    let (i, number) = opt(terminated(number, char(' ')))(i)?;
    let (i, keyword) = take_while1(is_atom_char)(i)?;
    let (i, _) = opt(char(' '))(i)?;
    Ok((
        &i[i.len()..],
        Untagged {
            number,
            keyword: String::from_utf8_lossy(keyword).to_ascii_uppercase(),
            rest: trim_crlf(i),
        },
    ))
}

fn status(i: &[u8]) -> IResult<&[u8], Status> {
    alt((
        value(Status::Ok, tag_no_case("OK")),
        value(Status::No, tag_no_case("NO")),
        value(Status::Bad, tag_no_case("BAD")),
    ))(i)
}

fn tagged<'a>(t: &str, i: &'a [u8]) -> IResult<&'a [u8], (Status, &'a [u8])> {
    let (i, _) = tag(t.as_bytes())(i)?;
    let (i, _) = char(' ')(i)?;
    let (i, status) = status(i)?;
    let (i, _) = opt(char(' '))(i)?;
    Ok((&i[i.len()..], (status, trim_crlf(i))))
}

/// Classify a complete response line against the tag of the command in flight.
///
/// A line that is neither untagged, a continuation request, nor tagged with `tag` breaks the
/// framing of the stream.
pub(crate) fn classify<'a>(raw: &'a [u8], tag: &str) -> Result<LineKind<'a>> {
    if raw.starts_with(b"* ") {
        return match untagged(raw) {
            Ok((_, u)) => Ok(LineKind::Untagged(u)),
            Err(_) => Err(Error::Parse(ParseError::Invalid(raw.to_vec()))),
        };
    }
    if raw.starts_with(b"+") {
        return Ok(LineKind::Continuation);
    }
    match tagged(tag, raw) {
        Ok((_, (status, text))) => Ok(LineKind::Tagged(
            status,
            String::from_utf8_lossy(text).into_owned(),
        )),
        Err(_) => Err(Error::Parse(ParseError::Framing(raw.to_vec()))),
    }
}

/// Untagged status responses never carry literals.
pub(crate) fn may_carry_literal(first_segment: &[u8]) -> bool {
    match untagged(first_segment) {
        Ok((_, u)) => !matches!(
            u.keyword.as_str(),
            "OK" | "NO" | "BAD" | "BYE" | "PREAUTH"
        ),
        Err(_) => false,
    }
}

/// Look for a `{n}` literal marker at the end of a line segment.
///
/// Returns `None` if the segment does not end in a marker, and the offending text if the byte
/// count is not a decimal number.
pub(crate) fn literal_len(segment: &[u8]) -> Option<std::result::Result<usize, String>> {
    let body = trim_crlf(segment);
    let body = body.strip_suffix(b"}")?;
    let open = body.iter().rposition(|&c| c == b'{')?;
    let count = &body[open + 1..];
    if count.contains(&b' ') {
        return None;
    }
    match number(count) {
        Ok((rest, n)) if rest.is_empty() => Some(Ok(n)),
        _ => Some(Err(String::from_utf8_lossy(count).into_owned())),
    }
}

/// Split a leading `[CODE args]` response code off a status text.
///
/// The code is upper-cased; the arguments are returned as sent.
pub(crate) fn response_code(text: &str) -> Option<(String, &str)> {
    let inner = text.strip_prefix('[')?;
    let end = inner.find(']')?;
    let inner = &inner[..end];
    let (code, args) = match inner.find(' ') {
        Some(sp) => (&inner[..sp], &inner[sp + 1..]),
        None => (inner, ""),
    };
    Some((code.to_ascii_uppercase(), args))
}

/// Parse one `* LIST` line.
///
/// Returns `Ok(None)` for any other data response.
pub(crate) fn parse_name(raw: &[u8]) -> Result<Option<Name>> {
    match imap_proto::parser::parse_response(raw) {
        Ok((
            _,
            Response::MailboxData(MailboxDatum::List {
                flags,
                delimiter,
                name,
            }),
        )) => Ok(Some(Name {
            attributes: flags.into_iter().map(|f| f.to_string()).collect(),
            delimiter: delimiter.map(|d| d.to_string()),
            name: name.to_string(),
        })),
        Ok(_) => Ok(None),
        Err(_) => Err(Error::Parse(ParseError::Data(raw.to_vec()))),
    }
}

/// Parse one `* STATUS` line.
///
/// Returns `Ok(None)` for any other data response.
pub(crate) fn parse_status(raw: &[u8]) -> Result<Option<MailboxStatus>> {
    match imap_proto::parser::parse_response(raw) {
        Ok((_, Response::MailboxData(MailboxDatum::Status { status, .. }))) => {
            let mut mb = MailboxStatus::default();
            for attr in status {
                match attr {
                    StatusAttribute::Messages(v) => mb.messages = v,
                    StatusAttribute::Recent(v) => mb.recent = v,
                    StatusAttribute::Unseen(v) => mb.unseen = Some(v),
                    StatusAttribute::UidNext(v) => mb.uid_next = Some(v),
                    StatusAttribute::UidValidity(v) => mb.uid_validity = Some(v),
                    _ => {}
                }
            }
            Ok(Some(mb))
        }
        Ok(_) => Ok(None),
        Err(_) => Err(Error::Parse(ParseError::Data(raw.to_vec()))),
    }
}

/// The rights string of a `* MYRIGHTS <mailbox> <rights>` response.
pub(crate) fn myrights(rest: &[u8]) -> String {
    let text = String::from_utf8_lossy(rest);
    text.rsplit(' ').next().unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_untagged() {
        match classify(b"* 23 EXISTS\r\n", "a0001").unwrap() {
            LineKind::Untagged(u) => {
                assert_eq!(u.number, Some(23));
                assert_eq!(u.keyword, "EXISTS");
                assert!(u.rest.is_empty());
            }
            k => panic!("unexpected {:?}", k),
        }
        match classify(b"* capability IMAP4rev1 ACL\r\n", "a0001").unwrap() {
            LineKind::Untagged(u) => {
                assert_eq!(u.number, None);
                assert_eq!(u.keyword, "CAPABILITY");
                assert_eq!(u.rest, b"IMAP4rev1 ACL");
            }
            k => panic!("unexpected {:?}", k),
        }
    }

    #[test]
    fn classify_tagged_is_case_insensitive() {
        assert_eq!(
            classify(b"a0007 no [TRYCREATE] no such mailbox\r\n", "a0007").unwrap(),
            LineKind::Tagged(Status::No, "[TRYCREATE] no such mailbox".to_string())
        );
        assert_eq!(
            classify(b"a0007 OK\r\n", "a0007").unwrap(),
            LineKind::Tagged(Status::Ok, String::new())
        );
        assert_eq!(classify(b"+ go ahead\r\n", "a0007").unwrap(), LineKind::Continuation);
    }

    #[test]
    fn foreign_tag_breaks_framing() {
        match classify(b"a0006 OK done\r\n", "a0007") {
            Err(Error::Parse(ParseError::Framing(raw))) => assert_eq!(raw, b"a0006 OK done\r\n"),
            r => panic!("unexpected {:?}", r),
        }
    }

    #[test]
    fn literal_markers() {
        assert_eq!(literal_len(b"* 1 FETCH (RFC822 {13}\r\n"), Some(Ok(13)));
        assert_eq!(literal_len(b"* 1 FETCH (RFC822 {1x}\r\n"), Some(Err("1x".to_string())));
        assert_eq!(literal_len(b"* 1 FETCH (RFC822 {}\r\n"), Some(Err(String::new())));
        assert_eq!(literal_len(b"* 1 FETCH (FLAGS ())\r\n"), None);
        assert_eq!(literal_len(b"* LIST () \"/\" {some name}\r\n"), None);
        assert!(may_carry_literal(b"* 1 FETCH (RFC822 {13}\r\n"));
        assert!(!may_carry_literal(b"* OK {13}\r\n"));
    }

    #[test]
    fn response_codes() {
        assert_eq!(
            response_code("[READ-ONLY] EXAMINE completed"),
            Some(("READ-ONLY".to_string(), ""))
        );
        assert_eq!(
            response_code("[capability IMAP4rev1 IDLE] hi"),
            Some(("CAPABILITY".to_string(), "IMAP4rev1 IDLE"))
        );
        assert_eq!(response_code("SELECT completed"), None);
    }

    #[test]
    fn parse_list_line() {
        let name = parse_name(b"* LIST (\\HasNoChildren) \".\" \"INBOX.Sent\"\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(name.name(), "INBOX.Sent");
        assert_eq!(name.delimiter(), Some("."));
        assert!(name.has_attribute("\\hasnochildren"));
    }

    #[test]
    fn parse_status_line() {
        let st = parse_status(b"* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292)\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(st.messages, 231);
        assert_eq!(st.uid_next, Some(44292));
        assert_eq!(st.unseen, None);
    }

    #[test]
    fn myrights_takes_last_word() {
        assert_eq!(myrights(b"\"INBOX\" lrswipcda"), "lrswipcda");
        assert_eq!(myrights(b"INBOX rs"), "rs");
    }
}
