//! The header fetch pipeline.
//!
//! A `FETCH` response is tokenized and then folded through [`FetchState::step`], a pure
//! transition function, into a [`FetchItem`]. Items become [`HeaderRecord`]s once the response
//! is complete.

use std::io::{Read, Write};

use log::{debug, info};
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take},
    character::complete::{char, space0},
    combinator::{map, value},
    sequence::{delimited, preceded},
    IResult,
};

use crate::error::{Error, ParseError, Result};
use crate::parse::{number, untagged};
use crate::session::Session;
use crate::types::{
    parse_internal_date, Capability, Envelope, Flag, HeaderRecord, MessageFlags, Seq,
};

/// One lexical element of a `FETCH` response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token<'a> {
    /// `(`
    Open,
    /// `)`
    Close,
    /// An atom or number. Section specifiers such as `BODY[HEADER.FIELDS (DATE)]` are a single
    /// atom.
    Atom(String),
    /// A quoted string, unescaped.
    Quoted(Vec<u8>),
    /// The payload of a `{n}` literal.
    Literal(&'a [u8]),
    /// `NIL`
    Nil,
}

/// The attributes the pipeline extracts from a `FETCH` response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribute {
    /// `FLAGS`
    Flags,
    /// `INTERNALDATE`
    InternalDate,
    /// `RFC822.SIZE`
    Size,
    /// `BODY[HEADER.FIELDS (...)]` or `RFC822.HEADER`
    Header,
    /// Anything else; its value is skipped.
    Other,
}

impl Attribute {
    fn from_name(name: &str) -> Attribute {
        let name = name.to_ascii_uppercase();
        match name.as_str() {
            "FLAGS" => Attribute::Flags,
            "INTERNALDATE" => Attribute::InternalDate,
            "RFC822.SIZE" => Attribute::Size,
            n if n.starts_with("BODY[HEADER") || n.starts_with("RFC822.HEADER") => {
                Attribute::Header
            }
            _ => Attribute::Other,
        }
    }
}

/// The attribute values collected from one `FETCH` response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchItem {
    /// `FLAGS`, if the response carried them.
    pub flags: Option<Vec<Flag>>,
    /// `INTERNALDATE`, unparsed.
    pub internal_date: Option<String>,
    /// `RFC822.SIZE`
    pub size: Option<usize>,
    /// The raw header block.
    pub header: Option<Vec<u8>>,
}

impl FetchItem {
    /// Fold a later response for the same message into this one. Attributes `other` carries
    /// replace ours; the rest are kept.
    pub fn merge(&mut self, other: FetchItem) {
        if other.flags.is_some() {
            self.flags = other.flags;
        }
        if other.internal_date.is_some() {
            self.internal_date = other.internal_date;
        }
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.header.is_some() {
            self.header = other.header;
        }
    }

    /// Turn the collected values into a header record for the message at `index`.
    pub fn into_record(self, index: usize) -> HeaderRecord {
        let received = match self.internal_date.as_deref() {
            Some(d) => parse_internal_date(d).unwrap_or_else(|| {
                debug!("unparseable INTERNALDATE {:?}", d);
                0
            }),
            None => 0,
        };
        let flags = MessageFlags::from_flags(self.flags.iter().flatten());
        HeaderRecord {
            index,
            received,
            size: self.size.unwrap_or(0),
            envelope: self
                .header
                .as_deref()
                .map(Envelope::parse)
                .unwrap_or_default(),
            flags,
            server_flags: flags,
            changed: false,
        }
    }
}

/// Position of the parser within a `FETCH` attribute list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchState {
    /// Before the opening parenthesis of the attribute list.
    Start,
    /// Between attributes, expecting a name or the closing parenthesis.
    Attributes,
    /// After an attribute name, expecting its value.
    Value(Attribute),
    /// Inside the `FLAGS` list.
    Flags,
    /// Inside the field list of `RFC822.HEADER.LINES (...)`.
    HeaderFields,
    /// Inside a parenthesized value that is being skipped, at the given depth.
    Skip(usize),
    /// After the closing parenthesis.
    Done,
}

impl FetchState {
    /// Advance by one token, recording attribute values into `item`.
    pub fn step(
        self,
        token: Token<'_>,
        item: &mut FetchItem,
    ) -> std::result::Result<Self, ParseError> {
        use self::Attribute as A;
        use self::FetchState::*;

        let next = match (self, token) {
            (Start, Token::Open) => Attributes,
            (Attributes, Token::Close) => Done,
            (Attributes, Token::Atom(name)) => Value(Attribute::from_name(&name)),

            (Value(A::Flags), Token::Open) => {
                item.flags = Some(Vec::new());
                Flags
            }
            (Flags, Token::Atom(f)) => {
                item.flags.get_or_insert_with(Vec::new).push(Flag::from(f));
                Flags
            }
            (Flags, Token::Close) => Attributes,

            (Value(A::InternalDate), Token::Quoted(d)) => {
                item.internal_date = Some(String::from_utf8_lossy(&d).into_owned());
                Attributes
            }
            (Value(A::Size), Token::Atom(n)) => {
                let size = n
                    .parse()
                    .map_err(|_| ParseError::Fetch(format!("bad RFC822.SIZE {:?}", n)))?;
                item.size = Some(size);
                Attributes
            }
            (Value(A::Header), Token::Open) => HeaderFields,
            (HeaderFields, Token::Close) => Value(A::Header),
            (HeaderFields, Token::Atom(_)) | (HeaderFields, Token::Quoted(_)) => HeaderFields,
            (Value(A::Header), Token::Literal(b)) => {
                item.header = Some(b.to_vec());
                Attributes
            }
            (Value(A::Header), Token::Quoted(b)) => {
                item.header = Some(b);
                Attributes
            }
            (Value(A::Header), Token::Nil) => {
                item.header = Some(Vec::new());
                Attributes
            }
            (Value(_), Token::Nil) => Attributes,

            (Value(A::Other), Token::Open) => Skip(1),
            (Value(A::Other), Token::Close) => {
                return Err(ParseError::Fetch("attribute without a value".into()))
            }
            (Value(A::Other), _) => Attributes,
            (Skip(1), Token::Close) => Attributes,
            (Skip(d), Token::Close) => Skip(d - 1),
            (Skip(d), Token::Open) => Skip(d + 1),
            (Skip(d), _) => Skip(d),

            (state, token) => {
                return Err(ParseError::Fetch(format!(
                    "unexpected {:?} in state {:?}",
                    token, state
                )))
            }
        };
        Ok(next)
    }
}

fn is_atom_byte(c: u8) -> bool {
    !matches!(c, b' ' | b'(' | b')' | b'"' | b'{' | b'\r' | b'\n' | b'[')
}

/// An atom, where a `[...]` section may contain spaces and parentheses.
fn atom(i: &[u8]) -> IResult<&[u8], String> {
    let mut end = 0;
    while end < i.len() {
        match i[end] {
            b'[' => match i[end..].iter().position(|&c| c == b']') {
                Some(close) => end += close + 1,
                None => break,
            },
            c if is_atom_byte(c) => end += 1,
            _ => break,
        }
    }
    if end == 0 {
        return Err(nom::Err::Error(nom::error::Error::new(
            i,
            nom::error::ErrorKind::TakeWhile1,
        )));
    }
    Ok((&i[end..], String::from_utf8_lossy(&i[..end]).into_owned()))
}

fn quoted(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    delimited(
        char('"'),
        escaped_transform(
            is_not("\"\\"),
            '\\',
            alt((value(&b"\\"[..], tag("\\")), value(&b"\""[..], tag("\"")))),
        ),
        char('"'),
    )(i)
}

fn literal(i: &[u8]) -> IResult<&[u8], &[u8]> {
    let (i, n) = delimited(char('{'), number, tag("}\r\n"))(i)?;
    take(n)(i)
}

fn token(i: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        space0,
        alt((
            value(Token::Open, char('(')),
            value(Token::Close, char(')')),
            map(quoted, Token::Quoted),
            map(literal, Token::Literal),
            map(atom, |a| {
                if a.eq_ignore_ascii_case("NIL") {
                    Token::Nil
                } else {
                    Token::Atom(a)
                }
            }),
        )),
    )(i)
}

/// Parse a complete `* <n> FETCH (...)` line, literals included.
pub fn parse_fetch_line(raw: &[u8]) -> std::result::Result<(Seq, FetchItem), ParseError> {
    let bad = || ParseError::Fetch(String::from_utf8_lossy(raw).into_owned());
    let (_, u) = untagged(raw).map_err(|_| bad())?;
    let seq = match u.number {
        Some(n) if u.keyword == "FETCH" => n as Seq,
        _ => return Err(bad()),
    };

    let mut item = FetchItem::default();
    let mut state = FetchState::Start;
    let mut input = u.rest;
    while state != FetchState::Done {
        let (rest, tok) = token(input).map_err(|_| bad())?;
        state = state.step(tok, &mut item)?;
        input = rest;
    }
    Ok((seq, item))
}

impl<T: Read + Write> Session<T> {
    /// The `FETCH` attribute list used for header downloads.
    fn header_query(&self) -> String {
        let fields = self.config.header_fields.join(" ");
        if self.capabilities.has(Capability::Imap4rev1) {
            format!(
                "(FLAGS INTERNALDATE RFC822.SIZE BODY.PEEK[HEADER.FIELDS ({})])",
                fields
            )
        } else {
            format!("(FLAGS INTERNALDATE RFC822.SIZE RFC822.HEADER.LINES ({}))", fields)
        }
    }

    /// Download the headers of the messages with zero-based indices `first..=last` into the
    /// selected mailbox context, and return the new records.
    ///
    /// If the server announces more messages while the download is in flight, the range is
    /// widened to cover them. Expunges reported meanwhile are reconciled before returning, so
    /// the records returned may already have been renumbered in the context.
    pub fn fetch_headers(&mut self, first: usize, last: usize) -> Result<Vec<HeaderRecord>> {
        let fetched = self.download_headers(first, last)?;
        self.finish()?;
        Ok(fetched)
    }

    /// The download behind [`fetch_headers`](Self::fetch_headers), without applying what the
    /// server reported meanwhile.
    pub(crate) fn download_headers(
        &mut self,
        first: usize,
        mut last: usize,
    ) -> Result<Vec<HeaderRecord>> {
        if self.selected.is_none() {
            return Err(Error::NotSelected);
        }
        if first > last {
            return Ok(Vec::new());
        }
        let query = self.header_query();
        let mut fetched = Vec::new();
        let mut from = first;
        loop {
            let response = self.run(&format!("FETCH {}:{} {}", from + 1, last + 1, query))?;

            // a message may get several FETCH responses, e.g. a flag change next to the headers
            let mut batch: Vec<Option<FetchItem>> = vec![None; last + 1 - from];
            for line in &response.lines {
                let (seq, item) = match parse_fetch_line(&line.raw) {
                    Ok(parsed) => parsed,
                    Err(ParseError::Fetch(_)) if !line.is_fetch() => continue,
                    Err(e) => return Err(e.into()),
                };
                let index = match (seq as usize).checked_sub(1) {
                    Some(index) => index,
                    None => continue,
                };
                if index < from || index > last {
                    debug!("ignoring FETCH for message {} outside {}:{}", seq, from + 1, last + 1);
                    continue;
                }
                match &mut batch[index - from] {
                    Some(known) => known.merge(item),
                    slot => *slot = Some(item),
                }
            }
            for (offset, item) in batch.into_iter().enumerate() {
                let index = from + offset;
                match item {
                    Some(item) if item.header.is_some() => fetched.push(item.into_record(index)),
                    _ => {
                        return Err(ParseError::Fetch(format!(
                            "no headers for message {}",
                            index + 1
                        ))
                        .into())
                    }
                }
            }

            // EXISTS seen while fetching
            match self.pending.exists {
                Some(n) if n > last + 1 => {
                    self.pending.exists = None;
                    from = last + 1;
                    last = n - 1;
                    debug!("widening header fetch to {}", n);
                }
                _ => break,
            }
        }

        let selected = self.selected.as_mut().ok_or(Error::NotSelected)?;
        let ctx = &mut selected.context;
        ctx.headers.truncate(first);
        ctx.headers.extend(fetched.iter().cloned());
        ctx.update_counts();
        selected.exists = ctx.headers.len();
        info!("fetched {} headers of {}", fetched.len(), selected.name);
        Ok(fetched)
    }
}
