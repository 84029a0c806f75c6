//! The command/response engine.
//!
//! Every command goes through [`Session::run`]: a fresh tag is written with the command, then
//! lines are read until the line carrying that tag. Untagged lines pass through the
//! unsolicited-response dispatcher first; whatever it does not consume is handed back to the
//! caller. [`Session::execute`] additionally brings the selected mailbox up to date afterwards.

use std::borrow::Cow;
use std::io::{self, BufRead, ErrorKind, Read, Write};

use log::{debug, info, trace, warn};

use crate::error::{Error, ParseError, Result};
use crate::parse::{self, LineKind, Status, Untagged};
use crate::session::{Pending, Session, SessionState};
use crate::types::CheckStatus;

const TAG_PREFIX: &str = "a";
const TAG_MODULUS: u16 = 10_000;

/// Generator of command tags `a0000` through `a9999`, wrapping around.
#[derive(Clone, Debug, Default)]
pub(crate) struct Tag(u16);

impl Tag {
    pub(crate) fn next(&mut self) -> String {
        let tag = format!("{}{:04}", TAG_PREFIX, self.0);
        self.0 = (self.0 + 1) % TAG_MODULUS;
        tag
    }
}

/// One complete response line, including the bytes of any literals it carries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Line {
    pub(crate) raw: Vec<u8>,
    /// Literal bytes that were written to a sink instead of `raw`.
    pub(crate) streamed: usize,
}

impl Line {
    pub(crate) fn untagged(&self) -> Option<Untagged<'_>> {
        parse::untagged(&self.raw).ok().map(|(_, u)| u)
    }

    pub(crate) fn is_fetch(&self) -> bool {
        self.untagged().map_or(false, |u| u.keyword == "FETCH")
    }
}

/// The outcome of a successful command.
#[derive(Clone, Debug, Default)]
pub struct Response {
    pub(crate) lines: Vec<Line>,
    pub(crate) text: String,
}

impl Response {
    /// Untagged data lines that were not consumed by the unsolicited-response dispatcher.
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.lines.iter().map(|l| &l.raw[..])
    }

    /// Text of the tagged `OK`, response code included.
    pub fn text(&self) -> &str {
        &self.text
    }
}

fn redact(command: &str) -> Cow<'_, str> {
    match command.get(..6) {
        Some(verb) if verb.eq_ignore_ascii_case("LOGIN ") => Cow::Borrowed("LOGIN <redacted>"),
        _ => Cow::Borrowed(command),
    }
}

impl<T: Read + Write> Session<T> {
    /// Run a command, then apply any new mail or expunge it revealed to the selected mailbox.
    ///
    /// A tagged `NO` or `BAD` is returned as [`Error::No`]/[`Error::Bad`] and leaves the session
    /// usable. Fatal errors tear the session down before they are returned.
    pub fn execute(&mut self, command: &str) -> Result<Response> {
        let result = self.run(command);
        if self.state != SessionState::Disconnected {
            self.finish()?;
        }
        result
    }

    /// Run a command without applying mailbox updates afterwards.
    pub(crate) fn run(&mut self, command: &str) -> Result<Response> {
        self.run_with_sink(command, None)
    }

    /// Run a command, writing the payload of literals in its response to `sink`.
    pub(crate) fn run_with_sink(
        &mut self,
        command: &str,
        sink: Option<&mut dyn Write>,
    ) -> Result<Response> {
        self.ensure_connected()?;
        let tag = self.tag.next();
        let result = self
            .write_command(&tag, command)
            .and_then(|_| self.read_until(&tag, sink, false))
            .and_then(|r| r.ok_or_else(|| ParseError::Framing(b"+".to_vec()).into()));
        self.check(result)
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Err(Error::ConnectionLost);
        }
        Ok(())
    }

    /// Tear the session down if `result` carries a fatal error.
    pub(crate) fn check<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(ref e) = result {
            if e.is_fatal() {
                self.teardown(e);
            }
        }
        result
    }

    pub(crate) fn teardown(&mut self, reason: &Error) {
        if self.state != SessionState::Disconnected {
            if self.logging_out {
                debug!("session closed");
            } else {
                warn!("session lost: {}", reason);
            }
        }
        self.state = SessionState::Disconnected;
        self.selected = None;
        self.pending = Pending::default();
    }

    pub(crate) fn write_command(&mut self, tag: &str, command: &str) -> Result<()> {
        let shown = redact(command);
        trace!("C: {} {}", tag, shown);
        if self.debug {
            eprintln!("C: {} {}", tag, shown);
        }
        self.stream.write_all(tag.as_bytes())?;
        self.stream.write_all(b" ")?;
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(b"\r\n")?;
        self.stream.flush()?;
        Ok(())
    }

    pub(crate) fn log_response(&self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        trace!("S: {}", text.trim_end());
        if self.debug {
            eprint!("S: {}", text);
        }
    }

    /// Read response lines up to the completion of `tag`.
    ///
    /// With `continuation` set, a `+` line ends the read early and `Ok(None)` is returned.
    pub(crate) fn read_until(
        &mut self,
        tag: &str,
        mut sink: Option<&mut dyn Write>,
        continuation: bool,
    ) -> Result<Option<Response>> {
        enum Next {
            Keep,
            Skip,
            Continue,
            Done(Status, String),
        }

        let mut lines = Vec::new();
        loop {
            let line = match self.read_line(sink.as_deref_mut().map(|s| s as &mut dyn Write)) {
                Err(Error::Parse(ParseError::LiteralCount(count))) => {
                    self.drain(tag)?;
                    return Err(ParseError::LiteralCount(count).into());
                }
                r => r?,
            };
            self.log_response(&line.raw);

            let next = match parse::classify(&line.raw, tag)? {
                LineKind::Untagged(u) => {
                    if self.handle_unsolicited(&u)? {
                        Next::Skip
                    } else {
                        Next::Keep
                    }
                }
                LineKind::Continuation => Next::Continue,
                LineKind::Tagged(status, text) => Next::Done(status, text),
            };
            match next {
                Next::Keep => lines.push(line),
                Next::Skip => {}
                Next::Continue if continuation => return Ok(None),
                Next::Continue => return Err(ParseError::Framing(line.raw).into()),
                Next::Done(Status::Ok, text) => return Ok(Some(Response { lines, text })),
                Next::Done(Status::No, text) => return Err(Error::No(text)),
                Next::Done(Status::Bad, text) => return Err(Error::Bad(text)),
            }
        }
    }

    /// Skip everything up to and including the completion of `tag`.
    fn drain(&mut self, tag: &str) -> Result<()> {
        debug!("draining response to {}", tag);
        loop {
            let mut raw = Vec::new();
            self.read_segment(&mut raw)?;
            self.log_response(&raw);
            if raw.starts_with(tag.as_bytes()) && raw.get(tag.len()) == Some(&b' ') {
                return Ok(());
            }
        }
    }

    /// Read one CRLF-terminated segment, refusing to buffer more than the configured maximum.
    fn read_segment(&mut self, into: &mut Vec<u8>) -> Result<()> {
        let limit = self.config.max_line_length;
        let read = (&mut self.stream)
            .take(limit as u64 + 1)
            .read_until(b'\n', into)?;
        if read == 0 {
            return Err(Error::ConnectionLost);
        }
        if !into.ends_with(b"\n") {
            if read > limit {
                return Err(ParseError::LineTooLong(limit).into());
            }
            return Err(Error::ConnectionLost);
        }
        Ok(())
    }

    /// Read exactly `len` literal bytes into `out`.
    fn read_literal(&mut self, len: usize, out: &mut dyn Write) -> Result<()> {
        let mut buf = [0u8; 8192];
        let mut received = 0;
        while received < len {
            let want = buf.len().min(len - received);
            match self.stream.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    out.write_all(&buf[..n])?;
                    received += n;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if is_truncation(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }
        if received < len {
            return Err(ParseError::ShortLiteral {
                expected: len,
                received,
            }
            .into());
        }
        Ok(())
    }

    /// Read a complete response line, following `{n}` literals.
    pub(crate) fn read_line(&mut self, mut sink: Option<&mut dyn Write>) -> Result<Line> {
        let mut line = Line::default();
        self.read_segment(&mut line.raw)?;
        if !parse::may_carry_literal(&line.raw) {
            return Ok(line);
        }
        let mut start = 0;
        loop {
            let len = match parse::literal_len(&line.raw[start..]) {
                None => return Ok(line),
                Some(Ok(len)) => len,
                Some(Err(count)) => return Err(ParseError::LiteralCount(count).into()),
            };
            match sink.as_deref_mut() {
                Some(out) => {
                    self.read_literal(len, out)?;
                    line.streamed += len;
                }
                None => self.read_literal(len, &mut line.raw)?,
            }
            start = line.raw.len();
            self.read_segment(&mut line.raw)?;
        }
    }

    /// Apply pending new mail and expunges to the selected mailbox.
    ///
    /// Expunges force a full reconciliation; otherwise the headers of new messages are
    /// fetched. Nothing happens while reopen is disallowed.
    pub(crate) fn finish(&mut self) -> Result<CheckStatus> {
        let mut status = CheckStatus::Unchanged;
        while self.state == SessionState::Selected && self.reopen_allowed {
            if self.pending.expunge {
                let hint = self.cursor();
                let remapped = self.reopen(hint)?;
                self.set_cursor(remapped);
                status = CheckStatus::Reopened;
                continue;
            }
            let known = self.context().map_or(0, |c| c.len());
            match self.pending.exists.take() {
                Some(n) if n > known => {
                    self.download_headers(known, n - 1)?;
                    info!("{} new messages", n - known);
                    if status == CheckStatus::Unchanged {
                        status = CheckStatus::NewMail;
                    }
                }
                _ => break,
            }
        }
        Ok(status)
    }
}

fn is_truncation(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::UnexpectedEof | ErrorKind::TimedOut | ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_stream::MockStream;
    use crate::session::tests::{header_fetch, selected, subjects};

    #[test]
    fn tags_increase_and_wrap() {
        let mut tag = Tag::default();
        let mut prev = tag.next();
        assert_eq!(prev, "a0000");
        for _ in 1..10_000 {
            let t = tag.next();
            assert!(t > prev);
            prev = t;
        }
        assert_eq!(prev, "a9999");
        assert_eq!(tag.next(), "a0000");
    }

    #[test]
    fn redacts_login() {
        assert_eq!(redact("LOGIN \"fred\" \"secret\""), "LOGIN <redacted>");
        assert_eq!(redact("login fred secret"), "LOGIN <redacted>");
        assert_eq!(redact("LIST \"\" *"), "LIST \"\" *");
    }

    #[test]
    fn readline_delay_read() {
        let greeting = "* OK Dovecot ready.\r\n";
        let mock_stream = MockStream::new(greeting.as_bytes().to_vec()).with_delay(5);
        let mut session = Session::new(mock_stream);
        let line = session.read_line(None).unwrap();
        assert_eq!(String::from_utf8(line.raw).unwrap(), greeting);
    }

    #[test]
    fn readline_eof() {
        let mut session = Session::new(MockStream::default().with_eof());
        match session.read_line(None) {
            Err(Error::ConnectionLost) => {}
            r => panic!("unexpected {:?}", r),
        }
    }

    #[test]
    fn readline_err() {
        let mut session = Session::new(MockStream::default().with_err());
        assert!(matches!(session.read_line(None), Err(Error::Io(_))));
    }

    #[test]
    fn line_too_long_is_fatal() {
        let long = format!("* OK {}\r\na0000 OK\r\n", "x".repeat(100));
        let mut session = Session::new(MockStream::new(long.into_bytes())).with_config(
            crate::Config {
                max_line_length: 64,
                ..Default::default()
            },
        );
        match session.noop() {
            Err(Error::Parse(ParseError::LineTooLong(64))) => {}
            r => panic!("unexpected {:?}", r),
        }
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(session.noop(), Err(Error::ConnectionLost)));
    }

    #[test]
    fn literal_is_read_verbatim() {
        let mut session = Session::new(MockStream::new(
            b"* 1 FETCH (RFC822 {12}\r\na)\r\nb\r\n{3}\r\n)\r\n".to_vec(),
        ));
        let line = session.read_line(None).unwrap();
        assert_eq!(line.raw, b"* 1 FETCH (RFC822 {12}\r\na)\r\nb\r\n{3}\r\n)\r\n");
    }

    #[test]
    fn literal_into_sink() {
        let mut session = Session::new(MockStream::new(
            b"* 1 FETCH (RFC822 {5}\r\nhello FLAGS (\\Seen))\r\n".to_vec(),
        ));
        let mut body = Vec::new();
        let line = session.read_line(Some(&mut body)).unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(line.streamed, 5);
        assert_eq!(line.raw, b"* 1 FETCH (RFC822 {5}\r\n FLAGS (\\Seen))\r\n");
    }

    #[test]
    fn short_literal_is_recoverable() {
        let mut session = Session::new(MockStream::new(
            b"* 1 FETCH (RFC822 {13}\r\n0123456789".to_vec(),
        ));
        match session.run("FETCH 1 RFC822") {
            Err(Error::Parse(ParseError::ShortLiteral {
                expected: 13,
                received: 10,
            })) => {}
            r => panic!("unexpected {:?}", r),
        }
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn bad_literal_count_drains_to_completion() {
        let mut session = Session::new(MockStream::new(
            b"* 1 FETCH (RFC822 {1x}\r\nstuff)\r\na0000 OK done\r\na0001 OK NOOP\r\n".to_vec(),
        ));
        match session.run("FETCH 1 RFC822") {
            Err(Error::Parse(ParseError::LiteralCount(c))) => assert_eq!(c, "1x"),
            r => panic!("unexpected {:?}", r),
        }
        session.noop().unwrap();
        assert_eq!(session.stream.get_ref().written(), "a0000 FETCH 1 RFC822\r\na0001 NOOP\r\n");
    }

    #[test]
    fn no_and_bad_are_recoverable() {
        let mut session = Session::new(MockStream::new(
            b"a0000 NO [ALERT] over quota\r\na0001 BAD unknown command\r\na0002 OK\r\n".to_vec(),
        ));
        match session.execute("NOOP") {
            Err(Error::No(text)) => assert_eq!(text, "[ALERT] over quota"),
            r => panic!("unexpected {:?}", r),
        }
        assert!(matches!(session.execute("FROB"), Err(Error::Bad(_))));
        session.noop().unwrap();
    }

    #[test]
    fn foreign_tag_is_fatal() {
        let mut session = selected(&["A"], "a0009 OK what\r\n");
        match session.noop() {
            Err(Error::Parse(ParseError::Framing(_))) => {}
            r => panic!("unexpected {:?}", r),
        }
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.context().is_none());
    }

    #[test]
    fn unexpected_continuation_is_fatal() {
        let mut session = Session::new(MockStream::new(b"+ more\r\n".to_vec()));
        assert!(matches!(
            session.noop(),
            Err(Error::Parse(ParseError::Framing(_)))
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn unknown_untagged_is_skipped() {
        let mut session = Session::new(MockStream::new(
            b"* XFROBNICATE 1 2 3\r\n* FLAGS (\\Seen)\r\na0000 OK\r\n".to_vec(),
        ));
        let response = session.execute("NOOP").unwrap();
        let lines: Vec<&[u8]> = response.lines().collect();
        assert_eq!(lines, vec![&b"* FLAGS (\\Seen)\r\n"[..]]);
    }

    #[test]
    fn new_mail_during_noop() {
        let rest = format!(
            "* 4 EXISTS\r\na0002 OK NOOP completed\r\n{}a0003 OK FETCH completed\r\n",
            header_fetch(4, "\\Recent", "D")
        );
        let mut session = selected(&["A", "B", "C"], &rest);
        session.noop().unwrap();
        assert_eq!(subjects(&session), vec!["A", "B", "C", "D"]);
        let ctx = session.context().unwrap();
        assert_eq!(ctx.new_mail_count(), 4);
        assert_eq!(ctx.new_messages(), 1);
        assert!(session
            .stream
            .get_ref()
            .written()
            .ends_with("a0002 NOOP\r\na0003 FETCH 4:4 (FLAGS INTERNALDATE RFC822.SIZE RFC822.HEADER.LINES (DATE FROM TO CC SUBJECT MESSAGE-ID IN-REPLY-TO REFERENCES))\r\n"));
    }

    #[test]
    fn fetch_widens_on_exists() {
        let rest = format!(
            "* 4 EXISTS\r\na0002 OK NOOP completed\r\n\
             {}* 5 EXISTS\r\na0003 OK FETCH completed\r\n\
             {}a0004 OK FETCH completed\r\n",
            header_fetch(4, "", "D"),
            header_fetch(5, "", "E")
        );
        let mut session = selected(&["A", "B", "C"], &rest);
        session.noop().unwrap();
        assert_eq!(subjects(&session), vec!["A", "B", "C", "D", "E"]);
        assert!(session.stream.get_ref().written().contains("a0004 FETCH 5:5 "));
    }

    #[test]
    fn superfluous_exists_is_ignored() {
        let mut session = selected(&["A", "B"], "* 2 EXISTS\r\na0002 OK\r\n");
        session.noop().unwrap();
        assert_eq!(session.context().unwrap().len(), 2);
        assert!(session.stream.get_ref().written().ends_with("a0002 NOOP\r\n"));
    }

    #[test]
    fn shrinking_exists_is_desync() {
        let mut session = selected(&["A", "B", "C"], "* 2 EXISTS\r\na0002 OK\r\n");
        match session.noop() {
            Err(Error::Desync {
                known: 3,
                reported: 2,
            }) => {}
            r => panic!("unexpected {:?}", r),
        }
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.context().is_none());
    }

    #[test]
    fn bye_tears_down() {
        let mut session = selected(&["A"], "* BYE Autologout; idle for too long\r\n");
        match session.noop() {
            Err(Error::Bye(text)) => assert_eq!(text, "Autologout; idle for too long"),
            r => panic!("unexpected {:?}", r),
        }
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(session.noop(), Err(Error::ConnectionLost)));
    }

    #[test]
    fn deferred_new_mail() {
        let rest = format!(
            "* 2 EXISTS\r\na0002 OK\r\na0003 OK\r\n{}a0004 OK\r\n",
            header_fetch(2, "", "B")
        );
        let mut session = selected(&["A"], &rest);
        session.allow_reopen(false);
        session.noop().unwrap();
        assert_eq!(session.context().unwrap().len(), 1);
        session.allow_reopen(true);
        session.noop().unwrap();
        assert_eq!(subjects(&session), vec!["A", "B"]);
    }
}
