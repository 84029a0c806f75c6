use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Instant;

use bufstream::BufStream;
use log::{debug, info, warn};

use crate::cache::BodyCache;
use crate::command::Tag;
use crate::config::Config;
use crate::credentials::CredentialSource;
use crate::error::{Error, ParseError, Result};
use crate::parse;
use crate::types::{
    Capabilities, Capability, CheckStatus, Flag, MailboxContext, MailboxStatus, Name, Rights,
};
use crate::utils::{sequence_set, validate_str};

/// Where a [`Session`] is in the protocol.
///
/// ```text
/// Disconnected --connect--> Connected --LOGIN--> Authenticated --SELECT--> Selected
/// ```
///
/// A fatal error or `BYE` moves any state to `Disconnected`; closing a mailbox moves `Selected`
/// back to `Authenticated`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// The connection is gone; every command fails with [`Error::ConnectionLost`].
    Disconnected,
    /// Connected and greeted, not yet logged in.
    Connected,
    /// Logged in, no mailbox selected.
    Authenticated,
    /// A mailbox is selected.
    Selected,
}

/// Server-driven changes observed but not yet applied to the mailbox context.
#[derive(Debug, Default)]
pub(crate) struct Pending {
    /// The latest `EXISTS` count above the number of known messages.
    pub(crate) exists: Option<usize>,
    /// An `EXPUNGE` was seen.
    pub(crate) expunge: bool,
}

/// The selected mailbox.
#[derive(Debug)]
pub(crate) struct Selected {
    pub(crate) name: String,
    pub(crate) context: MailboxContext,
    /// Message count as last accepted from the server.
    pub(crate) exists: usize,
    pub(crate) cache: BodyCache,
    pub(crate) cursor: Option<usize>,
}

/// An IMAP session over a single connection.
///
/// The session owns its connection, its tag counter and at most one selected mailbox. Every
/// command is synchronous: it returns once the server's tagged completion has been read, and
/// any new mail or expunges announced along the way have already been folded into the
/// [`MailboxContext`].
pub struct Session<T: Read + Write> {
    pub(crate) stream: BufStream<T>,
    pub(crate) tag: Tag,
    pub(crate) state: SessionState,
    pub(crate) capabilities: Capabilities,
    pub(crate) delimiter: Option<char>,
    pub(crate) rights: Rights,
    pub(crate) config: Config,
    pub(crate) pending: Pending,
    pub(crate) reopen_allowed: bool,
    pub(crate) selected: Option<Selected>,
    pub(crate) logging_out: bool,
    last_check: Option<Instant>,

    /// Enable debug mode for this session, which echoes every line sent and received to stderr.
    pub debug: bool,
}

impl Session<TcpStream> {
    /// Open a plain TCP connection and read the server greeting.
    ///
    /// Use [`ClientBuilder`](crate::ClientBuilder) for TLS.
    pub fn connect(host: &str, port: u16) -> Result<Session<TcpStream>> {
        let tcp = TcpStream::connect((host, port))?;
        let mut session = Session::new(tcp);
        session.read_greeting()?;
        Ok(session)
    }
}

impl<T: Read + Write> Session<T> {
    /// Creates a new session over an already connected stream.
    ///
    /// The greeting has not been consumed yet; call [`read_greeting`](Self::read_greeting)
    /// before anything else unless the caller has done so already.
    pub fn new(stream: T) -> Session<T> {
        Session {
            stream: BufStream::new(stream),
            tag: Tag::default(),
            state: SessionState::Connected,
            capabilities: Capabilities::default(),
            delimiter: None,
            rights: Rights::default(),
            config: Config::default(),
            pending: Pending::default(),
            reopen_allowed: true,
            selected: None,
            logging_out: false,
            last_check: None,
            debug: false,
        }
    }

    /// Replace the session configuration.
    pub fn with_config(mut self, config: Config) -> Session<T> {
        self.config = config;
        self
    }

    /// The session configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current protocol state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The capabilities most recently advertised by the server.
    pub fn server_capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The hierarchy delimiter, once learned from a `LIST` response.
    pub fn delimiter(&self) -> Option<char> {
        self.delimiter
    }

    /// Rights held on the selected mailbox.
    pub fn rights(&self) -> &Rights {
        &self.rights
    }

    /// Name of the selected mailbox.
    pub fn selected_mailbox(&self) -> Option<&str> {
        self.selected.as_ref().map(|s| s.name.as_str())
    }

    /// The selected mailbox.
    pub fn context(&self) -> Option<&MailboxContext> {
        self.selected.as_ref().map(|s| &s.context)
    }

    /// The index of the message the caller is displaying, kept up to date across
    /// reconciliation. `None` if it was expunged.
    pub fn cursor(&self) -> Option<usize> {
        self.selected.as_ref().and_then(|s| s.cursor)
    }

    /// Record which message the caller is displaying.
    pub fn set_cursor(&mut self, index: Option<usize>) {
        if let Some(s) = self.selected.as_mut() {
            s.cursor = index;
        }
    }

    /// Allow or defer updates of the selected mailbox.
    ///
    /// While disallowed, new mail and expunges reported by the server are only remembered. The
    /// first command to complete after they are allowed again applies them.
    pub fn allow_reopen(&mut self, allow: bool) {
        self.reopen_allowed = allow;
    }

    /// Take back the underlying stream, for example to start TLS after `STARTTLS`.
    pub fn into_inner(self) -> Result<T> {
        Ok(self.stream.into_inner()?)
    }

    /// Read the server greeting.
    ///
    /// `* OK` leaves the session `Connected`, `* PREAUTH` makes it `Authenticated`. A
    /// `[CAPABILITY ...]` code in the greeting is taken as the capability list.
    pub fn read_greeting(&mut self) -> Result<()> {
        let line = self.read_line(None);
        let line = self.check(line)?;
        self.log_response(&line.raw);

        let result = match parse::untagged(&line.raw) {
            Ok((_, greeting)) => {
                let text = greeting.text();
                match greeting.keyword.as_str() {
                    "OK" => {
                        self.absorb_response_code(&text);
                        self.state = SessionState::Connected;
                        Ok(())
                    }
                    "PREAUTH" => {
                        self.absorb_response_code(&text);
                        self.state = SessionState::Authenticated;
                        Ok(())
                    }
                    "BYE" => Err(Error::Bye(text)),
                    _ => Err(ParseError::Invalid(line.raw.clone()).into()),
                }
            }
            Err(_) => Err(ParseError::Invalid(line.raw.clone()).into()),
        };
        debug!("greeting read, now {:?}", self.state);
        self.check(result)
    }

    pub(crate) fn absorb_response_code(&mut self, text: &str) {
        if let Some((code, args)) = parse::response_code(text) {
            if code == "CAPABILITY" {
                self.capabilities = Capabilities::from_atoms(args.split_whitespace());
            }
        }
    }

    /// The `CAPABILITY` command requests a listing of capabilities that the server supports.
    pub fn capabilities(&mut self) -> Result<&Capabilities> {
        self.execute("CAPABILITY")?;
        Ok(&self.capabilities)
    }

    /// Log in with a user name and password.
    ///
    /// Fails with [`Error::LoginDisabled`] without sending anything if the server advertised
    /// `LOGINDISABLED`.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.capabilities.has(Capability::LoginDisabled) {
            return Err(Error::LoginDisabled);
        }
        let response = self.execute(&format!(
            "LOGIN {} {}",
            validate_str(username)?,
            validate_str(password)?
        ))?;
        self.absorb_response_code(&response.text);
        self.state = SessionState::Authenticated;
        debug!("logged in as {}", username);
        Ok(())
    }

    /// Authenticate, asking `source` for credentials.
    ///
    /// Capabilities are discovered first if the greeting did not carry them. A `NO` from the
    /// server asks `source` again, up to [`Config::max_login_attempts`] times; any other error
    /// ends authentication immediately.
    pub fn authenticate<C>(&mut self, source: &mut C) -> Result<()>
    where
        C: CredentialSource + ?Sized,
    {
        match self.state {
            SessionState::Disconnected => return Err(Error::ConnectionLost),
            SessionState::Authenticated | SessionState::Selected => return Ok(()),
            SessionState::Connected => {}
        }
        if self.capabilities.is_empty() {
            self.capabilities()?;
        }
        if self.capabilities.has(Capability::LoginDisabled) {
            return Err(Error::LoginDisabled);
        }

        let mut rejection: Option<String> = None;
        for attempt in 1..=self.config.max_login_attempts {
            let creds = source.credentials(rejection.as_deref())?;
            match self.login(&creds.user, &creds.password) {
                Ok(()) => return Ok(()),
                Err(Error::No(text)) => {
                    warn!("login attempt {} rejected: {}", attempt, text);
                    rejection = Some(text);
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::No(rejection.unwrap_or_default()))
    }

    /// Select a mailbox and download its headers.
    ///
    /// Any previously selected mailbox is discarded first. Rights on the new mailbox come from
    /// `MYRIGHTS` when the server supports ACLs, otherwise every right is assumed.
    pub fn select(&mut self, mailbox: &str) -> Result<&MailboxContext> {
        self.open_mailbox("SELECT", mailbox, false)
    }

    /// Like [`select`](Self::select), but the mailbox is opened read-only.
    pub fn examine(&mut self, mailbox: &str) -> Result<&MailboxContext> {
        self.open_mailbox("EXAMINE", mailbox, true)
    }

    fn open_mailbox(
        &mut self,
        verb: &str,
        mailbox: &str,
        read_only: bool,
    ) -> Result<&MailboxContext> {
        let quoted = validate_str(mailbox)?;
        self.fastclose_mailbox();

        let response = self.run(&format!("{} {}", verb, quoted))?;
        let exists = self.pending.exists.take().unwrap_or(0);
        let read_only = read_only
            || matches!(parse::response_code(&response.text), Some((code, _)) if code == "READ-ONLY");

        self.state = SessionState::Selected;
        self.selected = Some(Selected {
            name: mailbox.to_string(),
            context: MailboxContext::new(read_only),
            exists,
            cache: BodyCache::new(self.config.temp_dir.clone()),
            cursor: None,
        });
        info!(
            "selected {} with {} messages{}",
            mailbox,
            exists,
            if read_only { " (read-only)" } else { "" }
        );

        if self.capabilities.has(Capability::Acl) {
            self.rights = Rights::default();
            if let Err(e) = self.run(&format!("MYRIGHTS {}", quoted)) {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("MYRIGHTS failed, assuming full rights: {}", e);
                self.rights = Rights::all();
            }
        } else {
            self.rights = Rights::all();
        }

        if exists > 0 {
            if let Err(e) = self.download_headers(0, exists - 1) {
                self.fastclose_mailbox();
                return Err(e);
            }
        }
        self.finish()?;
        self.context().ok_or(Error::NotSelected)
    }

    /// Close the selected mailbox with `CLOSE`, which expunges deleted messages on the server.
    pub fn close_mailbox(&mut self) -> Result<()> {
        if self.selected.is_none() {
            return Err(Error::NotSelected);
        }
        let result = self.run("CLOSE");
        self.fastclose_mailbox();
        result.map(|_| ())
    }

    /// Forget the selected mailbox without telling the server.
    pub fn fastclose_mailbox(&mut self) {
        if let Some(s) = self.selected.take() {
            debug!("closing {}", s.name);
        }
        if self.state == SessionState::Selected {
            self.state = SessionState::Authenticated;
        }
        self.pending = Pending::default();
    }

    /// Log out and drop the connection state.
    ///
    /// The server's `BYE` is expected here and is not an error, nor is the server hanging up
    /// before the tagged completion.
    pub fn logout(&mut self) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }
        self.logging_out = true;
        let result = self.run("LOGOUT");
        self.logging_out = false;
        self.teardown(&Error::ConnectionLost);
        match result {
            Ok(_) => Ok(()),
            Err(e @ Error::Io(_)) | Err(e @ Error::ConnectionLost) => {
                debug!("connection closed during LOGOUT: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Noop always succeeds, and it does nothing. New mail and expunges reported in reply are
    /// applied to the selected mailbox.
    pub fn noop(&mut self) -> Result<()> {
        self.execute("NOOP").map(|_| ())
    }

    /// Poll the selected mailbox for changes.
    ///
    /// A `NOOP` is sent at most once per [`Config::check_interval`]; changes that are already
    /// pending are applied either way.
    pub fn check_mailbox(&mut self) -> Result<CheckStatus> {
        if self.selected.is_none() {
            return Err(Error::NotSelected);
        }
        let due = match (self.config.check_interval, self.last_check) {
            (Some(interval), Some(last)) => last.elapsed() >= interval,
            _ => true,
        };
        if due {
            self.last_check = Some(Instant::now());
            self.run("NOOP")?;
        }
        self.finish()
    }

    /// The `LIST` command returns a subset of names from the complete set of all names available
    /// to the client.
    ///
    /// The first reply also fixes the session's hierarchy delimiter.
    pub fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<Name>> {
        let response = self.execute(&format!(
            "LIST {} {}",
            validate_str(reference)?,
            validate_str(pattern)?
        ))?;
        let mut names = Vec::new();
        for line in &response.lines {
            if let Some(name) = parse::parse_name(&line.raw)? {
                names.push(name);
            }
        }
        if self.delimiter.is_none() {
            self.delimiter = names
                .iter()
                .find_map(|n| n.delimiter())
                .and_then(|d| d.chars().next());
        }
        Ok(names)
    }

    /// The `STATUS` command requests the status of the indicated mailbox without selecting it.
    pub fn status(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        let response = self.execute(&format!(
            "STATUS {} (MESSAGES RECENT UNSEEN UIDNEXT UIDVALIDITY)",
            validate_str(mailbox)?
        ))?;
        for line in &response.lines {
            if let Some(status) = parse::parse_status(&line.raw)? {
                return Ok(status);
            }
        }
        Err(ParseError::Data(response.text.into_bytes()).into())
    }

    /// Create a mailbox.
    pub fn create(&mut self, mailbox: &str) -> Result<()> {
        self.execute(&format!("CREATE {}", validate_str(mailbox)?))
            .map(|_| ())
    }

    /// Delete a mailbox.
    pub fn delete(&mut self, mailbox: &str) -> Result<()> {
        self.execute(&format!("DELETE {}", validate_str(mailbox)?))
            .map(|_| ())
    }

    /// Rename a mailbox.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.execute(&format!(
            "RENAME {} {}",
            validate_str(from)?,
            validate_str(to)?
        ))
        .map(|_| ())
    }

    /// Add a mailbox to the subscription list.
    pub fn subscribe(&mut self, mailbox: &str) -> Result<()> {
        self.execute(&format!("SUBSCRIBE {}", validate_str(mailbox)?))
            .map(|_| ())
    }

    /// Remove a mailbox from the subscription list.
    pub fn unsubscribe(&mut self, mailbox: &str) -> Result<()> {
        self.execute(&format!("UNSUBSCRIBE {}", validate_str(mailbox)?))
            .map(|_| ())
    }

    /// Append a message to a mailbox.
    ///
    /// The message is sent as a literal once the server asks for it; if the server answers the
    /// command without a continuation request the result is [`Error::Append`].
    pub fn append(&mut self, mailbox: &str, content: &[u8]) -> Result<()> {
        let command = format!("APPEND {} {{{}}}", validate_str(mailbox)?, content.len());
        self.ensure_connected()?;
        let tag = self.tag.next();
        let result = self.append_literal(&tag, &command, content);
        let result = self.check(result);
        if self.state != SessionState::Disconnected {
            self.finish()?;
        }
        result
    }

    fn append_literal(&mut self, tag: &str, command: &str, content: &[u8]) -> Result<()> {
        self.write_command(tag, command)?;
        match self.read_until(tag, None, true) {
            Ok(None) => {}
            Ok(Some(_)) => return Err(Error::Append),
            Err(e) => return Err(e),
        }
        self.stream.write_all(content)?;
        self.stream.write_all(b"\r\n")?;
        self.stream.flush()?;
        self.read_until(tag, None, false).map(|_| ())
    }

    /// Make sure `mailbox` exists before appending to it, creating it if allowed.
    pub fn open_append(&mut self, mailbox: &str, create_missing: bool) -> Result<()> {
        match self.status(mailbox) {
            Ok(_) => Ok(()),
            Err(Error::No(text)) if create_missing => {
                debug!("{} does not exist ({}), creating it", mailbox, text);
                self.create(mailbox)
            }
            Err(e) => Err(e),
        }
    }

    /// Copy messages to another mailbox, optionally marking the originals `\Deleted` locally.
    pub fn copy(&mut self, indices: &[usize], mailbox: &str, delete_originals: bool) -> Result<()> {
        let ctx = self.context().ok_or(Error::NotSelected)?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= ctx.len()) {
            return Err(Error::NoSuchMessage(bad));
        }
        let quoted = validate_str(mailbox)?;
        let result = self.run(&format!("COPY {} {}", sequence_set(indices), quoted));
        if result.is_ok() && delete_originals {
            for &i in indices {
                self.set_flag(i, Flag::Deleted, true)?;
            }
        }
        if self.state != SessionState::Disconnected {
            self.finish()?;
        }
        result.map(|_| ())
    }
}
