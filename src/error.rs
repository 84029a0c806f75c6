//! IMAP error types.

use std::io::Error as IoError;
use std::result;

#[cfg(feature = "native-tls")]
use native_tls::Error as TlsError;
#[cfg(feature = "native-tls")]
use native_tls::HandshakeError as TlsHandshakeError;
use std::error::Error as StdError;
#[cfg(feature = "native-tls")]
use std::net::TcpStream;

use bufstream::IntoInnerError as BufError;
use thiserror::Error;

/// A convenience wrapper around `Result` for `imap_engine::Error`.
pub type Result<T> = result::Result<T, Error>;

/// A set of errors that can occur in the IMAP engine.
///
/// Errors fall into two classes, see [`Error::is_fatal`]. A fatal error means the session can no
/// longer be trusted: by the time it is returned the session has been torn down, its mailbox
/// context discarded, and every further command fails with [`Error::ConnectionLost`]. Any other
/// error only aborts the command that produced it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    #[error("{0}")]
    Io(#[from] IoError),
    /// An error from the TLS library during the handshake or while managing the socket.
    #[error("TLS error: {0}")]
    Tls(Box<dyn StdError + Send + Sync>),
    /// A BAD response from the IMAP server.
    #[error("Bad Response: {0}")]
    Bad(String),
    /// A NO response from the IMAP server.
    #[error("No Response: {0}")]
    No(String),
    /// The server closed the connection with an untagged `BYE`.
    #[error("Server closed the connection: {0}")]
    Bye(String),
    /// The server reported fewer messages than we know about without expunging any.
    #[error("Message count is out of sync: {reported} reported, {known} known")]
    Desync {
        /// Number of messages in the local mailbox context.
        known: usize,
        /// Count carried by the offending `EXISTS` response.
        reported: usize,
    },
    /// The connection was terminated unexpectedly.
    #[error("Connection lost")]
    ConnectionLost,
    /// Error parsing a server response.
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// Command input failed validation before being sent.
    #[error("{0}")]
    Validate(#[from] ValidateError),
    /// The server did not accept the `APPEND` literal.
    #[error("Could not append mail to mailbox")]
    Append,
    /// The server advertised `LOGINDISABLED`.
    #[error("Server has disabled the LOGIN command")]
    LoginDisabled,
    /// A mailbox operation was attempted without a selected mailbox.
    #[error("No mailbox is selected")]
    NotSelected,
    /// The selected mailbox was opened read-only.
    #[error("Mailbox is read-only")]
    ReadOnly,
    /// A message index outside the mailbox context was requested.
    #[error("No message with index {0}")]
    NoSuchMessage(usize),
}

#[cfg(feature = "native-tls")]
impl From<TlsError> for Error {
    fn from(err: TlsError) -> Error {
        Error::Tls(Box::new(err))
    }
}

#[cfg(feature = "native-tls")]
impl From<TlsHandshakeError<TcpStream>> for Error {
    fn from(err: TlsHandshakeError<TcpStream>) -> Error {
        Error::Tls(err.to_string().into())
    }
}

impl<T> From<BufError<T>> for Error {
    fn from(err: BufError<T>) -> Error {
        Error::Io(err.into())
    }
}

impl Error {
    /// Returns true if this error leaves the session unusable.
    ///
    /// Transport failures, malformed framing, `BYE` and message count desynchronization are
    /// fatal. Tagged `NO`/`BAD` responses, bad literals scoped to a single `FETCH`, and input
    /// validation failures are not.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::Tls(_)
            | Error::ConnectionLost
            | Error::Bye(_)
            | Error::Desync { .. } => true,
            Error::Parse(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// The human-readable text of a tagged `NO` or `BAD` response.
    pub fn server_text(&self) -> Option<&str> {
        match self {
            Error::No(s) | Error::Bad(s) | Error::Bye(s) => Some(s),
            _ => None,
        }
    }
}

/// An error occurred while trying to parse a server response.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A line could not be attributed to our command: it was neither untagged, a continuation
    /// request, nor tagged with the tag of the command in flight.
    #[error("Unexpected response line: {}", String::from_utf8_lossy(.0))]
    Framing(Vec<u8>),
    /// A response line exceeded the configured maximum length.
    #[error("Response line longer than {0} bytes")]
    LineTooLong(usize),
    /// The response could not be parsed at all.
    #[error("Unable to parse response: {}", String::from_utf8_lossy(.0))]
    Invalid(Vec<u8>),
    /// The byte count of a literal was not a decimal number.
    #[error("Invalid literal byte count: {0:?}")]
    LiteralCount(String),
    /// The stream ended before the declared literal was complete.
    #[error("Literal truncated: expected {expected} bytes, got {received}")]
    ShortLiteral {
        /// Declared size of the literal.
        expected: usize,
        /// Bytes actually read before the stream gave out.
        received: usize,
    },
    /// A data response such as `LIST` or `STATUS` could not be parsed.
    #[error("Unable to parse data response: {}", String::from_utf8_lossy(.0))]
    Data(Vec<u8>),
    /// A `FETCH` response did not have the shape we asked for.
    #[error("Unable to parse FETCH response: {0}")]
    Fetch(String),
    /// The mailbox path was not of the form `{host[:port]}mailbox`.
    #[error("Invalid mailbox path: {0}")]
    Path(String),
}

impl ParseError {
    /// Whether this parse error means the response stream can no longer be followed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ParseError::Framing(_) | ParseError::LineTooLong(_) | ParseError::Invalid(_)
        )
    }
}

/// An invalid character was found in an input string.
#[derive(Debug, Error)]
#[error("Invalid character in input: {0:?}")]
pub struct ValidateError(pub char);
