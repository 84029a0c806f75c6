use std::net::TcpStream;

use log::debug;

use crate::config::Config;
use crate::conn::Connection;
use crate::error::Result;
use crate::session::Session;

#[cfg(feature = "native-tls")]
use crate::error::Error;
#[cfg(feature = "native-tls")]
use crate::types::Capability;
#[cfg(feature = "native-tls")]
use native_tls::{TlsConnector, TlsStream};

/// How the connection to the server is secured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionMode {
    /// No encryption at all.
    Plaintext,
    /// TLS from the first byte, usually on port 993.
    #[cfg(feature = "native-tls")]
    Tls,
    /// A plaintext connection upgraded with `STARTTLS` before logging in.
    #[cfg(feature = "native-tls")]
    StartTls,
}

/// A convenience builder for [`Session`]s over the supported transports.
///
/// ```no_run
/// # use imap_engine::{ClientBuilder, ConnectionMode, Credentials};
/// # fn main() -> Result<(), imap_engine::Error> {
/// let mut session = ClientBuilder::new("imap.example.com", 993)
///     .mode(ConnectionMode::Tls)
///     .connect()?;
/// session.authenticate(&mut Credentials::new("fred", "hunter2"))?;
/// session.select("INBOX")?;
/// # Ok(())
/// # }
/// ```
///
/// The greeting has been read by the time [`connect`](Self::connect) returns.
pub struct ClientBuilder<D>
where
    D: AsRef<str>,
{
    domain: D,
    port: u16,
    mode: ConnectionMode,
    #[cfg(feature = "native-tls")]
    skip_tls_verify: bool,
    config: Config,
}

impl<D> ClientBuilder<D>
where
    D: AsRef<str>,
{
    /// Make a new `ClientBuilder` using the given domain and port, in plaintext mode.
    pub fn new(domain: D, port: u16) -> Self {
        ClientBuilder {
            domain,
            port,
            mode: ConnectionMode::Plaintext,
            #[cfg(feature = "native-tls")]
            skip_tls_verify: false,
            config: Config::default(),
        }
    }

    /// Choose how the connection is secured.
    pub fn mode(&mut self, mode: ConnectionMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Accept any certificate the server presents.
    ///
    /// Only meant for testing against servers with self-signed certificates.
    #[cfg(feature = "native-tls")]
    pub fn danger_skip_tls_verify(&mut self, skip: bool) -> &mut Self {
        self.skip_tls_verify = skip;
        self
    }

    /// Configuration for the resulting session.
    pub fn config(&mut self, config: Config) -> &mut Self {
        self.config = config;
        self
    }

    /// Connect, secure the connection as configured, and read the greeting.
    pub fn connect(&self) -> Result<Session<Connection>> {
        let domain = self.domain.as_ref();
        let tcp = TcpStream::connect((domain, self.port))?;
        debug!("connected to {}:{} ({:?})", domain, self.port, self.mode);

        let mut session = match self.mode {
            ConnectionMode::Plaintext => {
                let mut session = Session::new(Box::new(tcp) as Connection);
                session.read_greeting()?;
                session
            }
            #[cfg(feature = "native-tls")]
            ConnectionMode::Tls => {
                let tls = self.handshake(tcp)?;
                let mut session = Session::new(Box::new(tls) as Connection);
                session.read_greeting()?;
                session
            }
            #[cfg(feature = "native-tls")]
            ConnectionMode::StartTls => self.starttls(tcp)?,
        };
        session.config = self.config.clone();
        Ok(session)
    }

    #[cfg(feature = "native-tls")]
    fn handshake(&self, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(self.skip_tls_verify)
            .build()?;
        Ok(connector.connect(self.domain.as_ref(), tcp)?)
    }

    #[cfg(feature = "native-tls")]
    fn starttls(&self, tcp: TcpStream) -> Result<Session<Connection>> {
        let mut plain = Session::new(tcp);
        plain.read_greeting()?;
        if plain.server_capabilities().is_empty() {
            plain.capabilities()?;
        }
        if !plain.server_capabilities().has(Capability::StartTls) {
            return Err(Error::Tls("server does not offer STARTTLS".into()));
        }
        plain.run("STARTTLS")?;

        let tls = self.handshake(plain.into_inner()?)?;
        debug!("STARTTLS negotiated with {}", self.domain.as_ref());
        // capabilities may change once the connection is secure
        Ok(Session::new(Box::new(tls) as Connection))
    }
}
