//! Pothole server client.
//!
//! [`PotholeClient`] exposes one blocking method per server operation. Each call renders a
//! [`Request`], sends it through the connection's [`LineTransport`] while holding the
//! request lock, reads the response (if the command has one) and decodes it.
//!
//! The client is owned by the caller. Share it between threads with an `Arc`; every method
//! takes `&self`. At most one connection is active per client: [`PotholeClient::connect`]
//! replaces (and closes) the previous one.
//!
//! # Example
//! ```rust,no_run
//! use pothole::{ClientConfig, PotholeClient, PotholeRecord};
//!
//! let client = PotholeClient::new(ClientConfig::new("127.0.0.1:4000"));
//! client.connect().unwrap();
//!
//! client.set_username("tony").unwrap();
//! client.submit(&PotholeRecord::new(41.9, 12.5, 22.0)).unwrap();
//! let nearby = client.list_by_range(41.9, 12.5, 500).unwrap();
//! let threshold = client.threshold().unwrap();
//! ```
use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use log::{info, warn};
use thiserror::Error;

use crate::{
    CommandError, PotholeRecord, Request,
    protocol::{
        Exchange, LineTransport, ListFormat, Socket, TransportError, collect_delimited,
        parse_envelope, parse_threshold,
    },
};

/// Baseline read deadline of a connection, also used for each response read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(6000);
/// Threshold reported when the server does not answer with a number.
pub const DEFAULT_THRESHOLD: f64 = 20.0;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),
    #[error("invalid request: {0}")]
    Command(#[from] CommandError),
    #[error("client state lock poisoned")]
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for ClientError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ClientError::Poisoned
    }
}

/// Connection settings for a [`PotholeClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Server address as `host:port`.
    pub address: String,
    pub timeout: Duration,
    pub default_threshold: f64,
    pub list_format: ListFormat,
}

impl ClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:4000"),
            timeout: DEFAULT_TIMEOUT,
            default_threshold: DEFAULT_THRESHOLD,
            list_format: ListFormat::default(),
        }
    }
}

/// Blocking client for a pothole server.
pub struct PotholeClient<S: Socket = std::net::TcpStream> {
    config: ClientConfig,
    transport: RwLock<Option<Arc<LineTransport<S>>>>,
}

impl PotholeClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: RwLock::new(None),
        }
    }

    /// Open a connection to the configured server, replacing any existing one.
    pub fn connect(&self) -> Result<(), ClientError> {
        let transport = LineTransport::open(&self.config.address, self.config.timeout)?;
        info!("connected to {}", self.config.address);
        self.replace(transport)
    }
}

impl<S: Socket> PotholeClient<S> {
    /// Build a client over an already established socket.
    pub fn with_socket(config: ClientConfig, socket: S) -> Result<Self, ClientError> {
        let transport = LineTransport::from_socket(socket, config.timeout)?;
        Ok(Self {
            config,
            transport: RwLock::new(Some(Arc::new(transport))),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        match self.transport.read() {
            Ok(transport) => transport.as_ref().is_some_and(|t| t.is_open()),
            Err(_) => false,
        }
    }

    /// Close the active connection. A disconnected client is left as is.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        let previous = self.transport.write()?.take();
        if let Some(transport) = previous {
            info!("disconnecting from {}", self.config.address);
            transport.close()?;
        }
        Ok(())
    }

    fn replace(&self, transport: LineTransport<S>) -> Result<(), ClientError> {
        let previous = self.transport.write()?.replace(Arc::new(transport));
        if let Some(previous) = previous {
            warn!("replacing an existing connection");
            if let Err(e) = previous.close() {
                warn!("failed to close replaced connection: {e}");
            }
        }
        Ok(())
    }

    fn transport(&self) -> Result<Arc<LineTransport<S>>, ClientError> {
        let transport = self.transport.read()?;
        match transport.as_ref() {
            Some(t) if t.is_open() => Ok(Arc::clone(t)),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Send `request` and hand the open exchange to `respond` for reading the answer.
    fn call<T, F>(&self, request: &Request, respond: F) -> Result<T, ClientError>
    where
        F: FnOnce(&mut Exchange<'_, S>, u64) -> Result<T, ClientError>,
    {
        let transport = self.transport()?;
        let mut exchange = transport.exchange()?;
        exchange.write_line(&request.render())?;
        respond(&mut exchange, self.config.timeout_millis())
    }

    /// Every record known to the server.
    pub fn list_all(&self) -> Result<Vec<PotholeRecord>, ClientError> {
        let format = self.config.list_format;
        self.call(&Request::list_all(), |exchange, timeout| match format {
            ListFormat::Envelope => Ok(envelope_or_empty(read_reply(exchange, timeout)?)),
            ListFormat::Delimited => collect_delimited::<_, ClientError>(|| {
                loop {
                    match read_reply(exchange, timeout)? {
                        Reply::Line(line) => return Ok(Some(line)),
                        Reply::Timeout => return Ok(None),
                        Reply::Malformed => continue,
                    }
                }
            }),
        })
    }

    /// Records within `range` of the given point.
    pub fn list_by_range(
        &self,
        latitude: f64,
        longitude: f64,
        range: u32,
    ) -> Result<Vec<PotholeRecord>, ClientError> {
        let request = Request::list_by_range(latitude, longitude, range);
        self.call(&request, |exchange, timeout| {
            Ok(envelope_or_empty(read_reply(exchange, timeout)?))
        })
    }

    /// The server's severity threshold, or the configured default if it does not answer
    /// with a number in time.
    pub fn threshold(&self) -> Result<f64, ClientError> {
        let fallback = self.config.default_threshold;
        self.call(&Request::threshold(), |exchange, timeout| {
            let line = match read_reply(exchange, timeout)? {
                Reply::Line(line) => Some(line),
                Reply::Timeout | Reply::Malformed => None,
            };
            match parse_threshold(line.as_deref()) {
                Ok(Some(threshold)) => Ok(threshold),
                Ok(None) => {
                    warn!("no threshold received, using default {fallback}");
                    Ok(fallback)
                }
                Err(e) => {
                    warn!("{e}, using default {fallback}");
                    Ok(fallback)
                }
            }
        })
    }

    pub fn submit(&self, record: &PotholeRecord) -> Result<(), ClientError> {
        self.call(&Request::submit(record), |_, _| Ok(()))
    }

    pub fn set_username(&self, name: &str) -> Result<(), ClientError> {
        let request = Request::set_username(name)?;
        self.call(&request, |_, _| Ok(()))
    }
}

/// One response read.
enum Reply {
    Line(String),
    Timeout,
    /// A line arrived but is not valid UTF-8; it has been consumed and logged.
    Malformed,
}

fn read_reply<S: Socket>(
    exchange: &mut Exchange<'_, S>,
    timeout: u64,
) -> Result<Reply, ClientError> {
    match exchange.read_line(timeout) {
        Ok(Some(line)) => Ok(Reply::Line(line)),
        Ok(None) => Ok(Reply::Timeout),
        Err(TransportError::InvalidUtf8(_)) => Ok(Reply::Malformed),
        Err(e) => Err(e.into()),
    }
}

fn envelope_or_empty(reply: Reply) -> Vec<PotholeRecord> {
    let line = match reply {
        Reply::Line(line) => line,
        Reply::Timeout | Reply::Malformed => return Vec::new(),
    };

    match parse_envelope(Some(&line)) {
        Ok(records) => records,
        Err(e) => {
            warn!("{e}, returning no records");
            Vec::new()
        }
    }
}
