use std::{
    io::{self, BufRead, BufReader, Read, Write},
    net::{Shutdown, TcpStream},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use log::{debug, trace, warn};
use thiserror::Error;

/// Protocol line terminator.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Read deadline used while discarding unread data at the start of an exchange.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to '{address}': {source}")]
    Connect { address: String, source: io::Error },
    #[error("connection closed by peer")]
    Closed,
    #[error("refusing to send line containing a terminator: {0:?}")]
    InvalidLine(String),
    #[error("received line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("transport lock poisoned")]
    Poisoned,
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

impl<T> From<std::sync::PoisonError<T>> for TransportError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        TransportError::Poisoned
    }
}

/// Full-duplex byte stream with an adjustable read deadline.
///
/// The read timeout is a property of the underlying socket, shared by every handle
/// obtained through [`Socket::try_clone`].
pub trait Socket: Read + Write + Send + Sync + Sized {
    fn try_clone(&self) -> io::Result<Self>;
    fn read_timeout(&self) -> io::Result<Option<Duration>>;
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn shutdown(&self) -> io::Result<()>;
}

impl Socket for TcpStream {
    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }

    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        TcpStream::read_timeout(self)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Read half state: buffered stream plus the bytes of a line whose terminator has not
/// arrived yet.
struct LineReader<S> {
    inner: BufReader<S>,
    pending: Vec<u8>,
}

/// Line-oriented transport over a single socket.
///
/// Writes and reads are serialized independently: one writer and one reader may be active
/// at the same time, but never two of either. [`LineTransport::exchange`] additionally
/// pairs a request with its response.
pub struct LineTransport<S: Socket = TcpStream> {
    control: S,
    reader: Mutex<LineReader<S>>,
    writer: Mutex<S>,
    exchange: Mutex<()>,
    closed: AtomicBool,
}

impl LineTransport<TcpStream> {
    /// Connect to `address` and use `timeout` as the baseline read deadline.
    pub fn open(address: &str, timeout: Duration) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address).map_err(|source| TransportError::Connect {
            address: address.to_string(),
            source,
        })?;
        debug!("connected to {address}");
        Self::from_socket(stream, timeout)
    }
}

impl<S: Socket> LineTransport<S> {
    pub fn from_socket(socket: S, timeout: Duration) -> Result<Self, TransportError> {
        socket.set_read_timeout(to_deadline(timeout))?;
        let reader = LineReader {
            inner: BufReader::new(socket.try_clone()?),
            pending: Vec::new(),
        };
        let writer = socket.try_clone()?;

        Ok(Self {
            control: socket,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            exchange: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Shut the socket down. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("closing connection");
        match self.control.shutdown() {
            Ok(()) => Ok(()),
            // Peer already went away.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current read deadline of the socket; `None` blocks indefinitely.
    pub fn read_timeout(&self) -> Result<Option<Duration>, TransportError> {
        Ok(self.control.read_timeout()?)
    }

    /// Send one line, appending the terminator.
    pub fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock()?;
        self.write_locked(&mut writer, line)
    }

    /// Read one line, waiting at most `timeout_millis` (0 waits indefinitely).
    ///
    /// Returns `Ok(None)` if no complete line arrived in time. The socket's previous read
    /// deadline is restored before returning, whatever the outcome.
    pub fn read_line(&self, timeout_millis: u64) -> Result<Option<String>, TransportError> {
        let mut reader = self.reader.lock()?;
        self.read_locked(&mut reader, timeout_millis)
    }

    /// Hold the request lock for one write followed by its reads.
    ///
    /// Concurrent callers each going through an exchange cannot consume each other's
    /// responses. Data already received when the exchange starts answers no request of
    /// this exchange (e.g. a reply that arrived after its caller timed out) and is
    /// discarded.
    pub fn exchange(&self) -> Result<Exchange<'_, S>, TransportError> {
        let guard = self.exchange.lock()?;
        if self.is_open() {
            let mut reader = self.reader.lock()?;
            let discarded = self.discard_stale(&mut reader)?;
            if discarded > 0 {
                warn!("discarded {discarded} byte(s) of stale response data");
            }
        }
        Ok(Exchange {
            transport: self,
            _guard: guard,
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    fn write_locked(&self, writer: &mut S, line: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        if line.contains(['\n', '\r']) {
            return Err(TransportError::InvalidLine(line.to_string()));
        }

        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(LINE_TERMINATOR);

        writer
            .write_all(&bytes)
            .and_then(|()| writer.flush())
            .map_err(|e| self.fail(e))?;
        debug!("write: {line}");
        Ok(())
    }

    fn read_locked(
        &self,
        reader: &mut LineReader<S>,
        timeout_millis: u64,
    ) -> Result<Option<String>, TransportError> {
        self.ensure_open()?;
        let previous = self.control.read_timeout()?;
        self.control
            .set_read_timeout(to_deadline(Duration::from_millis(timeout_millis)))?;
        trace!("start read_line, timeout {timeout_millis}ms");

        let result = self.read_one(reader);

        match (self.control.set_read_timeout(previous), result) {
            (Ok(()), result) => result,
            // The line is already consumed; losing it would desynchronize the caller.
            (Err(e), Ok(Some(line))) => {
                warn!("failed to restore read timeout {previous:?}: {e}");
                Ok(Some(line))
            }
            (Err(e), Ok(None)) => Err(self.fail(e)),
            (Err(e), Err(err)) => {
                warn!("failed to restore read timeout {previous:?}: {e}");
                Err(err)
            }
        }
    }

    /// Drop buffered bytes, any partial line and whatever the socket can hand out
    /// without waiting. Returns the number of bytes dropped.
    fn discard_stale(&self, reader: &mut LineReader<S>) -> Result<usize, TransportError> {
        let mut discarded = reader.pending.len();
        reader.pending.clear();

        let previous = self.control.read_timeout()?;
        self.control.set_read_timeout(Some(DRAIN_TIMEOUT))?;

        let result = loop {
            let available = match reader.inner.fill_buf() {
                Ok(buf) => buf.len(),
                Err(e) if is_timeout(&e) => break Ok(discarded),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(self.fail(e)),
            };
            // End of stream is reported by the next read.
            if available == 0 {
                break Ok(discarded);
            }
            reader.inner.consume(available);
            discarded += available;
        };

        self.control.set_read_timeout(previous)?;
        result
    }

    fn read_one(&self, reader: &mut LineReader<S>) -> Result<Option<String>, TransportError> {
        let LineReader { inner, pending } = reader;
        match inner.read_until(LINE_TERMINATOR, pending) {
            Ok(0) if pending.is_empty() => {
                self.closed.store(true, Ordering::Release);
                Err(TransportError::Closed)
            }
            Ok(_) if pending.last() != Some(&LINE_TERMINATOR) => {
                // End of stream in the middle of a line; hand out what arrived.
                self.closed.store(true, Ordering::Release);
                let line = take_line(pending)?;
                debug!("received (unterminated): {line}");
                Ok(Some(line))
            }
            Ok(_) => {
                let line = take_line(pending)?;
                debug!("received: {line}");
                Ok(Some(line))
            }
            Err(e) if is_timeout(&e) => {
                warn!("read_line timed out with {} byte(s) pending", pending.len());
                Ok(None)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Mark the transport closed if `e` means the connection is gone.
    fn fail(&self, e: io::Error) -> TransportError {
        if is_disconnect(&e) {
            warn!("connection lost: {e}");
            self.closed.store(true, Ordering::Release);
        }
        e.into()
    }
}

/// A request/response critical section obtained from [`LineTransport::exchange`].
pub struct Exchange<'a, S: Socket> {
    transport: &'a LineTransport<S>,
    _guard: MutexGuard<'a, ()>,
}

impl<S: Socket> Exchange<'_, S> {
    pub fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.transport.write_line(line)
    }

    pub fn read_line(&mut self, timeout_millis: u64) -> Result<Option<String>, TransportError> {
        self.transport.read_line(timeout_millis)
    }
}

fn to_deadline(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() { None } else { Some(timeout) }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// Drain `pending` into a string without its terminator. The bytes are consumed even
/// when they are not valid UTF-8.
fn take_line(pending: &mut Vec<u8>) -> Result<String, TransportError> {
    let mut bytes = std::mem::take(pending);
    if bytes.last() == Some(&LINE_TERMINATOR) {
        bytes.pop();
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8(bytes).map_err(|e| {
        warn!("dropping malformed line: {e}");
        e.into()
    })
}
