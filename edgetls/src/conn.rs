//! The public connection: a TLS session over a blocking transport.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::client::{self, ClientConfig};
use crate::common_state::{CommonState, ConnectionState, Context, State};
use crate::enums::{AlertDescription, ProtocolVersion};
use crate::error::Error;
use crate::log::{debug, trace, warn};
use crate::msgs::enums::AlertLevel;
use crate::msgs::message::{Message, MessagePayload};
use crate::record::layer::{LayerError, RecordReader, RecordWriter};
use crate::server::{self, ServerConfig};

/// The byte stream a `Conn` runs over.
///
/// Methods take `&self` so that one thread can read while another
/// writes, as `TcpStream` allows.
pub trait Transport: Send + Sync {
    /// Reads some bytes; 0 means the peer closed.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes every byte of `buf`.
    fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// `None` blocks forever.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// `None` blocks forever.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// The local address, which for a server is the VIP the client
    /// connected to.
    fn local_ip(&self) -> Option<IpAddr> {
        None
    }

    /// Stop sending; called after close_notify.
    fn shutdown_write(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for TcpStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut &*self, buf)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(&mut &*self, buf)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }

    fn local_ip(&self) -> Option<IpAddr> {
        self.local_addr().ok().map(|addr| addr.ip())
    }

    fn shutdown_write(&self) -> io::Result<()> {
        self.shutdown(std::net::Shutdown::Write)
    }
}

enum Role {
    Client,
    Server,
}

struct Handshake {
    /// `None` only after a state failed; the error is then stored.
    state: Option<Box<dyn State>>,
    common: CommonState,
}

/// A TLS connection over `T`.
///
/// The handshake runs on the first `read`, `write` or explicit
/// `handshake` call.  One thread may read while another writes.
pub struct Conn<T> {
    transport: T,
    role: Role,
    hs: Mutex<Handshake>,
    input: Mutex<RecordReader>,
    output: Mutex<RecordWriter>,
    error: Mutex<Option<Error>>,
    closed: AtomicBool,
    peer_closed: AtomicBool,
}

impl<T: Transport> Conn<T> {
    /// Wraps an accepted connection.
    pub fn server(transport: T, config: Arc<ServerConfig>) -> Self {
        let mut common = CommonState::new();
        common.vip = transport.local_ip();
        let input = RecordReader::new(config.accept_sslv2_hello);
        let output = RecordWriter::new(ProtocolVersion::TLSv1_0, config.dynamic_record);
        let state: Box<dyn State> = Box::new(server::ExpectClientHello::new(config));

        Self::new(transport, Role::Server, state, common, input, output)
    }

    /// Wraps a dialled connection.  The ClientHello is prepared here
    /// and sent by the first I/O call.
    pub fn client(transport: T, config: Arc<ClientConfig>) -> Result<Self, Error> {
        let mut common = CommonState::new();
        let mut input = RecordReader::new(false);
        let mut output = RecordWriter::new(ProtocolVersion::TLSv1_0, false);

        let mut cx = Context {
            common: &mut common,
            reader: &mut input,
            writer: &mut output,
        };
        let state = client::start_handshake(config, &mut cx)?;

        Ok(Self::new(transport, Role::Client, state, common, input, output))
    }

    fn new(
        transport: T,
        role: Role,
        state: Box<dyn State>,
        common: CommonState,
        input: RecordReader,
        output: RecordWriter,
    ) -> Self {
        Self {
            transport,
            role,
            hs: Mutex::new(Handshake {
                state: Some(state),
                common,
            }),
            input: Mutex::new(input),
            output: Mutex::new(output),
            error: Mutex::new(None),
            closed: AtomicBool::new(false),
            peer_closed: AtomicBool::new(false),
        }
    }

    /// Runs the handshake if it has not completed yet.
    pub fn handshake(&self) -> io::Result<()> {
        let mut hs = lock(&self.hs)?;
        self.check_error()?;
        if matches!(&hs.state, Some(state) if state.is_traffic()) {
            return Ok(());
        }

        let mut input = lock(&self.input)?;
        let mut output = lock(&self.output)?;
        match self.drive(&mut hs, &mut input, &mut output) {
            Ok(()) => Ok(()),
            Err(LayerError::Io(e)) => Err(e),
            Err(LayerError::Tls(e)) => Err(self.fail(e, &mut output)),
        }
    }

    fn drive(&self, hs: &mut Handshake, reader: &mut RecordReader, writer: &mut RecordWriter) -> Result<(), LayerError> {
        loop {
            self.flush(writer)?;
            match &hs.state {
                Some(state) if state.is_traffic() => return Ok(()),
                Some(_) => {}
                None => return Err(Error::HandshakeNotComplete.into()),
            }

            let m = reader.read_message(|buf| self.transport.read(buf))?;
            let m = match classify(m)? {
                Incoming::Message(m) => m,
                Incoming::CloseNotify => return Err(Error::AlertReceived(AlertDescription::CloseNotify).into()),
                Incoming::Ignored => continue,
            };

            if let Some(state) = hs.state.take() {
                let mut cx = Context {
                    common: &mut hs.common,
                    reader: &mut *reader,
                    writer: &mut *writer,
                };
                hs.state = Some(state.handle(&mut cx, m)?);
            }
        }
    }

    /// Reads application data, running the handshake first if needed.
    /// Returns 0 once the peer has closed the connection.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.handshake()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let mut input = lock(&self.input)?;
        loop {
            self.check_error()?;

            if !input.plaintext.is_empty() {
                let n = buf.len().min(input.plaintext.len());
                buf[..n].copy_from_slice(&input.plaintext.bytes()[..n]);
                input.plaintext.consume(n);
                return Ok(n);
            }

            if self.peer_closed.load(Ordering::Acquire) {
                return Ok(0);
            }

            let m = match input.read_message(|buf| self.transport.read(buf)) {
                Ok(m) => m,
                Err(LayerError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof && input.at_boundary() => {
                    debug!("peer closed without close_notify");
                    self.peer_closed.store(true, Ordering::Release);
                    return Ok(0);
                }
                Err(LayerError::Io(e)) => return Err(e),
                Err(LayerError::Tls(e)) => return Err(self.fail_output(e)),
            };

            match classify(m) {
                Ok(Incoming::Message(m)) => {
                    if let MessagePayload::ApplicationData(payload) = &m.payload {
                        input.plaintext.extend(&payload.0);
                        continue;
                    }
                    let err = match self.role {
                        Role::Server => server::refuse_renegotiation(&m),
                        Role::Client => client::refuse_renegotiation(&m),
                    };
                    return Err(self.fail_output(err));
                }
                Ok(Incoming::CloseNotify) => {
                    self.peer_closed.store(true, Ordering::Release);
                    return Ok(0);
                }
                Ok(Incoming::Ignored) => {}
                Err(e) => return Err(self.fail_output(e)),
            }
        }
    }

    /// Writes all of `buf` as application data, running the handshake
    /// first if needed.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.handshake()?;

        let mut output = lock(&self.output)?;
        self.check_error()?;
        if self.closed.load(Ordering::Acquire) {
            return Err(to_io(Error::ConnectionClosed));
        }

        if let Err(e) = output.send_app_data(buf, Instant::now()) {
            return Err(self.fail(e, &mut output));
        }
        self.flush(&mut output)?;
        Ok(buf.len())
    }

    /// Sends close_notify and shuts down the sending side of the
    /// transport.  Later writes fail; reads still drain what the peer
    /// sends.
    pub fn close(&self) -> io::Result<()> {
        let mut output = lock(&self.output)?;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        output.send_alert(AlertDescription::CloseNotify);
        self.flush(&mut output)?;
        self.transport.shutdown_write()
    }

    /// What the handshake negotiated so far.
    pub fn connection_state(&self) -> ConnectionState {
        match self.hs.lock() {
            Ok(hs) => hs.common.snapshot(),
            Err(_) => ConnectionState::default(),
        }
    }

    /// The SNI the client sent (server side) or the name we asked for
    /// (client side).
    pub fn server_name(&self) -> Option<String> {
        self.hs
            .lock()
            .ok()
            .and_then(|hs| hs.common.server_name.clone())
    }

    /// The local address the connection was accepted on.
    pub fn vip(&self) -> Option<IpAddr> {
        self.hs.lock().ok().and_then(|hs| hs.common.vip)
    }

    /// Overrides the VIP, for transports that cannot tell it, before
    /// the handshake consults it.
    pub fn set_vip(&self, vip: IpAddr) {
        if let Ok(mut hs) = self.hs.lock() {
            hs.common.vip = Some(vip);
        }
    }

    /// Sets both the read and the write deadline.
    pub fn set_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }

    /// Bounds every later read; `None` waits forever.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.transport
            .set_read_timeout(timeout_until(deadline))
    }

    /// Bounds every later write; `None` waits forever.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.transport
            .set_write_timeout(timeout_until(deadline))
    }

    /// The underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    fn flush(&self, writer: &mut RecordWriter) -> io::Result<()> {
        if writer.has_sendable() {
            self.transport
                .write_all(&writer.take_sendable())?;
        }
        Ok(())
    }

    fn check_error(&self) -> io::Result<()> {
        match lock(&self.error)?.as_ref() {
            Some(e) => Err(to_io(e.clone())),
            None => Ok(()),
        }
    }

    /// Sends the alert for `e`, remembers `e` for every later call and
    /// returns it as an I/O error.
    fn fail(&self, e: Error, writer: &mut RecordWriter) -> io::Error {
        warn!("connection failed: {}", e);
        if let Some(alert) = e.alert() {
            writer.send_alert(alert);
            if let Err(io) = self.flush(writer) {
                trace!("cannot send alert: {}", io);
            }
        }

        if let Ok(mut stored) = self.error.lock() {
            stored.get_or_insert_with(|| e.clone());
        }
        to_io(e)
    }

    fn fail_output(&self, e: Error) -> io::Error {
        match self.output.lock() {
            Ok(mut output) => self.fail(e, &mut output),
            Err(_) => to_io(e),
        }
    }
}

enum Incoming {
    Message(Message),
    CloseNotify,
    Ignored,
}

fn classify(m: Message) -> Result<Incoming, Error> {
    let MessagePayload::Alert(alert) = &m.payload else {
        return Ok(Incoming::Message(m));
    };

    if alert.level == AlertLevel::Fatal {
        warn!("received fatal alert {:?}", alert.description);
        return Err(Error::AlertReceived(alert.description));
    }
    match alert.description {
        AlertDescription::CloseNotify => {
            debug!("received close_notify");
            Ok(Incoming::CloseNotify)
        }
        desc => {
            warn!("ignoring warning alert {:?}", desc);
            Ok(Incoming::Ignored)
        }
    }
}

fn to_io(e: Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

fn lock<X>(m: &Mutex<X>) -> io::Result<MutexGuard<'_, X>> {
    m.lock()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "connection lock poisoned"))
}

/// A socket timeout that expires at `deadline`.  A deadline already
/// past still gets a minimal timeout, as zero means "none" to sockets.
fn timeout_until(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| {
        d.saturating_duration_since(Instant::now())
            .max(Duration::from_millis(1))
    })
}

impl<T: Transport> Read for Conn<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Conn::read(self, buf)
    }
}

impl<T: Transport> Read for &Conn<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Conn::read(*self, buf)
    }
}

impl<T: Transport> Write for Conn<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Conn::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: Transport> Write for &Conn<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Conn::write(*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T> fmt::Debug for Conn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.role {
            Role::Client => "client",
            Role::Server => "server",
        };
        f.debug_struct("Conn")
            .field("side", &side)
            .finish_non_exhaustive()
    }
}
