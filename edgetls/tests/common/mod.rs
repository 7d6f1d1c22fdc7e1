#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use edgetls::{
    CertifiedKey, ClientConfig, Conn, ConnectionState, Error, FixedTimeProvider, RootCertStore,
    ServerConfig,
};

/// A time inside the validity window of every certificate, CRL and
/// OCSP response under `test-ca/`.
pub const NOW: u64 = 1_792_465_610;

/// How long any test socket may block.
const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyType {
    Rsa,
    Ecdsa,
}

pub static ALL_KEY_TYPES: &[KeyType] = &[KeyType::Rsa, KeyType::Ecdsa];

impl KeyType {
    fn dir(self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ecdsa => "ecdsa",
        }
    }

    pub fn path_for(self, part: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../test-ca")
            .join(self.dir())
            .join(part)
    }

    pub fn bytes_for(self, part: &str) -> Vec<u8> {
        std::fs::read(self.path_for(part)).unwrap()
    }

    /// `name` is one of `end`, `other` or `client`.
    pub fn certified_key(self, name: &str) -> Arc<CertifiedKey> {
        Arc::new(
            CertifiedKey::from_pem_files(
                self.path_for(&format!("{name}.fullchain")),
                self.path_for(&format!("{name}.key")),
            )
            .unwrap(),
        )
    }

    pub fn roots(self) -> Arc<RootCertStore> {
        let mut roots = RootCertStore::empty();
        roots
            .add_pem_file(self.path_for("ca.cert"))
            .unwrap();
        Arc::new(roots)
    }
}

pub fn make_server_config(kt: KeyType) -> ServerConfig {
    let mut config = ServerConfig::new(vec![kt.certified_key("end")]);
    config.time_provider = Arc::new(FixedTimeProvider::from_secs(NOW));
    config
}

pub fn make_client_config(kt: KeyType) -> ClientConfig {
    let mut config = ClientConfig::new(kt.roots());
    config.server_name = Some("testserver.com".to_string());
    config.time_provider = Arc::new(FixedTimeProvider::from_secs(NOW));
    config
}

pub fn make_client_config_with_auth(kt: KeyType) -> ClientConfig {
    let mut config = make_client_config(kt);
    config.client_auth_cert = Some(kt.certified_key("client"));
    config
}

/// What each side saw of one connection.
#[derive(Debug)]
pub struct Outcome {
    pub client: io::Result<ConnectionState>,
    pub server: io::Result<ConnectionState>,
}

impl Outcome {
    pub fn unwrap(self) -> (ConnectionState, ConnectionState) {
        match (self.client, self.server) {
            (Ok(client), Ok(server)) => (client, server),
            (client, server) => panic!("handshake failed: client {client:?} server {server:?}"),
        }
    }

    pub fn client_error(&self) -> Option<Error> {
        self.client.as_ref().err().and_then(tls_error)
    }

    pub fn server_error(&self) -> Option<Error> {
        self.server.as_ref().err().and_then(tls_error)
    }
}

/// The TLS error inside an I/O error returned by `Conn`.
pub fn tls_error(err: &io::Error) -> Option<Error> {
    err.get_ref()?
        .downcast_ref::<Error>()
        .cloned()
}

pub const PING: &[u8] = b"hello from the client";

/// Runs one connection between fresh `Conn`s over loopback TCP.  The
/// client sends `PING`, the server echoes it, and both close.
pub fn do_handshake(server_config: &Arc<ServerConfig>, client_config: &Arc<ClientConfig>) -> Outcome {
    let (addr, server) = spawn_server(server_config, |conn| {
        let mut buf = [0u8; PING.len()];
        (&*conn).read_exact(&mut buf)?;
        (&*conn).write_all(&buf)?;
        conn.close()
    });

    let client = run_client(addr, client_config, |conn| {
        (&*conn).write_all(PING)?;
        let mut buf = [0u8; PING.len()];
        (&*conn).read_exact(&mut buf)?;
        assert_eq!(&buf, PING);
        conn.close()
    });

    Outcome {
        client,
        server: server.join().unwrap(),
    }
}

/// Sends edgetls logs to the test harness; `RUST_LOG` picks the level.
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .try_init();
}

/// Accepts one connection on a loopback port, runs the handshake and
/// then `serve`, and reports the server's connection state.
pub fn spawn_server<F>(
    config: &Arc<ServerConfig>,
    serve: F,
) -> (SocketAddr, thread::JoinHandle<io::Result<ConnectionState>>)
where
    F: FnOnce(&Conn<TcpStream>) -> io::Result<()> + Send + 'static,
{
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let config = Arc::clone(config);

    let handle = thread::spawn(move || {
        let (sock, _) = listener.accept()?;
        let conn = Conn::server(sock, config);
        conn.set_deadline(Some(Instant::now() + TIMEOUT))?;
        match conn.handshake().and_then(|()| serve(&conn)) {
            Ok(()) => Ok(conn.connection_state()),
            Err(e) => {
                linger(conn.get_ref());
                Err(e)
            }
        }
    });

    (addr, handle)
}

/// Dials `addr`, runs the handshake and then `talk`.
pub fn run_client<F>(addr: SocketAddr, config: &Arc<ClientConfig>, talk: F) -> io::Result<ConnectionState>
where
    F: FnOnce(&Conn<TcpStream>) -> io::Result<()>,
{
    let sock = TcpStream::connect(addr)?;
    let conn = Conn::client(sock, Arc::clone(config))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    conn.set_deadline(Some(Instant::now() + TIMEOUT))?;
    match conn.handshake().and_then(|()| talk(&conn)) {
        Ok(()) => Ok(conn.connection_state()),
        Err(e) => {
            linger(conn.get_ref());
            Err(e)
        }
    }
}

/// Lets the alert we may have sent reach the peer: closing a socket
/// with unread input resets it, which can drop data still in flight.
fn linger(sock: &TcpStream) {
    let _ = sock.shutdown(Shutdown::Write);
    let _ = sock.set_read_timeout(Some(Duration::from_secs(1)));
    let mut buf = [0u8; 4096];
    while let Ok(n) = (&*sock).read(&mut buf) {
        if n == 0 {
            break;
        }
    }
}

/// Opens a plain TCP connection to a server thread, for tests that
/// speak raw bytes.
pub fn raw_client(addr: SocketAddr) -> TcpStream {
    let sock = TcpStream::connect(addr).unwrap();
    sock.set_read_timeout(Some(TIMEOUT))
        .unwrap();
    sock
}

/// Reads one TLS record: `(type, version, body)`.
pub fn read_record(sock: &mut TcpStream) -> io::Result<(u8, u16, Vec<u8>)> {
    let mut header = [0u8; 5];
    sock.read_exact(&mut header)?;
    let len = usize::from(u16::from_be_bytes([header[3], header[4]]));
    let mut body = vec![0u8; len];
    sock.read_exact(&mut body)?;
    Ok((header[0], u16::from_be_bytes([header[1], header[2]]), body))
}
