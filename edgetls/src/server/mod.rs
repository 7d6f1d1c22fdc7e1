mod server_conn;
pub use server_conn::{
    ClientAuthType, ClientHelloInfo, KeyPairLoader, MultiCertificate, ProducesTickets, Rule,
    ServerConfig, ServerRule, StoresServerSessions,
};

pub(crate) mod handy;
pub use handy::{NoServerSessionStorage, PemKeyPairLoader, ServerSessionMemoryCache};

mod hs;
pub(crate) use hs::{refuse_renegotiation, ExpectClientHello};

mod tls12;
