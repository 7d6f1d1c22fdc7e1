mod client_conn;
pub use client_conn::{ClientConfig, ClientSessionCache};

pub(crate) mod handy;
pub use handy::{ClientSessionMemoryCache, NoClientSessionStorage};

mod hs;
pub(crate) use hs::{refuse_renegotiation, start_handshake};
#[cfg(test)]
pub(crate) use hs::{start_handshake_adjusted, start_sslv2_handshake};

mod tls12;
