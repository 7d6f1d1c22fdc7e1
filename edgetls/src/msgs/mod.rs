#![allow(missing_docs)]
//! Wire encoding and decoding of TLS records and handshake messages.

#[macro_use]
mod macros;

pub mod alert;
pub mod base;
pub mod ccs;
pub mod codec;
pub mod enums;
pub mod handshake;
pub(crate) mod hsjoiner;
pub mod message;
pub mod persist;
pub(crate) mod sslv2;

#[cfg(test)]
mod handshake_test;
