//! The single place where we generate random material for our own use.

use rand_core::{OsRng, RngCore};

/// Fill `buf` from the operating system's generator.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<(), GetRandomFailed> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|_| GetRandomFailed)
}

/// Make a [`Vec<u8>`] of the given size containing random material.
pub(crate) fn random_vec(len: usize) -> Result<Vec<u8>, GetRandomFailed> {
    let mut v = vec![0; len];
    fill_random(&mut v)?;
    Ok(v)
}

/// Random material generation failed.
#[derive(Debug)]
pub struct GetRandomFailed;

impl From<GetRandomFailed> for crate::Error {
    fn from(_: GetRandomFailed) -> Self {
        Self::FailedToGetRandomBytes
    }
}
