use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use der::{Decode, Encode};
use pki_types::pem::PemObject;
use pki_types::{CertificateDer, CertificateRevocationListDer};
use x509_cert::crl::CertificateList;
use x509_cert::Certificate;

use crate::error::{CertificateError, Error};

/// Answers whether a client certificate has been revoked.
///
/// Consulted for every client certificate chain the server accepts,
/// after path validation.
pub trait CrlPool: Send + Sync {
    /// Whether `cert` is listed as revoked by its issuer.
    fn check_cert_revoked(&self, cert: &CertificateDer<'_>) -> bool;
}

/// A `CrlPool` over CRLs held in memory, looked up by issuer name and
/// serial number.
///
/// CRL signatures are not checked here; the lists are trusted as
/// configuration.
#[derive(Default)]
pub struct MemoryCrlPool {
    revoked: HashSet<(Vec<u8>, Vec<u8>)>,
}

impl MemoryCrlPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every entry of a DER-encoded CRL.
    pub fn add(&mut self, crl: &CertificateRevocationListDer<'_>) -> Result<(), Error> {
        let list = CertificateList::from_der(crl.as_ref()).map_err(bad_crl)?;
        let issuer = list
            .tbs_cert_list
            .issuer
            .to_der()
            .map_err(bad_crl)?;

        for entry in list
            .tbs_cert_list
            .revoked_certificates
            .iter()
            .flatten()
        {
            self.revoked.insert((
                issuer.clone(),
                entry.serial_number.as_bytes().to_vec(),
            ));
        }
        Ok(())
    }

    /// Adds every CRL in a PEM file.
    pub fn add_pem_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        for crl in CertificateRevocationListDer::pem_file_iter(path.as_ref())
            .map_err(|e| Error::InvalidConfig(format!("cannot read CRL file: {}", e)))?
        {
            let crl = crl.map_err(|e| Error::InvalidConfig(format!("bad CRL PEM: {}", e)))?;
            self.add(&crl)?;
        }
        Ok(())
    }

    /// Number of revoked (issuer, serial) pairs held.
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    /// No certificate is revoked.
    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

fn bad_crl(e: der::Error) -> Error {
    Error::InvalidConfig(format!("bad CRL: {}", e))
}

impl CrlPool for MemoryCrlPool {
    fn check_cert_revoked(&self, cert: &CertificateDer<'_>) -> bool {
        let Ok(cert) = Certificate::from_der(cert.as_ref()) else {
            return false;
        };
        let Ok(issuer) = cert.tbs_certificate.issuer.to_der() else {
            return false;
        };

        self.revoked.contains(&(
            issuer,
            cert.tbs_certificate
                .serial_number
                .as_bytes()
                .to_vec(),
        ))
    }
}

impl fmt::Debug for MemoryCrlPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCrlPool")
            .field("revoked", &self.revoked.len())
            .finish()
    }
}

/// Fails with `CertificateError::Revoked` when the pool lists `cert`.
pub(crate) fn check(pool: &dyn CrlPool, cert: &CertificateDer<'_>) -> Result<(), Error> {
    match pool.check_cert_revoked(cert) {
        true => Err(CertificateError::Revoked.into()),
        false => Ok(()),
    }
}
