use std::path::Path;

use pki_types::pem::PemObject;
use pki_types::{CertificateDer, ServerName, TrustAnchor, UnixTime};

use crate::crl::{self, CrlPool};
use crate::crypto::verify::SUPPORTED_SIG_ALGS;
use crate::error::{CertificateError, Error};
use crate::log::{debug, trace};
use crate::msgs::base::PayloadU16;

/// A container for root certificates able to provide a root-of-trust
/// for connection authentication.
#[derive(Clone, Debug, Default)]
pub struct RootCertStore {
    /// The list of roots.
    pub roots: Vec<TrustAnchor<'static>>,
}

impl RootCertStore {
    /// Make a new, empty `RootCertStore`.
    pub fn empty() -> Self {
        Self { roots: Vec::new() }
    }

    /// Parse the given DER-encoded certificates and add all that can be
    /// parsed in a best-effort fashion.
    ///
    /// This is because large collections of root certificates often
    /// include ancient or syntactically invalid certificates.
    ///
    /// Returns the number of certificates added, and the number that
    /// were ignored.
    pub fn add_parsable_certificates<'a>(
        &mut self,
        der_certs: impl IntoIterator<Item = CertificateDer<'a>>,
    ) -> (usize, usize) {
        let mut valid_count = 0;
        let mut invalid_count = 0;

        for der_cert in der_certs {
            #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
            match webpki::anchor_from_trusted_cert(&der_cert) {
                Ok(anchor) => {
                    self.roots.push(anchor.to_owned());
                    valid_count += 1;
                }
                Err(err) => {
                    trace!("invalid cert der {:?}", der_cert.as_ref());
                    debug!("certificate parsing failed: {:?}", err);
                    invalid_count += 1;
                }
            };
        }

        debug!(
            "add_parsable_certificates processed {} valid and {} invalid certs",
            valid_count, invalid_count
        );

        (valid_count, invalid_count)
    }

    /// Add a single DER-encoded certificate to the store.
    pub fn add(&mut self, der: CertificateDer<'_>) -> Result<(), Error> {
        self.roots.push(
            webpki::anchor_from_trusted_cert(&der)
                .map_err(pki_error)?
                .to_owned(),
        );
        Ok(())
    }

    /// Adds every certificate in a PEM file, returning how many were
    /// added.
    pub fn add_pem_file(&mut self, path: impl AsRef<Path>) -> Result<usize, Error> {
        let mut added = 0;
        for der in CertificateDer::pem_file_iter(path.as_ref())
            .map_err(|e| Error::InvalidConfig(format!("cannot read CA file: {}", e)))?
        {
            let der = der.map_err(|e| Error::InvalidConfig(format!("bad CA PEM: {}", e)))?;
            self.add(der)?;
            added += 1;
        }
        Ok(added)
    }

    /// Return the DER encoded subject of each certificate in the
    /// store, as sent in CertificateRequest.
    pub(crate) fn subjects(&self) -> Vec<PayloadU16> {
        self.roots
            .iter()
            .map(|ta| PayloadU16::new(wrap_in_sequence(ta.subject.as_ref())))
            .collect()
    }

    /// Return true if there are no certificates.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Say how many certificates are in the container.
    pub fn len(&self) -> usize {
        self.roots.len()
    }
}

/// Trust anchors hold the subject without its outer SEQUENCE.
fn wrap_in_sequence(bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![0x30];
    let len = bytes.len();
    match len {
        0..=0x7f => out.push(len as u8),
        0x80..=0xff => out.extend([0x81, len as u8]),
        _ => out.extend([0x82, (len >> 8) as u8, len as u8]),
    }
    out.extend_from_slice(bytes);
    out
}

/// Validates a server's chain for use by `server_name`, which may be a
/// DNS name or an IP address literal.  Without a name only the path is
/// checked.
pub(crate) fn verify_server_chain(
    roots: &RootCertStore,
    chain: &[CertificateDer<'static>],
    server_name: Option<&str>,
    now: UnixTime,
) -> Result<(), Error> {
    let (end_entity, intermediates) = chain
        .split_first()
        .ok_or(Error::NoCertificatesPresented)?;

    let cert = webpki::EndEntityCert::try_from(end_entity).map_err(pki_error)?;
    cert.verify_for_usage(
        SUPPORTED_SIG_ALGS,
        &roots.roots,
        intermediates,
        now,
        webpki::KeyUsage::server_auth(),
        None,
        None,
    )
    .map_err(pki_error)?;

    if let Some(name) = server_name {
        let name = ServerName::try_from(name)
            .map_err(|_| Error::from(CertificateError::NotValidForName))?;
        cert.verify_is_valid_for_subject_name(&name)
            .map_err(pki_error)?;
    }
    Ok(())
}

/// Validates a client's chain against `roots`, then asks `crls`
/// whether any certificate in it was revoked.
pub(crate) fn verify_client_chain(
    roots: &RootCertStore,
    crls: Option<&dyn CrlPool>,
    chain: &[CertificateDer<'static>],
    now: UnixTime,
) -> Result<(), Error> {
    let (end_entity, intermediates) = chain
        .split_first()
        .ok_or(Error::NoCertificatesPresented)?;

    let cert = webpki::EndEntityCert::try_from(end_entity).map_err(pki_error)?;
    cert.verify_for_usage(
        SUPPORTED_SIG_ALGS,
        &roots.roots,
        intermediates,
        now,
        webpki::KeyUsage::client_auth(),
        None,
        None,
    )
    .map_err(pki_error)?;

    if let Some(crls) = crls {
        for cert in chain {
            crl::check(crls, cert)?;
        }
    }
    Ok(())
}

fn pki_error(error: webpki::Error) -> Error {
    use webpki::Error::*;
    match error {
        BadDer | BadDerTime | TrailingData(_) => CertificateError::BadEncoding.into(),
        CertNotValidYet { .. } => CertificateError::NotValidYet.into(),
        CertExpired { .. } | InvalidCertValidity => CertificateError::Expired.into(),
        UnknownIssuer => CertificateError::UnknownIssuer.into(),
        CertNotValidForName { .. } => CertificateError::NotValidForName.into(),
        CertRevoked => CertificateError::Revoked.into(),
        UnsupportedCriticalExtension => CertificateError::UnhandledCriticalExtension.into(),
        InvalidSignatureForPublicKey { .. } => CertificateError::BadSignature.into(),
        _ => CertificateError::Other(format!("{:?}", error)).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crl::MemoryCrlPool;

    /// One day after the test certificates become valid.
    const NOW: u64 = 1_792_465_610;

    fn dir(kind: &str) -> String {
        format!("{}/../test-ca/{}/", env!("CARGO_MANIFEST_DIR"), kind)
    }

    fn roots(kind: &str) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        assert_eq!(
            roots
                .add_pem_file(format!("{}ca.cert", dir(kind)))
                .unwrap(),
            1
        );
        roots
    }

    fn chain(kind: &str, name: &str) -> Vec<CertificateDer<'static>> {
        CertificateDer::pem_file_iter(format!("{}{}.fullchain", dir(kind), name))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn now() -> UnixTime {
        UnixTime::since_unix_epoch(std::time::Duration::from_secs(NOW))
    }

    #[test]
    fn server_chain_and_names() {
        for kind in ["rsa", "ecdsa"] {
            let roots = roots(kind);
            let chain = chain(kind, "end");
            verify_server_chain(&roots, &chain, Some("testserver.com"), now()).unwrap();
            verify_server_chain(&roots, &chain, Some("a.wild.test"), now()).unwrap();
            verify_server_chain(&roots, &chain, None, now()).unwrap();
            assert_eq!(
                verify_server_chain(&roots, &chain, Some("b.a.wild.test"), now()),
                Err(CertificateError::NotValidForName.into())
            );
            assert_eq!(
                verify_server_chain(&roots, &chain, Some("127.0.0.1"), now()),
                Err(CertificateError::NotValidForName.into())
            );
        }
    }

    #[test]
    fn server_chain_rejects_unknown_issuer_and_bad_time() {
        let chain = chain("rsa", "end");
        assert_eq!(
            verify_server_chain(&roots("ecdsa"), &chain, None, now()),
            Err(CertificateError::UnknownIssuer.into())
        );
        assert_eq!(
            verify_server_chain(
                &roots("rsa"),
                &chain,
                None,
                UnixTime::since_unix_epoch(std::time::Duration::from_secs(1_000_000_000))
            ),
            Err(CertificateError::NotValidYet.into())
        );
        assert_eq!(
            verify_server_chain(&roots("rsa"), &[], None, now()),
            Err(Error::NoCertificatesPresented)
        );
    }

    #[test]
    fn client_chain_needs_client_usage() {
        let roots = roots("rsa");
        verify_client_chain(&roots, None, &chain("rsa", "client"), now()).unwrap();
        assert!(verify_client_chain(&roots, None, &chain("rsa", "end"), now()).is_err());
    }

    #[test]
    fn client_chain_consults_crls() {
        let roots = roots("rsa");
        let mut crls = MemoryCrlPool::new();
        crls.add_pem_file(format!("{}client.revoked.crl.pem", dir("rsa")))
            .unwrap();

        assert_eq!(
            verify_client_chain(&roots, Some(&crls), &chain("rsa", "client"), now()),
            Err(CertificateError::Revoked.into())
        );
    }

    #[test]
    fn subjects_are_complete_names() {
        let roots = roots("rsa");
        let subjects = roots.subjects();
        assert_eq!(subjects.len(), 1);
        use der::Decode;
        let name = x509_cert::name::Name::from_der(&subjects[0].0).unwrap();
        assert!(!name.0.is_empty());
    }

    #[test]
    fn parsable_certificates_skip_garbage() {
        let mut roots = RootCertStore::empty();
        let (ok, bad) = roots.add_parsable_certificates(vec![
            CertificateDer::from(vec![0x30, 0x00]),
            chain("rsa", "end").remove(1),
        ]);
        assert_eq!((ok, bad), (1, 1));
        assert!(!roots.is_empty());
    }
}
