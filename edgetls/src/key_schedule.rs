use zeroize::Zeroizing;

use crate::common_state::Side;
use crate::crypto::cipher::RecordMac;
use crate::crypto::prf;
use crate::enums::ProtocolVersion;
use crate::error::Error;
use crate::hash_hs::{HandshakeHash, SSL3_CLIENT_SENDER, SSL3_SERVER_SENDER};
use crate::record::half_conn::CipherSpec;
use crate::suites::SupportedCipherSuite;

/// The two hello randoms of a connection.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConnectionRandoms {
    pub(crate) client: [u8; 32],
    pub(crate) server: [u8; 32],
}

impl ConnectionRandoms {
    pub(crate) fn new(client: [u8; 32], server: [u8; 32]) -> Self {
        Self { client, server }
    }
}

fn join_randoms(first: &[u8; 32], second: &[u8; 32]) -> [u8; 64] {
    let mut randoms = [0u8; 64];
    randoms[..32].copy_from_slice(first);
    randoms[32..].copy_from_slice(second);
    randoms
}

/// Per-connection keying material, for every version from SSLv3 to
/// TLS 1.2.
pub(crate) struct ConnectionSecrets {
    pub(crate) randoms: ConnectionRandoms,
    version: ProtocolVersion,
    suite: &'static SupportedCipherSuite,
    master_secret: Zeroizing<[u8; 48]>,
}

impl ConnectionSecrets {
    /// Derives the master secret from a completed key exchange.
    pub(crate) fn from_premaster(
        premaster: &[u8],
        randoms: ConnectionRandoms,
        version: ProtocolVersion,
        suite: &'static SupportedCipherSuite,
    ) -> Self {
        let mut ret = Self {
            randoms,
            version,
            suite,
            master_secret: Zeroizing::new([0u8; 48]),
        };

        let seed = join_randoms(&ret.randoms.client, &ret.randoms.server);
        prf::prf(
            &mut ret.master_secret[..],
            version,
            suite.prf_hash(),
            premaster,
            b"master secret",
            &seed,
        );
        ret
    }

    pub(crate) fn new_resume(
        randoms: ConnectionRandoms,
        version: ProtocolVersion,
        suite: &'static SupportedCipherSuite,
        master_secret: &[u8; 48],
    ) -> Self {
        Self {
            randoms,
            version,
            suite,
            master_secret: Zeroizing::new(*master_secret),
        }
    }

    pub(crate) fn suite(&self) -> &'static SupportedCipherSuite {
        self.suite
    }

    pub(crate) fn master_secret(&self) -> &[u8; 48] {
        &self.master_secret
    }

    fn make_key_block(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(vec![0u8; self.suite.key_block_len()]);

        // server random first here, unlike the master secret
        let randoms = join_randoms(&self.randoms.server, &self.randoms.client);
        prf::prf(
            &mut out,
            self.version,
            self.suite.prf_hash(),
            &self.master_secret[..],
            b"key expansion",
            &randoms,
        );
        out
    }

    /// Builds the `(read, write)` cipher specs for `side` from the key
    /// block: MAC secrets, then keys, then IVs, client before server.
    pub(crate) fn make_cipher_specs(&self, side: Side) -> Result<(CipherSpec, CipherSpec), Error> {
        let key_block = self.make_key_block();
        let suite = self.suite;
        let (mac_len, key_len, iv_len) = (suite.mac_len(), suite.bulk.key_len(), suite.bulk.iv_len());

        let (client_mac, rest) = key_block.split_at(mac_len);
        let (server_mac, rest) = rest.split_at(mac_len);
        let (client_key, rest) = rest.split_at(key_len);
        let (server_key, rest) = rest.split_at(key_len);
        let (client_iv, rest) = rest.split_at(iv_len);
        let server_iv = &rest[..iv_len];

        let make = |mac_secret: &[u8], key: &[u8], iv: &[u8]| -> Result<CipherSpec, Error> {
            let mac = suite
                .mac
                .map(|alg| RecordMac::new(self.version, alg, mac_secret));
            Ok(CipherSpec::new(suite.bulk.new_cipher(key, iv)?, mac))
        };

        let client = make(client_mac, client_key, client_iv)?;
        let server = make(server_mac, server_key, server_iv)?;
        Ok(match side {
            Side::Client => (server, client),
            Side::Server => (client, server),
        })
    }

    fn make_verify_data(&self, hh: &HandshakeHash, label: &[u8], sender: &[u8]) -> Vec<u8> {
        if self.version == ProtocolVersion::SSLv3 {
            return hh.ssl3_hash(&self.master_secret[..], sender);
        }

        let mut out = vec![0u8; 12];
        prf::prf(
            &mut out,
            self.version,
            self.suite.prf_hash(),
            &self.master_secret[..],
            label,
            &hh.current_hash(),
        );
        out
    }

    pub(crate) fn client_verify_data(&self, hh: &HandshakeHash) -> Vec<u8> {
        self.make_verify_data(hh, b"client finished", SSL3_CLIENT_SENDER)
    }

    pub(crate) fn server_verify_data(&self, hh: &HandshakeHash) -> Vec<u8> {
        self.make_verify_data(hh, b"server finished", SSL3_SERVER_SENDER)
    }
}
