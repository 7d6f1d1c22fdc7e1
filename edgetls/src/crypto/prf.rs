use super::hash::HashAlgorithm;
use super::hmac;
use crate::enums::ProtocolVersion;

/// P_hash from RFC 5246 section 5.
fn p_hash(out: &mut [u8], alg: HashAlgorithm, secret: &[u8], label: &[u8], seed: &[u8]) {
    let hmac_key = hmac::Key::new(alg, secret);

    // A(1)
    let mut current_a = hmac_key.sign(&[label, seed]);

    let chunk_size = hmac_key.tag_len();
    for chunk in out.chunks_mut(chunk_size) {
        // P_hash[i] = HMAC_hash(secret, A(i) + seed)
        let p_term = hmac_key.sign(&[&current_a[..], label, seed]);
        chunk.copy_from_slice(&p_term[..chunk.len()]);

        // A(i+1) = HMAC_hash(secret, A(i))
        current_a = hmac_key.sign(&[&current_a[..]]);
    }
}

/// The TLS 1.0 and 1.1 PRF: P_MD5 over the first half of the secret
/// XORed with P_SHA1 over the second half.  Odd-length secrets share
/// their middle byte.
fn prf_md5_sha1(out: &mut [u8], secret: &[u8], label: &[u8], seed: &[u8]) {
    let half = (secret.len() + 1) / 2;
    let (s1, s2) = (&secret[..half], &secret[secret.len() - half..]);

    p_hash(out, HashAlgorithm::Md5, s1, label, seed);
    let mut sha1_out = vec![0u8; out.len()];
    p_hash(&mut sha1_out, HashAlgorithm::Sha1, s2, label, seed);

    for (o, s) in out.iter_mut().zip(sha1_out.iter()) {
        *o ^= s;
    }
}

/// SSLv3 key derivation: `MD5(secret + SHA1("A" + secret + seed)) +
/// MD5(secret + SHA1("BB" + secret + seed)) + ...`.
///
/// SSLv3 has no labels; `seed` is the randoms in the order the caller
/// needs.
pub(crate) fn ssl3_prf(out: &mut [u8], secret: &[u8], seed: &[u8]) {
    let mut salt = Vec::with_capacity(26);
    for (i, chunk) in out.chunks_mut(16).enumerate() {
        salt.clear();
        salt.resize(i + 1, b'A' + i as u8);

        let mut sha1 = HashAlgorithm::Sha1.start();
        sha1.update(&salt);
        sha1.update(secret);
        sha1.update(seed);
        let inner = sha1.finish();

        let mut md5 = HashAlgorithm::Md5.start();
        md5.update(secret);
        md5.update(&inner);
        chunk.copy_from_slice(&md5.finish()[..chunk.len()]);
    }
}

/// The PRF for `version`.  `suite_hash` only matters from TLS 1.2,
/// where the cipher suite chooses it.  SSLv3 ignores `label`.
pub(crate) fn prf(
    out: &mut [u8],
    version: ProtocolVersion,
    suite_hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
) {
    match version {
        ProtocolVersion::SSLv3 => ssl3_prf(out, secret, seed),
        ProtocolVersion::TLSv1_0 | ProtocolVersion::TLSv1_1 => {
            prf_md5_sha1(out, secret, label, seed)
        }
        _ => p_hash(out, suite_hash, secret, label, seed),
    }
}
