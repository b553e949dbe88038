//! The TLS 1.2 pseudo-random function (RFC 5246 section 5).
//!
//! `PRF(secret, label, seed) = P_hash(secret, label ‖ seed)` where P_hash
//! iterates HMAC to produce arbitrary-length output. Every suite in this
//! stack runs the PRF over SHA-256.

use mintls_crypto::hash::HashAlgorithm;
use mintls_crypto::hmac::Hmac;

pub fn prf(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
    out_len: usize,
) -> Vec<u8> {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label);
    label_seed.extend_from_slice(seed);
    p_hash(hash, secret, &label_seed, out_len)
}

fn p_hash(hash: HashAlgorithm, secret: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(out_len + hash.digest_size());
    // A(1) = HMAC(secret, seed), A(i+1) = HMAC(secret, A(i))
    let mut a = Hmac::mac(hash, secret, seed);
    while out.len() < out_len {
        let mut h = Hmac::new(hash, secret);
        h.update(&a);
        h.update(seed);
        out.extend_from_slice(&h.finalize());
        a = Hmac::mac(hash, secret, &a);
    }
    out.truncate(out_len);
    out
}
