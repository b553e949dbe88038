//! HMAC (RFC 2104) over any supported digest.

use crate::hash::{HashAlgorithm, Hasher};

/// Streaming HMAC. Holds the inner hash; the outer pass runs at
/// finalization.
#[derive(Clone)]
pub struct Hmac {
    algorithm: HashAlgorithm,
    opad_key: [u8; 64],
    inner: Hasher,
}

impl Hmac {
    /// Keys longer than the digest block are hashed down first, per the
    /// RFC.
    pub fn new(algorithm: HashAlgorithm, key: &[u8]) -> Self {
        let block = algorithm.block_size();
        let mut k = [0u8; 64];
        if key.len() > block {
            let d = algorithm.digest(key);
            k[..d.len()].copy_from_slice(&d);
        } else {
            k[..key.len()].copy_from_slice(key);
        }
        let mut ipad_key = [0u8; 64];
        let mut opad_key = [0u8; 64];
        for i in 0..block {
            ipad_key[i] = k[i] ^ 0x36;
            opad_key[i] = k[i] ^ 0x5c;
        }
        let mut inner = algorithm.hasher();
        inner.update(&ipad_key);
        Hmac {
            algorithm,
            opad_key,
            inner,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Vec<u8> {
        let inner_digest = self.inner.finalize();
        let mut outer = self.algorithm.hasher();
        outer.update(&self.opad_key);
        outer.update(&inner_digest);
        outer.finalize()
    }

    /// One-shot MAC.
    pub fn mac(algorithm: HashAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut h = Hmac::new(algorithm, key);
        h.update(data);
        h.finalize()
    }
}
