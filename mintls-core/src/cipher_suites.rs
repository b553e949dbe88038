//! The cipher suite table.
//!
//! Three RSA key exchange, CBC mode suites. Each carries a preference
//! number: zero would mean "never offer", lower non-zero numbers win during
//! server selection. The client offers every non-zero suite in table order.

use mintls_crypto::aes::BlockCipherAlgorithm;
use mintls_crypto::hash::HashAlgorithm;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CipherSuite {
    pub id: u16,
    pub name: &'static str,
    pub preference: u8,
    pub mac: HashAlgorithm,
    pub cipher: BlockCipherAlgorithm,
    /// Hash driving both the PRF and the Finished digest.
    pub prf_hash: HashAlgorithm,
}

impl CipherSuite {
    pub const fn mac_key_len(&self) -> usize {
        self.mac.digest_size()
    }

    pub const fn enc_key_len(&self) -> usize {
        self.cipher.key_size()
    }

    pub const fn block_len(&self) -> usize {
        self.cipher.block_size()
    }
}

pub const TLS_RSA_WITH_AES_128_CBC_SHA: CipherSuite = CipherSuite {
    id: 0x002f,
    name: "TLS_RSA_WITH_AES_128_CBC_SHA",
    preference: 1,
    mac: HashAlgorithm::Sha1,
    cipher: BlockCipherAlgorithm::Aes128,
    prf_hash: HashAlgorithm::Sha256,
};

pub const TLS_RSA_WITH_AES_128_CBC_SHA256: CipherSuite = CipherSuite {
    id: 0x003c,
    name: "TLS_RSA_WITH_AES_128_CBC_SHA256",
    preference: 2,
    mac: HashAlgorithm::Sha256,
    cipher: BlockCipherAlgorithm::Aes128,
    prf_hash: HashAlgorithm::Sha256,
};

pub const TLS_RSA_WITH_AES_256_CBC_SHA: CipherSuite = CipherSuite {
    id: 0x0035,
    name: "TLS_RSA_WITH_AES_256_CBC_SHA",
    preference: 3,
    mac: HashAlgorithm::Sha1,
    cipher: BlockCipherAlgorithm::Aes256,
    prf_hash: HashAlgorithm::Sha256,
};

pub const SUPPORTED: [CipherSuite; 3] = [
    TLS_RSA_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_AES_128_CBC_SHA256,
    TLS_RSA_WITH_AES_256_CBC_SHA,
];

/// Look up a suite by wire id, ignoring disabled entries.
pub fn by_id(id: u16) -> Option<&'static CipherSuite> {
    SUPPORTED
        .iter()
        .find(|suite| suite.id == id && suite.preference != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_id() {
        assert_eq!(by_id(0x002f), Some(&TLS_RSA_WITH_AES_128_CBC_SHA));
        assert_eq!(by_id(0x0035), Some(&TLS_RSA_WITH_AES_256_CBC_SHA));
        assert_eq!(by_id(0x1301), None);
    }

    #[test]
    fn test_key_material_sizes() {
        assert_eq!(TLS_RSA_WITH_AES_128_CBC_SHA.mac_key_len(), 20);
        assert_eq!(TLS_RSA_WITH_AES_128_CBC_SHA256.mac_key_len(), 32);
        assert_eq!(TLS_RSA_WITH_AES_256_CBC_SHA.enc_key_len(), 32);
        for suite in SUPPORTED {
            assert_eq!(suite.block_len(), 16);
            assert!(suite.preference != 0);
        }
    }
}
