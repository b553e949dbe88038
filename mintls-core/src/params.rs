//! Key derivation and per-direction cipher parameters.

use mintls_crypto::aes::Aes;
use zeroize::Zeroizing;

use crate::cipher_suites::CipherSuite;
use crate::error::Result;
use crate::prf::prf;

pub(crate) const MASTER_SECRET_LEN: usize = 48;
pub(crate) const VERIFY_DATA_LEN: usize = 12;

/// Active cipher state for one direction of a connection.
pub(crate) struct CipherParams {
    pub suite: &'static CipherSuite,
    pub mac_key: Zeroizing<Vec<u8>>,
    pub aes: Aes,
}

/// Everything derived from the premaster secret.
pub(crate) struct KeyMaterial {
    pub master_secret: Zeroizing<Vec<u8>>,
    pub client: CipherParams,
    pub server: CipherParams,
}

/// RFC 5246 key derivation. The key block is sliced as client MAC key,
/// server MAC key, client cipher key, server cipher key; the CBC suites
/// here use per-record explicit IVs so no IV material is taken.
pub(crate) fn derive(
    suite: &'static CipherSuite,
    premaster: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<KeyMaterial> {
    let mut randoms = [0u8; 64];
    randoms[..32].copy_from_slice(client_random);
    randoms[32..].copy_from_slice(server_random);
    let master_secret = Zeroizing::new(prf(
        suite.prf_hash,
        premaster,
        b"master secret",
        &randoms,
        MASTER_SECRET_LEN,
    ));

    // key expansion seeds with the randoms swapped
    randoms[..32].copy_from_slice(server_random);
    randoms[32..].copy_from_slice(client_random);
    let mac_len = suite.mac_key_len();
    let key_len = suite.enc_key_len();
    let key_block = Zeroizing::new(prf(
        suite.prf_hash,
        &master_secret,
        b"key expansion",
        &randoms,
        2 * mac_len + 2 * key_len,
    ));

    let (client_mac, rest) = key_block.split_at(mac_len);
    let (server_mac, rest) = rest.split_at(mac_len);
    let (client_key, server_key) = rest.split_at(key_len);

    Ok(KeyMaterial {
        client: CipherParams {
            suite,
            mac_key: Zeroizing::new(client_mac.to_vec()),
            aes: Aes::new(suite.cipher, client_key)?,
        },
        server: CipherParams {
            suite,
            mac_key: Zeroizing::new(server_mac.to_vec()),
            aes: Aes::new(suite.cipher, server_key)?,
        },
        master_secret,
    })
}

/// Finished verify_data over a transcript digest.
pub(crate) fn verify_data(
    suite: &CipherSuite,
    master_secret: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
) -> Vec<u8> {
    prf(
        suite.prf_hash,
        master_secret,
        label,
        transcript_hash,
        VERIFY_DATA_LEN,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher_suites::{TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_128_CBC_SHA256};

    #[test]
    fn test_derive_is_deterministic_and_sliced() {
        let premaster = [0x11u8; 48];
        let cr = [0x22u8; 32];
        let sr = [0x33u8; 32];
        let a = derive(&TLS_RSA_WITH_AES_128_CBC_SHA, &premaster, &cr, &sr).unwrap();
        let b = derive(&TLS_RSA_WITH_AES_128_CBC_SHA, &premaster, &cr, &sr).unwrap();
        assert_eq!(a.master_secret, b.master_secret);
        assert_eq!(a.master_secret.len(), MASTER_SECRET_LEN);
        assert_eq!(a.client.mac_key.len(), 20);
        assert_eq!(a.client.mac_key, b.client.mac_key);
        assert_ne!(a.client.mac_key, a.server.mac_key);
    }

    #[test]
    fn test_directions_share_key_schedule() {
        let km = derive(
            &TLS_RSA_WITH_AES_128_CBC_SHA256,
            &[0x44; 48],
            &[0x55; 32],
            &[0x66; 32],
        )
        .unwrap();
        // the same client key schedule must invert itself regardless of
        // which side holds it
        let iv = [0u8; 16];
        let mut buf = *b"sixteen byte msg";
        km.client.aes.cbc_encrypt(&iv, &mut buf).unwrap();
        km.client.aes.cbc_decrypt(&iv, &mut buf).unwrap();
        assert_eq!(&buf, b"sixteen byte msg");
    }

    #[test]
    fn test_verify_data_length_and_label_sensitivity() {
        let suite = &TLS_RSA_WITH_AES_128_CBC_SHA;
        let master = [0x77u8; 48];
        let hash = [0x88u8; 32];
        let client = verify_data(suite, &master, b"client finished", &hash);
        let server = verify_data(suite, &master, b"server finished", &hash);
        assert_eq!(client.len(), VERIFY_DATA_LEN);
        assert_ne!(client, server);
    }
}
