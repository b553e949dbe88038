//! Local certificate and private key.

use std::path::Path;
use std::sync::Arc;

use mintls_crypto::bigint::BigInt;
use mintls_crypto::rsa::{CrtParams, PrivateKey};
use tracing::debug;

use crate::asn1::{self, Decoded};
use crate::error::Result;

/// A certificate plus its RSA private key, shared read-only across
/// connections.
pub struct Identity {
    certificate_der: Vec<u8>,
    private_key: PrivateKey,
}

impl Identity {
    /// Load a DER certificate and a PKCS#1 DER private key from disk.
    pub fn from_der_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Arc<Identity>> {
        let cert_der = std::fs::read(cert_path)?;
        let key_der = std::fs::read(key_path)?;
        Identity::from_der(cert_der, &key_der)
    }

    /// Build an identity from in-memory DER buffers.
    pub fn from_der(certificate_der: Vec<u8>, key_der: &[u8]) -> Result<Arc<Identity>> {
        // validated now so a bad certificate fails at load, not mid-handshake
        let cert = asn1::decode(certificate_der.clone(), &asn1::X509_CERTIFICATE)?;
        cert.require("certificate[0].tbsCertificate.subjectPublicKeyInfo.subjectPublicKey")?;

        let key = asn1::decode(key_der.to_vec(), &asn1::RSA_PRIVATE_KEY)?;
        let private_key = PrivateKey {
            modulus: integer(&key, "privkey.modulus")?,
            private_exponent: integer(&key, "privkey.privateExponent")?,
            crt: Some(CrtParams {
                prime1: integer(&key, "privkey.prime1")?,
                prime2: integer(&key, "privkey.prime2")?,
                exponent1: integer(&key, "privkey.exponent1")?,
                exponent2: integer(&key, "privkey.exponent2")?,
                coefficient: integer(&key, "privkey.coefficient")?,
            }),
        };
        debug!(
            modulus_bits = private_key.modulus.nbits(),
            cert_len = certificate_der.len(),
            "identity loaded"
        );
        Ok(Arc::new(Identity {
            certificate_der,
            private_key,
        }))
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

fn integer(decoded: &Decoded, fqn: &str) -> Result<BigInt> {
    Ok(BigInt::from_bytes_be(decoded.require(fqn)?))
}
