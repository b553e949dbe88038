//! TLS 1.2 client handshake.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use mintls_crypto::bigint::BigInt;
use mintls_crypto::random;
use mintls_crypto::rsa::PublicKey;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::asn1::{self, Decoded};
use crate::cipher_suites::{self, SUPPORTED};
use crate::connection::{
    Connection, Event, Reader, HS_CERTIFICATE, HS_CERTIFICATE_REQUEST, HS_CERTIFICATE_VERIFY,
    HS_CLIENT_HELLO, HS_CLIENT_KEY_EXCHANGE, HS_FINISHED, HS_SERVER_HELLO,
    HS_SERVER_HELLO_DONE, HS_SERVER_KEY_EXCHANGE,
};
use crate::error::{CryptoError, Error, ProtocolError, Result};
use crate::identity::Identity;
use crate::params;
use crate::stream::{TlsStream, Transport};

/// Client-side configuration. An identity is only needed when the server
/// requests a client certificate.
pub struct ClientConfig {
    pub identity: Option<Arc<Identity>>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            identity: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// TLS 1.2 client. Reusable across connections.
pub struct TlsClient {
    config: ClientConfig,
}

impl TlsClient {
    pub fn new(config: ClientConfig) -> Self {
        TlsClient { config }
    }

    /// Run the handshake over `transport`, returning an established stream.
    pub fn connect(&self, transport: Box<dyn Transport>) -> Result<TlsStream> {
        let mut conn = Connection::new(transport, true, self.config.timeout);
        match self.handshake(&mut conn) {
            Ok(()) => {
                debug!(
                    suite = conn.suite().map(|s| s.name),
                    "client handshake complete"
                );
                Ok(TlsStream::new(conn))
            }
            Err(e) => {
                warn!(error = %e, "client handshake failed");
                conn.close();
                Err(e)
            }
        }
    }

    fn handshake(&self, conn: &mut Connection) -> Result<()> {
        let client_random = Connection::hello_random()?;
        send_client_hello(conn, &client_random)?;

        let mut server_random = [0u8; 32];
        let mut server_cert: Option<Decoded> = None;
        let mut cert_requested = false;
        loop {
            match conn.next_event()? {
                Event::Handshake(HS_SERVER_HELLO, body) => {
                    conn.transcript_push(HS_SERVER_HELLO, &body);
                    parse_server_hello(conn, &body, &mut server_random)?;
                }
                Event::Handshake(HS_CERTIFICATE, body) => {
                    conn.transcript_push(HS_CERTIFICATE, &body);
                    server_cert = parse_certificate_list(&body)?;
                }
                Event::Handshake(HS_CERTIFICATE_REQUEST, body) => {
                    conn.transcript_push(HS_CERTIFICATE_REQUEST, &body);
                    debug!("server requested a client certificate");
                    cert_requested = true;
                }
                Event::Handshake(HS_SERVER_HELLO_DONE, body) => {
                    conn.transcript_push(HS_SERVER_HELLO_DONE, &body);
                    break;
                }
                Event::Handshake(HS_SERVER_KEY_EXCHANGE, _) => {
                    return Err(ProtocolError::UnexpectedMessage.into());
                }
                Event::Handshake(msg_type, body) => {
                    debug!(msg_type, "ignoring handshake message");
                    conn.transcript_push(msg_type, &body);
                }
                Event::ChangeCipherSpec(_) => {
                    return Err(ProtocolError::UnexpectedMessage.into());
                }
            }
        }

        if cert_requested {
            let body = match &self.config.identity {
                Some(identity) => certificate_list_body(identity.certificate_der()),
                None => certificate_list_body(&[]),
            };
            conn.send_handshake(HS_CERTIFICATE, &body, true)?;
        }

        let server_cert = server_cert.ok_or(ProtocolError::MissingCertificate)?;
        let public_key = extract_public_key(&server_cert)?;
        let mut premaster = Zeroizing::new([0u8; 48]);
        premaster[0] = 3;
        premaster[1] = 3;
        random::fill(&mut premaster[2..])?;
        let encrypted = public_key.encrypt(&premaster[..])?;
        let mut body = BytesMut::with_capacity(2 + encrypted.len());
        body.put_u16(encrypted.len() as u16);
        body.put_slice(&encrypted);
        conn.send_handshake(HS_CLIENT_KEY_EXCHANGE, &body, true)?;

        if cert_requested {
            if let Some(identity) = &self.config.identity {
                let signature = identity.private_key().sign_sha1(conn.transcript_bytes())?;
                let mut body = BytesMut::with_capacity(4 + signature.len());
                // signature algorithm: SHA-1 with RSA
                body.put_u8(2);
                body.put_u8(1);
                body.put_u16(signature.len() as u16);
                body.put_slice(&signature);
                conn.send_handshake(HS_CERTIFICATE_VERIFY, &body, true)?;
            }
        }

        let suite = conn
            .suite()
            .ok_or(Error::Protocol(ProtocolError::UnexpectedMessage))?;
        let material = params::derive(suite, &premaster[..], &client_random, &server_random)?;
        conn.set_key_material(material);
        conn.send_ccs()?;
        let verify = conn.verify_data(b"client finished")?;
        conn.send_handshake(HS_FINISHED, &verify, true)?;

        match conn.next_event()? {
            Event::ChangeCipherSpec(payload) if payload == [1] => conn.activate_read()?,
            Event::ChangeCipherSpec(_) => return Err(ProtocolError::DecodeError.into()),
            Event::Handshake(..) => return Err(ProtocolError::UnexpectedMessage.into()),
        }

        loop {
            match conn.next_event()? {
                Event::Handshake(HS_FINISHED, body) => {
                    // the server's Finished is verified but never enters the
                    // transcript
                    let expected = conn.verify_data(b"server finished")?;
                    if body.len() != params::VERIFY_DATA_LEN || body != expected {
                        return Err(CryptoError::FinishedVerifyFailed.into());
                    }
                    return Ok(());
                }
                Event::Handshake(msg_type, body) => {
                    debug!(msg_type, "ignoring handshake message");
                    conn.transcript_push(msg_type, &body);
                }
                Event::ChangeCipherSpec(_) => {
                    return Err(ProtocolError::UnexpectedMessage.into());
                }
            }
        }
    }
}

fn send_client_hello(conn: &mut Connection, client_random: &[u8; 32]) -> Result<()> {
    let offered: Vec<u16> = SUPPORTED
        .iter()
        .filter(|s| s.preference != 0)
        .map(|s| s.id)
        .collect();
    let mut body = BytesMut::with_capacity(41 + 2 * offered.len());
    body.put_u8(3);
    body.put_u8(3);
    body.put_slice(client_random);
    body.put_u8(0); // no session id
    body.put_u16((offered.len() * 2) as u16);
    for id in offered {
        body.put_u16(id);
    }
    body.put_u8(1); // one compression method: null
    body.put_u8(0);
    conn.send_handshake(HS_CLIENT_HELLO, &body, true)
}

fn parse_server_hello(
    conn: &mut Connection,
    body: &[u8],
    server_random: &mut [u8; 32],
) -> Result<()> {
    let mut r = Reader::new(body);
    let major = r.u8()?;
    let minor = r.u8()?;
    if (major, minor) != (3, 3) {
        return Err(ProtocolError::BadVersion.into());
    }
    conn.set_version((3, 3));
    server_random.copy_from_slice(r.take(32)?);
    let session_id_len = r.u8()? as usize;
    // a session id echo is tolerated and ignored; we never resume
    r.take(session_id_len)?;
    let suite_id = r.u16()?;
    let suite = cipher_suites::by_id(suite_id).ok_or(ProtocolError::NoCipherSuite)?;
    conn.set_suite(suite);
    if r.u8()? != 0 {
        return Err(ProtocolError::BadCompression.into());
    }
    debug!(suite = suite.name, "server hello accepted");
    Ok(())
}

/// Parse a Certificate message; returns the decoded first certificate, or
/// `None` for an empty list.
fn parse_certificate_list(body: &[u8]) -> Result<Option<Decoded>> {
    let mut r = Reader::new(body);
    let total = r.u24()?;
    let mut r = Reader::new(r.take(total)?);
    let mut first = None;
    let mut count = 0;
    while r.remaining() > 0 {
        let len = r.u24()?;
        let der = r.take(len)?;
        let decoded = asn1::decode(der.to_vec(), &asn1::X509_CERTIFICATE)?;
        if first.is_none() {
            first = Some(decoded);
        }
        count += 1;
    }
    debug!(count, "certificate list parsed");
    Ok(first)
}

pub(crate) fn certificate_list_body(der: &[u8]) -> Vec<u8> {
    let mut body = BytesMut::with_capacity(6 + der.len());
    if der.is_empty() {
        body.put_uint(0, 3);
    } else {
        body.put_uint((der.len() + 3) as u64, 3);
        body.put_uint(der.len() as u64, 3);
        body.put_slice(der);
    }
    body.to_vec()
}

/// Pull the RSA public key out of a decoded certificate.
fn extract_public_key(cert: &Decoded) -> Result<PublicKey> {
    let spk =
        cert.require("certificate[0].tbsCertificate.subjectPublicKeyInfo.subjectPublicKey")?;
    // leading unused-bits octet of the BIT STRING must be zero
    if spk.first() != Some(&0) {
        return Err(ProtocolError::DecodeError.into());
    }
    let inner = asn1::decode(spk[1..].to_vec(), &asn1::RSA_PUBLIC_KEY)?;
    Ok(PublicKey {
        modulus: BigInt::from_bytes_be(inner.require("pubkey.modulus")?),
        exponent: BigInt::from_bytes_be(inner.require("pubkey.publicExponent")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_list_body_framing() {
        let body = certificate_list_body(&[0xAA, 0xBB]);
        assert_eq!(body, vec![0, 0, 5, 0, 0, 2, 0xAA, 0xBB]);
        assert_eq!(certificate_list_body(&[]), vec![0, 0, 0]);
    }

    #[test]
    fn test_extract_public_key_from_test_cert() {
        let der = include_bytes!("../tests/data/test-cert.der").to_vec();
        let cert = asn1::decode(der, &asn1::X509_CERTIFICATE).unwrap();
        let key = extract_public_key(&cert).unwrap();
        assert_eq!(key.block_len(), 256);
        assert_eq!(key.exponent, BigInt::from_u64(0x10001));
    }

    #[test]
    fn test_parse_certificate_list_round_trip() {
        let der = include_bytes!("../tests/data/test-cert.der");
        let body = certificate_list_body(der);
        let decoded = parse_certificate_list(&body).unwrap().unwrap();
        assert!(decoded.find("certificate[0].tbsCertificate").is_some());
        assert!(parse_certificate_list(&certificate_list_body(&[]))
            .unwrap()
            .is_none());
    }
}
