//! TLS 1.2 server handshake.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::asn1;
use crate::cipher_suites::{self, CipherSuite};
use crate::client::certificate_list_body;
use crate::connection::{
    Connection, Event, Reader, HS_CERTIFICATE, HS_CERTIFICATE_VERIFY, HS_CLIENT_HELLO,
    HS_CLIENT_KEY_EXCHANGE, HS_FINISHED, HS_SERVER_HELLO, HS_SERVER_HELLO_DONE,
};
use crate::error::{CryptoError, ProtocolError, Result};
use crate::identity::Identity;
use crate::params;
use crate::stream::{TlsStream, Transport};

/// Server-side configuration; the identity is mandatory.
pub struct ServerConfig {
    pub identity: Arc<Identity>,
    pub timeout: Duration,
}

impl ServerConfig {
    pub fn new(identity: Arc<Identity>) -> Self {
        ServerConfig {
            identity,
            timeout: Duration::from_secs(5),
        }
    }
}

/// TLS 1.2 server. Reusable across connections; `accept` once per peer.
pub struct TlsServer {
    config: ServerConfig,
}

impl TlsServer {
    pub fn new(config: ServerConfig) -> Self {
        TlsServer { config }
    }

    /// Run the handshake over an accepted transport.
    pub fn accept(&self, transport: Box<dyn Transport>) -> Result<TlsStream> {
        let mut conn = Connection::new(transport, false, self.config.timeout);
        match self.handshake(&mut conn) {
            Ok(()) => {
                debug!(
                    suite = conn.suite().map(|s| s.name),
                    "server handshake complete"
                );
                Ok(TlsStream::new(conn))
            }
            Err(e) => {
                warn!(error = %e, "server handshake failed");
                conn.close();
                Err(e)
            }
        }
    }

    fn handshake(&self, conn: &mut Connection) -> Result<()> {
        let client_random = match conn.next_event()? {
            Event::Handshake(HS_CLIENT_HELLO, body) => {
                conn.transcript_push(HS_CLIENT_HELLO, &body);
                parse_client_hello(conn, &body)?
            }
            _ => return Err(ProtocolError::UnexpectedMessage.into()),
        };

        let server_random = Connection::hello_random()?;
        send_server_hello(conn, &server_random)?;
        let cert_body = certificate_list_body(self.config.identity.certificate_der());
        conn.send_handshake(HS_CERTIFICATE, &cert_body, true)?;
        conn.send_handshake(HS_SERVER_HELLO_DONE, &[], true)?;

        let key = self.config.identity.private_key();
        let mut got_certificate = false;
        let mut derived = false;
        loop {
            match conn.next_event()? {
                Event::Handshake(HS_CERTIFICATE, body) if !got_certificate && !derived => {
                    conn.transcript_push(HS_CERTIFICATE, &body);
                    got_certificate = true;
                    parse_client_certificate(&body)?;
                }
                Event::Handshake(HS_CLIENT_KEY_EXCHANGE, body) if !derived => {
                    conn.transcript_push(HS_CLIENT_KEY_EXCHANGE, &body);
                    let mut r = Reader::new(&body);
                    let enc_len = r.u16()? as usize;
                    if enc_len != r.remaining() || enc_len != key.block_len() {
                        return Err(ProtocolError::BadKeyExchangeLength.into());
                    }
                    let premaster = Zeroizing::new(key.decrypt(r.take(enc_len)?)?);
                    if premaster.len() != 48 || premaster[0] != 3 || premaster[1] != 3 {
                        return Err(CryptoError::BadPremaster.into());
                    }
                    let suite = conn
                        .suite()
                        .ok_or(ProtocolError::UnexpectedMessage)?;
                    let material =
                        params::derive(suite, &premaster, &client_random, &server_random)?;
                    conn.set_key_material(material);
                    derived = true;
                }
                Event::Handshake(HS_CERTIFICATE_VERIFY, body) if derived => {
                    // accepted for interoperability; the signature is not
                    // checked because we never request client certificates
                    conn.transcript_push(HS_CERTIFICATE_VERIFY, &body);
                    debug!(len = body.len(), "certificate verify received");
                }
                Event::ChangeCipherSpec(payload) => {
                    if !derived {
                        return Err(ProtocolError::UnexpectedMessage.into());
                    }
                    if payload != [1] {
                        return Err(ProtocolError::DecodeError.into());
                    }
                    conn.activate_read()?;
                    break;
                }
                _ => return Err(ProtocolError::UnexpectedMessage.into()),
            }
        }

        match conn.next_event()? {
            Event::Handshake(HS_FINISHED, body) => {
                let expected = conn.verify_data(b"client finished")?;
                if body.len() != params::VERIFY_DATA_LEN || body != expected {
                    return Err(CryptoError::FinishedVerifyFailed.into());
                }
                // the client's Finished joins the transcript only after it
                // verifies, so our own Finished covers it
                conn.transcript_push(HS_FINISHED, &body);
            }
            _ => return Err(ProtocolError::UnexpectedMessage.into()),
        }

        conn.send_ccs()?;
        let verify = conn.verify_data(b"server finished")?;
        conn.send_handshake(HS_FINISHED, &verify, true)?;
        Ok(())
    }
}

/// Parse ClientHello, select a suite, and up-negotiate the connection to
/// TLS 1.2. Returns the client random.
fn parse_client_hello(conn: &mut Connection, body: &[u8]) -> Result<[u8; 32]> {
    let mut r = Reader::new(body);
    let major = r.u8()?;
    let minor = r.u8()?;
    if (major, minor) != (3, 3) {
        return Err(ProtocolError::BadVersion.into());
    }
    let mut client_random = [0u8; 32];
    client_random.copy_from_slice(r.take(32)?);
    if r.u8()? != 0 {
        // we never hand out session ids, so none can come back
        return Err(ProtocolError::BadSessionId.into());
    }
    let suites_len = r.u16()? as usize;
    if suites_len % 2 != 0 {
        return Err(ProtocolError::DecodeError.into());
    }
    let mut selected: Option<&'static CipherSuite> = None;
    for chunk in r.take(suites_len)?.chunks_exact(2) {
        let id = u16::from_be_bytes([chunk[0], chunk[1]]);
        if let Some(suite) = cipher_suites::by_id(id) {
            if selected.map_or(true, |s| suite.preference < s.preference) {
                selected = Some(suite);
            }
        }
    }
    let suite = selected.ok_or(ProtocolError::NoCipherSuite)?;
    let compression_len = r.u8()? as usize;
    if !r.take(compression_len)?.contains(&0) {
        return Err(ProtocolError::BadCompression.into());
    }
    conn.set_version((3, 3));
    conn.set_suite(suite);
    debug!(suite = suite.name, "client hello accepted");
    Ok(client_random)
}

fn send_server_hello(conn: &mut Connection, server_random: &[u8; 32]) -> Result<()> {
    let suite = conn
        .suite()
        .ok_or(ProtocolError::UnexpectedMessage)?;
    let mut body = BytesMut::with_capacity(40);
    body.put_u8(3);
    body.put_u8(3);
    body.put_slice(server_random);
    body.put_u8(0); // no session id
    body.put_u16(suite.id);
    body.put_u8(0); // null compression
    conn.send_handshake(HS_SERVER_HELLO, &body, true)
}

/// Validate a client Certificate message; an empty list is allowed.
fn parse_client_certificate(body: &[u8]) -> Result<()> {
    let mut r = Reader::new(body);
    let total = r.u24()?;
    let mut r = Reader::new(r.take(total)?);
    let mut count = 0;
    while r.remaining() > 0 {
        let len = r.u24()?;
        asn1::decode(r.take(len)?.to_vec(), &asn1::X509_CERTIFICATE)?;
        count += 1;
    }
    debug!(count, "client certificate list parsed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_body(version: (u8, u8), session_id: &[u8], suites: &[u16]) -> Vec<u8> {
        let mut body = BytesMut::new();
        body.put_u8(version.0);
        body.put_u8(version.1);
        body.put_slice(&[0x5a; 32]);
        body.put_u8(session_id.len() as u8);
        body.put_slice(session_id);
        body.put_u16((suites.len() * 2) as u16);
        for id in suites {
            body.put_u16(*id);
        }
        body.put_u8(1);
        body.put_u8(0);
        body.to_vec()
    }

    struct NullTransport;
    impl Transport for NullTransport {
        fn write_all(&mut self, bufs: &[&[u8]]) -> Result<usize> {
            Ok(bufs.iter().map(|b| b.len()).sum())
        }
        fn read_timeout(&mut self, _buf: &mut [u8], _t: Duration) -> Result<usize> {
            Ok(0)
        }
        fn close(&mut self) {}
        fn is_closed(&self) -> bool {
            false
        }
    }

    fn test_conn() -> Connection {
        Connection::new(Box::new(NullTransport), false, Duration::from_secs(1))
    }

    #[test]
    fn test_client_hello_picks_lowest_preference() {
        let mut conn = test_conn();
        // 0x0035 (pref 3) offered before 0x002f (pref 1): 0x002f must win
        let body = hello_body((3, 3), &[], &[0x0035, 0x002f]);
        parse_client_hello(&mut conn, &body).unwrap();
        assert_eq!(conn.suite().unwrap().id, 0x002f);
        assert_eq!(conn.version(), (3, 3));
    }

    #[test]
    fn test_client_hello_rejects_old_version() {
        let mut conn = test_conn();
        let body = hello_body((3, 1), &[], &[0x002f]);
        assert_eq!(
            parse_client_hello(&mut conn, &body),
            Err(ProtocolError::BadVersion.into())
        );
    }

    #[test]
    fn test_client_hello_rejects_session_id() {
        let mut conn = test_conn();
        let body = hello_body((3, 3), &[0xaa; 8], &[0x002f]);
        assert_eq!(
            parse_client_hello(&mut conn, &body),
            Err(ProtocolError::BadSessionId.into())
        );
    }

    #[test]
    fn test_client_hello_no_common_suite() {
        let mut conn = test_conn();
        let body = hello_body((3, 3), &[], &[0x1301, 0x1302]);
        assert_eq!(
            parse_client_hello(&mut conn, &body),
            Err(ProtocolError::NoCipherSuite.into())
        );
    }

    #[test]
    fn test_truncated_client_hello() {
        let mut conn = test_conn();
        let mut body = hello_body((3, 3), &[], &[0x002f]);
        body.truncate(20);
        assert_eq!(
            parse_client_hello(&mut conn, &body),
            Err(ProtocolError::DecodeError.into())
        );
    }
}
