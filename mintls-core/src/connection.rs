//! The TLS record layer and shared connection state.
//!
//! Both handshake drivers sit on top of this: framing, CBC record
//! protection, the handshake transcript, and application data buffering.
//! Sequence numbers count records in each direction and reset when that
//! direction's ChangeCipherSpec activates its keys.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};
use mintls_crypto::hmac::Hmac;
use mintls_crypto::random;
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use crate::cipher_suites::CipherSuite;
use crate::error::{CryptoError, Error, ProtocolError, Result};
use crate::params::{self, CipherParams, KeyMaterial};
use crate::stream::Transport;

pub(crate) const CONTENT_CHANGE_CIPHER_SPEC: u8 = 20;
pub(crate) const CONTENT_ALERT: u8 = 21;
pub(crate) const CONTENT_HANDSHAKE: u8 = 22;
pub(crate) const CONTENT_APPLICATION_DATA: u8 = 23;
pub(crate) const CONTENT_HEARTBEAT: u8 = 24;

pub(crate) const HS_CLIENT_HELLO: u8 = 1;
pub(crate) const HS_SERVER_HELLO: u8 = 2;
pub(crate) const HS_CERTIFICATE: u8 = 11;
pub(crate) const HS_SERVER_KEY_EXCHANGE: u8 = 12;
pub(crate) const HS_CERTIFICATE_REQUEST: u8 = 13;
pub(crate) const HS_SERVER_HELLO_DONE: u8 = 14;
pub(crate) const HS_CERTIFICATE_VERIFY: u8 = 15;
pub(crate) const HS_CLIENT_KEY_EXCHANGE: u8 = 16;
pub(crate) const HS_FINISHED: u8 = 20;

/// Declared record payloads above this are rejected.
const MAX_RECORD_PAYLOAD: usize = 16384 + 2048;

/// Application data is split into records no larger than this.
const MAX_WRITE_CHUNK: usize = 8192;

const ALERT_CLOSE_NOTIFY: u8 = 0;

/// What the peer sent next, at handshake granularity.
pub(crate) enum Event {
    Handshake(u8, Vec<u8>),
    ChangeCipherSpec(Vec<u8>),
}

pub(crate) struct Connection {
    transport: Box<dyn Transport>,
    pub(crate) timeout: Duration,
    is_client: bool,
    version: (u8, u8),
    suite: Option<&'static CipherSuite>,
    master_secret: Option<Zeroizing<Vec<u8>>>,
    pending_read: Option<CipherParams>,
    pending_write: Option<CipherParams>,
    read_params: Option<CipherParams>,
    write_params: Option<CipherParams>,
    seq_rx: u64,
    seq_tx: u64,
    /// Raw concatenation of handshake messages, both directions.
    transcript: Vec<u8>,
    /// Handshake bytes received but not yet consumed as messages.
    handshake_rx: Vec<u8>,
    /// Decrypted application data not yet handed to the caller.
    app_rx: Vec<u8>,
    closed: bool,
    /// Closed by a protocol or crypto violation rather than orderly shutdown.
    fatal: bool,
}

impl Connection {
    pub(crate) fn new(transport: Box<dyn Transport>, is_client: bool, timeout: Duration) -> Self {
        Connection {
            transport,
            timeout,
            is_client,
            version: (3, 1),
            suite: None,
            master_secret: None,
            pending_read: None,
            pending_write: None,
            read_params: None,
            write_params: None,
            seq_rx: 0,
            seq_tx: 0,
            transcript: Vec::new(),
            handshake_rx: Vec::new(),
            app_rx: Vec::new(),
            closed: false,
            fatal: false,
        }
    }

    pub(crate) fn version(&self) -> (u8, u8) {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: (u8, u8)) {
        self.version = version;
    }

    pub(crate) fn suite(&self) -> Option<&'static CipherSuite> {
        self.suite
    }

    pub(crate) fn set_suite(&mut self, suite: &'static CipherSuite) {
        self.suite = Some(suite);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// 32 bytes of hello randomness: unix time, then 28 random bytes.
    pub(crate) fn hello_random() -> Result<[u8; 32]> {
        let mut out = [0u8; 32];
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        out[..4].copy_from_slice(&now.to_be_bytes());
        random::fill(&mut out[4..])?;
        Ok(out)
    }

    // --- transcript ------------------------------------------------------

    pub(crate) fn transcript_push(&mut self, msg_type: u8, body: &[u8]) {
        self.transcript.push(msg_type);
        self.transcript
            .extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        self.transcript.extend_from_slice(body);
    }

    pub(crate) fn transcript_bytes(&self) -> &[u8] {
        &self.transcript
    }

    pub(crate) fn transcript_hash(&self) -> [u8; 32] {
        mintls_crypto::hash::Sha256::digest(&self.transcript)
    }

    // --- key material ----------------------------------------------------

    pub(crate) fn set_key_material(&mut self, material: KeyMaterial) {
        let KeyMaterial {
            master_secret,
            client,
            server,
        } = material;
        self.master_secret = Some(master_secret);
        if self.is_client {
            self.pending_write = Some(client);
            self.pending_read = Some(server);
        } else {
            self.pending_write = Some(server);
            self.pending_read = Some(client);
        }
    }

    pub(crate) fn verify_data(&self, label: &[u8]) -> Result<Vec<u8>> {
        let suite = self
            .suite
            .ok_or(Error::Protocol(ProtocolError::UnexpectedMessage))?;
        let master = self
            .master_secret
            .as_ref()
            .ok_or(Error::Protocol(ProtocolError::UnexpectedMessage))?;
        Ok(params::verify_data(
            suite,
            master,
            label,
            &self.transcript_hash(),
        ))
    }

    /// Send ChangeCipherSpec and start encrypting.
    pub(crate) fn send_ccs(&mut self) -> Result<()> {
        self.write_record(CONTENT_CHANGE_CIPHER_SPEC, &[1])?;
        let params = self
            .pending_write
            .take()
            .ok_or(Error::Protocol(ProtocolError::UnexpectedMessage))?;
        self.write_params = Some(params);
        self.seq_tx = 0;
        Ok(())
    }

    /// Activate the read direction after the peer's ChangeCipherSpec.
    pub(crate) fn activate_read(&mut self) -> Result<()> {
        let params = self
            .pending_read
            .take()
            .ok_or(Error::Protocol(ProtocolError::UnexpectedMessage))?;
        self.read_params = Some(params);
        self.seq_rx = 0;
        Ok(())
    }

    // --- record write ----------------------------------------------------

    pub(crate) fn send_handshake(
        &mut self,
        msg_type: u8,
        body: &[u8],
        into_transcript: bool,
    ) -> Result<()> {
        let mut msg = BytesMut::with_capacity(4 + body.len());
        msg.put_u8(msg_type);
        msg.put_uint(body.len() as u64, 3);
        msg.put_slice(body);
        if into_transcript {
            self.transcript.extend_from_slice(&msg);
        }
        self.write_record(CONTENT_HANDSHAKE, &msg)
    }

    pub(crate) fn write_record(&mut self, content_type: u8, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        trace!(
            content_type,
            len = payload.len(),
            protected = self.write_params.is_some(),
            "tx record"
        );
        let params = match &self.write_params {
            None => {
                let header = record_header(content_type, self.version, payload.len());
                self.transport.write_all(&[&header, payload])?;
                return Ok(());
            }
            Some(params) => params,
        };

        let mac = record_mac(params, self.seq_tx, content_type, self.version, payload);
        let block = params.suite.block_len();
        let pad = block - ((payload.len() + mac.len() + 1) % block);
        let mut plaintext = BytesMut::with_capacity(payload.len() + mac.len() + pad + 1);
        plaintext.put_slice(payload);
        plaintext.put_slice(&mac);
        plaintext.put_bytes(pad as u8, pad + 1);

        let mut iv = [0u8; 16];
        random::fill(&mut iv)?;
        params.aes.cbc_encrypt(&iv, &mut plaintext)?;

        let header = record_header(content_type, self.version, iv.len() + plaintext.len());
        self.transport.write_all(&[&header, &iv, &plaintext])?;
        self.seq_tx += 1;
        Ok(())
    }

    /// Send application data, split into records.
    pub(crate) fn write_app(&mut self, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(MAX_WRITE_CHUNK) {
            self.write_record(CONTENT_APPLICATION_DATA, chunk)?;
        }
        Ok(())
    }

    // --- record read -----------------------------------------------------

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = match self.transport.read_timeout(&mut buf[filled..], timeout) {
                Ok(n) => n,
                Err(e) => {
                    // a record torn mid-read cannot be resumed later
                    if filled > 0 {
                        self.teardown_fatal();
                    }
                    return Err(e);
                }
            };
            if n == 0 {
                if filled > 0 {
                    self.teardown_fatal();
                }
                return Err(Error::ConnectionClosed);
            }
            filled += n;
        }
        Ok(())
    }

    fn read_record(&mut self, timeout: Duration) -> Result<(u8, Vec<u8>)> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        let mut header = [0u8; 5];
        self.read_exact(&mut header, timeout)?;
        let content_type = header[0];
        if header[1] != self.version.0 || header[2] < self.version.1 {
            return Err(ProtocolError::BadVersion.into());
        }
        let len = u16::from_be_bytes([header[3], header[4]]) as usize;
        if len > MAX_RECORD_PAYLOAD {
            return Err(ProtocolError::RecordOverflow.into());
        }
        let mut payload = vec![0u8; len];
        self.read_exact(&mut payload, timeout)?;
        trace!(
            content_type,
            len,
            protected = self.read_params.is_some(),
            "rx record"
        );
        if let Some(params) = &self.read_params {
            let plaintext =
                decrypt_record(params, self.seq_rx, content_type, self.version, &payload)?;
            self.seq_rx += 1;
            return Ok((content_type, plaintext));
        }
        Ok((content_type, payload))
    }

    fn pop_handshake(&mut self) -> Option<(u8, Vec<u8>)> {
        if self.handshake_rx.len() < 4 {
            return None;
        }
        let len = u32::from_be_bytes([
            0,
            self.handshake_rx[1],
            self.handshake_rx[2],
            self.handshake_rx[3],
        ]) as usize;
        if self.handshake_rx.len() < 4 + len {
            return None;
        }
        let msg_type = self.handshake_rx[0];
        let body = self.handshake_rx[4..4 + len].to_vec();
        self.handshake_rx.drain(..4 + len);
        Some((msg_type, body))
    }

    /// Next handshake-relevant event, reading records as needed.
    pub(crate) fn next_event(&mut self) -> Result<Event> {
        loop {
            if let Some((msg_type, body)) = self.pop_handshake() {
                trace!(msg_type, len = body.len(), "rx handshake message");
                return Ok(Event::Handshake(msg_type, body));
            }
            let timeout = self.timeout;
            let (content_type, payload) = self.read_record(timeout)?;
            match content_type {
                CONTENT_HANDSHAKE => self.handshake_rx.extend_from_slice(&payload),
                CONTENT_CHANGE_CIPHER_SPEC => {
                    if !self.handshake_rx.is_empty() {
                        return Err(ProtocolError::DecodeError.into());
                    }
                    return Ok(Event::ChangeCipherSpec(payload));
                }
                CONTENT_ALERT => return Err(self.alert_error(&payload)),
                CONTENT_HEARTBEAT if !self.is_client => {
                    debug!("ignoring heartbeat record during handshake");
                }
                _ => return Err(ProtocolError::UnexpectedMessage.into()),
            }
        }
    }

    fn alert_error(&mut self, payload: &[u8]) -> Error {
        if payload.len() < 2 {
            self.teardown_fatal();
            return ProtocolError::DecodeError.into();
        }
        let (level, description) = (payload[0], payload[1]);
        if description == ALERT_CLOSE_NOTIFY {
            self.teardown();
            return Error::ConnectionClosed;
        }
        warn!(level, description, "alert received");
        self.teardown_fatal();
        ProtocolError::AlertReceived(level, description).into()
    }

    /// Read application data into `buf`; `Ok(0)` after an orderly close.
    /// Any protocol or crypto violation tears the connection down and every
    /// later call fails with `ConnectionClosed`.
    pub(crate) fn read_app(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        loop {
            if !self.app_rx.is_empty() {
                let n = buf.len().min(self.app_rx.len());
                buf[..n].copy_from_slice(&self.app_rx[..n]);
                self.app_rx.drain(..n);
                return Ok(n);
            }
            if self.closed {
                if self.fatal {
                    return Err(Error::ConnectionClosed);
                }
                return Ok(0);
            }
            let (content_type, payload) = match self.read_record(timeout) {
                Ok(record) => record,
                // a timeout at a record boundary may be retried
                Err(Error::Timeout) if !self.closed => return Err(Error::Timeout),
                Err(Error::ConnectionClosed) if !self.fatal => {
                    self.teardown();
                    return Ok(0);
                }
                Err(e) => {
                    self.teardown_fatal();
                    return Err(e);
                }
            };
            match content_type {
                CONTENT_APPLICATION_DATA => self.app_rx.extend_from_slice(&payload),
                CONTENT_ALERT => {
                    let err = self.alert_error(&payload);
                    if matches!(err, Error::ConnectionClosed) {
                        return Ok(0);
                    }
                    return Err(err);
                }
                CONTENT_HANDSHAKE => {
                    // post-handshake messages (e.g. HelloRequest) are ignored
                    debug!(len = payload.len(), "ignoring post-handshake message");
                }
                CONTENT_HEARTBEAT if !self.is_client => {
                    debug!("ignoring heartbeat record");
                }
                _ => {
                    self.teardown_fatal();
                    return Err(ProtocolError::UnexpectedMessage.into());
                }
            }
        }
    }

    /// Drop all key material and close the transport.
    pub(crate) fn close(&mut self) {
        self.teardown();
    }

    fn teardown_fatal(&mut self) {
        self.fatal = true;
        self.teardown();
    }

    fn teardown(&mut self) {
        if !self.closed {
            debug!("connection teardown");
        }
        self.closed = true;
        self.read_params = None;
        self.write_params = None;
        self.pending_read = None;
        self.pending_write = None;
        self.master_secret = None;
        self.transport.close();
    }
}

/// Cursor over a handshake message body; underruns become `DecodeError`.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ProtocolError::DecodeError.into());
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u24(&mut self) -> Result<usize> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]) as usize)
    }
}

fn record_header(content_type: u8, version: (u8, u8), len: usize) -> [u8; 5] {
    [
        content_type,
        version.0,
        version.1,
        (len >> 8) as u8,
        len as u8,
    ]
}

/// MAC over the sequence number, the plaintext record header, and the data.
fn record_mac(
    params: &CipherParams,
    seq: u64,
    content_type: u8,
    version: (u8, u8),
    data: &[u8],
) -> Vec<u8> {
    let mut mac = Hmac::new(params.suite.mac, &params.mac_key);
    mac.update(&seq.to_be_bytes());
    mac.update(&[content_type, version.0, version.1]);
    mac.update(&(data.len() as u16).to_be_bytes());
    mac.update(data);
    mac.finalize()
}

fn decrypt_record(
    params: &CipherParams,
    seq: u64,
    content_type: u8,
    version: (u8, u8),
    payload: &[u8],
) -> Result<Vec<u8>> {
    let block = params.suite.block_len();
    let mac_len = params.suite.mac_key_len();
    if payload.len() < 16 + block || (payload.len() - 16) % block != 0 {
        return Err(CryptoError::BadPadding.into());
    }
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&payload[..16]);
    let mut plaintext = payload[16..].to_vec();
    params.aes.cbc_decrypt(&iv, &mut plaintext)?;

    let pad = plaintext[plaintext.len() - 1] as usize;
    if plaintext.len() < pad + 1 + mac_len {
        return Err(CryptoError::BadPadding.into());
    }
    if plaintext[plaintext.len() - 1 - pad..]
        .iter()
        .any(|&b| b as usize != pad)
    {
        return Err(CryptoError::BadPadding.into());
    }
    let data_len = plaintext.len() - mac_len - pad - 1;

    let expected = record_mac(params, seq, content_type, version, &plaintext[..data_len]);
    if plaintext[data_len..data_len + mac_len] != expected[..] {
        warn!(seq, "record MAC mismatch");
        return Err(CryptoError::BadMac.into());
    }
    plaintext.truncate(data_len);
    Ok(plaintext)
}
