//! Full client/server handshake over an in-memory transport.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use mintls_core::{
    ClientConfig, Error, Identity, ProtocolError, Result, ServerConfig, TlsClient, TlsServer,
    Transport,
};

const CERT: &[u8] = include_bytes!("data/test-cert.der");
const KEY: &[u8] = include_bytes!("data/test-key.der");

/// One end of an in-memory byte pipe.
struct PipeTransport {
    tx: Option<Sender<Vec<u8>>>,
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    closed: bool,
}

fn pipe() -> (PipeTransport, PipeTransport) {
    let (tx_a, rx_b) = mpsc::channel();
    let (tx_b, rx_a) = mpsc::channel();
    let a = PipeTransport {
        tx: Some(tx_a),
        rx: rx_a,
        pending: Vec::new(),
        closed: false,
    };
    let b = PipeTransport {
        tx: Some(tx_b),
        rx: rx_b,
        pending: Vec::new(),
        closed: false,
    };
    (a, b)
}

impl Transport for PipeTransport {
    fn write_all(&mut self, bufs: &[&[u8]]) -> Result<usize> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        let mut joined = Vec::new();
        for buf in bufs {
            joined.extend_from_slice(buf);
        }
        let len = joined.len();
        let tx = self.tx.as_ref().ok_or(Error::ConnectionClosed)?;
        tx.send(joined).map_err(|_| Error::ConnectionClosed)?;
        Ok(len)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if self.pending.is_empty() {
            match self.rx.recv_timeout(timeout) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => return Err(Error::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn close(&mut self) {
        self.tx = None;
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

fn run_server(transport: PipeTransport) -> thread::JoinHandle<Result<Vec<u8>>> {
    thread::spawn(move || {
        let identity = Identity::from_der(CERT.to_vec(), KEY)?;
        let server = TlsServer::new(ServerConfig::new(identity));
        let mut stream = server.accept(Box::new(transport))?;
        let mut buf = [0u8; 1024];
        let n = stream.read(&mut buf)?;
        stream.write(b"pong from server")?;
        stream.close();
        Ok(buf[..n].to_vec())
    })
}

#[test]
fn test_loopback_handshake_and_echo() {
    let (client_end, server_end) = pipe();
    let server = run_server(server_end);

    let client = TlsClient::new(ClientConfig::default());
    let mut stream = client
        .connect(Box::new(client_end))
        .expect("client handshake");
    assert_eq!(stream.cipher_suite(), Some("TLS_RSA_WITH_AES_128_CBC_SHA"));

    stream.write(b"ping from client").expect("write");
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).expect("read");
    assert_eq!(&buf[..n], b"pong from server");
    stream.close();

    let received = server.join().expect("server thread").expect("server side");
    assert_eq!(received, b"ping from client");
}

#[test]
fn test_large_transfer_spans_records() {
    let (client_end, server_end) = pipe();
    let server = thread::spawn(move || -> Result<Vec<u8>> {
        let identity = Identity::from_der(CERT.to_vec(), KEY)?;
        let server = TlsServer::new(ServerConfig::new(identity));
        let mut stream = server.accept(Box::new(server_end))?;
        let mut collected = Vec::new();
        let mut buf = [0u8; 4096];
        while collected.len() < 40_000 {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        stream.write(&[collected.len() as u8])?;
        stream.close();
        Ok(collected)
    });

    let client = TlsClient::new(ClientConfig::default());
    let mut stream = client
        .connect(Box::new(client_end))
        .expect("client handshake");
    // forces the writer to split across several records
    let payload: Vec<u8> = (0..40_000u32).map(|i| i as u8).collect();
    stream.write(&payload).expect("write");
    let mut ack = [0u8; 1];
    assert_eq!(stream.read(&mut ack).expect("read ack"), 1);
    stream.close();

    let received = server.join().expect("server thread").expect("server side");
    assert_eq!(received, payload);
}

#[test]
fn test_client_rejects_non_tls_peer() {
    let (client_end, mut server_end) = pipe();
    let fake = thread::spawn(move || {
        let mut buf = [0u8; 4096];
        // swallow the ClientHello, answer with an SSLv2-era version
        let _ = server_end.read_timeout(&mut buf, Duration::from_secs(5));
        let _ = server_end.write_all(&[&[0x16, 0x02, 0x00, 0x00, 0x02, 0x01, 0x00]]);
    });

    let client = TlsClient::new(ClientConfig::default());
    let err = client.connect(Box::new(client_end)).err().unwrap();
    assert_eq!(err, Error::Protocol(ProtocolError::BadVersion));
    fake.join().expect("fake peer thread");
}

#[test]
fn test_client_times_out_on_silent_peer() {
    let (client_end, _server_end) = pipe();
    let client = TlsClient::new(ClientConfig {
        identity: None,
        timeout: Duration::from_millis(50),
    });
    let err = client.connect(Box::new(client_end)).err().unwrap();
    assert_eq!(err, Error::Timeout);
}
