//! Error types for the protocol layer.

use core::fmt;

/// Result type for protocol operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Top-level error for connections, handshakes, and parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Transport I/O failure
    Io(String),

    /// A read did not complete within the allowed time
    Timeout,

    /// The peer closed the transport
    ConnectionClosed,

    /// The peer violated the protocol
    Protocol(ProtocolError),

    /// A cryptographic check failed
    Crypto(CryptoError),

    /// Certificate or key DER could not be decoded
    Asn1(Asn1Error),
}

/// Protocol-level handshake and record failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// A message arrived that the current state does not allow
    UnexpectedMessage,

    /// Record or hello version is not TLS 1.2 compatible
    BadVersion,

    /// Record length exceeds the protocol maximum
    RecordOverflow,

    /// A message was truncated or malformed
    DecodeError,

    /// No mutually supported cipher suite
    NoCipherSuite,

    /// The peer insisted on compression
    BadCompression,

    /// ClientHello carried a session id, which we never issue
    BadSessionId,

    /// ClientKeyExchange length does not match the server key modulus
    BadKeyExchangeLength,

    /// The peer did not provide a certificate we require
    MissingCertificate,

    /// The peer sent an alert
    AlertReceived(u8, u8),
}

/// Failed cryptographic checks during the handshake or on records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// CBC padding was inconsistent
    BadPadding,

    /// Record MAC did not verify
    BadMac,

    /// Decrypted premaster secret had the wrong shape
    BadPremaster,

    /// Finished verify_data mismatch
    FinishedVerifyFailed,

    /// A primitive operation failed
    Primitive(mintls_crypto::Error),
}

/// DER schema decoding failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asn1Error {
    /// Input ended inside an element
    Eof,

    /// An element's tag does not match the schema
    WrongTag,

    /// More elements in a sequence than the schema describes
    UnexpectedField,

    /// Multi-byte tag numbers are not supported
    UnsupportedTag,

    /// Indefinite lengths are not supported
    UnsupportedLength,

    /// A required element is absent from the decoded tree
    MissingField(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(msg) => write!(f, "i/o error: {msg}"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::ConnectionClosed => write!(f, "connection closed by peer"),
            Error::Protocol(e) => write!(f, "protocol error: {e}"),
            Error::Crypto(e) => write!(f, "crypto error: {e}"),
            Error::Asn1(e) => write!(f, "asn.1 error: {e}"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnexpectedMessage => write!(f, "unexpected message"),
            ProtocolError::BadVersion => write!(f, "unsupported protocol version"),
            ProtocolError::RecordOverflow => write!(f, "record too large"),
            ProtocolError::DecodeError => write!(f, "malformed message"),
            ProtocolError::NoCipherSuite => write!(f, "no shared cipher suite"),
            ProtocolError::BadCompression => write!(f, "unsupported compression"),
            ProtocolError::BadSessionId => write!(f, "unexpected session id"),
            ProtocolError::BadKeyExchangeLength => {
                write!(f, "client key exchange length mismatch")
            }
            ProtocolError::MissingCertificate => write!(f, "peer certificate missing"),
            ProtocolError::AlertReceived(level, desc) => {
                write!(f, "alert received (level {level}, description {desc})")
            }
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::BadPadding => write!(f, "bad record padding"),
            CryptoError::BadMac => write!(f, "record MAC verification failed"),
            CryptoError::BadPremaster => write!(f, "malformed premaster secret"),
            CryptoError::FinishedVerifyFailed => write!(f, "finished verify_data mismatch"),
            CryptoError::Primitive(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for Asn1Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asn1Error::Eof => write!(f, "unexpected end of input"),
            Asn1Error::WrongTag => write!(f, "tag does not match schema"),
            Asn1Error::UnexpectedField => write!(f, "element not described by schema"),
            Asn1Error::UnsupportedTag => write!(f, "multi-byte tags not supported"),
            Asn1Error::UnsupportedLength => write!(f, "indefinite lengths not supported"),
            Asn1Error::MissingField(name) => write!(f, "required element missing: {name}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<mintls_crypto::Error> for Error {
    fn from(e: mintls_crypto::Error) -> Self {
        Error::Crypto(CryptoError::Primitive(e))
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        Error::Crypto(e)
    }
}

impl From<Asn1Error> for Error {
    fn from(e: Asn1Error) -> Self {
        Error::Asn1(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Error::Timeout,
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            _ => Error::Io(e.to_string()),
        }
    }
}
