//! Error types for the crypto primitives.

use core::fmt;

/// Result type for crypto operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur in the primitive layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Modulus or divisor was zero
    DivideByZero,

    /// Input was not a valid hex string
    BadHex,

    /// Buffer length is not a multiple of the cipher block size
    BadBlockLength,

    /// Cipher key length does not match the selected algorithm
    BadKeyLength,

    /// Message does not fit in the PKCS#1 block for this modulus
    MessageTooLong,

    /// PKCS#1 block does not start with a zero byte
    BadLeadZero,

    /// PKCS#1 block type byte is wrong
    BadBlockType,

    /// PKCS#1 padding has no terminating zero byte
    NoPaddingTerminator,

    /// The system random source failed
    RandomSource,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DivideByZero => write!(f, "divide or modulo by zero"),
            Error::BadHex => write!(f, "invalid hex string"),
            Error::BadBlockLength => write!(f, "length is not a multiple of the block size"),
            Error::BadKeyLength => write!(f, "key length does not match the cipher"),
            Error::MessageTooLong => write!(f, "message too long for PKCS#1 block"),
            Error::BadLeadZero => write!(f, "PKCS#1 block missing leading zero byte"),
            Error::BadBlockType => write!(f, "PKCS#1 block type mismatch"),
            Error::NoPaddingTerminator => write!(f, "PKCS#1 padding terminator not found"),
            Error::RandomSource => write!(f, "system random source failure"),
        }
    }
}

impl std::error::Error for Error {}
