//! # mintls-core
//!
//! A minimal TLS 1.2 implementation over the primitives in
//! [`mintls_crypto`]. Client and server sides both speak the RSA key
//! exchange with AES-CBC cipher suites:
//!
//! - `TLS_RSA_WITH_AES_128_CBC_SHA`
//! - `TLS_RSA_WITH_AES_128_CBC_SHA256`
//! - `TLS_RSA_WITH_AES_256_CBC_SHA`
//!
//! A connection is driven through the [`Transport`] trait, so TLS can sit
//! on a TCP socket ([`TcpTransport`]), on another [`TlsStream`], or on
//! anything else that moves bytes. Certificates and keys are loaded from
//! DER through [`Identity`].
//!
//! ```no_run
//! use std::net::TcpStream;
//! use mintls_core::{ClientConfig, TcpTransport, TlsClient};
//!
//! # fn main() -> mintls_core::Result<()> {
//! let tcp = TcpStream::connect("127.0.0.1:8443")?;
//! let client = TlsClient::new(ClientConfig::default());
//! let mut stream = client.connect(Box::new(TcpTransport::new(tcp)))?;
//! stream.write(b"ping")?;
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms, unreachable_pub, unused_qualifications)]
#![forbid(unsafe_code)]

pub mod asn1;
pub mod cipher_suites;
mod client;
mod connection;
pub mod error;
mod identity;
mod params;
mod prf;
mod server;
mod stream;

pub use cipher_suites::{
    CipherSuite, TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_128_CBC_SHA256,
    TLS_RSA_WITH_AES_256_CBC_SHA,
};
pub use client::{ClientConfig, TlsClient};
pub use error::{Asn1Error, CryptoError, Error, ProtocolError, Result};
pub use identity::Identity;
pub use server::{ServerConfig, TlsServer};
pub use stream::{TcpTransport, TlsStream, Transport};
