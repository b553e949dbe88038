//! # mintls-crypto
//!
//! Self-contained cryptographic primitives for mintls. Nothing in this crate
//! knows about TLS; it provides the raw material the protocol layer is built
//! from:
//!
//! - Arbitrary-precision unsigned integers ([`bigint::BigInt`])
//! - MD5 / SHA-1 / SHA-256 ([`hash`])
//! - HMAC ([`hmac`])
//! - AES-128/192/256 with CBC mode ([`aes`])
//! - RSA PKCS#1 v1.5 encrypt / decrypt / sign ([`rsa`])
//! - A single system entropy shim ([`random`])
//!
//! The algorithm sets are closed and known at compile time, so algorithms
//! are selected through plain enums ([`hash::HashAlgorithm`],
//! [`aes::BlockCipherAlgorithm`]) rather than trait objects.
//!
//! None of the arithmetic here is constant-time; this crate is not hardened
//! against side channels.

#![warn(rust_2018_idioms, unreachable_pub, unused_qualifications)]
#![forbid(unsafe_code)]

pub mod aes;
pub mod bigint;
pub mod error;
pub mod hash;
pub mod hmac;
pub mod random;
pub mod rsa;

pub use error::{Error, Result};
