//! System entropy source.
//!
//! All nonces, IVs, and padding bytes in the stack come through here so the
//! entropy dependency stays in one place.

use crate::error::{Error, Result};

/// Fill `buf` with cryptographically secure random bytes.
pub fn fill(buf: &mut [u8]) -> Result<()> {
    getrandom::getrandom(buf).map_err(|_| Error::RandomSource)
}

/// Allocate a buffer of `len` secure random bytes.
pub fn vec(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    fill(&mut buf)?;
    Ok(buf)
}

/// Allocate `len` random bytes, none of which are zero.
///
/// PKCS#1 v1.5 encryption padding must not contain zero bytes; zeros are
/// re-rolled until the whole buffer is non-zero.
pub fn nonzero_vec(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec(len)?;
    for b in buf.iter_mut() {
        while *b == 0 {
            let mut one = [0u8; 1];
            fill(&mut one)?;
            *b = one[0];
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonzero_vec_has_no_zeros() {
        let buf = nonzero_vec(4096).unwrap();
        assert_eq!(buf.len(), 4096);
        assert!(buf.iter().all(|&b| b != 0));
    }
}
