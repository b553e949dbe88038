//! RSA with PKCS#1 v1.5 padding.
//!
//! Covers exactly what the TLS 1.2 RSA key exchange needs: block type 2
//! encryption of the premaster secret, the matching decryption (with CRT
//! when the prime factors are available), and block type 1 SHA-1 signatures
//! for CertificateVerify.
//!
//! Padding checks here are not constant-time, so this decryption oracle is
//! distinguishable under timing analysis (Bleichenbacher). The rest of the
//! stack shares that caveat.

use zeroize::Zeroize;

use crate::bigint::BigInt;
use crate::error::{Error, Result};
use crate::hash::Sha1;
use crate::random;

/// ASN.1 DigestInfo header for a SHA-1 hash, precomputed.
const DIGEST_INFO_SHA1: [u8; 15] = [
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
];

/// RSA public key.
#[derive(Clone, Debug)]
pub struct PublicKey {
    pub modulus: BigInt,
    pub exponent: BigInt,
}

/// CRT acceleration parameters: the prime factors and reduced exponents
/// from the PKCS#1 private key encoding.
#[derive(Clone)]
pub struct CrtParams {
    pub prime1: BigInt,
    pub prime2: BigInt,
    pub exponent1: BigInt,
    pub exponent2: BigInt,
    pub coefficient: BigInt,
}

/// RSA private key. Decryption runs through the CRT when `crt` is present
/// and falls back to a plain `c^d mod n` otherwise.
#[derive(Clone)]
pub struct PrivateKey {
    pub modulus: BigInt,
    pub private_exponent: BigInt,
    pub crt: Option<CrtParams>,
}

impl PublicKey {
    /// Modulus length in bytes; every ciphertext and signature block is
    /// exactly this long.
    pub fn block_len(&self) -> usize {
        (self.modulus.nbits() + 7) / 8
    }

    /// PKCS#1 v1.5 encrypt (block type 2, random non-zero padding).
    pub fn encrypt(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let k = self.block_len();
        if msg.len() + 11 > k {
            return Err(Error::MessageTooLong);
        }
        let pad_len = k - 3 - msg.len();
        let mut block = Vec::with_capacity(k);
        block.push(0x00);
        block.push(0x02);
        block.extend_from_slice(&random::nonzero_vec(pad_len)?);
        block.push(0x00);
        block.extend_from_slice(msg);
        let m = BigInt::from_bytes_be(&block);
        block.zeroize();
        let c = m.pow_mod(&self.exponent, &self.modulus)?;
        Ok(c.to_bytes_be(k))
    }
}

impl PrivateKey {
    pub fn block_len(&self) -> usize {
        (self.modulus.nbits() + 7) / 8
    }

    /// PKCS#1 v1.5 decrypt. Returns the message with the padding stripped.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let c = BigInt::from_bytes_be(ciphertext);
        let m = self.private_op(&c)?;
        let mut block = m.to_bytes_be(self.block_len());
        let msg = unpack_block_type2(&block)?;
        block.zeroize();
        Ok(msg)
    }

    /// Sign the SHA-1 digest of `msg` (block type 1, DigestInfo wrapped).
    pub fn sign_sha1(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let k = self.block_len();
        let digest = Sha1::digest(msg);
        let t_len = DIGEST_INFO_SHA1.len() + digest.len();
        if t_len + 11 > k {
            return Err(Error::MessageTooLong);
        }
        let mut block = Vec::with_capacity(k);
        block.push(0x00);
        block.push(0x01);
        block.resize(k - 1 - t_len, 0xff);
        block.push(0x00);
        block.extend_from_slice(&DIGEST_INFO_SHA1);
        block.extend_from_slice(&digest);
        let m = BigInt::from_bytes_be(&block);
        let s = self.private_op(&m)?;
        Ok(s.to_bytes_be(k))
    }

    /// `c^d mod n`, through the CRT when the factorization is known.
    fn private_op(&self, c: &BigInt) -> Result<BigInt> {
        let crt = match &self.crt {
            Some(crt) => crt,
            None => return c.pow_mod(&self.private_exponent, &self.modulus),
        };
        let m1 = c.pow_mod(&crt.exponent1, &crt.prime1)?;
        let m2 = c.pow_mod(&crt.exponent2, &crt.prime2)?;
        // Garner recombination: h = qInv * (m1 - m2) mod p, m = m2 + h*q.
        // m1 is lifted by multiples of p until the subtraction cannot
        // underflow.
        let mut tmp = m1;
        while tmp < m2 {
            tmp.add_assign(&crt.prime1);
        }
        tmp.sub_assign(&m2);
        let h = tmp.mul_mod(&crt.coefficient, &crt.prime1)?;
        let mut m = crt.prime2.mul_mod(&h, &self.modulus)?;
        m.add_assign(&m2);
        Ok(m)
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.private_exponent.zeroize();
        if let Some(crt) = &mut self.crt {
            crt.prime1.zeroize();
            crt.prime2.zeroize();
            crt.exponent1.zeroize();
            crt.exponent2.zeroize();
            crt.coefficient.zeroize();
        }
    }
}

fn unpack_block_type2(block: &[u8]) -> Result<Vec<u8>> {
    if block.is_empty() || block[0] != 0x00 {
        return Err(Error::BadLeadZero);
    }
    if block.len() < 2 || block[1] != 0x02 {
        return Err(Error::BadBlockType);
    }
    let zero = block[2..]
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::NoPaddingTerminator)?;
    Ok(block[2 + zero + 1..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: &str = "E5409A6BD8879B5D22285DDF1638B07342AF154A47A551D64255FF5C651AC8F6\
                     C9D04E0B6CB1E359AD684AC4D90C951FFA29415B88A5D7D277B39D3F7F13B21F\
                     DC5DE36B42A80366FB295A3E5622BDFEFB154939CA431E5D31857C29DADEDDA2\
                     2AFACF7E2FDFA7540A697C15FC9867DCFA986579ECB25A5D191220D672AA9752\
                     2FC16E09E621F29EA1BC9437430574795980AFD28E6DAE6611ED4A117DD00302\
                     5AE939F10510EEB9B73B7BCABFF9871EF8D972F68057AE670BFF357217959ECE\
                     692E1DCB76E09175AA1CE531B84D2BFE63448B9E925BF0291BD993D8F1E9FC06\
                     34865F97FE4DB42705C7C0D99C68B332FF08078DB44D0EB31A0361F415766703";
    const E: &str = "10001";
    const D: &str = "562E841EB8C6B9CC38340E9DF7DF95CDAEAADD091088008CD86135DF490ED9AF\
                     94CC9F1A426159437421F9C1A88AC760BF0D554990C42FAF2A5AB669915F191E\
                     4B1C6C8AFD02E64C876CD3450DE27FA464456B42B35BAA0584C1569CF16FC8C7\
                     D6FA74984E6CF89D6A509F5A309C26A776F96564816BC6F6AA9F1B032316284E\
                     01FDABB4AFFB0B11D06D114C6BC49AAD1CE1A6C8D6EF293E0E832C1E8C329DFE\
                     B6437082738238BD78C91A4E70E55C30CF1CA701653F969669CD8F6B4D9AE36E\
                     33ED8C20CA609D69542E61CEA45E32C98EF590D83C2011DC8E841A22DC90FF24\
                     89EA256490DF8D95975F8622ABD08909CB5BB67E7EB5F2379946BFA0ADBD5FB1";
    const P: &str = "F821A7602035728D3411EEB9F4D329CEC75709F13FCCB55F7E8009E0D9C8307C\
                     6821686CCCFCDB95B1C57DAB47A1B5EDA31058AD99F870BCD3213B9313F12C04\
                     1A214B9A236C6E4D7C016C235FF879A32D9A331701C350CB2B4D2B7D0D930852\
                     6C0D80AC91E92F3E9EC3CFE5229E651DA6E101AB33A4F919AEDF1D215A69DA7B";
    const Q: &str = "EC85B00C8558EB0B2AFD545A39A49E2B995B0A0DADD9CC725248B31065021850\
                     B93EA3F420EBA97D4DFE5F3852AD9D1CA4CB00C3A7B1C6FDA029BE77CA803F08\
                     49611729EECDAD7DC37AA9EF38F90C2D736AC6C7602145E7C7F471D8A08A691D\
                     1568D2F674AC4617EE430782F4B8F97CE2A30229A5921E6A5D0EF549769FE319";
    const DP: &str = "2E6CED8A18BCA750301BE2D4BC2FFE34882B8ADAAE9B389C4368E570428F2833\
                     3EB0717F59E33D9A868672FAE70E24A1EFCE9128FA13F7D3FC94CD36B996782B\
                     D44FC27B7681452A0E379DEA087CCF156EE4D90646F82A57B924592CAEAB81F5\
                     19EE74D2D502122ADF3DB7DA215E0D813CC600AFED9BC257C1D650F6FA99AF9D";
    const DQ: &str = "C4739DF02869DC80202ADDFF3AD59252A043CFABE0F4802D8C4EB9FC2A097D6C\
                     BF105A5991666C1699CB68077E1499E48AB3DA64A84AAEFF4622A603157D43DD\
                     7C255A7A07D16A028574C2E4E1AB6A03EE5387DB5DEB0507293BCDBBA24C9456\
                     05CC553D43573BB8F0BB57E7DBA030091CAD4C448F3338741BEB2AACE40C9531";
    const QINV: &str = "D7162E70767BAA380A7EB10BA37EFC053BA57D0E8A875D70221C33CE7C41530B\
                       5CA086C11E26CD331071B5AEA2EA5B28931490AEB1E8269BDCEAAED806293A29\
                       DA94459216148169A974278208313FB724E4A075E0ADF9C01B7647C0CF84CEFA\
                       F0A115A8D7FF20031649D8C1620C99D8B32316BCA7EE59C5A9DD8B019B2057FE";

    fn big(s: &str) -> BigInt {
        BigInt::from_hex(&s.replace(char::is_whitespace, "")).unwrap()
    }

    fn public_key() -> PublicKey {
        PublicKey {
            modulus: big(N),
            exponent: big(E),
        }
    }

    fn private_key(crt: bool) -> PrivateKey {
        PrivateKey {
            modulus: big(N),
            private_exponent: big(D),
            crt: crt.then(|| CrtParams {
                prime1: big(P),
                prime2: big(Q),
                exponent1: big(DP),
                exponent2: big(DQ),
                coefficient: big(QINV),
            }),
        }
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let msg = b"attack at dawn";
        let ct = public_key().encrypt(msg).unwrap();
        assert_eq!(ct.len(), 256);
        assert_eq!(private_key(false).decrypt(&ct).unwrap(), msg);
    }

    #[test]
    fn test_crt_decrypt_matches_plain() {
        let msg = [0x03, 0x03, 0xde, 0xad, 0xbe, 0xef];
        let ct = public_key().encrypt(&msg).unwrap();
        assert_eq!(private_key(true).decrypt(&ct).unwrap(), msg);
    }

    #[test]
    fn test_sign_sha1_known_answer() {
        let sig = private_key(true).sign_sha1(b"hello").unwrap();
        assert_eq!(
            hex::encode(&sig),
            "93a99e8b131e5ad7ff15b077e7f0ea50825cb4d1a750d62d1f51d8a01d4de4d6\
             e86620a721038b64f9fb624df67280bb3a696dd7429ad0b893516b31c5975461\
             dca2c2dbe3903493394176acbbfe90189c7db838252d9ac200fe649b9126c697\
             edb66613a0df63d52fb2eeeef8635193e9c2148506240949768592623c278480\
             887f8d27a3289865b5f18948844f9913657e0c12b86346445a75ed4b66300245\
             1a1716d9dd6cef79e0e7354304ddbc6f94fc436677942d2bc30b6c23c11e68e4\
             caa09911ad18cb9295fce27f2219a538f3630fe6dc03bf86a66460ef7bfa4e5d\
             6007efc6c57ca99998000cabd475aca5abb56ff1879631fec8d4e6a347234519"
                .replace(char::is_whitespace, "")
        );
    }

    #[test]
    fn test_sign_without_crt_matches() {
        assert_eq!(
            private_key(false).sign_sha1(b"hello").unwrap(),
            private_key(true).sign_sha1(b"hello").unwrap()
        );
    }

    #[test]
    fn test_message_too_long() {
        let msg = vec![0xAA; 256 - 10];
        assert_eq!(public_key().encrypt(&msg), Err(Error::MessageTooLong));
        // largest message that still fits
        let msg = vec![0xAA; 256 - 11];
        let ct = public_key().encrypt(&msg).unwrap();
        assert_eq!(private_key(true).decrypt(&ct).unwrap(), msg);
    }

    fn raw_encrypt(block: &[u8]) -> Vec<u8> {
        let pk = public_key();
        let m = BigInt::from_bytes_be(block);
        m.pow_mod(&pk.exponent, &pk.modulus).unwrap().to_bytes_be(256)
    }

    #[test]
    fn test_decrypt_rejects_bad_padding() {
        let key = private_key(true);

        let mut block = vec![0xFF; 256];
        block[0] = 0x01;
        assert_eq!(key.decrypt(&raw_encrypt(&block)), Err(Error::BadLeadZero));

        block[0] = 0x00;
        block[1] = 0x01;
        assert_eq!(key.decrypt(&raw_encrypt(&block)), Err(Error::BadBlockType));

        block[1] = 0x02;
        // all padding, no terminator
        assert_eq!(
            key.decrypt(&raw_encrypt(&block)),
            Err(Error::NoPaddingTerminator)
        );
    }
}
