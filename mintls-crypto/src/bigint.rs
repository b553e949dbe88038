//! Arbitrary-precision unsigned integers.
//!
//! Just enough bignum arithmetic for RSA: addition, subtraction, shifts,
//! multiplication, remainder, and modular exponentiation. Values are
//! non-negative; subtraction requires the subtrahend to be no larger than
//! the minuend.
//!
//! Modular exponentiation uses a per-modulus lookup table ([`MulLookup`])
//! so the inner loop multiplies word-by-word against precomputed powers of
//! 2^64 instead of running a full shift-subtract reduction per step.
//!
//! Nothing here is constant-time.

use core::cmp::Ordering;
use core::fmt;

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// An arbitrary-precision unsigned integer.
///
/// Little-endian 64-bit words. `last` indexes the most significant word in
/// use; any words above it are zero scratch space so arithmetic can carry
/// upward without reallocating.
#[derive(Clone)]
pub struct BigInt {
    words: Vec<u64>,
    last: usize,
}

impl BigInt {
    /// Zero.
    pub fn new() -> Self {
        BigInt {
            words: vec![0],
            last: 0,
        }
    }

    pub fn from_u64(v: u64) -> Self {
        BigInt {
            words: vec![v],
            last: 0,
        }
    }

    /// Parse a big-endian byte string. Leading zero bytes are allowed.
    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        let mut n = BigInt::new();
        for (i, &b) in bytes.iter().rev().enumerate() {
            if b != 0 {
                n.set_byte(i, b);
            }
        }
        n
    }

    /// Parse an unsigned hex string, upper or lower case. Whitespace is
    /// skipped so wrapped constants paste in cleanly.
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut n = BigInt::new();
        let mut digits = 0;
        for c in s.chars() {
            if c.is_whitespace() {
                continue;
            }
            let d = c.to_digit(16).ok_or(Error::BadHex)? as u64;
            digits += 1;
            n.mul2();
            n.mul2();
            n.mul2();
            n.mul2();
            n.words[0] |= d;
        }
        if digits == 0 {
            return Err(Error::BadHex);
        }
        Ok(n)
    }

    /// Uppercase hex with no leading zeros; zero renders as `"0"`.
    pub fn to_hex(&self) -> String {
        if self.is_zero() {
            return "0".to_owned();
        }
        let mut s = format!("{:X}", self.words[self.last]);
        for i in (0..self.last).rev() {
            s.push_str(&format!("{:016X}", self.words[i]));
        }
        s
    }

    /// Serialize as exactly `len` big-endian bytes, truncating or
    /// zero-padding at the most significant end.
    pub fn to_bytes_be(&self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        for i in 0..len {
            out[len - 1 - i] = self.get_byte(i);
        }
        out
    }

    pub fn is_zero(&self) -> bool {
        self.last == 0 && self.words[0] == 0
    }

    /// Number of significant bits; zero has none.
    pub fn nbits(&self) -> usize {
        if self.is_zero() {
            return 0;
        }
        self.last * 64 + (64 - self.words[self.last].leading_zeros() as usize)
    }

    /// Number of significant bytes; zero has none.
    pub fn nbytes(&self) -> usize {
        (self.nbits() + 7) / 8
    }

    /// Bit `i`, counting from the least significant.
    pub fn bit(&self, i: usize) -> bool {
        let w = i / 64;
        w <= self.last && (self.words[w] >> (i % 64)) & 1 == 1
    }

    /// Byte `i`, counting from the least significant. Out of range reads
    /// return zero.
    pub fn get_byte(&self, i: usize) -> u8 {
        let w = i / 8;
        if w > self.last {
            return 0;
        }
        (self.words[w] >> ((i % 8) * 8)) as u8
    }

    /// Set byte `i`, growing the value as needed.
    pub fn set_byte(&mut self, i: usize, v: u8) {
        let w = i / 8;
        self.ensure(w + 1);
        let shift = (i % 8) * 8;
        self.words[w] = (self.words[w] & !(0xffu64 << shift)) | ((v as u64) << shift);
        if w > self.last {
            self.last = w;
        }
        self.fix_last();
    }

    fn ensure(&mut self, n: usize) {
        if self.words.len() < n {
            self.words.resize(n, 0);
        }
    }

    fn fix_last(&mut self) {
        while self.last > 0 && self.words[self.last] == 0 {
            self.last -= 1;
        }
    }

    /// `self += b`.
    pub fn add_assign(&mut self, b: &BigInt) {
        let n = self.last.max(b.last) + 2;
        self.ensure(n);
        let mut carry = false;
        for i in 0..n {
            let bw = if i <= b.last { b.words[i] } else { 0 };
            let (s1, c1) = self.words[i].overflowing_add(bw);
            let (s2, c2) = s1.overflowing_add(carry as u64);
            self.words[i] = s2;
            carry = c1 | c2;
        }
        self.last = n - 1;
        self.fix_last();
    }

    /// `self -= b`. Requires `b <= self`.
    pub fn sub_assign(&mut self, b: &BigInt) {
        debug_assert!(*b <= *self, "subtrahend exceeds minuend");
        let mut borrow = false;
        for i in 0..=self.last {
            let bw = if i <= b.last { b.words[i] } else { 0 };
            let (d1, b1) = self.words[i].overflowing_sub(bw);
            let (d2, b2) = d1.overflowing_sub(borrow as u64);
            self.words[i] = d2;
            borrow = b1 | b2;
        }
        self.fix_last();
    }

    /// `self <<= 1`.
    pub fn mul2(&mut self) {
        self.ensure(self.last + 2);
        let mut carry = 0u64;
        for i in 0..=self.last {
            let w = self.words[i];
            self.words[i] = (w << 1) | carry;
            carry = w >> 63;
        }
        if carry != 0 {
            self.last += 1;
            self.words[self.last] = carry;
        }
    }

    /// `self >>= 1`.
    pub fn div2(&mut self) {
        let mut carry = 0u64;
        for i in (0..=self.last).rev() {
            let w = self.words[i];
            self.words[i] = (w >> 1) | (carry << 63);
            carry = w & 1;
        }
        self.fix_last();
    }

    /// `self <<= 64`.
    fn shl_word(&mut self) {
        self.words.insert(0, 0);
        self.last += 1;
        self.fix_last();
    }

    /// `self = (self + b) mod m`. Both operands must already be below `m`.
    pub fn add_mod(&mut self, b: &BigInt, m: &BigInt) {
        self.add_assign(b);
        if *self >= *m {
            self.sub_assign(m);
        }
    }

    /// `self = (self * 2) mod m`. `self` must already be below `m`.
    pub fn mul2_mod(&mut self, m: &BigInt) {
        self.mul2();
        if *self >= *m {
            self.sub_assign(m);
        }
    }

    /// `self %= m` by shift-subtract.
    pub fn rem_assign(&mut self, m: &BigInt) -> Result<()> {
        if m.is_zero() {
            return Err(Error::DivideByZero);
        }
        if (*self) < *m {
            return Ok(());
        }
        let mut m2 = m.clone();
        let shift = self.nbits() - m2.nbits();
        for _ in 0..shift {
            m2.mul2();
        }
        for _ in 0..=shift {
            if *self >= m2 {
                self.sub_assign(&m2);
            }
            m2.div2();
        }
        Ok(())
    }

    /// `self * b` by shift-and-add over the bits of `b`.
    pub fn mul(&self, b: &BigInt) -> BigInt {
        let mut r = BigInt::new();
        for i in (0..b.nbits()).rev() {
            r.mul2();
            if b.bit(i) {
                r.add_assign(self);
            }
        }
        r
    }

    /// `(self * b) mod m`, bit-serial. Both operands must already be below
    /// `m`. For repeated multiplication against one modulus use
    /// [`MulLookup`] instead.
    pub fn mul_mod(&self, b: &BigInt, m: &BigInt) -> Result<BigInt> {
        if m.is_zero() {
            return Err(Error::DivideByZero);
        }
        let mut r = BigInt::new();
        for i in (0..b.nbits()).rev() {
            r.mul2_mod(m);
            if b.bit(i) {
                r.add_mod(self, m);
            }
        }
        Ok(r)
    }

    /// `self^exp mod m` by square-and-multiply with a [`MulLookup`] table.
    pub fn pow_mod(&self, exp: &BigInt, m: &BigInt) -> Result<BigInt> {
        let mut base = self.clone();
        if base >= *m {
            base.rem_assign(m)?;
        }
        let lookup = MulLookup::new(m)?;
        let mut r = BigInt::from_u64(1);
        let bits = (exp.last + 1) * 64;
        for i in (0..bits).rev() {
            r = lookup.mul_mod(&r, &r, true)?;
            if exp.bit(i) {
                r = lookup.mul_mod(&r, &base, true)?;
            }
        }
        r.rem_assign(m)?;
        Ok(r)
    }

    /// `self + b*scalar`, accumulated in place.
    fn add_scaled(&mut self, b: &BigInt, scalar: u64) {
        let n = self.last.max(b.last + 1) + 2;
        self.ensure(n);
        let mut carry = 0u128;
        for i in 0..=b.last {
            let acc = self.words[i] as u128 + (b.words[i] as u128) * (scalar as u128) + carry;
            self.words[i] = acc as u64;
            carry = acc >> 64;
        }
        let mut i = b.last + 1;
        while carry != 0 && i < n {
            let acc = self.words[i] as u128 + carry;
            self.words[i] = acc as u64;
            carry = acc >> 64;
            i += 1;
        }
        self.last = n - 1;
        self.fix_last();
    }
}

impl Default for BigInt {
    fn default() -> Self {
        BigInt::new()
    }
}

impl PartialEq for BigInt {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BigInt {}

impl PartialOrd for BigInt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BigInt {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.last != other.last {
            return self.last.cmp(&other.last);
        }
        for i in (0..=self.last).rev() {
            match self.words[i].cmp(&other.words[i]) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Debug for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BigInt({})", self.to_hex())
    }
}

impl Zeroize for BigInt {
    fn zeroize(&mut self) {
        self.words.zeroize();
        self.words.clear();
        self.words.push(0);
        self.last = 0;
    }
}

/// Precomputed powers of 2^64 modulo a fixed modulus.
///
/// `table[i] = 2^(64*i) mod m`, enough entries to cover the double-width
/// product of two partially reduced operands. Turns modular multiplication
/// into a schoolbook word product followed by one scaled-add per product
/// word.
pub struct MulLookup {
    modulus: BigInt,
    table: Vec<BigInt>,
}

impl MulLookup {
    pub fn new(modulus: &BigInt) -> Result<Self> {
        if modulus.is_zero() {
            return Err(Error::DivideByZero);
        }
        let len = (modulus.last + 3) * 2 + 1;
        let mut table = Vec::with_capacity(len);
        let mut cur = BigInt::from_u64(1);
        cur.rem_assign(modulus)?;
        for _ in 0..len {
            table.push(cur.clone());
            cur.shl_word();
            cur.rem_assign(modulus)?;
        }
        Ok(MulLookup {
            modulus: modulus.clone(),
            table,
        })
    }

    /// `(a * b) mod m` through the lookup table.
    ///
    /// With `weak` set the result is only partially reduced: congruent to
    /// the true product but possibly larger than the modulus. Weak results
    /// are valid inputs to further calls; fully reduce before comparing or
    /// serializing.
    pub fn mul_mod(&self, a: &BigInt, b: &BigInt, weak: bool) -> Result<BigInt> {
        let mut prod = vec![0u64; a.last + b.last + 3];
        for i in 0..=a.last {
            if a.words[i] == 0 {
                continue;
            }
            for j in 0..=b.last {
                let p = (a.words[i] as u128) * (b.words[j] as u128);
                add_word_at(&mut prod, i + j, p as u64);
                add_word_at(&mut prod, i + j + 1, (p >> 64) as u64);
            }
        }
        let mut r = BigInt::new();
        r.ensure(self.modulus.last + 3);
        for (w, &pw) in prod.iter().enumerate() {
            if pw != 0 {
                r.add_scaled(&self.table[w], pw);
            }
        }
        if !weak {
            r.rem_assign(&self.modulus)?;
        }
        Ok(r)
    }
}

fn add_word_at(buf: &mut [u64], idx: usize, v: u64) {
    if v == 0 {
        return;
    }
    let (sum, mut carry) = buf[idx].overflowing_add(v);
    buf[idx] = sum;
    let mut i = idx + 1;
    while carry && i < buf.len() {
        let (s, c) = buf[i].overflowing_add(1);
        buf[i] = s;
        carry = c;
        i += 1;
    }
}
