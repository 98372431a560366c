//! Group elements used as identifiers
//!
//! Every identifier in this crate is an element of the group of 4x4 upper
//! unitriangular matrices over the prime field `Z_p`, `p = 2^64 - 59`.
//! Such a matrix is fully described by its six cells above the diagonal:
//!
//! ```text
//! | 1  a12 a13 a14 |
//! | 0   1  a23 a24 |
//! | 0   0   1  a34 |
//! | 0   0   0   1  |
//! ```
//!
//! Three subsets matter to callers:
//!
//! - **Unordered**: only `a14` set. These elements are central and commute
//!   with every other element.
//! - **Hybrid**: the first superdiagonal is zero. Hybrids commute with each
//!   other but not with ordered elements.
//! - **Ordered**: anything else. Composition order is observable.
//!
//! Data fields get hybrid identifiers, functions get ordered ones, which is
//! what makes field insertion order irrelevant while application order is not.

use crate::error::{LdictError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;
use std::iter::Product;
use std::ops::Mul;
use std::str::FromStr;

/// Field modulus: the largest prime below 2^64.
pub const P: u64 = 18_446_744_073_709_551_557;

/// Length of the textual identifier.
pub const DIGITS: usize = 64;

/// Number of bytes in the numeric encoding (six 64-bit cells).
pub const ID_BYTES: usize = 48;

const ALPHABET: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-.";

// Cell positions inside `Hosh::cells`.
const A12: usize = 0;
const A23: usize = 1;
const A34: usize = 2;
const A13: usize = 3;
const A24: usize = 4;
const A14: usize = 5;

// Order of the cells in the encoded forms, most central first.
const ENCODING_ORDER: [usize; 6] = [A14, A13, A24, A12, A23, A34];

/// Element type, decided by which cells are non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Etype {
    Unordered,
    Hybrid,
    Ordered,
}

impl Etype {
    fn tag(self) -> u8 {
        match self {
            Etype::Unordered => b'u',
            Etype::Hybrid => b'h',
            Etype::Ordered => b'o',
        }
    }
}

impl fmt::Display for Etype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Etype::Unordered => "unordered",
            Etype::Hybrid => "hybrid",
            Etype::Ordered => "ordered",
        };
        f.write_str(name)
    }
}

#[inline]
fn add(a: u64, b: u64) -> u64 {
    ((a as u128 + b as u128) % P as u128) as u64
}

#[inline]
fn mul(a: u64, b: u64) -> u64 {
    ((a as u128 * b as u128) % P as u128) as u64
}

#[inline]
fn neg(a: u64) -> u64 {
    if a == 0 {
        0
    } else {
        P - a
    }
}

/// A group element.
///
/// `Hosh` is `Copy`; multiplication is the group operation.
///
/// # Examples
///
/// ```
/// use ldict::hosh::{Etype, Hosh};
///
/// let a = Hosh::from_bytes(Etype::Hybrid, b"a");
/// let b = Hosh::from_bytes(Etype::Hybrid, b"b");
/// assert_eq!(a * b, b * a);
///
/// let f = Hosh::from_bytes(Etype::Ordered, b"f");
/// assert_ne!(a * f, f * a);
/// assert_eq!(a * f * f.inv(), a);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hosh {
    cells: [u64; 6],
}

impl Hosh {
    /// The neutral element.
    pub const fn identity() -> Self {
        Hosh { cells: [0; 6] }
    }

    /// Derive an element of the requested type from arbitrary bytes.
    ///
    /// SHA-512 over a type tag and the content; the digest words are reduced
    /// mod `P` into the cells the type allows.
    pub fn from_bytes(etype: Etype, bytes: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update([etype.tag()]);
        hasher.update(bytes);
        let digest = hasher.finalize();

        let mut words = [0u64; 8];
        for (word, chunk) in words.iter_mut().zip(digest.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *word = u64::from_be_bytes(buf) % P;
        }

        let mut cells = [0u64; 6];
        match etype {
            Etype::Unordered => {
                cells[A14] = words[0];
            }
            Etype::Hybrid => {
                cells[A14] = words[0];
                cells[A13] = words[1];
                cells[A24] = words[2];
            }
            Etype::Ordered => {
                cells[A14] = words[0];
                cells[A13] = words[1];
                cells[A24] = words[2];
                cells[A12] = words[3];
                cells[A23] = words[4];
                cells[A34] = words[5];
                // All-zero superdiagonal has probability ~2^-192, but keep the type honest.
                if cells[A12] == 0 && cells[A23] == 0 && cells[A34] == 0 {
                    cells[A12] = 1;
                }
            }
        }
        Hosh { cells }
    }

    /// Build directly from cells given in encoding order `[a14, a13, a24, a12, a23, a34]`.
    pub fn from_cells(encoded: [u64; 6]) -> Result<Self> {
        let mut cells = [0u64; 6];
        for (value, &pos) in encoded.iter().zip(ENCODING_ORDER.iter()) {
            if *value >= P {
                return Err(LdictError::WrongId(format!(
                    "cell value {value} is not below the modulus"
                )));
            }
            cells[pos] = *value;
        }
        Ok(Hosh { cells })
    }

    /// Cells in encoding order `[a14, a13, a24, a12, a23, a34]`.
    pub fn cells(&self) -> [u64; 6] {
        ENCODING_ORDER.map(|pos| self.cells[pos])
    }

    pub fn etype(&self) -> Etype {
        let c = &self.cells;
        if c[A12] == 0 && c[A23] == 0 && c[A34] == 0 {
            if c[A13] == 0 && c[A24] == 0 {
                Etype::Unordered
            } else {
                Etype::Hybrid
            }
        } else {
            Etype::Ordered
        }
    }

    pub fn is_identity(&self) -> bool {
        self.cells == [0; 6]
    }

    /// Group inverse.
    pub fn inv(&self) -> Self {
        let a = &self.cells;
        let b12 = neg(a[A12]);
        let b23 = neg(a[A23]);
        let b34 = neg(a[A34]);
        let b13 = add(neg(a[A13]), mul(a[A12], a[A23]));
        let b24 = add(neg(a[A24]), mul(a[A23], a[A34]));
        let b14 = neg(add(add(a[A14], mul(a[A12], b24)), mul(a[A13], b34)));
        let mut cells = [0u64; 6];
        cells[A12] = b12;
        cells[A23] = b23;
        cells[A34] = b34;
        cells[A13] = b13;
        cells[A24] = b24;
        cells[A14] = b14;
        Hosh { cells }
    }

    /// Repeated self-composition, `self^k`.
    pub fn pow(&self, mut k: u64) -> Self {
        let mut base = *self;
        let mut acc = Hosh::identity();
        while k > 0 {
            if k & 1 == 1 {
                acc = acc * base;
            }
            base = base * base;
            k >>= 1;
        }
        acc
    }

    /// Position element used to split one identifier among several outputs.
    ///
    /// The `c`-th element is derived from half a row of `-` followed by `c`
    /// right-aligned in half a row of `.`; it is central.
    pub fn rho(c: usize) -> Self {
        let half = DIGITS / 2;
        let text = format!("{}{:.>width$}", "-".repeat(half), c, width = half);
        Hosh::from_bytes(Etype::Unordered, text.as_bytes())
    }

    /// Numeric encoding: 48 big-endian bytes in encoding order.
    pub fn to_bytes(&self) -> [u8; ID_BYTES] {
        let mut out = [0u8; ID_BYTES];
        for (chunk, value) in out.chunks_exact_mut(8).zip(self.cells()) {
            chunk.copy_from_slice(&value.to_be_bytes());
        }
        out
    }

    pub fn from_id_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ID_BYTES {
            return Err(LdictError::WrongId(format!(
                "expected {ID_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let mut encoded = [0u64; 6];
        for (value, chunk) in encoded.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *value = u64::from_be_bytes(buf);
        }
        Hosh::from_cells(encoded)
    }

    /// Canonical textual identifier, `DIGITS` characters.
    pub fn id(&self) -> String {
        let bytes = self.to_bytes();
        let mut out = String::with_capacity(DIGITS);
        for group in bytes.chunks_exact(3) {
            let n = (group[0] as u32) << 16 | (group[1] as u32) << 8 | group[2] as u32;
            for shift in [18u32, 12, 6, 0] {
                out.push(ALPHABET[((n >> shift) & 0x3f) as usize] as char);
            }
        }
        out
    }

    /// Parse a textual identifier produced by [`Hosh::id`].
    pub fn from_id(id: &str) -> Result<Self> {
        let raw = id.as_bytes();
        if raw.len() != DIGITS {
            return Err(LdictError::WrongId(format!(
                "expected {DIGITS} characters, got {}: {id:?}",
                raw.len()
            )));
        }
        let mut bytes = [0u8; ID_BYTES];
        for (group, out) in raw.chunks_exact(4).zip(bytes.chunks_exact_mut(3)) {
            let mut n = 0u32;
            for &ch in group {
                let digit = decode_digit(ch).ok_or_else(|| {
                    LdictError::WrongId(format!("invalid character {:?} in {id:?}", ch as char))
                })?;
                n = n << 6 | digit;
            }
            out[0] = (n >> 16) as u8;
            out[1] = (n >> 8) as u8;
            out[2] = n as u8;
        }
        Hosh::from_id_bytes(&bytes)
    }

    /// Last characters of the identifier, for display.
    pub fn short(&self) -> String {
        let id = self.id();
        id[id.len() - 8..].to_string()
    }
}

fn decode_digit(ch: u8) -> Option<u32> {
    match ch {
        b'0'..=b'9' => Some((ch - b'0') as u32),
        b'A'..=b'Z' => Some((ch - b'A') as u32 + 10),
        b'a'..=b'z' => Some((ch - b'a') as u32 + 36),
        b'-' => Some(62),
        b'.' => Some(63),
        _ => None,
    }
}

impl Default for Hosh {
    fn default() -> Self {
        Hosh::identity()
    }
}

impl Mul for Hosh {
    type Output = Hosh;

    fn mul(self, other: Hosh) -> Hosh {
        let a = &self.cells;
        let b = &other.cells;
        let mut cells = [0u64; 6];
        cells[A12] = add(a[A12], b[A12]);
        cells[A23] = add(a[A23], b[A23]);
        cells[A34] = add(a[A34], b[A34]);
        cells[A13] = add(add(a[A13], b[A13]), mul(a[A12], b[A23]));
        cells[A24] = add(add(a[A24], b[A24]), mul(a[A23], b[A34]));
        cells[A14] = add(
            add(add(a[A14], b[A14]), mul(a[A12], b[A24])),
            mul(a[A13], b[A34]),
        );
        Hosh { cells }
    }
}

impl<'a> Mul<&'a Hosh> for Hosh {
    type Output = Hosh;

    fn mul(self, other: &'a Hosh) -> Hosh {
        self * *other
    }
}

impl Product for Hosh {
    fn product<I: Iterator<Item = Hosh>>(iter: I) -> Hosh {
        iter.fold(Hosh::identity(), |acc, h| acc * h)
    }
}

impl<'a> Product<&'a Hosh> for Hosh {
    fn product<I: Iterator<Item = &'a Hosh>>(iter: I) -> Hosh {
        iter.fold(Hosh::identity(), |acc, h| acc * h)
    }
}

impl fmt::Display for Hosh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl fmt::Debug for Hosh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hosh({})", self.id())
    }
}

impl FromStr for Hosh {
    type Err = LdictError;

    fn from_str(s: &str) -> Result<Self> {
        Hosh::from_id(s)
    }
}

impl Serialize for Hosh {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id())
    }
}

impl<'de> Deserialize<'de> for Hosh {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Hosh::from_id(&id).map_err(serde::de::Error::custom)
    }
}
