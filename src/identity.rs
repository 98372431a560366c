//! Identifier derivation for fields and the solve step of application

use crate::compression::canonical_bytes;
use crate::error::{LdictError, Result};
use crate::hosh::{Etype, Hosh, DIGITS, P};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Positional text encoding of a field name.
///
/// The first two characters (padded with `-`), an underscore, then the hex of
/// the remaining UTF-8 bytes padded with `0`, cut to `DIGITS` characters.
///
/// ```
/// use ldict::identity::key2id;
///
/// assert_eq!(key2id("y").unwrap(), format!("y-_{}", "0".repeat(61)));
/// assert!(key2id("long bad field name").unwrap().starts_with("lo_6e6720"));
/// ```
pub fn key2id(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(LdictError::WrongKeyType(name.to_string()));
    }
    let mut prefix: String = name.chars().take(2).collect();
    while prefix.chars().count() < 2 {
        prefix.push('-');
    }
    let head_len: usize = name.chars().take(2).map(char::len_utf8).sum();
    let mut rest: String = name.as_bytes()[head_len..]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    let width = DIGITS - 3;
    if rest.len() < width {
        rest.push_str(&"0".repeat(width - rest.len()));
    }
    rest.truncate(width);
    Ok(format!("{prefix}_{rest}"))
}

/// Non-zero exponent that binds a value identifier to a field name.
///
/// Hashes the positional encoding together with the full name, so long names
/// sharing a truncated encoding still get distinct scalars.
pub fn key_scalar(name: &str) -> Result<u64> {
    let mut hasher = Sha256::new();
    hasher.update(key2id(name)?.as_bytes());
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    let k = u64::from_be_bytes(buf) % P;
    Ok(if k == 0 { 1 } else { k })
}

/// Identifier of a value, independent of the field holding it.
pub fn value_hosh(value: &Value) -> Result<Hosh> {
    Ok(Hosh::from_bytes(Etype::Hybrid, &canonical_bytes(value)?))
}

/// Identifier of the data field `name = value`.
pub fn field_hosh(name: &str, value: &Value) -> Result<Hosh> {
    let k = key_scalar(name)?;
    Ok(value_hosh(value)?.pow(k))
}

/// Split the identifier left for the outputs of one application.
///
/// `uf` is the container identifier after applying the function and `kept`
/// the identifiers of the fields that survive untouched, in slot order. The
/// returned identifiers, multiplied in order and followed by `kept`, give `uf`
/// back. The split among several outputs uses the central [`Hosh::rho`]
/// elements so each output gets a distinct identifier.
pub fn solve(uf: Hosh, kept: &[Hosh], outputs: usize) -> Vec<Hosh> {
    let previous: Hosh = kept.iter().product();
    let ufu = uf * previous.inv();
    match outputs {
        0 => Vec::new(),
        1 => vec![ufu],
        n => {
            let mut ids = Vec::with_capacity(n);
            let mut acc = Hosh::identity();
            for i in 0..n - 1 {
                let id = ufu * Hosh::rho(i);
                acc = acc * id;
                ids.push(id);
            }
            ids.push(acc.inv() * ufu);
            ids
        }
    }
}
