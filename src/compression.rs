//! Value packing
//!
//! Two concerns live here:
//!
//! - **Canonical bytes**: the deterministic JSON rendering of a value (object
//!   keys sorted recursively) that identifiers are derived from.
//! - **Packed envelopes**: the storage form handed to cache backends. A packed
//!   value is a small self-describing header followed by the (optionally
//!   compressed) canonical bytes:
//!
//! ```text
//! magic "LDV1" | kind u8 | codec u8 | reserved u16 | uncompressed_len u64 LE | payload
//! ```
//!
//! Packing is memoized per value allocation in a byte-bounded LRU so a value
//! that is stored in several caches is only serialized and compressed once.

use crate::error::{LdictError, Result};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub const MAGIC: &[u8; 4] = b"LDV1";
pub const HEADER_LEN: usize = 16;

/// Payload kinds understood by [`unwrap_envelope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadKind {
    CanonicalJson = 1,
}

impl PayloadKind {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(PayloadKind::CanonicalJson),
            _ => None,
        }
    }
}

/// Compression applied to the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Codec {
    None = 0,
    Lz4 = 1,
    Zstd = 2,
}

impl Codec {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Codec::None),
            1 => Some(Codec::Lz4),
            2 => Some(Codec::Zstd),
            _ => None,
        }
    }

    /// Best codec compiled into this build.
    pub fn preferred() -> Self {
        if cfg!(feature = "compression-lz4") {
            Codec::Lz4
        } else if cfg!(feature = "compression-zstd") {
            Codec::Zstd
        } else {
            Codec::None
        }
    }
}

/// Return a copy of `value` with every object's keys sorted.
pub fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Deterministic bytes used for hashing.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&canonical(value))?)
}

fn compress(codec: Codec, data: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Codec::None => Ok(data.to_vec()),
        Codec::Lz4 => {
            #[cfg(feature = "compression-lz4")]
            {
                Ok(lz4_flex::compress(data))
            }
            #[cfg(not(feature = "compression-lz4"))]
            {
                Err(LdictError::Envelope(
                    "lz4 codec not compiled in (enable feature compression-lz4)".into(),
                ))
            }
        }
        Codec::Zstd => {
            #[cfg(feature = "compression-zstd")]
            {
                Ok(zstd::bulk::compress(data, 3)?)
            }
            #[cfg(not(feature = "compression-zstd"))]
            {
                Err(LdictError::Envelope(
                    "zstd codec not compiled in (enable feature compression-zstd)".into(),
                ))
            }
        }
    }
}

fn decompress(codec: Codec, payload: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
    match codec {
        Codec::None => Ok(payload.to_vec()),
        Codec::Lz4 => {
            #[cfg(feature = "compression-lz4")]
            {
                lz4_flex::decompress(payload, uncompressed_len)
                    .map_err(|e| LdictError::Envelope(format!("lz4 decompression failed: {e}")))
            }
            #[cfg(not(feature = "compression-lz4"))]
            {
                let _ = (payload, uncompressed_len);
                Err(LdictError::Envelope(
                    "lz4 codec not compiled in (enable feature compression-lz4)".into(),
                ))
            }
        }
        Codec::Zstd => {
            #[cfg(feature = "compression-zstd")]
            {
                Ok(zstd::bulk::decompress(payload, uncompressed_len)?)
            }
            #[cfg(not(feature = "compression-zstd"))]
            {
                let _ = (payload, uncompressed_len);
                Err(LdictError::Envelope(
                    "zstd codec not compiled in (enable feature compression-zstd)".into(),
                ))
            }
        }
    }
}

/// Wrap `data` into an envelope.
pub fn wrap_envelope(kind: PayloadKind, codec: Codec, data: &[u8]) -> Result<Vec<u8>> {
    let payload = compress(codec, data)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(kind as u8);
    out.push(codec as u8);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(data.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Validate an envelope and return its uncompressed payload.
pub fn unwrap_envelope(expected: PayloadKind, bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() < HEADER_LEN {
        return Err(LdictError::Envelope(format!(
            "truncated envelope: {} bytes, header needs {HEADER_LEN}",
            bytes.len()
        )));
    }
    if &bytes[..4] != MAGIC {
        return Err(LdictError::Envelope("bad envelope magic".into()));
    }
    let kind = PayloadKind::from_u8(bytes[4])
        .ok_or_else(|| LdictError::Envelope(format!("unknown envelope payload kind {}", bytes[4])))?;
    if kind != expected {
        return Err(LdictError::Envelope(format!(
            "unexpected envelope payload kind {kind:?}, expected {expected:?}"
        )));
    }
    let codec = Codec::from_u8(bytes[5]).ok_or_else(|| {
        LdictError::Envelope(format!("unknown envelope compression codec {}", bytes[5]))
    })?;
    let mut len_buf = [0u8; 8];
    len_buf.copy_from_slice(&bytes[8..16]);
    let uncompressed_len = u64::from_le_bytes(len_buf) as usize;

    let data = decompress(codec, &bytes[HEADER_LEN..], uncompressed_len)?;
    if data.len() != uncompressed_len {
        return Err(LdictError::Envelope(format!(
            "envelope size mismatch: header says {uncompressed_len}, payload has {}",
            data.len()
        )));
    }
    Ok(data)
}

struct MemoEntry {
    // Held so the allocation, and thus the key, stays unique while memoized.
    _value: Arc<Value>,
    packed: Arc<[u8]>,
    tick: u64,
}

/// Recency is tracked by a monotonically increasing tick per use.
#[derive(Default)]
struct PackMemo {
    entries: HashMap<usize, MemoEntry>,
    order: BTreeMap<u64, usize>,
    next_tick: u64,
    size: usize,
}

impl PackMemo {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn hit(&mut self, key: usize) -> Option<Arc<[u8]>> {
        let tick = self.tick();
        let entry = self.entries.get_mut(&key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, key);
        Some(Arc::clone(&entry.packed))
    }

    fn insert(&mut self, key: usize, value: &Arc<Value>, packed: &Arc<[u8]>) {
        let tick = self.tick();
        let entry = MemoEntry {
            _value: Arc::clone(value),
            packed: Arc::clone(packed),
            tick,
        };
        if let Some(old) = self.entries.insert(key, entry) {
            self.order.remove(&old.tick);
            self.size -= old.packed.len();
        }
        self.order.insert(tick, key);
        self.size += packed.len();
    }

    fn evict_to(&mut self, limit: usize) {
        while self.size > limit {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.size -= entry.packed.len();
            }
        }
    }
}

/// Packs values into envelopes, remembering recent results.
pub struct Packer {
    codec: Codec,
    limit: usize,
    memo: RefCell<PackMemo>,
}

impl Packer {
    pub fn new(limit: usize) -> Self {
        Packer::with_codec(Codec::preferred(), limit)
    }

    pub fn with_codec(codec: Codec, limit: usize) -> Self {
        Packer {
            codec,
            limit,
            memo: RefCell::new(PackMemo::default()),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Pack a value, reusing the memoized blob when this allocation was packed before.
    pub fn pack(&self, value: &Arc<Value>) -> Result<Arc<[u8]>> {
        let key = Arc::as_ptr(value) as usize;
        let hit = self.memo.borrow_mut().hit(key);
        if let Some(packed) = hit {
            tracing::trace!(bytes = packed.len(), "pack memo hit");
            return Ok(packed);
        }

        let data = canonical_bytes(value)?;
        let packed: Arc<[u8]> = wrap_envelope(PayloadKind::CanonicalJson, self.codec, &data)?.into();

        let mut memo = self.memo.borrow_mut();
        memo.insert(key, value, &packed);
        memo.evict_to(self.limit);
        Ok(packed)
    }

    pub fn unpack(&self, bytes: &[u8]) -> Result<Value> {
        let data = unwrap_envelope(PayloadKind::CanonicalJson, bytes)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Bytes currently held by the memo.
    pub fn memo_size(&self) -> usize {
        self.memo.borrow().size
    }

    pub fn memo_len(&self) -> usize {
        self.memo.borrow().entries.len()
    }
}
