use ldict::compression::{unwrap_envelope, wrap_envelope, Codec, Packer, PayloadKind};
use serde_json::json;
use std::sync::Arc;

fn make_envelope(kind: u8, codec: u8, uncompressed_len: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + payload.len());
    out.extend_from_slice(b"LDV1");
    out.push(kind);
    out.push(codec);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&uncompressed_len.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

#[test]
fn unwrap_rejects_truncated_header() {
    let truncated = b"LDV1\x01\x00".to_vec();
    let err = unwrap_envelope(PayloadKind::CanonicalJson, &truncated).unwrap_err();
    assert!(err.to_string().contains("truncated envelope"));
}

#[test]
fn unwrap_rejects_bad_magic() {
    let mut bytes = make_envelope(1, 0, 0, b"");
    bytes[0] = b'X';
    let err = unwrap_envelope(PayloadKind::CanonicalJson, &bytes).unwrap_err();
    assert!(err.to_string().contains("bad envelope magic"));
}

#[test]
fn unwrap_rejects_unknown_kind() {
    let bytes = make_envelope(99, 0, 0, b"");
    let err = unwrap_envelope(PayloadKind::CanonicalJson, &bytes).unwrap_err();
    assert!(err.to_string().contains("unknown envelope payload kind"));
}

#[test]
fn unwrap_rejects_unknown_codec() {
    let bytes = make_envelope(PayloadKind::CanonicalJson as u8, 99, 0, b"");
    let err = unwrap_envelope(PayloadKind::CanonicalJson, &bytes).unwrap_err();
    assert!(err.to_string().contains("unknown envelope compression codec"));
}

#[test]
fn unwrap_rejects_size_mismatch_for_none_codec() {
    // codec=0 (None) but uncompressed_len doesn't match payload length.
    let bytes = make_envelope(PayloadKind::CanonicalJson as u8, 0, 5, b"xyz");
    let err = unwrap_envelope(PayloadKind::CanonicalJson, &bytes).unwrap_err();
    assert!(err.to_string().contains("envelope size mismatch"));
}

#[test]
fn unwrap_accepts_none_codec_when_sizes_match() {
    let bytes = make_envelope(PayloadKind::CanonicalJson as u8, 0, 3, b"xyz");
    let out = unwrap_envelope(PayloadKind::CanonicalJson, &bytes).unwrap();
    assert_eq!(out, b"xyz");
}

#[cfg(feature = "compression-lz4")]
#[test]
fn lz4_envelope_roundtrip() {
    let data = vec![b'a'; 4096];
    let wrapped = wrap_envelope(PayloadKind::CanonicalJson, Codec::Lz4, &data).unwrap();
    assert!(wrapped.len() < data.len());
    assert_eq!(wrapped[5], Codec::Lz4 as u8);
    assert_eq!(unwrap_envelope(PayloadKind::CanonicalJson, &wrapped).unwrap(), data);
}

#[cfg(feature = "compression-zstd")]
#[test]
fn zstd_envelope_roundtrip() {
    let data = vec![b'z'; 4096];
    let wrapped = wrap_envelope(PayloadKind::CanonicalJson, Codec::Zstd, &data).unwrap();
    assert_eq!(unwrap_envelope(PayloadKind::CanonicalJson, &wrapped).unwrap(), data);
}

#[cfg(not(feature = "compression-zstd"))]
#[test]
fn zstd_without_feature_is_reported() {
    let err = wrap_envelope(PayloadKind::CanonicalJson, Codec::Zstd, b"x").unwrap_err();
    assert!(err.to_string().contains("not compiled in"));
}

#[test]
fn packer_output_unpacks_with_fresh_packer() {
    let value = Arc::new(json!({"b": [1, 2, 3], "a": null}));
    let packed = Packer::new(1 << 20).pack(&value).unwrap();
    let back = Packer::with_codec(Codec::None, 0).unpack(&packed).unwrap();
    assert_eq!(back, *value);
}
