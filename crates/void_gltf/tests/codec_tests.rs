//! Integration tests for void_gltf

use serde_json::json;
use void_gltf::glb::{self, CHUNK_BIN, CHUNK_JSON, MAGIC};
use void_gltf::*;

fn container(version: u32, chunks: &[(u32, u32, &[u8])]) -> Vec<u8> {
    let body_len: usize = chunks.iter().map(|(_, _, data)| 8 + data.len()).sum();
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&((12 + body_len) as u32).to_le_bytes());
    for (declared_len, kind, data) in chunks {
        out.extend_from_slice(&declared_len.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

#[test]
fn test_parse_plain_json() {
    let bytes = br#"  {"asset":{"version":"2.0"},"nodes":[{"name":"a"}]}"#;
    let document = parse(bytes).unwrap();
    assert_eq!(document.container(), ContainerKind::Json);
    assert_eq!(document.node_count(), 1);
    assert_eq!(document.node_name(0).unwrap(), Some("a"));
}

#[test]
fn test_parse_json_with_bom() {
    let mut bytes = vec![0xEF, 0xBB, 0xBF];
    bytes.extend_from_slice(br#"{"nodes":[]}"#);
    let document = parse(&bytes).unwrap();
    assert_eq!(document.node_count(), 0);
}

#[test]
fn test_parse_container() {
    let json = br#"{"nodes":[{"extensions":{"OMI_link":{"uri":"x"}}}]}"#;
    let bytes = glb::write(json, Some(&[7, 7])).unwrap();
    let document = parse(&bytes).unwrap();

    assert_eq!(document.container(), ContainerKind::Binary);
    assert_eq!(document.binary(), Some(&[7u8, 7, 0, 0][..]));
    assert_eq!(
        document.node_extension(0, "OMI_link").unwrap(),
        Some(&json!({ "uri": "x" }))
    );
}

#[test]
fn test_unsupported_version_is_distinct() {
    let bytes = container(1, &[(2, CHUNK_JSON, b"{}")]);
    let err = parse(&bytes).unwrap_err();
    assert!(matches!(err, CodecError::UnsupportedVersion(1)));
    assert!(err.is_container_error());
}

#[test]
fn test_truncated_chunk_is_distinct() {
    let bytes = container(2, &[(64, CHUNK_JSON, b"{}  ")]);
    let err = parse(&bytes).unwrap_err();
    assert!(matches!(
        err,
        CodecError::TruncatedChunk { declared: 64, available: 4 }
    ));
}

#[test]
fn test_non_json_first_chunk() {
    let bytes = container(2, &[(4, CHUNK_BIN, &[0, 0, 0, 0])]);
    assert!(matches!(parse(&bytes), Err(CodecError::NonJsonChunk(CHUNK_BIN))));
}

#[test]
fn test_not_this_format() {
    let err = parse(b"PK\x03\x04 some zip archive").unwrap_err();
    assert!(matches!(err, CodecError::BadMagic(_)));

    let err = parse(b"").unwrap_err();
    assert!(matches!(err, CodecError::TruncatedHeader(0)));
}

#[test]
fn test_corrupt_json_reported_as_json_error() {
    let err = parse(br#"{"nodes": [}"#).unwrap_err();
    assert!(matches!(err, CodecError::Json(_)));
    assert!(!err.is_container_error());

    let bytes = glb::write(b"[1, 2]", None).unwrap();
    assert!(matches!(parse(&bytes), Err(CodecError::NotAnObject)));
}

#[test]
fn test_serialize_preserves_unknown_fields() {
    let source = json!({
        "asset": { "version": "2.0", "generator": "test" },
        "meshes": [{ "primitives": [] }],
        "nodes": [{ "mesh": 0, "extensions": { "VENDOR_thing": { "a": [1, 2] } } }],
        "extensions": { "VENDOR_root": {} }
    });
    let document = Document::from_value(source.clone()).unwrap();

    let bytes = serialize(&document).unwrap();
    let reparsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(reparsed, source);
}

#[test]
fn test_container_round_trip() {
    let bytes = glb::write(br#"{"nodes":[{"name":"n"}]}"#, Some(&[1, 2, 3, 4])).unwrap();
    let mut document = parse(&bytes).unwrap();
    document
        .set_node_extension(0, "OMI_seat", json!({ "angle": 0.5 }))
        .unwrap();

    let written = serialize(&document).unwrap();
    let reparsed = parse(&written).unwrap();
    assert_eq!(reparsed.container(), ContainerKind::Binary);
    assert_eq!(reparsed.binary(), Some(&[1u8, 2, 3, 4][..]));
    assert_eq!(
        reparsed.node_extension(0, "OMI_seat").unwrap(),
        Some(&json!({ "angle": 0.5 }))
    );
}
