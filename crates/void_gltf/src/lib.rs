//! # Void glTF
//!
//! Document codec for glTF 2.0 scene interchange files.
//!
//! - Plain JSON (`.gltf`) and binary container (`.glb`) input
//! - Distinct errors for every container framing failure
//! - Raw, lossless JSON tree: unknown fields and extensions survive a round trip
//! - Index-checked accessors for nodes, scenes and resource arrays
//!
//! ## Example
//!
//! ```ignore
//! use void_gltf::{Document, TraversalOrder};
//!
//! let document = void_gltf::parse(&bytes)?;
//! for index in document.traversal_order(TraversalOrder::Declaration)? {
//!     if let Some(ext) = document.node_extensions(index)? {
//!         println!("node {} carries {:?}", index, ext.keys().collect::<Vec<_>>());
//!     }
//! }
//! let bytes = void_gltf::serialize(&document)?;
//! ```

pub mod document;
pub mod error;
pub mod glb;

pub use document::{ContainerKind, Document, JsonObject, NodeIndex, TraversalOrder};
pub use error::{CodecError, CodecResult};

/// Parse wire bytes (JSON or binary container) into a document
pub fn parse(bytes: &[u8]) -> CodecResult<Document> {
    Document::parse(bytes)
}

/// Serialize a document back to the wire form it was read from
pub fn serialize(document: &Document) -> CodecResult<Vec<u8>> {
    document.to_bytes()
}
