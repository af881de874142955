//! Patch exported extension blocks into a base document

use std::collections::BTreeMap;

use serde_json::Value;
use void_gltf::{CodecError, CodecResult, Document, NodeIndex};

use crate::config::PipelineConfig;
use crate::error::HandlerError;
use crate::report::{Diagnostic, ExportReport};

/// Blocks produced by the node and document export passes
#[derive(Debug, Clone, Default)]
pub struct EmittedBlocks {
    nodes: BTreeMap<NodeIndex, Vec<(String, Value)>>,
    document: Vec<(String, Value)>,
}

impl EmittedBlocks {
    /// Create an empty block set
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a node-level block
    pub fn push_node(&mut self, node: NodeIndex, name: &str, block: Value) {
        self.nodes
            .entry(node)
            .or_default()
            .push((name.to_string(), block));
    }

    /// Queue a document-level block
    pub fn push_document(&mut self, name: &str, block: Value) {
        self.document.push((name.to_string(), block));
    }

    /// Blocks emitted for one node, in handler order
    pub fn node(&self, node: NodeIndex) -> &[(String, Value)] {
        self.nodes.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Queued document-level blocks
    pub fn document(&self) -> &[(String, Value)] {
        &self.document
    }

    /// Check if nothing was queued
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.document.is_empty()
    }
}

/// Merge emitted blocks into `document`
///
/// Existing blocks under other names are kept; a block re-emitted under an
/// existing name replaces it. Every emitted name is added to
/// `extensionsUsed`, and to `extensionsRequired` when the config asks for it.
/// A node index past the end of the document's node array is reported and
/// skipped.
pub fn inject(
    document: &mut Document,
    blocks: EmittedBlocks,
    config: &PipelineConfig,
    report: &mut ExportReport,
) -> CodecResult<()> {
    let node_count = document.node_count();

    for (node, entries) in blocks.nodes {
        for (name, block) in entries {
            if node >= node_count {
                let error = HandlerError::from(CodecError::IndexOutOfRange {
                    array: "nodes".into(),
                    index: node,
                    len: node_count,
                });
                report.push(
                    Diagnostic::from_handler_error(&error)
                        .with_extension(name)
                        .with_node(Some(node)),
                );
                continue;
            }

            match document.set_node_extension(node, &name, block) {
                Ok(previous) => {
                    if previous.is_some() {
                        log::debug!("Replaced existing '{}' block on node {}", name, node);
                    }
                    report.node_blocks += 1;
                    report.emitted.insert(name);
                }
                Err(e) => {
                    report.push(
                        Diagnostic::from_handler_error(&HandlerError::from(e))
                            .with_extension(name)
                            .with_node(Some(node)),
                    );
                }
            }
        }
    }

    for (name, block) in blocks.document {
        if document.set_document_extension(&name, block)?.is_some() {
            log::debug!("Replaced existing document-level '{}' block", name);
        }
        report.emitted.insert(name);
    }

    for name in &report.emitted {
        if config.is_required(name) {
            document.mark_extension_required(name)?;
        } else {
            document.mark_extension_used(name)?;
        }
    }

    Ok(())
}
