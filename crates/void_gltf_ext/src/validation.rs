//! Optional extension validation collaborator
//!
//! The pipeline does not judge what an extension block means. A host that
//! wants semantic checks installs an [`ExtensionValidator`]; each block is
//! offered to it before its handler runs.

use std::fmt;

use serde_json::Value;
use void_gltf::NodeIndex;

/// Where a validated block was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationScope {
    Document,
    Node(NodeIndex),
}

impl ValidationScope {
    /// Node the block belongs to, if node-level
    pub fn node(&self) -> Option<NodeIndex> {
        match self {
            Self::Document => None,
            Self::Node(node) => Some(*node),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Reported; the block is still imported
    Warning,
    /// Reported; the block is skipped
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    /// Issue that is reported but does not skip the block
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    /// Issue that skips the block
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// Checks extension blocks before they reach their handler
pub trait ExtensionValidator: Send + Sync {
    fn validate(&self, extension: &str, scope: ValidationScope, block: &Value) -> Vec<ValidationIssue>;
}

/// Rejects blocks that are not JSON objects and warns about empty ones
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl ExtensionValidator for StructuralValidator {
    fn validate(&self, extension: &str, _scope: ValidationScope, block: &Value) -> Vec<ValidationIssue> {
        match block {
            Value::Object(map) if map.is_empty() => {
                vec![ValidationIssue::warning(format!("'{}' block is empty", extension))]
            }
            Value::Object(_) => Vec::new(),
            _ => vec![ValidationIssue::error(format!(
                "'{}' block must be a JSON object",
                extension
            ))],
        }
    }
}
