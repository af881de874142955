//! Diagnostics for recovered failures
//!
//! Reference, handler and deferred-action failures never abort an operation.
//! They are logged and collected here so callers can inspect them without a
//! logger installed.

use std::collections::BTreeSet;
use std::fmt;

use void_gltf::NodeIndex;

use crate::error::HandlerError;
use crate::scene::ObjectId;

/// What kind of recovered failure a diagnostic describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Index outside an array, or a node without a scene object
    Reference,
    /// Error or panic inside a handler call
    Handler,
    /// Error or panic inside a deferred action
    Deferred,
    /// Issue raised by the validation collaborator
    Validation,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Handler => write!(f, "handler"),
            Self::Deferred => write!(f, "deferred"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// One recovered failure
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub extension: Option<String>,
    pub node: Option<NodeIndex>,
    pub object: Option<ObjectId>,
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic with no location
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            extension: None,
            node: None,
            object: None,
            message: message.into(),
        }
    }

    /// Classify a handler error as a reference or handler failure
    pub fn from_handler_error(error: &HandlerError) -> Self {
        let kind = if error.is_reference() {
            DiagnosticKind::Reference
        } else {
            DiagnosticKind::Handler
        };
        Self::new(kind, error.to_string())
    }

    /// Attach the extension name
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Attach the node index
    pub fn with_node(mut self, node: Option<NodeIndex>) -> Self {
        self.node = node;
        self
    }

    /// Attach the scene object
    pub fn with_object(mut self, object: Option<ObjectId>) -> Self {
        self.object = object;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(extension) = &self.extension {
            write!(f, " {}", extension)?;
        }
        if let Some(node) = self.node {
            write!(f, " node {}", node)?;
        }
        if let Some(object) = self.object {
            write!(f, " object {}", object)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Outcome details of one import
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub diagnostics: Vec<Diagnostic>,
    /// Handler invocations attempted
    pub handler_calls: usize,
    /// Deferred actions executed
    pub deferred_run: usize,
    /// Nodes carrying at least one extension block
    pub nodes_with_extensions: usize,
}

/// Outcome details of one export
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub diagnostics: Vec<Diagnostic>,
    pub handler_calls: usize,
    /// Extension names injected into the document
    pub emitted: BTreeSet<String>,
    /// Node-level blocks injected
    pub node_blocks: usize,
}

macro_rules! report_common {
    ($report:ty) => {
        impl $report {
            /// No recovered failures
            pub fn is_clean(&self) -> bool {
                self.diagnostics.is_empty()
            }

            /// Number of diagnostics of `kind`
            pub fn count(&self, kind: DiagnosticKind) -> usize {
                self.diagnostics.iter().filter(|d| d.kind == kind).count()
            }

            /// Diagnostics of `kind`, in the order they were recorded
            pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> + '_ {
                self.diagnostics.iter().filter(move |d| d.kind == kind)
            }

            pub(crate) fn push(&mut self, diagnostic: Diagnostic) {
                log::warn!("{}", diagnostic);
                self.diagnostics.push(diagnostic);
            }
        }
    };
}

report_common!(ImportReport);
report_common!(ExportReport);
