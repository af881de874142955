//! Dispatch orchestrator
//!
//! Drives registered handlers through an import or export:
//!
//! - Import: parse, document-level handlers, instantiate and map nodes,
//!   node-level handlers per node, drain deferred actions, dispose.
//! - Export: map objects, node-level handlers per object, document-level
//!   handlers, base export, inject blocks, serialize.
//!
//! Handlers run one at a time and are awaited before the next starts. Failures
//! inside a handler or deferred action are isolated, logged and reported;
//! only format errors, cancellation and collaborator failures abort.

mod export;
mod import;
mod inject;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use void_gltf::Document;

use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::error::{HandlerError, HandlerResult, PipelineError, PipelineResult};
use crate::registry::SharedExtensionRegistry;
use crate::report::{Diagnostic, DiagnosticKind, ExportReport, ImportReport};
use crate::scene::ObjectId;
use crate::validation::{ExtensionValidator, Severity, ValidationScope};

pub use inject::{inject, EmittedBlocks};

/// Result of a successful import
#[derive(Debug)]
pub struct ImportOutput {
    /// The parsed document
    pub document: Document,
    /// Scene objects aligned with the traversal order
    pub objects: Vec<ObjectId>,
    pub report: ImportReport,
}

/// Result of a successful export
#[derive(Debug)]
pub struct ExportOutput {
    /// Serialized document
    pub bytes: Vec<u8>,
    /// The document the bytes were serialized from
    pub document: Document,
    pub report: ExportReport,
}

/// Import/export orchestrator over a shared registry
#[derive(Clone)]
pub struct ExtensionPipeline {
    registry: SharedExtensionRegistry,
    config: PipelineConfig,
    validator: Option<Arc<dyn ExtensionValidator>>,
}

impl ExtensionPipeline {
    /// Create a pipeline with the default configuration
    pub fn new(registry: SharedExtensionRegistry) -> Self {
        Self::with_config(registry, PipelineConfig::default())
    }

    /// Create a pipeline with an explicit configuration
    pub fn with_config(registry: SharedExtensionRegistry, config: PipelineConfig) -> Self {
        Self {
            registry,
            config,
            validator: None,
        }
    }

    /// Install a validator consulted before every handler import
    pub fn with_validator(mut self, validator: Arc<dyn ExtensionValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Registry this pipeline snapshots for each operation
    pub fn registry(&self) -> &SharedExtensionRegistry {
        &self.registry
    }

    /// Get the pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the validator over one block
    ///
    /// Returns false when the block must be skipped.
    fn validate(
        &self,
        extension: &str,
        scope: ValidationScope,
        block: &Value,
        report: &mut ImportReport,
    ) -> bool {
        let Some(validator) = &self.validator else {
            return true;
        };

        let mut accept = true;
        for issue in validator.validate(extension, scope, block) {
            if issue.severity == Severity::Error {
                accept = false;
            }
            report.push(
                Diagnostic::new(
                    DiagnosticKind::Validation,
                    format!("{}: {}", issue.severity, issue.message),
                )
                .with_extension(extension)
                .with_node(scope.node()),
            );
        }
        accept
    }

    /// Await a handler future, converting a panic into a handler error
    async fn guarded<T, F>(&self, future: F) -> HandlerResult<T>
    where
        F: Future<Output = HandlerResult<T>> + Send,
    {
        if !self.config.isolate_panics {
            return future.await;
        }

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl std::fmt::Debug for ExtensionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionPipeline")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Abort with [`PipelineError::Cancelled`] once the token is cancelled
fn ensure_live(cancel: &CancellationToken) -> PipelineResult<()> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Record a failed handler call for an export
fn export_failure(
    report: &mut ExportReport,
    error: &HandlerError,
    extension: &str,
    node: Option<usize>,
    object: Option<ObjectId>,
) {
    report.push(
        Diagnostic::from_handler_error(error)
            .with_extension(extension)
            .with_node(node)
            .with_object(object),
    );
}
