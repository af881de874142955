//! # Void glTF Extensions
//!
//! Pluggable extension handling for glTF scene documents.
//!
//! - [`ExtensionRegistry`]: one handler per extension name, priority ordered
//! - [`ImportContext`] / [`ExportContext`]: per-operation mapping, side
//!   channel, deferred actions and shared resource tables
//! - [`ExtensionPipeline`]: drives document-level and node-level handlers on
//!   import and export, isolating failures per handler
//!
//! ## Example
//!
//! ```ignore
//! use void_gltf_ext::prelude::*;
//!
//! let registry = SharedExtensionRegistry::new();
//! registry.register(Registration::node(SeatHandler))?;
//!
//! let pipeline = ExtensionPipeline::new(registry);
//! let mut scene = MemoryScene::new();
//! let cancel = CancellationToken::new();
//!
//! let output = pipeline
//!     .import(&bytes, &mut scene, &HierarchyInstantiator, &cancel)
//!     .await?;
//! for diagnostic in &output.report.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod instantiate;
pub mod names;
pub mod passthrough;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod scene;
pub mod validation;

pub use cancel::CancellationToken;
pub use config::PipelineConfig;
pub use context::{
    ExportContext, ExportState, ImportContext, ImportState, NodeMap, ObjectCache,
    SharedResourceTable, SideChannel,
};
pub use error::{
    ConfigError, HandlerError, HandlerResult, PipelineError, PipelineResult, RegistryError,
};
pub use handler::{
    Capability, CapabilitySet, DocumentExtensionHandler, ExtensionHandler, NodeExtensionHandler,
    Registration,
};
pub use instantiate::{
    BaseExporter, DocumentExporter, HierarchyExporter, HierarchyInstantiator, SceneInstantiator,
    SourceNode,
};
pub use passthrough::{PassthroughHandler, RawDocumentExtensions, RawExtensions};
pub use pipeline::{EmittedBlocks, ExportOutput, ExtensionPipeline, ImportOutput};
pub use registry::{ExtensionRegistry, HandlerSet, RegisteredHandler, SharedExtensionRegistry};
pub use report::{Diagnostic, DiagnosticKind, ExportReport, ImportReport};
pub use scene::{MemoryScene, ObjectId, SceneGraph, SceneGraphExt};
pub use validation::{ExtensionValidator, Severity, StructuralValidator, ValidationIssue, ValidationScope};

/// Prelude for handler authors
pub mod prelude {
    pub use crate::cancel::CancellationToken;
    pub use crate::context::{ExportContext, ImportContext};
    pub use crate::error::{HandlerError, HandlerResult};
    pub use crate::handler::{
        DocumentExtensionHandler, ExtensionHandler, NodeExtensionHandler, Registration,
    };
    pub use crate::instantiate::{HierarchyExporter, HierarchyInstantiator};
    pub use crate::pipeline::ExtensionPipeline;
    pub use crate::registry::SharedExtensionRegistry;
    pub use crate::scene::{MemoryScene, ObjectId, SceneGraph, SceneGraphExt};
    pub use void_gltf::NodeIndex;
}
