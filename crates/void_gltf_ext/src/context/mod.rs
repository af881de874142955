//! Per-operation contexts
//!
//! A context is created when an import or export begins, is handed to every
//! handler invocation in turn, and is disposed when the operation ends or is
//! cancelled. It exclusively owns the node/object mapping and the state
//! handlers share with each other.

mod cache;
mod deferred;
mod export;
mod import;
mod mapping;
mod resources;
mod side_channel;

pub use cache::ObjectCache;
pub use deferred::{DeferredFn, DeferredQueue};
pub use export::{ExportContext, ExportState};
pub use import::{ImportContext, ImportState};
pub use mapping::NodeMap;
pub use resources::SharedResourceTable;
pub use side_channel::SideChannel;
