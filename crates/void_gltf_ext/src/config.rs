//! Pipeline configuration
//!
//! # Example Config File
//!
//! ```toml
//! [pipeline]
//! traversal = "pre-order"       # declaration, pre-order
//! chunk_size = 128              # nodes between yield points
//! isolate_panics = true
//! required_extensions = ["OMI_physics_body"]
//! require_all_emitted = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use void_gltf::TraversalOrder;

use crate::error::ConfigError;

/// Tunables for one [`ExtensionPipeline`](crate::ExtensionPipeline)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Node walk shared by index assignment and object instantiation
    pub traversal: TraversalOrder,

    /// Nodes (or deferred actions) processed between voluntary yields
    pub chunk_size: usize,

    /// Catch panics in handlers and deferred actions
    pub isolate_panics: bool,

    /// Emitted names also listed in `extensionsRequired`
    pub required_extensions: Vec<String>,

    /// List every emitted name in `extensionsRequired`
    pub require_all_emitted: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            traversal: TraversalOrder::Declaration,
            chunk_size: 256,
            isolate_panics: true,
            required_extensions: Vec::new(),
            require_all_emitted: false,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    pipeline: PipelineConfig,
}

impl PipelineConfig {
    /// Parse the `[pipeline]` table of a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(s)?;
        Ok(file.pipeline)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        log::info!("Loaded pipeline config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Render as a TOML document with a `[pipeline]` table
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let file = ConfigFile {
            pipeline: self.clone(),
        };
        Ok(toml::to_string(&file)?)
    }

    /// Chunk size with 0 treated as 1
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }

    /// Whether an emitted extension goes into `extensionsRequired`
    pub fn is_required(&self, name: &str) -> bool {
        self.require_all_emitted || self.required_extensions.iter().any(|n| n == name)
    }
}
