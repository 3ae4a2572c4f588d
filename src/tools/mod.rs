//! Tool registry
//!
//! Tools are described by [`ToolDescriptor`]s registered once at startup.
//! Each descriptor carries a factory; every `tools/call` builds a fresh
//! handler bound to that call's credential, so no state leaks between
//! callers.

pub mod catalog;
pub mod search;
pub mod upstream;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::credentials::Credential;
use crate::protocol::{Tool, ToolAnnotations, ToolsCallResult};
use crate::{Error, Result};

pub use upstream::UpstreamClient;

/// Everything a tool handler may use for one call
#[derive(Clone)]
pub struct ToolContext {
    /// Shared upstream HTTP client
    pub upstream: UpstreamClient,
    /// Credential resolved for this call
    pub credential: Credential,
}

/// A tool instance bound to a single call
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool. Upstream failures are reported inside the result
    /// (`isError: true`), not as protocol errors.
    async fn call(&self, arguments: Value) -> ToolsCallResult;
}

/// Builds a handler for one call
pub type ToolFactory = Arc<dyn Fn(ToolContext) -> Box<dyn ToolHandler> + Send + Sync>;

/// Static description of a tool
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Unique tool name
    pub name: String,
    /// Description shown to clients
    pub description: String,
    /// JSON Schema for `arguments`
    pub input_schema: Value,
    /// Handler factory
    pub factory: ToolFactory,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// The `tools/list` entry for this descriptor
    #[must_use]
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            input_schema: self.input_schema.clone(),
            annotations: Some(ToolAnnotations {
                read_only_hint: Some(true),
                open_world_hint: Some(true),
            }),
        }
    }

    /// Build a handler bound to `ctx`
    #[must_use]
    pub fn instantiate(&self, ctx: ToolContext) -> Box<dyn ToolHandler> {
        (self.factory)(ctx)
    }
}

/// Immutable name → descriptor map, in registration order
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry, rejecting duplicate names
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, d) in descriptors.iter().enumerate() {
            if index.insert(d.name.clone(), i).is_some() {
                return Err(Error::Config(format!("Duplicate tool name: {}", d.name)));
            }
        }
        Ok(Self {
            tools: descriptors,
            index,
        })
    }

    /// Registry of every Token Metrics endpoint tool, plus `search` and `fetch`
    pub fn token_metrics() -> Result<Self> {
        let mut descriptors = catalog::descriptors();
        descriptors.extend(search::descriptors());
        Self::new(descriptors)
    }

    /// Exact, case-sensitive lookup
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// `tools/list` payload in registration order
    #[must_use]
    pub fn list(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDescriptor::to_tool).collect()
    }

    /// Number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
