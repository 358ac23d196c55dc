use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::errors::{ToolError, ToolOutput};
use crate::models::tool::{Tool, ToolCall};

/// A group of related tools behind a single implementation.
///
/// Toolkits may touch the filesystem or spawn subprocesses, but each call is
/// a complete operation: it returns the full output text or fails, never a
/// partial result.
#[async_trait]
pub trait Toolkit: Send + Sync {
    fn name(&self) -> &str;

    /// The tools this toolkit provides, in a stable declared order.
    fn tools(&self) -> &[Tool];

    async fn call(&self, tool_call: &ToolCall) -> ToolOutput;
}

/// A fixed mapping from tool name to the toolkit providing it.
///
/// The registry is immutable for the lifetime of a session; there is no
/// dynamic registration.
pub struct ToolRegistry {
    toolkits: Vec<Box<dyn Toolkit>>,
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build the registry, failing fast on duplicate tool names rather
    /// than silently shadowing one toolkit with another.
    pub fn new(toolkits: Vec<Box<dyn Toolkit>>) -> Result<Self> {
        let mut tools = Vec::new();
        let mut index = HashMap::new();

        for (i, toolkit) in toolkits.iter().enumerate() {
            for tool in toolkit.tools() {
                if index.insert(tool.name.clone(), i).is_some() {
                    return Err(anyhow!(
                        "Duplicate tool name: {} (declared again by toolkit '{}')",
                        tool.name,
                        toolkit.name()
                    ));
                }
                tools.push(tool.clone());
            }
        }

        Ok(Self {
            toolkits,
            tools,
            index,
        })
    }

    /// All registered tools, in registration order. Used both for the
    /// endpoint's function declarations and for enumerating tool names in
    /// the system instructions.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub async fn invoke(&self, call: &ToolCall) -> ToolOutput {
        let toolkit = self
            .index
            .get(&call.name)
            .map(|i| &self.toolkits[*i])
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        toolkit.call(call).await
    }
}
