//! Runtime-discovered tools (e.g. an MCP client).

use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::ToolParameters;
use crate::error::TarkoError;

/// A tool advertised by a remote backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicTool {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

/// A backend that can list and execute tools at runtime.
///
/// Transport failures and timeouts should be returned as errors; their
/// message is forwarded to the model unchanged.
#[async_trait]
pub trait DynamicToolProvider: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<DynamicTool>, TarkoError>;

    async fn execute_tool(
        &self,
        name: &str,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, TarkoError>;
}

/// Exposes one [`DynamicTool`] through the [`Tool`] trait.
pub struct DynamicToolAdapter {
    provider: Arc<dyn DynamicToolProvider>,
    tool: DynamicTool,
}

impl DynamicToolAdapter {
    pub fn new(provider: Arc<dyn DynamicToolProvider>, tool: DynamicTool) -> Self {
        Self { provider, tool }
    }

    /// Discover every tool of `provider` and wrap each one.
    pub async fn discover(
        provider: Arc<dyn DynamicToolProvider>,
    ) -> Result<Vec<Arc<dyn Tool>>, TarkoError> {
        let tools = provider.list_tools().await?;
        Ok(tools
            .into_iter()
            .map(|tool| Arc::new(Self::new(provider.clone(), tool)) as Arc<dyn Tool>)
            .collect())
    }
}

#[async_trait]
impl Tool for DynamicToolAdapter {
    fn name(&self) -> &str {
        &self.tool.name
    }

    fn description(&self) -> &str {
        &self.tool.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.tool.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, TarkoError> {
        self.provider.execute_tool(&self.tool.name, args, ctx).await
    }
}
