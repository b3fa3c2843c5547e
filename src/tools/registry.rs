//! Permanent tool registry with an execution-scoped overlay.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::tool::Tool;

#[derive(Default)]
struct RegistryState {
    permanent: Vec<Arc<dyn Tool>>,
    execution: Option<Vec<Arc<dyn Tool>>>,
    // Bumped on every overlay change so stale guards leave newer overlays alone.
    overlay_id: u64,
}

/// Name-indexed tools shared by an agent and its dispatcher.
///
/// While an execution overlay is installed, lookups consult it first and
/// fall back to the permanent tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("ToolRegistry")
            .field("permanent", &names(&state.permanent))
            .field("execution", &state.execution.as_deref().map(names))
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a permanent tool, replacing any tool with the same name.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        let mut state = self.write();
        state.permanent.retain(|t| t.name() != tool.name());
        state.permanent.push(tool);
    }

    /// Remove a permanent tool. Returns whether it existed.
    pub fn unregister_tool(&self, name: &str) -> bool {
        let mut state = self.write();
        let before = state.permanent.len();
        state.permanent.retain(|t| t.name() != name);
        state.permanent.len() != before
    }

    pub fn set_execution_tools(&self, tools: Vec<Arc<dyn Tool>>) {
        self.install(tools);
    }

    pub fn clear_execution_tools(&self) {
        let mut state = self.write();
        state.execution = None;
        state.overlay_id += 1;
    }

    pub fn has_execution_tools(&self) -> bool {
        self.read().execution.is_some()
    }

    /// Install `tools` as the overlay until the returned guard drops.
    ///
    /// The guard only clears the overlay it installed; a later overlay
    /// survives an earlier guard dropping.
    pub fn scope(&self, tools: Vec<Arc<dyn Tool>>) -> ExecutionToolsGuard {
        let overlay_id = self.install(tools);
        ExecutionToolsGuard {
            registry: self.clone(),
            overlay_id,
        }
    }

    fn install(&self, tools: Vec<Arc<dyn Tool>>) -> u64 {
        let mut state = self.write();
        state.execution = Some(tools);
        state.overlay_id += 1;
        state.overlay_id
    }

    /// Look up a tool by name: overlay first, then permanent.
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let state = self.read();
        state
            .execution
            .iter()
            .flatten()
            .chain(state.permanent.iter())
            .find(|t| t.name() == name)
            .cloned()
    }

    /// Tools visible to the model: overlay plus permanent tools it does not shadow.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let state = self.read();
        let mut visible: Vec<Arc<dyn Tool>> = state.execution.clone().unwrap_or_default();
        for tool in &state.permanent {
            if !visible.iter().any(|t| t.name() == tool.name()) {
                visible.push(tool.clone());
            }
        }
        visible
    }

    /// Only the permanently registered tools.
    pub fn permanent_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.read().permanent.clone()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools().iter().map(|t| t.name().to_string()).collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the execution overlay on drop.
#[must_use = "the execution tools are cleared when the guard drops"]
pub struct ExecutionToolsGuard {
    registry: ToolRegistry,
    overlay_id: u64,
}

impl Drop for ExecutionToolsGuard {
    fn drop(&mut self) {
        let mut state = self.registry.write();
        if state.overlay_id == self.overlay_id {
            state.execution = None;
        }
    }
}

fn names(tools: &[Arc<dyn Tool>]) -> Vec<&str> {
    tools.iter().map(|t| t.name()).collect()
}
