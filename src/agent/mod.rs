//! Run controller: single-flight agent runs over an event stream.
//!
//! An [`Agent`] owns one [`EventStream`], one permanent [`ToolRegistry`] and a
//! [`ToolCallEngine`]. [`Agent::run`] claims the agent synchronously, so a
//! second call while a run executes fails with
//! [`TarkoError::AlreadyExecuting`] before anything is awaited.

pub mod history;
pub mod hooks;
pub mod options;
mod runner;
pub mod state;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tokio::sync::{mpsc, watch};

pub use history::build_history;
pub use hooks::{AgentHooks, HookContext};
pub use options::RunOptions;
pub use state::{ActiveRun, AgentStatus, RunState};

use crate::config::KernelConfig;
use crate::dispatcher::ToolDispatcher;
use crate::engine::{EngineKind, SharedScreenContext, ToolCallEngine};
use crate::error::TarkoError;
use crate::event_stream::{AssistantMessage, Event, EventStream, EventType, Subscription};
use crate::provider::ModelProvider;
use crate::tools::{
    DynamicToolAdapter, DynamicToolProvider, ExecutionToolsGuard, Tool, ToolRegistry,
};
use crate::types::GenerationSettings;

pub(crate) struct AgentInner {
    pub(crate) provider: Arc<dyn ModelProvider>,
    pub(crate) engine: Arc<dyn ToolCallEngine>,
    pub(crate) registry: ToolRegistry,
    pub(crate) events: EventStream,
    pub(crate) dispatcher: ToolDispatcher,
    pub(crate) hooks: Vec<Arc<dyn AgentHooks>>,
    pub(crate) state: RunState,
    pub(crate) instructions: String,
    pub(crate) settings: GenerationSettings,
    pub(crate) max_iterations: usize,
    pub(crate) max_images: usize,
}

/// A tool-using agent. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("provider", &self.inner.provider.provider_name())
            .field("model", &self.inner.provider.model_id())
            .field("engine", &self.inner.engine.kind())
            .field("status", &self.status())
            .finish()
    }
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Run one task to completion.
    ///
    /// The agent is claimed when this is called, not when the future is
    /// first polled. Aborts, provider failures and the iteration cap resolve
    /// to `Ok` with a synthesized message; only a concurrent run is an `Err`.
    pub fn run(
        &self,
        options: impl Into<RunOptions>,
    ) -> BoxFuture<'static, Result<AssistantMessage, TarkoError>> {
        let options = options.into();
        let claimed = self.claim(options);
        let inner = self.inner.clone();
        Box::pin(async move {
            let (run, tool_scope, options) = claimed?;
            Ok(runner::execute(inner, run, tool_scope, options).await)
        })
    }

    /// Run one task in the background and stream its events.
    ///
    /// Only events of this run's session are yielded. The stream ends after
    /// its `agent_run_end`, once the run has released the agent. Must be
    /// called inside a Tokio runtime.
    pub fn run_streaming(
        &self,
        options: impl Into<RunOptions>,
    ) -> Result<BoxStream<'static, Event>, TarkoError> {
        let mut options = options.into().with_stream(true);
        let session_id = options
            .session_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        let (run, tool_scope, options) = self.claim(options)?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = DetachOnDrop(Some(self.inner.events.subscribe(move |event| {
            if event.session_id.as_deref() == Some(session_id.as_str()) {
                let _ = tx.send(event.clone());
            }
        })));
        let handle = tokio::spawn(runner::execute(self.inner.clone(), run, tool_scope, options));

        let stream = async_stream::stream! {
            let _subscription = subscription;
            while let Some(event) = rx.recv().await {
                let done = event.event_type() == EventType::AgentRunEnd;
                yield event;
                if done {
                    break;
                }
            }
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "streaming run task failed");
            }
        };
        Ok(Box::pin(stream))
    }

    // Claims the agent and installs the run's tool overlay in one step, so a
    // run never sees the overlay of an aborted run that is still unwinding.
    fn claim(
        &self,
        mut options: RunOptions,
    ) -> Result<(ActiveRun, ExecutionToolsGuard, RunOptions), TarkoError> {
        let run = self.inner.state.begin()?;
        let tool_scope = self
            .inner
            .registry
            .scope(options.tools.take().unwrap_or_default());
        Ok((run, tool_scope, options))
    }

    /// Abort the current run. Returns `false` when nothing runs.
    pub fn abort(&self) -> bool {
        let aborted = self.inner.state.abort();
        if aborted {
            tracing::info!("agent run aborted");
        }
        aborted
    }

    pub fn status(&self) -> AgentStatus {
        self.inner.state.status()
    }

    /// Receiver that observes status changes.
    pub fn watch_status(&self) -> watch::Receiver<AgentStatus> {
        self.inner.state.watch()
    }

    /// Resolve once no run is in flight.
    pub async fn wait_for_idle(&self) {
        self.inner.state.wait_until_settled().await;
    }

    pub fn event_stream(&self) -> &EventStream {
        &self.inner.events
    }

    /// Permanent registry, with any run-scoped overlay applied.
    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.registry
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.inner.dispatcher
    }

    pub fn engine(&self) -> &Arc<dyn ToolCallEngine> {
        &self.inner.engine
    }

    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.inner.registry.register_tool(tool);
    }

    /// Register every tool exposed by a dynamic provider. Returns the count.
    pub async fn register_dynamic_tools(
        &self,
        provider: Arc<dyn DynamicToolProvider>,
    ) -> Result<usize, TarkoError> {
        let tools = DynamicToolAdapter::discover(provider).await?;
        let count = tools.len();
        for tool in tools {
            self.inner.registry.register_tool(tool);
        }
        tracing::info!(count, "registered dynamic tools");
        Ok(count)
    }
}

struct DetachOnDrop(Option<Subscription>);

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        if let Some(subscription) = self.0.take() {
            subscription.unsubscribe();
        }
    }
}

/// Builder for [`Agent`].
pub struct AgentBuilder {
    provider: Option<Arc<dyn ModelProvider>>,
    engine: Option<Arc<dyn ToolCallEngine>>,
    config: KernelConfig,
    screen: SharedScreenContext,
    instructions: String,
    settings: GenerationSettings,
    hooks: Vec<Arc<dyn AgentHooks>>,
    tools: Vec<Arc<dyn Tool>>,
    events: Option<EventStream>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            engine: None,
            config: KernelConfig::default(),
            screen: SharedScreenContext::default(),
            instructions: String::new(),
            settings: GenerationSettings::default(),
            hooks: Vec::new(),
            tools: Vec::new(),
            events: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom engine instead of the configured kind.
    pub fn with_engine(mut self, engine: Arc<dyn ToolCallEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_tool_call_engine(mut self, kind: EngineKind) -> Self {
        self.config.tool_call_engine = kind;
        self
    }

    /// Screen context shared with GUI engines and hooks.
    pub fn with_screen_context(mut self, screen: SharedScreenContext) -> Self {
        self.screen = screen;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn with_max_images(mut self, max_images: usize) -> Self {
        self.config.max_images = max_images;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn AgentHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Share an existing event stream instead of creating one.
    pub fn with_event_stream(mut self, events: EventStream) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<Agent, TarkoError> {
        self.config.validate()?;
        let provider = self.provider.ok_or_else(|| {
            TarkoError::Configuration("a model provider is required".to_string())
        })?;
        let engine = self.engine.unwrap_or_else(|| {
            self.config
                .tool_call_engine
                .build(self.config.gui.clone(), self.screen.clone())
        });

        let registry = ToolRegistry::new();
        for tool in self.tools {
            registry.register_tool(tool);
        }
        let events = self.events.unwrap_or_default();
        let dispatcher = ToolDispatcher::new(registry.clone(), events.clone());

        Ok(Agent {
            inner: Arc::new(AgentInner {
                provider,
                engine,
                registry,
                events,
                dispatcher,
                hooks: self.hooks,
                state: RunState::new(),
                instructions: self.instructions,
                settings: self.settings,
                max_iterations: self.config.max_iterations,
                max_images: self.config.max_images,
            }),
        })
    }
}
