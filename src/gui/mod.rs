//! GUI agents: screenshots in, parsed actions out through an [`Operator`].

pub mod operator;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;

pub use operator::{ExecuteOutput, ExecuteParams, Operator, OperatorTool, Screenshot};
pub use prompt::action_space_prompt;

use crate::agent::{Agent, AgentBuilder, AgentHooks, HookContext};
use crate::config::KernelConfig;
use crate::engine::{ActionSyntax, EngineKind, SharedScreenContext};
use crate::error::TarkoError;
use crate::event_stream::{EnvironmentInput, EventPayload};
use crate::provider::ModelProvider;
use crate::types::{ContentPart, GenerationSettings};

/// Captures a screenshot before every model turn.
///
/// The frame is recorded as an `environment_input` event. Its size and
/// device scale factor are published to the engine for coordinate
/// normalization.
pub struct GuiHooks {
    operator: Arc<dyn Operator>,
    screen: SharedScreenContext,
}

impl GuiHooks {
    pub fn new(operator: Arc<dyn Operator>, screen: SharedScreenContext) -> Self {
        Self { operator, screen }
    }
}

#[async_trait]
impl AgentHooks for GuiHooks {
    async fn on_each_agent_loop_start(&self, ctx: &HookContext) -> Result<(), TarkoError> {
        let screenshot = self.operator.screenshot().await?;
        self.screen.set(screenshot.screen());
        self.screen.set_scale_factor(screenshot.scale_factor);
        tracing::debug!(
            session_id = %ctx.session_id,
            iteration = ctx.iteration,
            width = screenshot.width,
            height = screenshot.height,
            scale_factor = screenshot.scale_factor,
            "captured screenshot"
        );
        ctx.emit(EventPayload::EnvironmentInput(EnvironmentInput {
            content: vec![ContentPart::Image(screenshot.image())],
            description: Some("Screenshot".to_string()),
        }));
        Ok(())
    }
}

/// Assembles an [`Agent`] driving an [`Operator`] with a GUI engine.
pub struct GuiAgentBuilder {
    operator: Arc<dyn Operator>,
    provider: Option<Arc<dyn ModelProvider>>,
    config: KernelConfig,
    syntax: ActionSyntax,
    instructions: String,
    settings: GenerationSettings,
}

impl GuiAgentBuilder {
    pub fn new(operator: Arc<dyn Operator>) -> Self {
        Self {
            operator,
            provider: None,
            config: KernelConfig::default(),
            syntax: ActionSyntax::Grammar,
            instructions: String::new(),
            settings: GenerationSettings::default(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Iteration, image and parser settings. The engine kind is derived
    /// from the action syntax.
    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.syntax = match config.tool_call_engine {
            EngineKind::GuiMarker => ActionSyntax::Marker,
            EngineKind::Gui | EngineKind::Native => ActionSyntax::Grammar,
        };
        self.config = config;
        self
    }

    pub fn with_syntax(mut self, syntax: ActionSyntax) -> Self {
        self.syntax = syntax;
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

    pub fn build(self) -> Result<Agent, TarkoError> {
        let screen = SharedScreenContext::default();
        let mut config = self.config;
        config.tool_call_engine = match self.syntax {
            ActionSyntax::Grammar => EngineKind::Gui,
            ActionSyntax::Marker => EngineKind::GuiMarker,
        };

        let mut builder = AgentBuilder::new()
            .with_config(config)
            .with_screen_context(screen.clone())
            .with_instructions(self.instructions)
            .with_settings(self.settings)
            .with_tool(Arc::new(OperatorTool::new(self.operator.clone(), screen.clone())))
            .with_hooks(Arc::new(GuiHooks::new(self.operator, screen)));
        if let Some(provider) = self.provider {
            builder = builder.with_provider(provider);
        }
        builder.build()
    }
}
