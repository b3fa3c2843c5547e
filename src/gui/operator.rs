//! Operator boundary: the device a GUI agent looks at and acts on.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::action_parser::{PredictionParsed, ScreenContext};
use crate::engine::{SharedScreenContext, GUI_ACTION_TOOL};
use crate::error::TarkoError;
use crate::tools::{Tool, ToolArguments, ToolExecutionContext, ToolParameters};
use crate::types::ImageContent;

/// One captured frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    /// Base64 image data without the data-URL prefix.
    pub base64: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// Device pixel ratio of the captured screen.
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
}

fn default_mime_type() -> String {
    "image/png".to_string()
}

fn default_scale_factor() -> f64 {
    1.0
}

impl Screenshot {
    /// Encode raw PNG bytes.
    pub fn from_png(bytes: &[u8], width: u32, height: u32) -> Self {
        Self {
            base64: BASE64.encode(bytes),
            mime_type: default_mime_type(),
            width,
            height,
            scale_factor: default_scale_factor(),
        }
    }

    pub fn screen(&self) -> ScreenContext {
        ScreenContext::new(self.width, self.height)
    }

    pub fn image(&self) -> ImageContent {
        ImageContent::base64(self.base64.clone(), self.mime_type.clone())
    }
}

/// A parsed action handed to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteParams {
    pub parsed: PredictionParsed,
    /// Canonical text form of the action.
    pub action_str: String,
    #[serde(default)]
    pub thought: String,
    /// Screen the coordinates were resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<ScreenContext>,
}

/// Operator response. A message in `error_message` fails the tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A controllable screen (desktop, browser, phone).
#[async_trait]
pub trait Operator: Send + Sync {
    async fn screenshot(&self) -> Result<Screenshot, TarkoError>;

    async fn execute(&self, params: ExecuteParams) -> Result<ExecuteOutput, TarkoError>;
}

#[derive(Debug, Deserialize)]
struct GuiActionArgs {
    action: PredictionParsed,
    #[serde(default)]
    action_str: String,
    #[serde(default)]
    thought: String,
}

/// Executes [`GUI_ACTION_TOOL`] calls through an [`Operator`].
pub struct OperatorTool {
    operator: Arc<dyn Operator>,
    screen: SharedScreenContext,
    parameters: ToolParameters,
}

impl OperatorTool {
    pub fn new(operator: Arc<dyn Operator>, screen: SharedScreenContext) -> Self {
        let parameters = ToolParameters::object()
            .object("action", "Parsed GUI action", true)
            .string("action_str", "Canonical action text", false)
            .string("thought", "Reasoning behind the action", false)
            .build();
        Self {
            operator,
            screen,
            parameters,
        }
    }
}

#[async_trait]
impl Tool for OperatorTool {
    fn name(&self) -> &str {
        GUI_ACTION_TOOL
    }

    fn description(&self) -> &str {
        "Perform one GUI action (click, type, scroll, hotkey, drag, wait) on the screen"
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        _ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, TarkoError> {
        let GuiActionArgs {
            action,
            action_str,
            thought,
        } = args.deserialize()?;
        let action_str = if action_str.is_empty() {
            action.to_action_string()
        } else {
            action_str
        };
        let action_type = action.action_type.clone();

        let output = self
            .operator
            .execute(ExecuteParams {
                parsed: action,
                action_str: action_str.clone(),
                thought,
                screen: self.screen.get(),
            })
            .await?;
        if let Some(message) = output.error_message {
            return Err(TarkoError::tool(GUI_ACTION_TOOL, message));
        }
        Ok(serde_json::json!({
            "action": action_str,
            "action_type": action_type,
            "status": "success",
        }))
    }
}
