//! GUI action parsing: model text to normalized, screen-space actions.
//!
//! A response is split into thought and action sections by a
//! [`GrammarMode`], each blank-line separated segment is parsed as one
//! `name(key='value')` call, and `start_box`/`end_box` arguments are
//! normalized into `[0, 1]` boxes plus pixel midpoints.

pub mod coordinates;
pub mod function_call;
pub mod grammar;
pub mod marker;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use coordinates::{smart_resize, BoxNormalizer, CoordinateSpace, ScreenContext, SmartResizeConfig};
pub use function_call::{parse_function_call, FunctionCall};
pub use grammar::Sections;
pub use marker::{extract_action, ExtractedAction};

/// Action type that ends a task.
pub const FINISHED_ACTION: &str = "finished";

/// Coordinate convention of the vision model.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum ModelVersion {
    #[default]
    #[serde(rename = "v1.0")]
    #[strum(serialize = "v1.0")]
    V1_0,
    #[serde(rename = "v1.5")]
    #[strum(serialize = "v1.5")]
    V1_5,
}

/// Textual layout of a response.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GrammarMode {
    /// `Thought:` ... `Action:` free text.
    #[default]
    Bc,
    /// `<Thought>` ... `Action:` ... `</Output>`.
    O1,
}

/// Parser settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionParserConfig {
    /// `[width, height]` scale the model's coordinates are expressed in.
    pub factors: [f64; 2],
    pub mode: GrammarMode,
    pub model_version: ModelVersion,
    /// Device pixel ratio applied to pixel midpoints.
    pub scale_factor: f64,
    pub smart_resize: SmartResizeConfig,
}

impl Default for ActionParserConfig {
    fn default() -> Self {
        Self {
            factors: [1000.0, 1000.0],
            mode: GrammarMode::Bc,
            model_version: ModelVersion::V1_0,
            scale_factor: 1.0,
            smart_resize: SmartResizeConfig::default(),
        }
    }
}

/// Arguments of one parsed action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Normalized box as JSON array text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_box: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_box: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Screen-pixel midpoint of `start_box`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_coords: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_coords: Option<[f64; 2]>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ActionInputs {
    fn set(&mut self, key: &str, value: String) {
        match key {
            "content" => self.content = Some(value),
            "text" => {
                self.content.get_or_insert(value);
            }
            "start_box" => self.start_box = Some(value),
            "end_box" => self.end_box = Some(value),
            "key" => self.key = Some(value),
            "hotkey" => self.hotkey = Some(value),
            "direction" => self.direction = Some(value),
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }

    /// Arguments in `key='value'` order used by [`PredictionParsed::to_action_string`].
    fn pairs(&self) -> Vec<(&str, &str)> {
        let known = [
            ("content", &self.content),
            ("start_box", &self.start_box),
            ("end_box", &self.end_box),
            ("key", &self.key),
            ("hotkey", &self.hotkey),
            ("direction", &self.direction),
        ];
        known
            .into_iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .collect()
    }
}

/// One action parsed from model text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionParsed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
    pub thought: String,
    pub action_type: String,
    pub action_inputs: ActionInputs,
}

impl PredictionParsed {
    pub fn is_finished(&self) -> bool {
        self.action_type == FINISHED_ACTION
    }

    /// Call syntax for the action with its normalized arguments.
    pub fn to_action_string(&self) -> String {
        let args: Vec<String> = self
            .action_inputs
            .pairs()
            .into_iter()
            .map(|(k, v)| format!("{k}='{v}'"))
            .collect();
        format!("{}({})", self.action_type, args.join(", "))
    }
}

/// Parses GUI actions from model responses.
#[derive(Debug, Clone, Default)]
pub struct ActionParser {
    config: ActionParserConfig,
}

impl ActionParser {
    pub fn new(config: ActionParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ActionParserConfig {
        &self.config
    }

    /// Parse with the configured grammar.
    ///
    /// Segments that are not a single balanced call are dropped; an empty
    /// vector means nothing could be parsed.
    pub fn parse(&self, text: &str, screen: Option<ScreenContext>) -> Vec<PredictionParsed> {
        let sections = match self.config.mode {
            GrammarMode::Bc => grammar::split_bc(text),
            GrammarMode::O1 => grammar::split_o1(text),
        };
        self.parse_sections(&sections, screen)
    }

    /// Parse text that marks its action with `Action:`.
    pub fn parse_marked(&self, text: &str, screen: Option<ScreenContext>) -> Vec<PredictionParsed> {
        let extracted = extract_action(text);
        let thought = extracted
            .preamble
            .strip_prefix("Thought:")
            .unwrap_or(&extracted.preamble)
            .trim();
        let sections = Sections {
            reflection: None,
            thought: (!thought.is_empty()).then(|| thought.to_string()),
            action_text: extracted.body,
        };
        self.parse_sections(&sections, screen)
    }

    fn parse_sections(&self, sections: &Sections, screen: Option<ScreenContext>) -> Vec<PredictionParsed> {
        let normalizer = BoxNormalizer::new(&self.config, screen);
        sections
            .action_text
            .split("\n\n")
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| {
                let escaped = segment.replace('\n', "\\n");
                let Some(call) = parse_function_call(&escaped) else {
                    tracing::warn!(segment, "dropping unparseable action");
                    return None;
                };
                Some(PredictionParsed {
                    reflection: sections.reflection.clone(),
                    thought: sections.thought.clone().unwrap_or_default(),
                    action_type: call.name,
                    action_inputs: build_inputs(call.args, &normalizer),
                })
            })
            .collect()
    }
}

fn build_inputs(args: Vec<(String, String)>, normalizer: &BoxNormalizer) -> ActionInputs {
    let mut inputs = ActionInputs::default();
    for (key, value) in args {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let is_start = key.contains("start_box");
        if !is_start && !key.contains("end_box") {
            inputs.set(&key, value.to_string());
            continue;
        }
        match normalizer.normalize(value) {
            Some(normalized) => {
                inputs.set(&key, normalized.to_json_string());
                if let Some(center) = normalized.pixel_center {
                    if is_start {
                        inputs.start_coords = Some(center);
                    } else {
                        inputs.end_coords = Some(center);
                    }
                }
            }
            None => inputs.set(&key, value.to_string()),
        }
    }
    inputs
}
