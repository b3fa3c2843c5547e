//! Splitting model responses into thought and action sections.

use std::sync::LazyLock;

use regex::Regex;

static O1_THOUGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<Thought>\s*(.*?)\s*</Thought>").expect("o1 thought regex must compile")
});
static O1_SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\nAction_Summary:\s*(.*?)\s*Action:").expect("o1 summary regex must compile")
});
static O1_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\nAction:\s*(.*?)\s*</Output>").expect("o1 action regex must compile")
});

const ACTION_MARKER: &str = "Action:";

/// The parts of one response before action parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub reflection: Option<String>,
    pub thought: Option<String>,
    /// Text holding one or more blank-line separated calls.
    pub action_text: String,
}

/// `Thought:` / `Reflection:` + `Action_Summary:` / `Action_Summary:` prefixes,
/// then everything after the last `Action:`.
pub fn split_bc(text: &str) -> Sections {
    let text = text.trim();
    let mut sections = Sections::default();

    if let Some(rest) = text.strip_prefix("Thought:") {
        sections.thought = non_empty(until_action(rest));
    } else if let Some(rest) = text.strip_prefix("Reflection:") {
        if let Some((reflection, summary)) = rest.split_once("Action_Summary:") {
            sections.reflection = non_empty(reflection);
            sections.thought = non_empty(until_action(summary));
        }
    } else if let Some(rest) = text.strip_prefix("Action_Summary:") {
        let first_line = rest.lines().next().unwrap_or_default();
        sections.thought = non_empty(until_action(first_line));
    }

    sections.action_text = match text.rfind(ACTION_MARKER) {
        Some(index) => text[index + ACTION_MARKER.len()..].to_string(),
        None => text.to_string(),
    };
    sections
}

/// XML-tagged `<Thought>` with `Action_Summary:` and `Action:` lines closed by `</Output>`.
pub fn split_o1(text: &str) -> Sections {
    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };
    let thought = capture(&O1_THOUGHT_RE);
    let summary = capture(&O1_SUMMARY_RE);
    let action = capture(&O1_ACTION_RE);

    let thought = match (thought, summary) {
        (Some(thought), Some(summary)) => Some(format!("{thought}\n<Action_Summary>\n{summary}")),
        (thought, None) => thought,
        (None, Some(summary)) => Some(format!("<Action_Summary>\n{summary}")),
    };

    Sections {
        reflection: None,
        thought,
        action_text: action.unwrap_or_default(),
    }
}

fn until_action(text: &str) -> &str {
    match text.find(ACTION_MARKER) {
        Some(index) => &text[..index],
        None => text,
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
