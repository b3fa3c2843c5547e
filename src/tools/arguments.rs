//! Typed access to tool call arguments.

use crate::error::TarkoError;

/// Parsed tool call arguments with typed extraction helpers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Parse the raw argument text a model produced.
    ///
    /// Blank input is treated as an empty object.
    pub fn parse(raw: &str) -> Result<Self, TarkoError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::new(serde_json::json!({})));
        }
        serde_json::from_str(trimmed)
            .map(Self::new)
            .map_err(|e| TarkoError::InvalidArgument(format!("Failed to parse arguments: {e}")))
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, TarkoError> {
        self.get_str_opt(key)
            .ok_or_else(|| missing("string", key))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, TarkoError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| missing("integer", key))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, TarkoError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| missing("number", key))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, TarkoError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| missing("boolean", key))
    }

    /// Get a nested object.
    pub fn get_object(&self, key: &str) -> Result<&serde_json::Value, TarkoError> {
        self.value
            .get(key)
            .filter(|v| v.is_object())
            .ok_or_else(|| missing("object", key))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, TarkoError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            TarkoError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

fn missing(kind: &str, key: &str) -> TarkoError {
    TarkoError::InvalidArgument(format!("Missing {kind} argument: {key}"))
}
