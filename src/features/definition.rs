//! Declarative feature definitions, as loaded from configuration.

use crate::types::Value;
use serde::{Deserialize, Serialize};

/// How a calculated feature is derived from its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDefinition {
    /// Output window in seconds. `0` computes the whole requested span at once.
    #[serde(with = "window_serde")]
    pub window: i64,
    /// Ordered inputs. The order is the order in which the function sees them.
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    /// Name of the function in the function library.
    pub function: String,
    /// Value substituted when the function fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Persist results to the durable store, not only to the cache.
    #[serde(default)]
    pub store: bool,
}

impl FeatureDefinition {
    pub fn new(window: i64, function: impl Into<String>) -> Self {
        Self { window, inputs: Vec::new(), function: function.into(), default: None, store: false }
    }

    pub fn input(mut self, source_id: impl Into<String>) -> Self {
        self.inputs.push(InputSpec::Source(source_id.into()));
        self
    }

    pub fn windowed_input(mut self, source_id: impl Into<String>, window: i64) -> Self {
        self.inputs.push(InputSpec::Windowed(source_id.into(), window));
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn stored(mut self) -> Self {
        self.store = true;
        self
    }

    /// The window actually used over `span`: the declared one, or the whole span when it is 0.
    #[inline]
    pub fn effective_window(&self, span: i64) -> i64 {
        if self.window == 0 { span } else { self.window }
    }
}

/// One declared input: either a bare source id, read over the feature's own window,
/// or a `[source_id, window]` pair with an explicit window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSpec {
    Source(String),
    Windowed(String, #[serde(with = "window_serde")] i64),
}

impl InputSpec {
    pub fn source_id(&self) -> &str {
        match self {
            InputSpec::Source(id) | InputSpec::Windowed(id, _) => id,
        }
    }

    /// Resolves the input's id and window for a feature evaluated with `feature_window`.
    pub fn resolve(&self, feature_window: i64) -> (&str, i64) {
        match self {
            InputSpec::Source(id) => (id, feature_window),
            InputSpec::Windowed(id, window) => (id, *window),
        }
    }
}

/// Serde support for windows: integer seconds or a human duration such as `"1h 30m"`.
pub(crate) mod window_serde {
    use crate::time::human_duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(i64),
        Human(String),
    }

    pub fn serialize<S>(window: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        window.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => secs,
            Raw::Human(text) => human_duration(&text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_from_json() {
        let def: FeatureDefinition = serde_json::from_value(json!({
            "window": "5m",
            "inputs": ["temp", ["humidity", "1h"], ["pressure", 60]],
            "function": "average",
            "default": 0,
            "store": true
        }))
        .unwrap();

        assert_eq!(def.window, 300);
        assert_eq!(def.inputs[0], InputSpec::Source("temp".into()));
        assert_eq!(def.inputs[1], InputSpec::Windowed("humidity".into(), 3600));
        assert_eq!(def.inputs[2].resolve(300), ("pressure", 60));
        assert_eq!(def.default, Some(json!(0)));
        assert!(def.store);
    }

    #[test]
    fn test_definition_defaults() {
        let def: FeatureDefinition =
            serde_json::from_value(json!({"window": 0, "function": "count"})).unwrap();
        assert!(def.inputs.is_empty());
        assert!(def.default.is_none());
        assert!(!def.store);
        assert_eq!(def.effective_window(900), 900);
    }
}
