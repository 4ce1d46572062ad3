use super::definition::FeatureDefinition;
use super::functions::{FeatureFn, FunctionLibrary};
use crate::error::{ConfigError, PipelineError};
use crate::types::SourceKind;
use std::collections::BTreeMap;
use std::path::Path;

/// Feature definitions keyed by source id, together with the functions they reference.
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    definitions: BTreeMap<String, FeatureDefinition>,
    library: FunctionLibrary,
}

impl FeatureRegistry {
    pub fn new(library: FunctionLibrary) -> Self {
        Self { definitions: BTreeMap::new(), library }
    }

    /// Loads a `{ "<source_id>": <definition>, ... }` JSON file.
    pub fn from_path(path: &Path, library: FunctionLibrary) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let definitions: BTreeMap<String, FeatureDefinition> = serde_json::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        log::debug!("Loaded {} feature definitions from {:?}", definitions.len(), path);
        Ok(Self { definitions, library })
    }

    pub fn define(&mut self, source_id: impl Into<String>, definition: FeatureDefinition) -> &mut Self {
        self.definitions.insert(source_id.into(), definition);
        self
    }

    /// `Calculated` iff `source_id` has a feature definition.
    #[inline]
    pub fn classify(&self, source_id: &str) -> SourceKind {
        if self.definitions.contains_key(source_id) {
            SourceKind::Calculated
        } else {
            SourceKind::Raw
        }
    }

    pub fn is_calculated(&self, source_id: &str) -> bool {
        self.classify(source_id) == SourceKind::Calculated
    }

    pub fn definition(&self, source_id: &str) -> Option<&FeatureDefinition> {
        self.definitions.get(source_id)
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&str, &FeatureDefinition)> {
        self.definitions.iter().map(|(id, def)| (id.as_str(), def))
    }

    pub fn library(&self) -> &FunctionLibrary {
        &self.library
    }

    /// The function that calculates `source_id`.
    pub fn function_for(&self, source_id: &str) -> Result<&FeatureFn, PipelineError> {
        let def = self
            .definition(source_id)
            .ok_or_else(|| PipelineError::NotCalculated(source_id.to_string()))?;
        self.library.get(&def.function).ok_or_else(|| PipelineError::UnknownFunction {
            source_id: source_id.to_string(),
            function: def.function.clone(),
        })
    }

    /// Whether results of `source_id` are persisted to the durable store.
    pub fn is_stored(&self, source_id: &str) -> bool {
        self.definition(source_id).map_or(false, |d| d.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_classify_by_registry_membership() {
        let mut reg = FeatureRegistry::new(FunctionLibrary::builtin());
        reg.define("avg_5m", FeatureDefinition::new(300, "average").input("temp"));

        assert_eq!(reg.classify("avg_5m"), SourceKind::Calculated);
        assert_eq!(reg.classify("temp"), SourceKind::Raw);
        assert!(reg.function_for("avg_5m").is_ok());
        assert!(matches!(reg.function_for("temp"), Err(PipelineError::NotCalculated(_))));
    }

    #[test]
    fn test_unknown_function_is_reported() {
        let mut reg = FeatureRegistry::new(FunctionLibrary::new());
        reg.define("f", FeatureDefinition::new(60, "nope"));
        match reg.function_for("f") {
            Err(PipelineError::UnknownFunction { function, .. }) => assert_eq!(function, "nope"),
            other => panic!("Wrong result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"avg_5m": {{"window": "5m", "inputs": ["temp"], "function": "average", "store": true}}}}"#
        )
        .unwrap();

        let reg = FeatureRegistry::from_path(file.path(), FunctionLibrary::builtin()).unwrap();
        assert!(reg.is_stored("avg_5m"));
        assert_eq!(reg.definition("avg_5m").map(|d| d.window), Some(300));
    }
}
