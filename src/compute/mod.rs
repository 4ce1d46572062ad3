//! Resolution of cached data and calculation of what is missing.
pub mod engine;
pub mod missing;
pub mod resolver;

pub use engine::{CalculationEngine, CalculationWarning};
pub use missing::MissingSet;
pub use resolver::Resolver;


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::error::{PipelineError, StoreError};
    use crate::features::{FeatureDefinition, FeatureRegistry};
    use crate::graph::RunContext;
    use crate::io::{InputCache, MemoryCache, MemoryWriter, OnlineCache, SnapshotBackend, SourceBackend};
    use crate::types::{DataPoint, Interval};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn resolve_for(
        reg: &FeatureRegistry,
        sources: &[&str],
        span: Interval,
        cache: &mut dyn InputCache,
        forced: &BTreeSet<String>,
    ) -> (RunContext, MissingSet) {
        let sources: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
        let mut ctx = RunContext::new();
        let order = ctx.build_feature_topology(reg, &sources).unwrap();
        ctx.build_time_graph(reg, &sources, span).unwrap();
        let missing = Resolver::new(reg, forced).resolve(&mut ctx, &order, cache).unwrap();
        (ctx, missing)
    }

    #[test]
    fn test_raw_request_needs_no_calculation() {
        let reg = avg_registry(false);
        let mut cache = OnlineCache::new(SnapshotBackend::new(temp_cache(0, 3600)));
        let (ctx, missing) = resolve_for(&reg, &["temp"], Interval::new(0, 3600), &mut cache, &BTreeSet::new());

        assert!(missing.is_empty());
        assert_eq!(cache.backend().fetches_for("temp"), vec![Interval::new(0, 3600)]);
        let node = ctx.arena().get("temp", Interval::new(0, 3600)).unwrap();
        assert!(ctx.arena().is_met(node));
    }

    #[test]
    fn test_fully_cached_feature_has_nothing_missing() {
        let reg = avg_registry(true);
        let mut stored = temp_cache(0, 900);
        for t in [300, 600, 900] {
            stored.insert("avg_5m", DataPoint::new(t as f64, 300.0, json!(1.0)));
        }
        let mut cache = OnlineCache::new(SnapshotBackend::new(stored));
        let (_, missing) = resolve_for(&reg, &["avg_5m"], Interval::new(0, 900), &mut cache, &BTreeSet::new());

        assert!(missing.is_empty());
        // The stored feature is fetched in one merged query; its inputs are not needed at all.
        assert_eq!(cache.backend().fetches_for("avg_5m"), vec![Interval::new(0, 900)]);
        assert!(cache.backend().fetches_for("temp").is_empty());
    }

    #[test]
    fn test_one_missing_step_is_calculated() {
        let reg = avg_registry(true);
        let mut stored = temp_cache(0, 900);
        for t in [300, 900] {
            stored.insert("avg_5m", DataPoint::new(t as f64, 300.0, json!(1.0)));
        }
        let mut cache = OnlineCache::new(SnapshotBackend::new(stored));
        let (_, mut missing) = resolve_for(&reg, &["avg_5m"], Interval::new(0, 900), &mut cache, &BTreeSet::new());

        assert_eq!(missing.intervals("avg_5m").collect::<Vec<_>>(), vec![Interval::new(300, 600)]);
        assert_eq!(cache.backend().fetches_for("temp"), vec![Interval::new(300, 600)]);

        let mut writer = MemoryWriter::new();
        let none = BTreeSet::new();
        CalculationEngine::new(&reg, &none).calculate_unmet(&mut missing, &mut cache, &mut writer).unwrap();

        let expected = vec![DataPoint::new(600.0, 300.0, 8.0)];
        assert!(!missing.contains("avg_5m", Interval::new(300, 600)));
        assert_eq!(cache.get("avg_5m", Interval::new(300, 600)), expected);
        assert_eq!(writer.entries("avg_5m"), expected.as_slice());
    }

    #[test]
    fn test_adjacent_needs_are_merged_into_one_query() {
        let reg = avg_registry(false);
        let mut cache = OnlineCache::new(SnapshotBackend::new(temp_cache(0, 900)));
        let (_, missing) = resolve_for(&reg, &["avg_5m"], Interval::new(0, 900), &mut cache, &BTreeSet::new());

        assert_eq!(missing.len(), 3);
        assert_eq!(cache.backend().fetches_for("temp"), vec![Interval::new(0, 900)]);
        // Unstored features are never queried from the backing store.
        assert!(cache.backend().fetches_for("avg_5m").is_empty());
    }

    #[test]
    fn test_forced_sources_are_never_met() {
        let reg = avg_registry(false);
        let mut cache = temp_cache(0, 900);
        cache.insert("avg_5m", DataPoint::new(300.0, 300.0, json!(0)));
        let forced: BTreeSet<String> = ["avg_5m".to_string()].into();

        let (_, missing) = resolve_for(&reg, &["avg_5m"], Interval::new(0, 900), &mut cache, &forced);
        assert!(missing.contains("avg_5m", Interval::new(0, 300)));
        assert_eq!(missing.len(), 3);
    }

    struct Offline;

    impl SourceBackend for Offline {
        fn fetch(&mut self, _: &str, _: Interval) -> Result<Vec<DataPoint>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    #[test]
    fn test_store_failure_is_fatal_with_context() {
        let reg = avg_registry(false);
        let sources = vec!["avg_5m".to_string()];
        let mut ctx = RunContext::new();
        let order = ctx.build_feature_topology(&reg, &sources).unwrap();
        ctx.build_time_graph(&reg, &sources, Interval::new(0, 300)).unwrap();

        let mut cache = OnlineCache::new(Offline);
        let none = BTreeSet::new();
        let err = Resolver::new(&reg, &none).resolve(&mut ctx, &order, &mut cache).unwrap_err();
        match err {
            PipelineError::Store { context, .. } => assert_eq!(context, "querying temp over (0, 300]"),
            other => panic!("Wrong error: {other}"),
        }
    }

    #[test]
    fn test_offline_cache_is_not_queried() {
        let mut reg = avg_registry(false);
        reg.define("avg_15m", FeatureDefinition::new(900, "average").windowed_input("avg_5m", 900));
        let mut cache: MemoryCache = temp_cache(0, 900);
        let (ctx, mut missing) =
            resolve_for(&reg, &["avg_15m"], Interval::new(0, 900), &mut cache, &BTreeSet::new());

        assert_eq!(missing.len(), 4);
        let temp = ctx.arena().get("temp", Interval::new(300, 600)).unwrap();
        assert!(ctx.arena().is_met(temp));

        let mut writer = MemoryWriter::new();
        let none = BTreeSet::new();
        CalculationEngine::new(&reg, &none).calculate_unmet(&mut missing, &mut cache, &mut writer).unwrap();
        // Mean of the three 5-minute means 3, 8 and 13.
        assert_eq!(cache.get_at("avg_15m", 900.0).map(|p| p.value), Some(json!(8.0)));
    }
}
