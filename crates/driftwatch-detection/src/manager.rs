//! Detector manager: routing, lifecycle, cooldown, and persistence
//! orchestration.
//!
//! Samples for the same detector key are serialized through a per-key
//! lock guarding detector, trajectory, and cooldown inspection as one
//! critical section; samples for different keys run in parallel. The
//! global detector table is a concurrent map.

use crate::cusum::CusumDetector;
use crate::trajectory::TrajectoryCache;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use dashmap::DashMap;
use driftwatch_core::config::{DetectorConfig, DetectorConfigUpdate};
use driftwatch_core::metric_names::{counters, gauges, histograms};
use driftwatch_core::sample::{DecisionSnapshot, DetectionRecord, DetectorState, Sample};
use driftwatch_core::store::{ConfigStore, RecordLog, StateStore};
use driftwatch_core::types::{AlertSide, DetectorKey, ItemId, ItemType, ProcessContext};
use driftwatch_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of processing one sample
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Canonical detector key the sample routed to
    pub key: String,
    /// Whether the detector raised an alert
    pub alert: bool,
    /// Whether the alert survived cooldown and should be pushed
    pub should_push: bool,
    /// Direction of the alert, if any
    pub alert_side: Option<AlertSide>,
    /// Annotated snapshot of this step
    pub snapshot: DecisionSnapshot,
    /// Bounded trajectory window, oldest to newest
    pub trajectory: Vec<DecisionSnapshot>,
    /// Item type the detector ran as
    pub item_type: ItemType,
    /// Configuration the detector captured at construction (after any
    /// hot reloads)
    pub config: DetectorConfig,
}

/// Detector plus its trajectory, guarded as one critical section
#[derive(Debug)]
struct DetectorCell {
    detector: CusumDetector,
    trajectory: TrajectoryCache,
}

/// Routes samples to detectors and mediates persistence
pub struct DetectorManager {
    detectors: DashMap<String, Arc<Mutex<DetectorCell>>>,
    pending_states: Mutex<HashMap<String, DetectorState>>,
    defaults: RwLock<DetectorConfig>,
    config_store: Arc<dyn ConfigStore>,
    state_store: Arc<dyn StateStore>,
    record_log: Arc<dyn RecordLog>,
}

impl DetectorManager {
    /// Create a manager over the three persistence collaborators
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        state_store: Arc<dyn StateStore>,
        record_log: Arc<dyn RecordLog>,
        defaults: DetectorConfig,
    ) -> Self {
        info!("Creating detector manager");
        Self {
            detectors: DashMap::new(),
            pending_states: Mutex::new(HashMap::new()),
            defaults: RwLock::new(defaults),
            config_store,
            state_store,
            record_log,
        }
    }

    /// Normalize a raw timestamp string.
    ///
    /// Accepts RFC 3339 (with or without `Z`) and bare
    /// `YYYY-MM-DDTHH:MM:SS` forms; falls back to the wall clock so a
    /// sample is never refused over time parsing.
    pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return dt.with_timezone(&Utc);
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Utc.from_utc_datetime(&naive);
            }
        }
        warn!(raw, "Unparseable sample timestamp, falling back to wall clock");
        Utc::now()
    }

    /// Process one sample end to end: route, detect, apply cooldown,
    /// journal, and return the annotated decision
    pub fn ingest(
        &self,
        sample: &Sample,
        override_cfg: Option<&DetectorConfigUpdate>,
    ) -> Result<IngestOutcome> {
        if sample.n == 0 {
            return Err(Error::validation("Sample throughput must be positive"));
        }
        if !sample.value.is_finite() {
            return Err(Error::validation("Sample value must be finite"));
        }
        if sample.item.as_str().is_empty() {
            return Err(Error::validation("Sample item must not be empty"));
        }

        let key = sample.detector_key().canonical();
        let config = self.resolve_config(&key, sample.item.as_str(), override_cfg);
        let cell = self.cell(&key, &config);

        let started = Instant::now();
        let mut guard = cell.lock().expect("detector cell lock poisoned");
        let outcome = guard
            .detector
            .update(sample.timestamp, sample.value, sample.n);

        let cfg = guard.detector.config();
        let item_type = cfg.item_type;
        let detector_config = cfg.clone();
        let should_push = if !outcome.alert {
            false
        } else if !cfg.enable_cooldown {
            true
        } else {
            !guard.trajectory.pushed_within(cfg.cooldown_periods)
        };

        let mut snapshot = outcome.snapshot;
        snapshot.push_executed = should_push;
        guard.trajectory.push(snapshot.clone());

        // The record log is advisory; the in-memory decision stands even
        // when the append fails.
        let record = DetectionRecord {
            key: key.clone(),
            item: sample.item.clone(),
            context: sample.context.clone(),
            item_type,
            snapshot: snapshot.clone(),
            tags: sample.tags.clone(),
        };
        if let Err(e) = self.record_log.append(&record) {
            warn!(key = %key, error = %e, "Record log append failed");
            metrics::counter!(counters::RECORD_APPEND_FAILURES_TOTAL).increment(1);
        }

        let trajectory = guard.trajectory.to_vec();
        drop(guard);

        metrics::counter!(counters::SAMPLES_INGESTED_TOTAL).increment(1);
        metrics::histogram!(histograms::DETECTION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        if snapshot.skip_reason.is_some() {
            metrics::counter!(counters::STEPS_SKIPPED_TOTAL).increment(1);
        }
        if outcome.alert {
            metrics::counter!(counters::ALERTS_RAISED_TOTAL).increment(1);
            if should_push {
                metrics::counter!(counters::ALERTS_PUSHED_TOTAL).increment(1);
            } else {
                metrics::counter!(counters::ALERTS_SUPPRESSED_TOTAL).increment(1);
            }
            debug!(
                key = %key,
                side = ?outcome.alert_side,
                pushed = should_push,
                "Alert raised"
            );
        }

        Ok(IngestOutcome {
            key,
            alert: outcome.alert,
            should_push,
            alert_side: outcome.alert_side,
            snapshot,
            trajectory,
            item_type,
            config: detector_config,
        })
    }

    /// Upsert a persisted configuration delta for a key
    pub fn register(&self, key: &str, delta: &DetectorConfigUpdate) -> Result<()> {
        self.config_store.set(&key.to_lowercase(), delta)?;
        info!(key, "Registered detector config");
        Ok(())
    }

    /// Persist a configuration delta and hot-reload any live detector.
    ///
    /// Returns whether a live detector picked the change up; the
    /// persisted delta applies to future constructions either way.
    pub fn update_config(&self, key: &str, delta: &DetectorConfigUpdate) -> Result<bool> {
        let key = key.to_lowercase();
        self.config_store.set(&key, delta)?;

        let cell = match self.detectors.get(&key) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Ok(false),
        };
        let mut guard = cell.lock().expect("detector cell lock poisoned");
        guard.detector.reconfigure(delta);
        info!(key = %key, "Hot-reloaded live detector config");
        Ok(true)
    }

    /// Update the global defaults. Existing detectors keep the config
    /// they captured at construction; only future constructions see the
    /// new defaults.
    pub fn update_global(&self, delta: &DetectorConfigUpdate) -> Result<DetectorConfig> {
        let updated = {
            let mut defaults = self.defaults.write().expect("defaults lock poisoned");
            defaults.apply(delta);
            defaults.clone()
        };
        updated.validate_config()?;
        self.config_store.set_global(&updated)?;
        info!("Updated global detector defaults");
        Ok(updated)
    }

    /// Current global defaults
    pub fn global_defaults(&self) -> DetectorConfig {
        self.defaults.read().expect("defaults lock poisoned").clone()
    }

    /// Global defaults plus every persisted per-key delta
    pub fn list_configs(&self) -> Result<(DetectorConfig, HashMap<String, DetectorConfigUpdate>)> {
        Ok((self.global_defaults(), self.config_store.list()?))
    }

    /// Remove a detector: live instance, persisted config, and state.
    /// Returns whether anything existed under the key.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_lowercase();
        let had_detector = self.detectors.remove(&key).is_some();
        let had_config = self.config_store.delete(&key)?;
        self.state_store.delete_many(std::slice::from_ref(&key))?;
        metrics::gauge!(gauges::ACTIVE_DETECTORS).set(self.detectors.len() as f64);
        if had_detector || had_config {
            info!(key = %key, "Removed detector");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Seed persisted configs for a batch of items, baking the current
    /// global defaults (plus a shared override) into each entry so later
    /// default changes do not drift under them
    pub fn batch_import(
        &self,
        items: &[String],
        shared: &DetectorConfigUpdate,
        context: Option<&ProcessContext>,
    ) -> Result<usize> {
        let baked = DetectorConfigUpdate::from(&self.global_defaults().merged(shared));
        let mut count = 0;
        for item in items {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let key = match context {
                Some(ctx) if !ctx.is_empty() => {
                    DetectorKey::new(ItemId::new(item), ctx.clone()).canonical()
                }
                _ => DetectorKey::bare(item).canonical(),
            };
            self.config_store.set(&key, &baked)?;
            count += 1;
        }
        info!(count, "Batch-imported detector configs");
        Ok(count)
    }

    /// Checkpoint every live detector; returns how many were saved
    pub fn save_all_states(&self) -> Result<usize> {
        let started = Instant::now();
        let mut states = Vec::with_capacity(self.detectors.len());
        for entry in self.detectors.iter() {
            let guard = entry.value().lock().expect("detector cell lock poisoned");
            states.push((entry.key().clone(), guard.detector.snapshot_state()));
        }
        if states.is_empty() {
            return Ok(0);
        }
        self.state_store.upsert_many(&states)?;
        metrics::histogram!(histograms::CHECKPOINT_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        info!(count = states.len(), "Checkpointed detector states");
        Ok(states.len())
    }

    /// Load persisted states; each is applied lazily when its detector
    /// is first constructed. Returns how many were loaded.
    pub fn load_all_states(&self) -> Result<usize> {
        let loaded = self.state_store.load_all()?;
        let count = loaded.len();
        *self.pending_states.lock().expect("pending states lock poisoned") = loaded;
        info!(count, "Loaded persisted detector states");
        Ok(count)
    }

    /// Construct detectors for every persisted config so the monitor
    /// surface is populated before the first sample arrives
    pub fn prewarm(&self) -> Result<usize> {
        let configs = self.config_store.list()?;
        let defaults = self.global_defaults();
        let mut count = 0;
        for (key, delta) in configs {
            let config = defaults.merged(&delta);
            self.cell(&key, &config);
            count += 1;
        }
        info!(count, "Pre-warmed detectors from persisted configs");
        Ok(count)
    }

    /// Canonical keys of live detectors
    pub fn active_keys(&self) -> Vec<String> {
        self.detectors.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of live detectors
    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Latest decision snapshot per live detector
    pub fn monitor_snapshot(&self) -> Vec<(String, DecisionSnapshot)> {
        let mut out = Vec::new();
        for entry in self.detectors.iter() {
            let guard = entry.value().lock().expect("detector cell lock poisoned");
            if let Some(snapshot) = guard.trajectory.latest() {
                out.push((entry.key().clone(), snapshot.clone()));
            }
        }
        out
    }

    /// Trajectory window for one detector, if it is live
    pub fn trajectory(&self, key: &str) -> Option<Vec<DecisionSnapshot>> {
        self.detectors.get(&key.to_lowercase()).map(|cell| {
            let guard = cell.value().lock().expect("detector cell lock poisoned");
            guard.trajectory.to_vec()
        })
    }

    /// Resolve the effective config for a key:
    /// caller override > per-key delta > per-item delta > global defaults
    fn resolve_config(
        &self,
        key: &str,
        item: &str,
        override_cfg: Option<&DetectorConfigUpdate>,
    ) -> DetectorConfig {
        let mut config = self.global_defaults();

        let item_key = item.to_lowercase();
        if item_key != key {
            match self.config_store.get(&item_key) {
                Ok(Some(delta)) => config.apply(&delta),
                Ok(None) => {}
                Err(e) => warn!(item = %item_key, error = %e, "Config lookup failed"),
            }
        }
        match self.config_store.get(key) {
            Ok(Some(delta)) => config.apply(&delta),
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "Config lookup failed"),
        }
        if let Some(delta) = override_cfg {
            config.apply(delta);
        }

        if let Err(e) = config.validate_config() {
            warn!(key, error = %e, "Resolved config invalid, using defaults");
            return self.global_defaults();
        }
        config
    }

    /// Fetch or lazily create the cell for a key, applying any pending
    /// restored state on first construction
    fn cell(&self, key: &str, config: &DetectorConfig) -> Arc<Mutex<DetectorCell>> {
        let cell = self
            .detectors
            .entry(key.to_string())
            .or_insert_with(|| {
                let mut detector = CusumDetector::new(config.clone());
                if let Some(state) = self
                    .pending_states
                    .lock()
                    .expect("pending states lock poisoned")
                    .remove(key)
                {
                    debug!(key, "Applying restored state to new detector");
                    detector.restore_state(&state);
                }
                Arc::new(Mutex::new(DetectorCell {
                    detector,
                    trajectory: TrajectoryCache::new(),
                }))
            })
            .clone();
        metrics::gauge!(gauges::ACTIVE_DETECTORS).set(self.detectors.len() as f64);
        cell
    }
}

impl std::fmt::Debug for DetectorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorManager")
            .field("detectors", &self.detectors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::store::RecordFilter;
    use driftwatch_core::types::MonitoringSide;
    use std::collections::HashMap as StdHashMap;

    /// In-memory config store for tests
    #[derive(Default)]
    struct MemConfig {
        entries: Mutex<StdHashMap<String, DetectorConfigUpdate>>,
        global: Mutex<Option<DetectorConfig>>,
    }

    impl ConfigStore for MemConfig {
        fn get(&self, key: &str) -> Result<Option<DetectorConfigUpdate>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }
        fn set(&self, key: &str, delta: &DetectorConfigUpdate) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            entries
                .entry(key.to_string())
                .or_default()
                .merge(delta);
            Ok(())
        }
        fn delete(&self, key: &str) -> Result<bool> {
            Ok(self.entries.lock().unwrap().remove(key).is_some())
        }
        fn list(&self) -> Result<StdHashMap<String, DetectorConfigUpdate>> {
            Ok(self.entries.lock().unwrap().clone())
        }
        fn get_global(&self) -> Result<Option<DetectorConfig>> {
            Ok(self.global.lock().unwrap().clone())
        }
        fn set_global(&self, config: &DetectorConfig) -> Result<()> {
            *self.global.lock().unwrap() = Some(config.clone());
            Ok(())
        }
    }

    /// In-memory state store for tests
    #[derive(Default)]
    struct MemState {
        states: Mutex<StdHashMap<String, DetectorState>>,
    }

    impl StateStore for MemState {
        fn upsert_many(&self, states: &[(String, DetectorState)]) -> Result<()> {
            let mut map = self.states.lock().unwrap();
            for (key, state) in states {
                map.insert(key.clone(), state.clone());
            }
            Ok(())
        }
        fn delete_many(&self, keys: &[String]) -> Result<()> {
            let mut map = self.states.lock().unwrap();
            for key in keys {
                map.remove(key);
            }
            Ok(())
        }
        fn load_all(&self) -> Result<StdHashMap<String, DetectorState>> {
            Ok(self.states.lock().unwrap().clone())
        }
    }

    /// In-memory record log for tests
    #[derive(Default)]
    struct MemLog {
        records: Mutex<Vec<DetectionRecord>>,
    }

    impl RecordLog for MemLog {
        fn append(&self, record: &DetectionRecord) -> Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
        fn query(&self, filter: &RecordFilter) -> Result<Vec<DetectionRecord>> {
            let mut out: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect();
            out.sort_by_key(|r| r.snapshot.timestamp);
            out.truncate(filter.limit);
            Ok(out)
        }
        fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|r| r.snapshot.timestamp >= cutoff);
            Ok((before - records.len()) as u64)
        }
    }

    struct Fixture {
        manager: DetectorManager,
        config: Arc<MemConfig>,
        state: Arc<MemState>,
        log: Arc<MemLog>,
    }

    fn fixture(defaults: DetectorConfig) -> Fixture {
        let config = Arc::new(MemConfig::default());
        let state = Arc::new(MemState::default());
        let log = Arc::new(MemLog::default());
        let manager = DetectorManager::new(
            Arc::clone(&config) as Arc<dyn ConfigStore>,
            Arc::clone(&state) as Arc<dyn StateStore>,
            Arc::clone(&log) as Arc<dyn RecordLog>,
            defaults,
        );
        Fixture {
            manager,
            config,
            state,
            log,
        }
    }

    fn yield_defaults() -> DetectorConfig {
        DetectorConfig {
            mu0: 0.005,
            base_n: 1000,
            target_shift_sigma: 1.0,
            target_arl0: 250.0,
            monitoring_side: Some(MonitoringSide::Upper),
            item_type: ItemType::Yield,
            ..Default::default()
        }
    }

    fn ts(i: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).single().unwrap()
            + chrono::Duration::minutes(i as i64)
    }

    fn sample(item: &str, value: f64, n: u64, i: u32) -> Sample {
        Sample {
            item: ItemId::new(item),
            context: ProcessContext::default(),
            value,
            n,
            timestamp: ts(i),
            tags: StdHashMap::new(),
        }
    }

    fn sample_with_product(item: &str, product: &str, value: f64, n: u64, i: u32) -> Sample {
        Sample {
            context: ProcessContext {
                product: Some(product.to_string()),
                line: None,
                station: None,
            },
            ..sample(item, value, n, i)
        }
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let with_z = DetectorManager::parse_timestamp("2025-03-01T12:00:00Z");
        assert_eq!(with_z, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().unwrap());

        let with_offset = DetectorManager::parse_timestamp("2025-03-01T12:00:00+02:00");
        assert_eq!(
            with_offset,
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).single().unwrap()
        );

        let bare = DetectorManager::parse_timestamp("2025-03-01T12:00:00");
        assert_eq!(bare, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().unwrap());
    }

    #[test]
    fn test_parse_timestamp_fallback_is_now() {
        let before = Utc::now();
        let parsed = DetectorManager::parse_timestamp("not-a-time");
        assert!(parsed >= before);
    }

    #[test]
    fn test_bad_samples_rejected() {
        let f = fixture(yield_defaults());
        assert!(f.manager.ingest(&sample("x", 0.005, 0, 0), None).is_err());
        assert!(f
            .manager
            .ingest(&sample("x", f64::NAN, 1000, 0), None)
            .is_err());
        assert!(f.manager.ingest(&sample("", 0.005, 1000, 0), None).is_err());
        // Nothing reached the detector table or the log.
        assert_eq!(f.manager.detector_count(), 0);
        assert!(f.log.records.lock().unwrap().is_empty());
    }

    #[test]
    fn test_key_set_matches_distinct_inputs() {
        let f = fixture(yield_defaults());
        f.manager.ingest(&sample("a", 0.005, 1000, 0), None).unwrap();
        f.manager.ingest(&sample("A", 0.005, 1000, 1), None).unwrap();
        f.manager
            .ingest(&sample_with_product("a", "P1", 0.005, 1000, 2), None)
            .unwrap();
        let mut keys = f.manager.active_keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "p1::unknownline::unknownstation::a"]);
    }

    #[test]
    fn test_per_key_isolation() {
        let f = fixture(yield_defaults());
        // Detector under product A sees a spike; product B stays clean.
        for i in 0..5 {
            f.manager
                .ingest(&sample_with_product("X", "A", 0.005, 1000, i), None)
                .unwrap();
            f.manager
                .ingest(&sample_with_product("X", "B", 0.005, 1000, i), None)
                .unwrap();
        }
        let spiked = f
            .manager
            .ingest(&sample_with_product("X", "A", 0.1, 1000, 6), None)
            .unwrap();
        assert!(spiked.alert);

        let clean = f
            .manager
            .ingest(&sample_with_product("X", "B", 0.005, 1000, 6), None)
            .unwrap();
        assert!(!clean.alert);
        assert_eq!(clean.snapshot.s_plus, 0.0);
    }

    #[test]
    fn test_cooldown_law() {
        let mut defaults = yield_defaults();
        defaults.cooldown_periods = 3;
        defaults.target_arl0 = 2.0; // tiny threshold: every spike alerts
        let f = fixture(defaults);

        let mut pushes = Vec::new();
        for i in 0..10 {
            let outcome = f.manager.ingest(&sample("hot", 0.1, 1000, i), None).unwrap();
            assert!(outcome.alert, "sample {} should alert", i);
            pushes.push(outcome.should_push);
        }
        // With C = 3, a push suppresses the next 3 alerts: among any 4
        // consecutive alerts exactly one is pushed.
        let expected = vec![
            true, false, false, false, true, false, false, false, true, false,
        ];
        assert_eq!(pushes, expected);
    }

    #[test]
    fn test_cooldown_disabled_pushes_every_alert() {
        let mut defaults = yield_defaults();
        defaults.enable_cooldown = false;
        defaults.target_arl0 = 2.0;
        let f = fixture(defaults);

        for i in 0..5 {
            let outcome = f.manager.ingest(&sample("hot", 0.1, 1000, i), None).unwrap();
            assert!(outcome.alert);
            assert!(outcome.should_push);
        }
    }

    #[test]
    fn test_suppressed_alert_still_counts_as_alert() {
        let mut defaults = yield_defaults();
        defaults.cooldown_periods = 5;
        defaults.target_arl0 = 2.0;
        let f = fixture(defaults);

        let first = f.manager.ingest(&sample("hot", 0.1, 1000, 0), None).unwrap();
        assert!(first.alert && first.should_push);

        let second = f.manager.ingest(&sample("hot", 0.1, 1000, 1), None).unwrap();
        assert!(second.alert);
        assert!(!second.should_push);
        // Detector reset happened regardless of suppression.
        assert_eq!(second.trajectory.len(), 2);
    }

    #[test]
    fn test_config_precedence_override_wins() {
        let f = fixture(yield_defaults());
        f.manager
            .register(
                "slow",
                &DetectorConfigUpdate {
                    mu0: Some(0.2),
                    ..Default::default()
                },
            )
            .unwrap();

        // Persisted per-item config applies...
        let from_store = f.manager.ingest(&sample("slow", 0.2, 1000, 0), None).unwrap();
        assert_eq!(from_store.snapshot.baseline, 0.2);

        // ...but a caller override beats it for a fresh detector.
        let override_cfg = DetectorConfigUpdate {
            mu0: Some(0.4),
            ..Default::default()
        };
        let fresh = fixture(yield_defaults());
        fresh
            .manager
            .register(
                "slow",
                &DetectorConfigUpdate {
                    mu0: Some(0.2),
                    ..Default::default()
                },
            )
            .unwrap();
        let overridden = fresh
            .manager
            .ingest(&sample("slow", 0.4, 1000, 0), Some(&override_cfg))
            .unwrap();
        assert_eq!(overridden.snapshot.baseline, 0.4);
    }

    #[test]
    fn test_update_global_spares_existing_detectors() {
        let f = fixture(yield_defaults());
        let before = f.manager.ingest(&sample("a", 0.005, 1000, 0), None).unwrap();

        f.manager
            .update_global(&DetectorConfigUpdate {
                target_arl0: Some(10_000.0),
                ..Default::default()
            })
            .unwrap();

        // Existing detector keeps its captured tuning.
        let after = f.manager.ingest(&sample("a", 0.005, 1000, 1), None).unwrap();
        assert_eq!(after.snapshot.threshold, before.snapshot.threshold);

        // A new detector resolves against the new defaults.
        let fresh = f.manager.ingest(&sample("b", 0.005, 1000, 0), None).unwrap();
        assert!(fresh.snapshot.threshold > before.snapshot.threshold);
    }

    #[test]
    fn test_hot_reload_threshold_within_one_call() {
        let f = fixture(yield_defaults());
        let before = f.manager.ingest(&sample("a", 0.005, 1000, 0), None).unwrap();

        let live = f
            .manager
            .update_config(
                "a",
                &DetectorConfigUpdate {
                    target_arl0: Some(1000.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(live);

        let after = f.manager.ingest(&sample("a", 0.005, 1000, 1), None).unwrap();
        assert!(after.snapshot.threshold > before.snapshot.threshold);
    }

    #[test]
    fn test_update_config_unknown_key_persists_only() {
        let f = fixture(yield_defaults());
        let live = f
            .manager
            .update_config(
                "ghost",
                &DetectorConfigUpdate {
                    mu0: Some(0.9),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!live);
        assert!(f.config.get("ghost").unwrap().is_some());
    }

    #[test]
    fn test_remove_detector() {
        let f = fixture(yield_defaults());
        f.manager.ingest(&sample("a", 0.005, 1000, 0), None).unwrap();
        f.manager.save_all_states().unwrap();
        assert_eq!(f.state.states.lock().unwrap().len(), 1);

        assert!(f.manager.remove("a").unwrap());
        assert_eq!(f.manager.detector_count(), 0);
        assert!(f.state.states.lock().unwrap().is_empty());

        // Unknown key is a no-op, not an error.
        assert!(!f.manager.remove("a").unwrap());
    }

    #[test]
    fn test_save_and_restore_states() {
        let f = fixture(yield_defaults());
        // Accumulate some positive drift without alerting.
        for i in 0..5 {
            f.manager.ingest(&sample("a", 0.007, 1000, i), None).unwrap();
        }
        let saved = f.manager.save_all_states().unwrap();
        assert_eq!(saved, 1);
        let persisted = f.state.states.lock().unwrap().get("a").cloned().unwrap();
        assert!(persisted.s_plus > 0.0);

        // New manager over the same stores: restore is lazy.
        let manager2 = DetectorManager::new(
            Arc::clone(&f.config) as Arc<dyn ConfigStore>,
            Arc::clone(&f.state) as Arc<dyn StateStore>,
            Arc::clone(&f.log) as Arc<dyn RecordLog>,
            yield_defaults(),
        );
        assert_eq!(manager2.load_all_states().unwrap(), 1);
        let outcome = manager2.ingest(&sample("a", 0.005, 1000, 10), None).unwrap();
        // The restored accumulator carried over (0.005 contributes ~0).
        assert!(outcome.snapshot.s_plus > 0.0);
    }

    #[test]
    fn test_records_journaled_including_skips() {
        let mut defaults = yield_defaults();
        defaults.base_n = 500;
        defaults.min_detection_ratio = 0.15;
        let f = fixture(defaults);

        f.manager.ingest(&sample("a", 0.005, 500, 0), None).unwrap();
        let skip = f.manager.ingest(&sample("a", 0.005, 50, 1), None).unwrap();
        assert!(skip.snapshot.skip_reason.is_some());

        let records = f.log.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].snapshot.skip_reason.is_some());
    }

    #[test]
    fn test_prewarm_builds_detectors() {
        let f = fixture(yield_defaults());
        f.manager
            .batch_import(
                &["a".to_string(), "b".to_string()],
                &DetectorConfigUpdate::default(),
                None,
            )
            .unwrap();
        assert_eq!(f.manager.prewarm().unwrap(), 2);
        assert_eq!(f.manager.detector_count(), 2);
        // Pre-warmed detectors have no decisions yet.
        assert!(f.manager.monitor_snapshot().is_empty());
    }

    #[test]
    fn test_batch_import_bakes_defaults() {
        let f = fixture(yield_defaults());
        f.manager
            .batch_import(
                &["a".to_string()],
                &DetectorConfigUpdate {
                    cooldown_periods: Some(9),
                    ..Default::default()
                },
                None,
            )
            .unwrap();

        let delta = f.config.get("a").unwrap().unwrap();
        assert_eq!(delta.cooldown_periods, Some(9));
        // Defaults were baked in explicitly.
        assert_eq!(delta.target_arl0, Some(250.0));

        // Later default changes do not leak into the imported item.
        f.manager
            .update_global(&DetectorConfigUpdate {
                target_arl0: Some(5000.0),
                ..Default::default()
            })
            .unwrap();
        let outcome = f.manager.ingest(&sample("a", 0.005, 1000, 0), None).unwrap();
        assert_eq!(outcome.snapshot.threshold, 2.0 * 250.0_f64.ln());
    }
}
