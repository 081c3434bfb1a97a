//! Rule-based correlation plus the pattern and anomaly detectors that
//! ride on the same sliding window (§4.8).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use sentinel_model::{Event, EventType};

use super::super::time_window::TimeWindow;

/// A predicate a candidate event must satisfy to count toward a rule.
#[derive(Debug, Clone)]
pub enum Condition {
    /// `event.field(field) == value`, compared as strings (the engine
    /// only ever tests discrete identifiers, never ranges).
    FieldEquals { field: String, value: String },
    /// Group candidates by the triggering event's interface rather
    /// than matching across the whole window.
    SameInterface,
}

#[derive(Debug, Clone)]
pub struct CorrelationRule {
    pub name: String,
    /// Zero means "use the engine's `default_horizon_s`".
    pub horizon_s: i64,
    pub conditions: Vec<Condition>,
    pub min_event_count: usize,
    pub generate_alert: bool,
}

impl CorrelationRule {
    pub fn new(name: impl Into<String>, min_event_count: usize) -> Self {
        Self {
            name: name.into(),
            horizon_s: 0,
            conditions: Vec::new(),
            min_event_count,
            generate_alert: true,
        }
    }

    pub fn with_horizon(mut self, horizon_s: i64) -> Self {
        self.horizon_s = horizon_s;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationResult {
    pub correlation_id: String,
    pub rule_name: String,
    pub event_count: usize,
    pub events: Vec<Event>,
    pub first_ts: i64,
    pub last_ts: i64,
}

#[derive(Debug, Clone)]
pub struct PatternResult {
    pub event_type: EventType,
    pub count: u64,
    pub first_ts: i64,
    pub last_ts: i64,
    pub events_per_second: f64,
}

#[derive(Debug, Clone)]
pub struct AnomalyResult {
    pub event_type: EventType,
    pub value: f64,
    pub mean: f64,
    pub stddev: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    pub max_window_size: usize,
    pub default_horizon_s: i64,
    pub max_rules: usize,
    pub enable_pattern_detection: bool,
    pub enable_anomaly_detection: bool,
    pub pattern_min_frequency: u64,
    pub anomaly_threshold: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            max_window_size: 10_000,
            default_horizon_s: 60,
            max_rules: 256,
            enable_pattern_detection: true,
            enable_anomaly_detection: true,
            pattern_min_frequency: 20,
            anomaly_threshold: 3.0,
        }
    }
}

struct PatternStat {
    count: u64,
    first_ts: i64,
    last_ts: i64,
    reported: bool,
}

/// Exponentially-weighted mean/variance of per-type inter-arrival
/// intervals. Smoothing factor chosen to react within a handful of
/// events without being noise-sensitive on a single outlier.
const EWMA_ALPHA: f64 = 0.3;

struct AnomalyStat {
    last_ts: Option<i64>,
    mean: f64,
    variance: f64,
    initialized: bool,
}

impl Default for AnomalyStat {
    fn default() -> Self {
        Self {
            last_ts: None,
            mean: 0.0,
            variance: 0.0,
            initialized: false,
        }
    }
}

/// Result of feeding one event through [`CorrelationEngine::process`].
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub correlations: Vec<CorrelationResult>,
    pub patterns: Vec<PatternResult>,
    pub anomalies: Vec<AnomalyResult>,
}

/// Rule engine + pattern detector + anomaly detector sharing one
/// sliding window of recent events.
pub struct CorrelationEngine {
    config: CorrelationConfig,
    window: TimeWindow,
    rules: RwLock<Vec<CorrelationRule>>,
    correlation_seq: AtomicU64,
    pattern_stats: Mutex<HashMap<EventType, PatternStat>>,
    anomaly_stats: Mutex<HashMap<EventType, AnomalyStat>>,
}

impl CorrelationEngine {
    pub fn new(config: CorrelationConfig) -> Self {
        let window = TimeWindow::new(config.max_window_size, config.default_horizon_s);
        Self {
            config,
            window,
            rules: RwLock::new(Vec::new()),
            correlation_seq: AtomicU64::new(0),
            pattern_stats: Mutex::new(HashMap::new()),
            anomaly_stats: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a rule; ignored once `max_rules` is reached.
    pub fn add_rule(&self, rule: CorrelationRule) -> bool {
        let mut rules = self.rules.write();
        if rules.len() >= self.config.max_rules {
            return false;
        }
        rules.push(rule);
        true
    }

    pub fn remove_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.name != name);
        rules.len() != before
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.read().iter().map(|r| r.name.clone()).collect()
    }

    /// Feeds one event through the window, the rule engine, and
    /// (if enabled) the pattern and anomaly detectors.
    pub fn process(&self, event: &Event) -> ProcessOutcome {
        self.window.add(event.clone(), event.timestamp);

        let mut outcome = ProcessOutcome::default();
        outcome.correlations = self.evaluate_rules(event);

        if self.config.enable_pattern_detection {
            if let Some(p) = self.update_pattern(event) {
                outcome.patterns.push(p);
            }
        }
        if self.config.enable_anomaly_detection {
            if let Some(a) = self.update_anomaly(event) {
                outcome.anomalies.push(a);
            }
        }
        outcome
    }

    fn evaluate_rules(&self, event: &Event) -> Vec<CorrelationResult> {
        let rules = self.rules.read();
        if rules.is_empty() {
            return Vec::new();
        }

        let mut window_events = Vec::new();
        self.window
            .query(None, None, &mut window_events, self.config.max_window_size);

        let mut results = Vec::new();
        for rule in rules.iter() {
            let horizon = if rule.horizon_s > 0 {
                rule.horizon_s
            } else {
                self.config.default_horizon_s
            };
            let same_interface = rule
                .conditions
                .iter()
                .any(|c| matches!(c, Condition::SameInterface));

            let matching: Vec<Event> = window_events
                .iter()
                .filter(|candidate| event.timestamp - candidate.timestamp <= horizon)
                .filter(|candidate| {
                    !same_interface || candidate.interface == event.interface
                })
                .filter(|candidate| {
                    rule.conditions.iter().all(|c| match c {
                        Condition::SameInterface => true,
                        Condition::FieldEquals { field, value } => {
                            field_as_string(candidate, field) == *value
                        }
                    })
                })
                .cloned()
                .collect();

            if matching.len() >= rule.min_event_count && rule.generate_alert {
                let first_ts = matching.iter().map(|e| e.timestamp).min().unwrap_or(event.timestamp);
                let last_ts = matching.iter().map(|e| e.timestamp).max().unwrap_or(event.timestamp);
                results.push(CorrelationResult {
                    correlation_id: self.next_correlation_id(&rule.name),
                    rule_name: rule.name.clone(),
                    event_count: matching.len(),
                    events: matching,
                    first_ts,
                    last_ts,
                });
            }
        }
        results
    }

    fn next_correlation_id(&self, rule_name: &str) -> String {
        let seq = self.correlation_seq.fetch_add(1, Ordering::Relaxed);
        format!("{seq}-{rule_name}")
    }

    fn update_pattern(&self, event: &Event) -> Option<PatternResult> {
        let mut stats = self.pattern_stats.lock();
        let horizon = self.config.default_horizon_s;
        let entry = stats.entry(event.event_type).or_insert(PatternStat {
            count: 0,
            first_ts: event.timestamp,
            last_ts: event.timestamp,
            reported: false,
        });

        if event.timestamp - entry.first_ts > horizon {
            entry.count = 0;
            entry.first_ts = event.timestamp;
            entry.reported = false;
        }

        entry.count += 1;
        entry.last_ts = event.timestamp;

        if entry.count >= self.config.pattern_min_frequency && !entry.reported {
            entry.reported = true;
            let span = (entry.last_ts - entry.first_ts).max(1) as f64;
            Some(PatternResult {
                event_type: event.event_type,
                count: entry.count,
                first_ts: entry.first_ts,
                last_ts: entry.last_ts,
                events_per_second: entry.count as f64 / span,
            })
        } else {
            None
        }
    }

    fn update_anomaly(&self, event: &Event) -> Option<AnomalyResult> {
        let mut stats = self.anomaly_stats.lock();
        let entry = stats.entry(event.event_type).or_default();

        let Some(last_ts) = entry.last_ts else {
            entry.last_ts = Some(event.timestamp);
            return None;
        };

        let interval = (event.timestamp - last_ts).max(0) as f64;
        entry.last_ts = Some(event.timestamp);

        if !entry.initialized {
            entry.mean = interval;
            entry.variance = 0.0;
            entry.initialized = true;
            return None;
        }

        let stddev = entry.variance.sqrt();
        let z_score = if stddev > f64::EPSILON {
            (interval - entry.mean) / stddev
        } else {
            0.0
        };

        let result = if z_score.abs() >= self.config.anomaly_threshold {
            Some(AnomalyResult {
                event_type: event.event_type,
                value: interval,
                mean: entry.mean,
                stddev,
                z_score,
            })
        } else {
            None
        };

        let diff = interval - entry.mean;
        entry.mean += EWMA_ALPHA * diff;
        entry.variance = (1.0 - EWMA_ALPHA) * (entry.variance + EWMA_ALPHA * diff * diff);

        result
    }
}

fn field_as_string(event: &Event, field: &str) -> String {
    use sentinel_model::FieldValue;
    match event.field(field) {
        FieldValue::Str(s) => s,
        FieldValue::Int(n) => n.to_string(),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Missing => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_model::{IfaceName, Payload};

    fn link_event(ts: i64, iface: &str) -> Event {
        Event::new(EventType::Link, 16, ts, Payload::Empty)
            .with_interface(IfaceName::new(iface).unwrap())
    }

    #[test]
    fn rule_fires_once_threshold_reached() {
        let engine = CorrelationEngine::new(CorrelationConfig {
            enable_pattern_detection: false,
            enable_anomaly_detection: false,
            ..CorrelationConfig::default()
        });
        engine.add_rule(
            CorrelationRule::new("link-burst", 3)
                .with_horizon(10)
                .with_condition(Condition::SameInterface),
        );

        assert!(engine.process(&link_event(0, "eth0")).correlations.is_empty());
        assert!(engine.process(&link_event(1, "eth0")).correlations.is_empty());
        let outcome = engine.process(&link_event(2, "eth0"));
        assert_eq!(outcome.correlations.len(), 1);
        assert_eq!(outcome.correlations[0].event_count, 3);
        assert_eq!(outcome.correlations[0].rule_name, "link-burst");
    }

    #[test]
    fn same_interface_condition_does_not_mix_groups() {
        let engine = CorrelationEngine::new(CorrelationConfig {
            enable_pattern_detection: false,
            enable_anomaly_detection: false,
            ..CorrelationConfig::default()
        });
        engine.add_rule(
            CorrelationRule::new("link-burst", 2)
                .with_horizon(10)
                .with_condition(Condition::SameInterface),
        );

        engine.process(&link_event(0, "eth0"));
        let outcome = engine.process(&link_event(1, "eth1"));
        assert!(outcome.correlations.is_empty());
    }

    #[test]
    fn pattern_detector_fires_once_per_window() {
        let engine = CorrelationEngine::new(CorrelationConfig {
            pattern_min_frequency: 3,
            enable_anomaly_detection: false,
            default_horizon_s: 60,
            ..CorrelationConfig::default()
        });
        for ts in 0..2 {
            assert!(engine.process(&link_event(ts, "eth0")).patterns.is_empty());
        }
        let outcome = engine.process(&link_event(2, "eth0"));
        assert_eq!(outcome.patterns.len(), 1);
        assert_eq!(outcome.patterns[0].count, 3);

        // Does not re-fire until the window resets.
        let outcome = engine.process(&link_event(3, "eth0"));
        assert!(outcome.patterns.is_empty());
    }

    #[test]
    fn anomaly_detector_flags_outlier_interval() {
        let engine = CorrelationEngine::new(CorrelationConfig {
            enable_pattern_detection: false,
            anomaly_threshold: 2.0,
            ..CorrelationConfig::default()
        });
        // Establish a steady ~1s baseline.
        for ts in 0..10 {
            engine.process(&link_event(ts, "eth0"));
        }
        // A long 500s gap should stand out against that baseline.
        let outcome = engine.process(&link_event(510, "eth0"));
        assert_eq!(outcome.anomalies.len(), 1);
        assert_eq!(outcome.anomalies[0].event_type, EventType::Link);
    }
}
