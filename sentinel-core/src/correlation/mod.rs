//! Correlation / pattern / anomaly engine (§4.8) and the security
//! detector built on top of it (§4.9).

pub mod engine;
pub mod security;

pub use engine::{
    AnomalyResult, Condition, CorrelationConfig, CorrelationEngine, CorrelationResult,
    CorrelationRule, PatternResult, ProcessOutcome,
};
pub use security::{SecurityAlert, SecurityAlertKind, SecurityConfig, SecurityDetector, SecuritySeverity};
