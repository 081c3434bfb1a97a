//! Named filter registry (§3, §4.6).
//!
//! Entries own their compiled AST + bytecode; handlers look filters up
//! by name. Per-filter counters are plain atomics so concurrent
//! `eval`/`eval_all` calls never contend on a lock just to record
//! stats.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use sentinel_model::Event;
use thiserror::Error;

use super::ast::Expr;
use super::bytecode::Program;
use super::parser::ParseError;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter '{0}' not found")]
    NotFound(String),
    #[error("filter '{name}' is invalid: {message}")]
    Invalid { name: String, message: String },
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Returned by [`FilterManager::add`]. Always returned even when the
/// source failed to parse/compile — the handle lets the caller inspect
/// the error without the add call itself failing.
#[derive(Debug, Clone)]
pub struct FilterHandle {
    pub name: String,
    pub valid: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FilterStats {
    pub eval_count: u64,
    pub match_count: u64,
    pub total_time_ns: u64,
}

struct Entry {
    description: String,
    source: String,
    #[allow(dead_code)]
    ast: Option<Expr>,
    program: Option<Program>,
    created_at: i64,
    modified_at: i64,
    enabled: std::sync::atomic::AtomicBool,
    eval_count: AtomicU64,
    match_count: AtomicU64,
    total_time_ns: AtomicU64,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn build_entry(source: &str, description: &str) -> (Entry, FilterHandle, String) {
    let now = now_unix();
    let (ast, program, error) = match super::parser::parse(source) {
        Ok(ast) => match super::bytecode::compile(&ast) {
            Ok(program) => (Some(ast), Some(program), None),
            Err(e) => (Some(ast), None, Some(e.to_string())),
        },
        Err(e) => (None, None, Some(format_parse_error(&e))),
    };

    let valid = error.is_none();
    let entry = Entry {
        description: description.to_string(),
        source: source.to_string(),
        ast,
        program,
        created_at: now,
        modified_at: now,
        enabled: std::sync::atomic::AtomicBool::new(valid),
        eval_count: AtomicU64::new(0),
        match_count: AtomicU64::new(0),
        total_time_ns: AtomicU64::new(0),
    };

    (entry, FilterHandle { name: String::new(), valid, error: error.clone() }, error.unwrap_or_default())
}

fn format_parse_error(e: &ParseError) -> String {
    format!(
        "{} (byte {}, line {}, column {})",
        e.message, e.byte_pos, e.line, e.column
    )
}

/// Registry of named compiled filters.
#[derive(Default)]
pub struct FilterManager {
    entries: DashMap<String, Entry>,
}

impl FilterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and compiles `source`. On failure the filter is still
    /// registered (disabled, with its error recorded) so callers can
    /// inspect what went wrong; the handle always carries a name.
    pub fn add(&self, name: impl Into<String>, description: impl Into<String>, source: impl Into<String>) -> FilterHandle {
        let name = name.into();
        let (entry, mut handle, _) = build_entry(&source.into(), &description.into());
        handle.name = name.clone();
        self.entries.insert(name, entry);
        handle
    }

    pub fn remove(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn update(&self, name: &str, source: impl Into<String>) -> Result<FilterHandle, FilterError> {
        let mut slot = self
            .entries
            .get_mut(name)
            .ok_or_else(|| FilterError::NotFound(name.to_string()))?;
        let description = slot.description.clone();
        let (new_entry, mut handle, _) = build_entry(&source.into(), &description);
        handle.name = name.to_string();
        *slot = new_entry;
        Ok(handle)
    }

    pub fn enable(&self, name: &str) -> Result<(), FilterError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| FilterError::NotFound(name.to_string()))?;
        if entry.program.is_none() {
            return Err(FilterError::Invalid {
                name: name.to_string(),
                message: "cannot enable a filter with no compiled program".into(),
            });
        }
        entry.enabled.store(true, Ordering::Release);
        Ok(())
    }

    pub fn disable(&self, name: &str) -> Result<(), FilterError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| FilterError::NotFound(name.to_string()))?;
        entry.enabled.store(false, Ordering::Release);
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.entries
            .get(name)
            .map(|e| e.enabled.load(Ordering::Acquire))
    }

    pub fn stats(&self, name: &str) -> Option<FilterStats> {
        self.entries.get(name).map(|e| FilterStats {
            eval_count: e.eval_count.load(Ordering::Relaxed),
            match_count: e.match_count.load(Ordering::Relaxed),
            total_time_ns: e.total_time_ns.load(Ordering::Relaxed),
        })
    }

    /// Evaluate a single named filter against `event`.
    pub fn eval(&self, name: &str, event: &Event) -> Result<bool, FilterError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| FilterError::NotFound(name.to_string()))?;
        let program = entry.program.as_ref().ok_or_else(|| FilterError::Invalid {
            name: name.to_string(),
            message: "filter has no compiled program".into(),
        })?;

        let start = std::time::Instant::now();
        let matched = super::evaluator::evaluate(program, event);
        let elapsed = start.elapsed().as_nanos() as u64;

        entry.eval_count.fetch_add(1, Ordering::Relaxed);
        entry.total_time_ns.fetch_add(elapsed, Ordering::Relaxed);
        if matched {
            entry.match_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(matched)
    }

    /// Evaluate every enabled filter against `event`; collects
    /// matching names into `out`, bounded by `out`'s capacity.
    pub fn eval_all(&self, event: &Event, out: &mut Vec<String>, cap: usize) {
        for entry in self.entries.iter() {
            if out.len() >= cap {
                break;
            }
            if !entry.enabled.load(Ordering::Acquire) {
                continue;
            }
            let Some(program) = entry.program.as_ref() else {
                continue;
            };

            let start = std::time::Instant::now();
            let matched = super::evaluator::evaluate(program, event);
            let elapsed = start.elapsed().as_nanos() as u64;

            entry.eval_count.fetch_add(1, Ordering::Relaxed);
            entry.total_time_ns.fetch_add(elapsed, Ordering::Relaxed);
            if matched {
                entry.match_count.fetch_add(1, Ordering::Relaxed);
                out.push(entry.key().clone());
            }
        }
    }

    /// Persist the registry to a simple text store: one tab-separated
    /// record per filter (`name\tdescription\tenabled\tsource`).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FilterError> {
        let mut file = std::fs::File::create(path)?;
        for entry in self.entries.iter() {
            writeln!(
                file,
                "{}\t{}\t{}\t{}",
                entry.key(),
                entry.description.replace('\t', " "),
                entry.enabled.load(Ordering::Acquire),
                entry.source.replace('\n', "\\n")
            )?;
        }
        Ok(())
    }

    /// Reload the registry from a store written by [`Self::save`].
    /// Each record is recompiled; parse/compile errors surface the
    /// same way they do from [`Self::add`].
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Vec<FilterHandle>, FilterError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut handles = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut parts = line.splitn(4, '\t');
            let (Some(name), Some(description), Some(enabled_str), Some(source)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let source = source.replace("\\n", "\n");
            let handle = self.add(name, description, source);
            if enabled_str == "false" {
                let _ = self.disable(name);
            }
            handles.push(handle);
        }
        Ok(handles)
    }
}

impl std::fmt::Debug for FilterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterManager")
            .field("filters", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_model::{Event, EventType, Payload};

    fn sample_event(message_type: u16) -> Event {
        Event::new(EventType::Generic, message_type, 0, Payload::Empty)
    }

    #[test]
    fn add_and_eval_matching_filter() {
        let mgr = FilterManager::new();
        let handle = mgr.add("rtm16", "matches message_type 16", "message_type == 16");
        assert!(handle.valid);
        assert!(mgr.eval("rtm16", &sample_event(16)).unwrap());
        assert!(!mgr.eval("rtm16", &sample_event(17)).unwrap());
        assert_eq!(mgr.stats("rtm16").unwrap().eval_count, 2);
        assert_eq!(mgr.stats("rtm16").unwrap().match_count, 1);
    }

    #[test]
    fn invalid_source_still_returns_a_handle() {
        let mgr = FilterManager::new();
        let handle = mgr.add("broken", "", "message_type ==");
        assert!(!handle.valid);
        assert!(handle.error.is_some());
        assert_eq!(mgr.is_enabled("broken"), Some(false));
        assert!(matches!(
            mgr.eval("broken", &sample_event(1)),
            Err(FilterError::Invalid { .. })
        ));
    }

    #[test]
    fn disabled_filters_are_skipped_by_eval_all() {
        let mgr = FilterManager::new();
        mgr.add("a", "", "message_type == 1");
        mgr.add("b", "", "message_type == 1");
        mgr.disable("b").unwrap();

        let mut out = Vec::new();
        mgr.eval_all(&sample_event(1), &mut out, 10);
        assert_eq!(out, vec!["a".to_string()]);
    }

    #[test]
    fn eval_all_respects_cap() {
        let mgr = FilterManager::new();
        for i in 0..5 {
            mgr.add(format!("f{i}"), "", "message_type == 1");
        }
        let mut out = Vec::new();
        mgr.eval_all(&sample_event(1), &mut out, 2);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.txt");

        let mgr = FilterManager::new();
        mgr.add("a", "desc a", "message_type == 1");
        mgr.add("b", "desc b", "message_type == 2");
        mgr.disable("b").unwrap();
        mgr.save(&path).unwrap();

        let reloaded = FilterManager::new();
        reloaded.load(&path).unwrap();
        assert_eq!(reloaded.is_enabled("a"), Some(true));
        assert_eq!(reloaded.is_enabled("b"), Some(false));
        assert!(reloaded.eval("a", &sample_event(1)).unwrap());
    }
}
