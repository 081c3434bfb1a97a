//! Hash-chained, append-only audit log (§4.13).
//!
//! Each line embeds the SHA-256 hash of the previous line, so a
//! tampered or truncated log is detectable by replaying the chain with
//! [`verify`]. Rotation renames files numerically (`path.0`, `path.1`,
//! ...) and starts the new file's chain from a zero hash.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// The seed `prev_hash` for an empty or freshly-rotated log: 64 hex
/// zeros, the width of a SHA-256 digest.
fn zero_hash() -> String {
    "0".repeat(64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSeverity {
    Info,
    Warning,
    Security,
    Critical,
}

impl AuditSeverity {
    fn as_code(self) -> u8 {
        match self {
            AuditSeverity::Info => 0,
            AuditSeverity::Warning => 1,
            AuditSeverity::Security => 2,
            AuditSeverity::Critical => 3,
        }
    }
}

fn format_timestamp(unix_secs: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(unix_secs, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}

/// Splits a line of the form `[a] [b] [c] [d] text` into its four
/// bracketed fields and the trailing text.
fn parse_line(line: &str) -> Option<(&str, &str, &str, &str, &str)> {
    let mut rest = line;
    let mut fields = [""; 4];
    for field in fields.iter_mut() {
        rest = rest.strip_prefix('[')?;
        let end = rest.find(']')?;
        *field = &rest[..end];
        rest = &rest[end + 1..];
        rest = rest.strip_prefix(' ').unwrap_or(rest);
    }
    Some((fields[0], fields[1], fields[2], fields[3], rest))
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\t', "\\t").replace('\n', "\\n")
}

struct State {
    file: File,
    prev_hash: String,
    sequence: u64,
    size: u64,
}

pub struct AuditLog {
    path: PathBuf,
    max_file_size: u64,
    max_rotations: u32,
    sync_writes: bool,
    state: Mutex<State>,
}

impl AuditLog {
    /// Opens (creating if necessary) the log at `path`, replaying its
    /// last line to recover `prev_hash` and the next sequence number.
    pub fn open(
        path: impl Into<PathBuf>,
        max_file_size: u64,
        max_rotations: u32,
        sync_writes: bool,
    ) -> Result<Self> {
        let path = path.into();
        let (prev_hash, sequence) = recover_tail(&path)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path,
            max_file_size,
            max_rotations,
            sync_writes,
            state: Mutex::new(State {
                file,
                prev_hash,
                sequence,
                size,
            }),
        })
    }

    pub fn append(&self, message: &str, severity: AuditSeverity, timestamp: i64) -> Result<()> {
        let mut state = self.state.lock();
        let line = format!(
            "[{}] [{}] [{}] [{}] {}",
            format_timestamp(timestamp),
            state.sequence,
            state.prev_hash,
            severity.as_code(),
            escape(message)
        );

        writeln!(state.file, "{line}")?;
        if self.sync_writes {
            state.file.sync_all()?;
        }

        state.prev_hash = sha256_hex(line.as_bytes());
        state.sequence += 1;
        state.size += line.len() as u64 + 1;

        if self.max_file_size > 0 && state.size >= self.max_file_size {
            self.rotate(&mut state)?;
        }
        Ok(())
    }

    fn rotate(&self, state: &mut State) -> Result<()> {
        drop(std::mem::replace(&mut state.file, File::open("/dev/null")?));

        for n in (0..self.max_rotations.saturating_sub(1)).rev() {
            let src = rotated_path(&self.path, n);
            let dst = rotated_path(&self.path, n + 1);
            if src.exists() {
                let _ = fs::rename(&src, &dst);
            }
        }
        let first = rotated_path(&self.path, 0);
        if self.path.exists() {
            fs::rename(&self.path, &first)?;
        }

        state.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        state.prev_hash = zero_hash();
        state.size = 0;
        Ok(())
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").field("path", &self.path).finish()
    }
}

fn rotated_path(base: &Path, n: u32) -> PathBuf {
    let mut os = base.as_os_str().to_owned();
    os.push(format!(".{n}"));
    PathBuf::from(os)
}

fn recover_tail(path: &Path) -> Result<(String, u64)> {
    let Ok(file) = File::open(path) else {
        return Ok((zero_hash(), 0));
    };
    let reader = BufReader::new(file);
    let mut last_line: Option<String> = None;
    let mut count = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        count += 1;
        last_line = Some(line);
    }

    match last_line {
        Some(line) => Ok((sha256_hex(line.as_bytes()), count)),
        None => Ok((zero_hash(), 0)),
    }
}

/// Replays a log file's hash chain from scratch. Returns `(true, None)`
/// if every line's declared `prev_hash` matches the hash of the line
/// before it; otherwise `(false, Some(line_no))` for the first
/// mismatch (1-based).
pub fn verify(path: impl AsRef<Path>) -> Result<(bool, Option<u64>)> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut expected = zero_hash();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx as u64 + 1;
        let (_, _, declared_prev_hash, _, _) =
            parse_line(&line).ok_or(CoreError::AuditIntegrity { line: line_no })?;

        if declared_prev_hash != expected {
            return Ok((false, Some(line_no)));
        }
        expected = sha256_hex(line.as_bytes());
    }
    Ok((true, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_form_a_verifiable_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        let log = AuditLog::open(&path, 0, 5, false).unwrap();
        log.append("interface up", AuditSeverity::Info, 1).unwrap();
        log.append("promiscuous mode", AuditSeverity::Security, 2).unwrap();

        let (ok, bad) = verify(&path).unwrap();
        assert!(ok);
        assert!(bad.is_none());
    }

    #[test]
    fn detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        let log = AuditLog::open(&path, 0, 5, false).unwrap();
        log.append("a", AuditSeverity::Info, 1).unwrap();
        log.append("b", AuditSeverity::Info, 2).unwrap();
        drop(log);

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = contents.lines().map(String::from).collect();
        let tampered = format!("[{}] [0] [{}] [0] tampered", format_timestamp(1), zero_hash());
        lines[0] = tampered;
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        let (ok, bad) = verify(&path).unwrap();
        assert!(!ok);
        assert_eq!(bad, Some(2));
    }

    #[test]
    fn reopening_recovers_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        {
            let log = AuditLog::open(&path, 0, 5, false).unwrap();
            log.append("first", AuditSeverity::Info, 1).unwrap();
        }
        {
            let log = AuditLog::open(&path, 0, 5, false).unwrap();
            log.append("second", AuditSeverity::Info, 2).unwrap();
        }

        let (ok, bad) = verify(&path).unwrap();
        assert!(ok, "chain should still verify across reopen: {bad:?}");
    }

    #[test]
    fn rotates_when_over_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        let log = AuditLog::open(&path, 40, 3, false).unwrap();
        for i in 0..10 {
            log.append(&format!("entry number {i}"), AuditSeverity::Info, i).unwrap();
        }
        assert!(rotated_path(&path, 0).exists());
    }
}
