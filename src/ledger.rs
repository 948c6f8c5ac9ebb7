//! Record of completed actions and observations keyed by a fingerprint of
//! their instruction text.
//!
//! Entries live in memory and, when a directory is configured, in two JSON
//! files (`actions.json`, `observations.json`) mapping fingerprints to
//! `{id, result}`. Every write re-reads and rewrites the relevant file.
//! Nothing is evicted unless asked.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::LedgerError;

const ACTIONS_FILE: &str = "actions.json";
const OBSERVATIONS_FILE: &str = "observations.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Instruction or observation text the entry was recorded for.
    #[serde(rename = "id")]
    pub text: String,
    pub result: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Action,
    Observation,
}

impl EntryKind {
    fn file_name(self) -> &'static str {
        match self {
            EntryKind::Action => ACTIONS_FILE,
            EntryKind::Observation => OBSERVATIONS_FILE,
        }
    }
}

type Entries = HashMap<String, LedgerEntry>;

/// Stable SHA-256 hex digest of `text`.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Default)]
struct State {
    actions: Entries,
    observations: Entries,
}

impl State {
    fn entries(&mut self, kind: EntryKind) -> &mut Entries {
        match kind {
            EntryKind::Action => &mut self.actions,
            EntryKind::Observation => &mut self.observations,
        }
    }
}

#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<State>,
    dir: Option<PathBuf>,
}

impl Ledger {
    /// Ledger held in memory only.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Ledger backed by `dir`, created with empty files on first use.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let mut state = State::default();
        for kind in [EntryKind::Action, EntryKind::Observation] {
            let path = dir.join(kind.file_name());
            if !path.exists() {
                save_entries(&path, &Entries::new())?;
            }
            *state.entries(kind) = load_entries(&path)?;
        }
        debug!(
            category = "ledger",
            dir = %dir.display(),
            actions = state.actions.len(),
            observations = state.observations.len(),
            "Opened ledger"
        );
        Ok(Self {
            state: Mutex::new(state),
            dir: Some(dir),
        })
    }

    pub fn record_action(&self, text: &str, result: &str) -> Result<String, LedgerError> {
        self.record(EntryKind::Action, text, result)
    }

    pub fn record_observation(&self, text: &str, result: &str) -> Result<String, LedgerError> {
        self.record(EntryKind::Observation, text, result)
    }

    pub fn action(&self, fingerprint: &str) -> Option<LedgerEntry> {
        self.lookup(EntryKind::Action, fingerprint)
    }

    pub fn observation(&self, fingerprint: &str) -> Option<LedgerEntry> {
        self.lookup(EntryKind::Observation, fingerprint)
    }

    pub fn len(&self, kind: EntryKind) -> usize {
        self.state.lock().entries(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.actions.is_empty() && state.observations.is_empty()
    }

    /// Store `{text, result}` under the fingerprint of `text`, replacing any
    /// earlier entry. A file-backed ledger only updates memory once the file
    /// write succeeded.
    pub fn record(&self, kind: EntryKind, text: &str, result: &str) -> Result<String, LedgerError> {
        let key = fingerprint(text);
        let entry = LedgerEntry {
            text: text.to_string(),
            result: result.to_string(),
        };

        if let Some(dir) = &self.dir {
            let path = dir.join(kind.file_name());
            let mut stored = load_entries(&path).unwrap_or_else(|e| {
                warn!(category = "ledger", "Error reading from {}: {e}", path.display());
                Entries::new()
            });
            stored.insert(key.clone(), entry.clone());
            save_entries(&path, &stored)?;
        }
        self.state.lock().entries(kind).insert(key.clone(), entry);
        debug!(category = "ledger", ?kind, fingerprint = %key, "Recorded entry");
        Ok(key)
    }

    pub fn lookup(&self, kind: EntryKind, fingerprint: &str) -> Option<LedgerEntry> {
        self.state.lock().entries(kind).get(fingerprint).cloned()
    }

    pub fn evict_action(&self, fingerprint: &str) -> Result<bool, LedgerError> {
        self.evict(EntryKind::Action, fingerprint)
    }

    pub fn evict_observation(&self, fingerprint: &str) -> Result<bool, LedgerError> {
        self.evict(EntryKind::Observation, fingerprint)
    }

    /// Remove one entry. Returns whether it existed.
    pub fn evict(&self, kind: EntryKind, fingerprint: &str) -> Result<bool, LedgerError> {
        let removed = self.state.lock().entries(kind).remove(fingerprint).is_some();
        if let Some(dir) = &self.dir {
            let path = dir.join(kind.file_name());
            let mut stored = load_entries(&path)?;
            if stored.remove(fingerprint).is_some() {
                save_entries(&path, &stored)?;
            }
        }
        Ok(removed)
    }

    /// Drop every entry of both kinds.
    pub fn clear(&self) -> Result<(), LedgerError> {
        *self.state.lock() = State::default();
        if let Some(dir) = &self.dir {
            for kind in [EntryKind::Action, EntryKind::Observation] {
                save_entries(&dir.join(kind.file_name()), &Entries::new())?;
            }
        }
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<Entries, LedgerError> {
    if !path.exists() {
        return Ok(Entries::new());
    }
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

fn save_entries(path: &Path, entries: &Entries) -> Result<(), LedgerError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    serde_json::to_writer_pretty(file, entries)?;
    Ok(())
}
