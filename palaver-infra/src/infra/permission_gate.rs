use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_SAFE_COMMANDS: &[&str] = &[
    "ls", "cat", "head", "tail", "wc", "date", "whoami", "echo", "pwd", "which", "git", "python",
    "python3", "node", "npm", "npx", "uv", "pip", "find", "grep", "sort", "uniq", "tr", "cut",
    "env",
];

#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt approval store {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of a permission check for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Leading token is on the allow-list.
    Safe,
    /// Exact text was approved before.
    Approved,
    /// Exact text was denied before (or just now).
    Denied,
    /// Nobody has decided on this exact text yet.
    NeedsApproval,
}

impl ApprovalDecision {
    pub fn is_permitted(self) -> bool {
        matches!(self, ApprovalDecision::Safe | ApprovalDecision::Approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionRecord {
    Allowed,
    Denied,
}

/// Asked once per unseen command text. May block.
pub trait Approver: Send + Sync {
    fn request(&self, command: &str) -> bool;
}

/// Unattended front-ends: every unknown command is refused.
pub struct DenyAll;

impl Approver for DenyAll {
    fn request(&self, _command: &str) -> bool {
        false
    }
}

pub struct ApproveAll;

impl Approver for ApproveAll {
    fn request(&self, _command: &str) -> bool {
        true
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApprovalFile {
    #[serde(default)]
    allowed: BTreeSet<String>,
    #[serde(default)]
    denied: BTreeSet<String>,
}

/// Decides whether a shell command may run unattended.
///
/// Allow-list matching looks only at the leading token; recorded decisions
/// match the exact command text. Approving `git push origin main` says
/// nothing about `git push origin dev`.
pub struct PermissionGate {
    store_path: PathBuf,
    safe_commands: HashSet<String>,
    records: Mutex<HashMap<String, PermissionRecord>>,
    approver: Box<dyn Approver>,
}

impl PermissionGate {
    /// Load the approval store. A missing file is an empty store; an
    /// unreadable or unparsable one is an error.
    pub fn new<P: AsRef<Path>>(
        store_path: P,
        approver: Box<dyn Approver>,
    ) -> Result<Self, PermissionError> {
        let defaults = DEFAULT_SAFE_COMMANDS.iter().map(|s| s.to_string());
        Self::with_safe_commands(store_path, defaults, approver)
    }

    pub fn with_safe_commands<P, I>(
        store_path: P,
        safe_commands: I,
        approver: Box<dyn Approver>,
    ) -> Result<Self, PermissionError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = String>,
    {
        let store_path = store_path.as_ref().to_path_buf();
        let records = load_records(&store_path)?;

        Ok(Self {
            store_path,
            safe_commands: safe_commands.into_iter().collect(),
            records: Mutex::new(records),
            approver,
        })
    }

    /// Classify without asking anyone.
    pub fn classify(&self, command: &str) -> ApprovalDecision {
        let base = command.split_whitespace().next().unwrap_or("");
        if !base.is_empty() && self.safe_commands.contains(base) {
            return ApprovalDecision::Safe;
        }

        match self.records.lock().get(command) {
            Some(PermissionRecord::Allowed) => ApprovalDecision::Approved,
            Some(PermissionRecord::Denied) => ApprovalDecision::Denied,
            None => ApprovalDecision::NeedsApproval,
        }
    }

    /// Classify, and for unseen commands ask the approver and remember the
    /// answer. Never returns `NeedsApproval`.
    pub fn check(&self, command: &str) -> Result<ApprovalDecision, PermissionError> {
        let decision = self.classify(command);
        if decision != ApprovalDecision::NeedsApproval {
            return Ok(decision);
        }

        let approved = self.approver.request(command);
        self.record(command, approved)?;

        Ok(if approved {
            ApprovalDecision::Approved
        } else {
            ApprovalDecision::Denied
        })
    }

    /// Persist an explicit decision for the exact command text.
    pub fn record(&self, command: &str, approved: bool) -> Result<(), PermissionError> {
        let record = if approved {
            PermissionRecord::Allowed
        } else {
            PermissionRecord::Denied
        };

        let mut records = self.records.lock();
        let previous = records.insert(command.to_string(), record);
        if let Err(e) = save_records(&self.store_path, &records) {
            match previous {
                Some(prev) => records.insert(command.to_string(), prev),
                None => records.remove(command),
            };
            return Err(e);
        }

        info!("Recorded {:?} for command: {}", record, command);
        Ok(())
    }

    pub fn safe_commands(&self) -> Vec<String> {
        let mut commands: Vec<String> = self.safe_commands.iter().cloned().collect();
        commands.sort();
        commands
    }
}

fn load_records(path: &Path) -> Result<HashMap<String, PermissionRecord>, PermissionError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }

    let file: ApprovalFile =
        serde_json::from_str(&content).map_err(|source| PermissionError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

    let mut records = HashMap::new();
    for command in file.allowed {
        records.insert(command, PermissionRecord::Allowed);
    }
    for command in file.denied {
        if records.insert(command.clone(), PermissionRecord::Denied).is_some() {
            warn!("Command listed as both allowed and denied, treating as denied: {}", command);
        }
    }
    Ok(records)
}

fn save_records(
    path: &Path,
    records: &HashMap<String, PermissionRecord>,
) -> Result<(), PermissionError> {
    let mut file = ApprovalFile::default();
    for (command, record) in records {
        match record {
            PermissionRecord::Allowed => file.allowed.insert(command.clone()),
            PermissionRecord::Denied => file.denied.insert(command.clone()),
        };
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut out = File::create(&temp_path)?;
        serde_json::to_writer_pretty(&mut out, &file)?;
        out.write_all(b"\n")?;
        out.sync_all()?;
    }
    fs::rename(&temp_path, path)?;

    Ok(())
}
