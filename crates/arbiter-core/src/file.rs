//! File-backed collaborators
//!
//! - [`JsonFileDecisionRepository`]: a JSON array of decisions
//! - [`JsonlEventSink`]: one sealed audit entry per line
//!
//! Read-modify-write cycles are serialized within the process. Rewrites go
//! through a temporary file and a rename so readers never see a torn file.

use crate::audit::{AuditChain, AuditEvent, SealedEvent};
use crate::error::StoreError;
use crate::store::{DecisionRepository, EventSink, UpdateOutcome};
use crate::types::{Decision, DecisionId, DecisionPatch};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Decisions stored as a JSON array on disk
#[derive(Debug)]
pub struct JsonFileDecisionRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileDecisionRepository {
    /// Repository over the given file; the file must exist when queried
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored decision, pending or not
    ///
    /// # Errors
    /// - `StoreError::NotFound` if the file does not exist
    /// - `StoreError::Io` / `StoreError::Serialization` on read or parse failure
    pub async fn load(&self) -> Result<Vec<Decision>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Replace the file contents
    ///
    /// # Errors
    /// `StoreError::Io` / `StoreError::Serialization` on failure.
    pub async fn save(&self, decisions: &[Decision]) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(decisions)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DecisionRepository for JsonFileDecisionRepository {
    async fn query_pending(&self) -> Result<Vec<Decision>, StoreError> {
        let mut decisions = self.load().await?;
        decisions.retain(Decision::is_pending);
        Ok(decisions)
    }

    async fn update(&self, id: &DecisionId, patch: &DecisionPatch) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut decisions = self.load().await?;
        let decision = decisions
            .iter_mut()
            .find(|d| &d.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply_to(decision);
        self.save(&decisions).await
    }

    async fn update_if_unescalated(
        &self,
        id: &DecisionId,
        patch: &DecisionPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut decisions = self.load().await?;
        let Some(decision) = decisions
            .iter_mut()
            .find(|d| &d.id == id && d.is_pending())
        else {
            return Ok(UpdateOutcome::NotPending);
        };
        if decision.metadata.is_escalated() {
            return Ok(UpdateOutcome::AlreadyEscalated);
        }
        patch.apply_to(decision);
        self.save(&decisions).await?;
        Ok(UpdateOutcome::Applied)
    }
}

/// Audit log stored as JSON lines, sealed into a hash chain
#[derive(Debug)]
pub struct JsonlEventSink {
    path: PathBuf,
    chain: Mutex<AuditChain>,
}

impl JsonlEventSink {
    /// Open a log, continuing the chain of any existing entries
    ///
    /// # Errors
    /// Fails if an existing log cannot be read or its last entry is malformed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        repair_torn_tail(&path).await?;
        let entries = match read_audit_log(&path).await {
            Ok(entries) => entries,
            Err(StoreError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let chain = AuditChain::resume(entries.last())?;
        Ok(Self {
            path,
            chain: Mutex::new(chain),
        })
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError> {
        let mut chain = self.chain.lock().await;
        let mut next = *chain;
        let sealed = next.seal(event)?;

        let mut line = serde_json::to_vec(&sealed)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let committed = file.metadata().await?.len();
        if let Err(e) = write_line(&mut file, &line).await {
            // Drop any partial line so the next append starts clean
            if let Err(trunc) = file.set_len(committed).await {
                warn!(path = %self.path.display(), error = %trunc, "failed to truncate partial audit entry");
            }
            return Err(e.into());
        }

        // Advance only once the entry is on disk
        *chain = next;
        Ok(())
    }
}

async fn write_line(file: &mut tokio::fs::File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

/// Make the log end on a line boundary
///
/// A trailing fragment without a newline is a write that never completed.
/// It is cut off, unless it parses as a full entry, in which case only the
/// newline is restored.
async fn repair_torn_tail(path: &Path) -> Result<(), StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if bytes.last().map_or(true, |b| *b == b'\n') {
        return Ok(());
    }

    let start = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    let mut file = tokio::fs::OpenOptions::new().append(true).open(path).await?;
    if serde_json::from_slice::<SealedEvent>(&bytes[start..]).is_ok() {
        file.write_all(b"\n").await?;
    } else {
        warn!(
            path = %path.display(),
            dropped_bytes = bytes.len() - start,
            "dropping incomplete audit entry"
        );
        file.set_len(start as u64).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Read every entry of a JSON-lines audit log
///
/// # Errors
/// - `StoreError::NotFound` if the file does not exist
/// - `StoreError::Io` / `StoreError::Serialization` on read or parse failure
pub async fn read_audit_log(path: &Path) -> Result<Vec<SealedEvent>, StoreError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(StoreError::from))
        .collect()
}

/// Verify the hash chain of a JSON-lines audit log
///
/// Returns the number of entries checked.
///
/// # Errors
/// As [`read_audit_log`], plus `StoreError::Chain` on a broken link.
pub async fn verify_audit_log(path: &Path) -> Result<usize, StoreError> {
    let entries = read_audit_log(path).await?;
    AuditChain::verify(&entries)?;
    Ok(entries.len())
}
