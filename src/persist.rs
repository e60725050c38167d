//! Durable storage for the conversation list.
//!
//! One JSON record under the platform data directory. Writes are bounded
//! and best-effort: the cap is pruned oldest-first, a failing write is
//! retried with a reduced subset, and a still-failing write is swallowed —
//! losing history is acceptable, crashing the client is not.

use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::types::Conversation;

/// Upper bound on persisted conversations.
pub const MAX_STORED_CONVERSATIONS: usize = 50;

const RECORD_FILE: &str = "conversations.json";

/// Handle on the durable conversation record.
#[derive(Clone, Debug)]
pub struct StoreFile {
    path: PathBuf,
}

impl StoreFile {
    /// Default record location under the platform data directory.
    pub fn default_location() -> Option<Self> {
        let dir = dirs::data_local_dir()?;
        Some(Self {
            path: dir.join("kestrel").join(RECORD_FILE),
        })
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the stored conversation list. Absence and stale layouts both
    /// come back as `None`; neither is fatal.
    pub fn load(&self) -> Option<Vec<Conversation>> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(conversations) => Some(conversations),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "discarding unreadable conversation record");
                None
            }
        }
    }

    /// Persist the list, newest first, bounded by the cap. On failure a
    /// half-cap subset is attempted before giving up.
    pub fn save(&self, conversations: &[Conversation]) {
        let capped = bound(conversations, MAX_STORED_CONVERSATIONS);
        if let Err(err) = self.write(capped) {
            warn!(%err, "persist failed, retrying with a reduced subset");
            let reduced = bound(conversations, MAX_STORED_CONVERSATIONS / 2);
            if let Err(err) = self.write(reduced) {
                warn!(%err, "degraded persist failed too, dropping this write");
            }
        }
    }

    /// Remove the durable record entirely.
    pub fn purge(&self) {
        if self.path.exists()
            && let Err(err) = fs::remove_file(&self.path)
        {
            warn!(%err, "failed to purge conversation record");
        }
    }

    fn write(&self, conversations: &[Conversation]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(conversations).map_err(std::io::Error::other)?;
        fs::write(&self.path, json)
    }
}

fn bound(conversations: &[Conversation], cap: usize) -> &[Conversation] {
    // The list is kept newest-first, so pruning oldest-first is a truncate.
    &conversations[..conversations.len().min(cap)]
}
