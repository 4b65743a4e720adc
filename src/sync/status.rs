//! Synchronization status of an entity

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Drift classification between the local and remote copies of an entity.
/// Exactly one value holds per entity at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Never compared against remote
    NotSynced,
    /// Local and remote snapshots match
    Synced,
    /// Exists locally, no remote counterpart, not yet pushed
    LocalOnly,
    /// Exists remotely, no local counterpart
    RemoteOnly,
    /// Local snapshot diverges from the last-known remote snapshot
    Modified,
    /// A push was queued or staged but not yet confirmed
    PendingPush,
    /// Remote counterpart of a previously synced entity disappeared
    RemoteDeleted,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::NotSynced
    }
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 7] = [
        SyncStatus::NotSynced,
        SyncStatus::Synced,
        SyncStatus::LocalOnly,
        SyncStatus::RemoteOnly,
        SyncStatus::Modified,
        SyncStatus::PendingPush,
        SyncStatus::RemoteDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::NotSynced => "NOT_SYNCED",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::LocalOnly => "LOCAL_ONLY",
            SyncStatus::RemoteOnly => "REMOTE_ONLY",
            SyncStatus::Modified => "MODIFIED",
            SyncStatus::PendingPush => "PENDING_PUSH",
            SyncStatus::RemoteDeleted => "REMOTE_DELETED",
        }
    }

    /// States from which a vanished remote means the entity was deleted remotely
    pub fn has_confirmed_remote(&self) -> bool {
        matches!(
            self,
            SyncStatus::Synced | SyncStatus::Modified | SyncStatus::RemoteDeleted
        )
    }

    /// Whether a local edit should be re-compared against the last-known remote
    pub fn tracks_remote_content(&self) -> bool {
        matches!(
            self,
            SyncStatus::RemoteOnly | SyncStatus::Synced | SyncStatus::Modified
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AppError::Validation(format!("Unknown sync status '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::RemoteDeleted).unwrap(),
            "\"REMOTE_DELETED\""
        );
        for status in SyncStatus::ALL {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json.as_str(), Some(status.as_str()));
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_remote_tracking_groups() {
        assert!(SyncStatus::Modified.has_confirmed_remote());
        assert!(!SyncStatus::PendingPush.has_confirmed_remote());
        assert!(SyncStatus::RemoteOnly.tracks_remote_content());
        assert!(!SyncStatus::RemoteDeleted.tracks_remote_content());
    }

    #[test]
    fn test_default_is_not_synced() {
        assert_eq!(SyncStatus::default(), SyncStatus::NotSynced);
    }
}
