use crate::claude::StoreKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid intent: {0}")]
    InvalidIntent(String),
    #[error("{store} at {} is present but unreadable: {reason}", .path.display())]
    StoreReadAnomaly {
        store: StoreKind,
        path: PathBuf,
        reason: String,
    },
    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    FilesystemMove {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backup of {store} failed, edit blocked: {cause:#}")]
    Backup {
        store: StoreKind,
        cause: anyhow::Error,
    },
    #[error("failed to update {store}: {cause:#}")]
    StoreWrite {
        store: StoreKind,
        cause: anyhow::Error,
    },
    #[error(
        "partial apply: updated [{}], not updated [{}]; re-run the same command for a metadata-only pass over the remaining stores: {cause:#}",
        join_stores(.updated),
        join_stores(.pending)
    )]
    PartialApply {
        updated: Vec<StoreKind>,
        pending: Vec<StoreKind>,
        cause: anyhow::Error,
    },
    #[error("restore of {} failed: {reason}", .backup.display())]
    Restore { backup: PathBuf, reason: String },
}

fn join_stores(stores: &[StoreKind]) -> String {
    stores
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    E001InvalidIntent,
    E002StoreReadAnomaly,
    E003FsMoveFailed,
    E004BackupFailed,
    E005PartialApply,
    E006RestoreFailed,
    E007StoreWriteFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001InvalidIntent => "E001_INVALID_INTENT",
            Self::E002StoreReadAnomaly => "E002_STORE_READ_ANOMALY",
            Self::E003FsMoveFailed => "E003_FS_MOVE_FAILED",
            Self::E004BackupFailed => "E004_BACKUP_FAILED",
            Self::E005PartialApply => "E005_PARTIAL_APPLY",
            Self::E006RestoreFailed => "E006_RESTORE_FAILED",
            Self::E007StoreWriteFailed => "E007_STORE_WRITE_FAILED",
        }
    }
}

impl ReconcileError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidIntent(_) => ErrorCode::E001InvalidIntent,
            Self::StoreReadAnomaly { .. } => ErrorCode::E002StoreReadAnomaly,
            Self::FilesystemMove { .. } => ErrorCode::E003FsMoveFailed,
            Self::Backup { .. } => ErrorCode::E004BackupFailed,
            Self::PartialApply { .. } => ErrorCode::E005PartialApply,
            Self::Restore { .. } => ErrorCode::E006RestoreFailed,
            Self::StoreWrite { .. } => ErrorCode::E007StoreWriteFailed,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidIntent(message.into())
    }
}
