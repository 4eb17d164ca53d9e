use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The pipeline stage a preparation failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareStage {
    Extract,
    ZipSort,
    Reorder,
    ZipIndex,
    EmailShardSort,
    EmailMerge,
    Finalize,
}

impl fmt::Display for PrepareStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrepareStage::Extract => "extract",
            PrepareStage::ZipSort => "zip sort",
            PrepareStage::Reorder => "reorder",
            PrepareStage::ZipIndex => "zip index",
            PrepareStage::EmailShardSort => "email shard sort",
            PrepareStage::EmailMerge => "email merge",
            PrepareStage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Preparation failed during {stage}: {source}")]
    StageFailed {
        stage: PrepareStage,
        #[source]
        source: anyhow::Error,
    },

    #[error("Index is not ready: {0}")]
    NotReady(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn stage(stage: PrepareStage, source: anyhow::Error) -> Self {
        IndexError::StageFailed { stage, source }
    }

    /// The stage that failed, if this is a preparation failure.
    pub fn failed_stage(&self) -> Option<PrepareStage> {
        match self {
            IndexError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
