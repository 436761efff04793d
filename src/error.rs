//! Error kinds raised by the lineage core (§7: checksum mismatches are
//! deliberately not among them — they're recorded by the checksum
//! verifier, not thrown, since a mismatch is evidence to report rather
//! than a condition that should abort a trace in progress).

use thiserror::Error;

use crate::dataset::DatasetId;

#[derive(Debug, Error)]
pub enum LineageError {
    #[error("dataset {dataset} has no lifted form for `{op}`")]
    UnsupportedLineageOp { dataset: DatasetId, op: &'static str },

    #[error("cyclic lineage detected at dataset {dataset}")]
    CyclicLineage { dataset: DatasetId },

    #[error("event log corrupt at byte offset {offset}")]
    CorruptLog { offset: u64 },

    #[error("event log io failure")]
    LogIoFailure(#[from] std::io::Error),

    #[error("tag space exhausted encoding (partition {partition}, position {position})")]
    TagSpaceExhausted { partition: usize, position: usize },

    #[error("underlying engine failure: {0}")]
    EngineFailure(String),
}

pub type Result<T> = std::result::Result<T, LineageError>;
