//! Event log & checksum verifier (§4.G, §6). The writer side appends
//! length-prefixed, magic-headered records to any `Write`; the reader
//! side replays them, bumping id watermarks and feeding checksum entries
//! to a `ChecksumVerifier` that records mismatches without ever treating
//! one as fatal (§7). Checksums are FNV-1a hashes seeded with the
//! constant `42` (§6) — `fnv` is already this crate's `FnvHashMap`
//! hasher, reused here for its second, unrelated job of producing a
//! fast, stable, reproducible digest.

use std::collections::hash_map::Entry;
use std::hash::Hasher;
use std::io::{self, Read, Write};

use fnv::{FnvHashMap, FnvHasher};
use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetId, Dependency, DependencyKind};
use crate::error::{LineageError, Result};

/// Fixed header every log file starts with (§6).
pub const MAGIC: [u8; 8] = *b"LINEAGE1";
const CHECKSUM_SEED: u64 = 42;

pub type StageId = u64;
pub type PartitionIndex = usize;

/// Computes the §6 checksum: an FNV-1a hash, seeded with `42`, of the
/// bincode encoding of `value`.
pub fn checksum<T: Serialize>(value: &T) -> Result<u32> {
    let bytes = bincode::serialize(value).map_err(|e| LineageError::EngineFailure(e.to_string()))?;
    let mut hasher = FnvHasher::with_key(CHECKSUM_SEED);
    hasher.write(&bytes);
    Ok(hasher.finish() as u32)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub stage_id: StageId,
    pub partition: PartitionIndex,
}

/// A dataset as recorded at registration time. `dependencies: None` is the
/// anomaly §9 calls out: "datasets whose `dependencies` is absent" are
/// recorded and proceed, treated downstream as a source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisteredDataset {
    pub id: DatasetId,
    pub dependencies: Option<Vec<Dependency>>,
    pub partitions: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumKind {
    Result,
    ShuffleMap,
}

/// Identifies what a checksum entry is about, for `ChecksumVerifier`'s
/// first-seen map. Block checksums key on a string block id rather than a
/// `(DatasetId, PartitionIndex)` pair, so this is a sum type rather than a
/// plain tuple.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChecksumSubject {
    Dataset { dataset_id: DatasetId, partition: PartitionIndex, kind: ChecksumKind },
    Block { block_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub subject: ChecksumSubject,
    pub expected: u32,
    pub got: u32,
}

/// The discriminated union of §3's event log entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EventLogEntry {
    DatasetRegistration(RegisteredDataset),
    TaskSubmission { stage_id: StageId, tasks: Vec<TaskDescriptor> },
    ResultTaskChecksum { dataset_id: DatasetId, partition: PartitionIndex, func_checksum: u32, result_checksum: u32 },
    ShuffleMapTaskChecksum { dataset_id: DatasetId, partition: PartitionIndex, accum_updates_checksum: u32 },
    BlockChecksum { block_id: String, bytes_checksum: u32 },
    LocalExceptionEvent { owner: String, message: String },
    RemoteExceptionEvent { owner: String, message: String },
}

/// Keeps the first-seen checksum per subject and accumulates mismatches
/// against later occurrences. Per §7, a mismatch is recorded, never
/// thrown.
#[derive(Default)]
pub struct ChecksumVerifier {
    seen: FnvHashMap<ChecksumSubject, u32>,
    mismatches: Vec<ChecksumMismatch>,
}

impl ChecksumVerifier {
    pub fn new() -> Self {
        ChecksumVerifier::default()
    }

    pub fn record(&mut self, subject: ChecksumSubject, value: u32) {
        match self.seen.entry(subject.clone()) {
            Entry::Occupied(existing) => {
                if *existing.get() != value {
                    self.mismatches.push(ChecksumMismatch { subject, expected: *existing.get(), got: value });
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
        }
    }

    pub fn mismatches(&self) -> &[ChecksumMismatch] {
        &self.mismatches
    }

    /// The first-seen checksum recorded for `subject`, if any.
    pub fn first_seen(&self, subject: &ChecksumSubject) -> Option<u32> {
        self.seen.get(subject).copied()
    }
}

/// Appends §3 event log entries to any `Write`, one record at a time, as
/// a 4-byte little-endian length prefix followed by the bincode payload.
/// `EventReporter` (§4.J) is the only caller that needs thread-safety
/// around a writer; this type itself assumes single-writer access, per
/// §5's "serialised by a single-writer actor".
pub struct EventLogWriter<W: Write> {
    out: W,
}

impl<W: Write> EventLogWriter<W> {
    /// Starts a brand new log, writing the magic header.
    pub fn new(mut out: W) -> Result<Self> {
        out.write_all(&MAGIC)?;
        Ok(EventLogWriter { out })
    }

    /// Resumes appending to a log whose header was already written by an
    /// earlier `new` call — the append-only half of §3's reopen lifecycle.
    pub fn resume(out: W) -> Self {
        EventLogWriter { out }
    }

    pub fn append(&mut self, entry: &EventLogEntry) -> Result<()> {
        let bytes = bincode::serialize(entry).map_err(|e| LineageError::EngineFailure(e.to_string()))?;
        let len = u32::try_from(bytes.len())
            .map_err(|_| LineageError::EngineFailure("event log record too large to frame".into()))?;
        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(&bytes)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Replays §3 event log entries from any `Read`, read-once until EOF,
/// resumable on reopen (§3 lifecycles): calling `replay_all` again after
/// more records have been appended to the same reopened stream picks up
/// exactly where the previous call left off, since `offset` tracks how
/// far into the stream this reader has consumed.
pub struct EventLogReader<R: Read> {
    input: R,
    offset: u64,
    header_checked: bool,
    pub datasets: FnvHashMap<DatasetId, RegisteredDataset>,
    pub next_dataset_id: DatasetId,
    pub next_shuffle_id: u64,
    pub next_stage_id: StageId,
    pub verifier: ChecksumVerifier,
}

impl<R: Read> EventLogReader<R> {
    pub fn new(input: R) -> Self {
        EventLogReader {
            input,
            offset: 0,
            header_checked: false,
            datasets: FnvHashMap::default(),
            next_dataset_id: 0,
            next_shuffle_id: 0,
            next_stage_id: 0,
            verifier: ChecksumVerifier::new(),
        }
    }

    fn check_header(&mut self) -> Result<()> {
        if self.header_checked {
            return Ok(());
        }
        let mut magic = [0u8; 8];
        match self.input.read_exact(&mut magic) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(LineageError::CorruptLog { offset: 0 });
            }
            Err(e) => return Err(LineageError::LogIoFailure(e)),
        }
        if magic != MAGIC {
            return Err(LineageError::CorruptLog { offset: 0 });
        }
        self.offset = 8;
        self.header_checked = true;
        Ok(())
    }

    /// Reads and applies every entry currently available, stopping
    /// cleanly at a well-formed EOF. A truncated record (length prefix
    /// present but payload short) is `CorruptLog`; already-ingested
    /// entries remain valid per §7.
    pub fn replay_all(&mut self) -> Result<()> {
        self.check_header()?;
        while let Some(entry) = self.read_one()? {
            self.ingest(entry);
        }
        Ok(())
    }

    fn read_one(&mut self) -> Result<Option<EventLogEntry>> {
        let mut len_buf = [0u8; 4];
        match self.input.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(LineageError::LogIoFailure(e)),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        if let Err(e) = self.input.read_exact(&mut payload) {
            return if e.kind() == io::ErrorKind::UnexpectedEof {
                Err(LineageError::CorruptLog { offset: self.offset })
            } else {
                Err(LineageError::LogIoFailure(e))
            };
        }
        self.offset += 4 + len as u64;
        let entry: EventLogEntry =
            bincode::deserialize(&payload).map_err(|_| LineageError::CorruptLog { offset: self.offset })?;
        Ok(Some(entry))
    }

    /// Applies one already-deserialized entry: updates watermarks, feeds
    /// checksums to the verifier, or logs-and-skips an anomaly (§7's
    /// "unknown entry type, null dependency list" are never silently
    /// dropped).
    pub fn ingest(&mut self, entry: EventLogEntry) {
        match entry {
            EventLogEntry::DatasetRegistration(ds) => {
                self.next_dataset_id = self.next_dataset_id.max(ds.id + 1);
                match &ds.dependencies {
                    Some(deps) => {
                        let shuffle_edges = deps.iter().filter(|d| d.kind == DependencyKind::Shuffle).count() as u64;
                        self.next_shuffle_id += shuffle_edges;
                    }
                    None => {
                        tracing::warn!(dataset_id = ds.id, "dataset registered with no dependency list; treating as source");
                    }
                }
                self.datasets.insert(ds.id, ds);
            }
            EventLogEntry::TaskSubmission { stage_id, .. } => {
                self.next_stage_id = self.next_stage_id.max(stage_id + 1);
            }
            EventLogEntry::ResultTaskChecksum { dataset_id, partition, result_checksum, .. } => {
                self.verifier.record(
                    ChecksumSubject::Dataset { dataset_id, partition, kind: ChecksumKind::Result },
                    result_checksum,
                );
            }
            EventLogEntry::ShuffleMapTaskChecksum { dataset_id, partition, accum_updates_checksum } => {
                self.verifier.record(
                    ChecksumSubject::Dataset { dataset_id, partition, kind: ChecksumKind::ShuffleMap },
                    accum_updates_checksum,
                );
            }
            EventLogEntry::BlockChecksum { block_id, bytes_checksum } => {
                self.verifier.record(ChecksumSubject::Block { block_id }, bytes_checksum);
            }
            EventLogEntry::LocalExceptionEvent { owner, message } => {
                tracing::warn!(owner = %owner, message = %message, "local exception recorded in event log");
            }
            EventLogEntry::RemoteExceptionEvent { owner, message } => {
                tracing::warn!(owner = %owner, message = %message, "remote exception recorded in event log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn registration(id: DatasetId) -> EventLogEntry {
        EventLogEntry::DatasetRegistration(RegisteredDataset { id, dependencies: Some(vec![]), partitions: 1 })
    }

    #[test]
    fn write_then_read_round_trips_and_bumps_watermarks() {
        let mut buf = Vec::new();
        {
            let mut writer = EventLogWriter::new(&mut buf).unwrap();
            writer.append(&registration(3)).unwrap();
            writer.append(&EventLogEntry::TaskSubmission { stage_id: 7, tasks: vec![] }).unwrap();
        }
        let mut reader = EventLogReader::new(Cursor::new(buf));
        reader.replay_all().unwrap();
        assert_eq!(reader.next_dataset_id, 4);
        assert_eq!(reader.next_stage_id, 8);
        assert!(reader.datasets.contains_key(&3));
    }

    #[test]
    fn reopen_resumes_from_where_it_left_off() {
        let mut buf = Vec::new();
        {
            let mut writer = EventLogWriter::new(&mut buf).unwrap();
            writer.append(&registration(1)).unwrap();
        }
        let mut reader = EventLogReader::new(Cursor::new(buf.clone()));
        reader.replay_all().unwrap();
        assert_eq!(reader.next_dataset_id, 2);

        // Simulate more records landing in the same (reopened) stream.
        {
            let mut cursor = Cursor::new(&mut buf);
            cursor.set_position(cursor.get_ref().len() as u64);
            let mut writer = EventLogWriter::resume(&mut cursor);
            writer.append(&registration(5)).unwrap();
        }
        let mut reader2 = EventLogReader::new(Cursor::new(buf));
        reader2.replay_all().unwrap();
        assert_eq!(reader2.next_dataset_id, 6);
    }

    #[test]
    fn shuffle_id_watermark_bumps_with_shuffle_dependencies() {
        let mut buf = Vec::new();
        {
            let mut writer = EventLogWriter::new(&mut buf).unwrap();
            writer
                .append(&EventLogEntry::DatasetRegistration(RegisteredDataset {
                    id: 2,
                    dependencies: Some(vec![Dependency { kind: crate::dataset::DependencyKind::Shuffle, parent: 1 }]),
                    partitions: 4,
                }))
                .unwrap();
        }
        let mut reader = EventLogReader::new(Cursor::new(buf));
        reader.replay_all().unwrap();
        assert_eq!(reader.next_shuffle_id, 1);
    }

    #[test]
    fn checksum_is_deterministic_and_seeded() {
        let a = checksum(&42i64).unwrap();
        let b = checksum(&42i64).unwrap();
        assert_eq!(a, b);
        let c = checksum(&43i64).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn checksum_verifier_flags_divergent_replays() {
        let mut verifier = ChecksumVerifier::new();
        let subject = ChecksumSubject::Dataset { dataset_id: 1, partition: 0, kind: ChecksumKind::Result };
        verifier.record(subject.clone(), 100);
        verifier.record(subject, 100);
        assert!(verifier.mismatches().is_empty());

        let mut verifier = ChecksumVerifier::new();
        let subject = ChecksumSubject::Dataset { dataset_id: 1, partition: 0, kind: ChecksumKind::Result };
        verifier.record(subject.clone(), 100);
        verifier.record(subject, 200);
        assert_eq!(verifier.mismatches().len(), 1);
    }

    #[test]
    fn truncated_record_is_corrupt_log() {
        let mut buf = Vec::new();
        {
            let mut writer = EventLogWriter::new(&mut buf).unwrap();
            writer.append(&registration(1)).unwrap();
        }
        buf.truncate(buf.len() - 2);
        let mut reader = EventLogReader::new(Cursor::new(buf));
        let err = reader.replay_all().unwrap_err();
        assert!(matches!(err, LineageError::CorruptLog { .. }));
    }

    #[test]
    fn bad_magic_is_corrupt_log() {
        let reader_input = Cursor::new(b"NOTLINEAGE".to_vec());
        let mut reader = EventLogReader::new(reader_input);
        let err = reader.replay_all().unwrap_err();
        assert!(matches!(err, LineageError::CorruptLog { .. }));
    }
}
