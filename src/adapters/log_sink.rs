//! Log-based record sink adapter.
//!
//! Implements [`RecordSink`] by writing every record through the `log`
//! facade under the `record` target, so the line lands wherever the
//! binary's logger sends it. A file writer would implement the same trait.

use log::info;

use crate::app::ports::RecordSink;
use crate::record::Record;

/// Adapter that logs every [`Record`] as one line.
#[derive(Debug, Default)]
pub struct LogRecordSink {
    written: u64,
}

impl LogRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl RecordSink for LogRecordSink {
    fn write(&mut self, record: &Record) {
        info!(target: "record", "{}", record);
        self.written += 1;
    }
}

/// Keeps records in memory; handy for tests and short diagnostic runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecordSink {
    pub records: Vec<Record>,
}

impl RecordSink for MemoryRecordSink {
    fn write(&mut self, record: &Record) {
        self.records.push(record.clone());
    }
}
