use crate::error::{DriverError, DriverResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputRecord {
    /// 1-based position in the source stream.
    pub index: usize,
    pub source: Vec<String>,
    pub reference: Option<Vec<String>>,
}

/// Non-empty run of records in source-stream order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    records: Vec<InputRecord>,
}

impl Batch {
    pub fn new(records: Vec<InputRecord>) -> Option<Self> {
        if records.is_empty() {
            None
        } else {
            Some(Self { records })
        }
    }

    pub fn records(&self) -> &[InputRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn sources(&self) -> impl Iterator<Item = &[String]> {
        self.records.iter().map(|r| r.source.as_slice())
    }

    /// Reference token sequences, if every record carries one.
    pub fn references(&self) -> Option<Vec<&[String]>> {
        self.records
            .iter()
            .map(|r| r.reference.as_deref())
            .collect()
    }

    pub fn has_references(&self) -> bool {
        self.records.iter().any(|r| r.reference.is_some())
    }
}

pub struct BatchAccumulator {
    capacity: usize,
    pending: Vec<InputRecord>,
}

impl BatchAccumulator {
    pub fn new(capacity: usize) -> DriverResult<Self> {
        if capacity == 0 {
            return Err(DriverError::invalid_config("batch size must be at least 1"));
        }
        Ok(Self {
            capacity,
            pending: Vec::with_capacity(capacity),
        })
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Buffers `record`; returns the full batch once capacity is reached.
    pub fn accept(&mut self, record: InputRecord) -> Option<Batch> {
        self.pending.push(record);
        if self.pending.len() < self.capacity {
            return None;
        }
        self.take()
    }

    /// Called once at end of stream: the undersized remainder, if any.
    pub fn flush(&mut self) -> Option<Batch> {
        self.take()
    }

    fn take(&mut self) -> Option<Batch> {
        let records = std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity));
        Batch::new(records)
    }
}
