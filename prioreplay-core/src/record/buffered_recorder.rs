use super::{Record, RecordStorage, RecordValue, Recorder};

/// Keeps written records in memory.
///
/// Flushed aggregates are appended to the same buffer with the step under
/// the key `"step"`.
#[derive(Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
    storage: RecordStorage,
}

impl BufferedRecorder {
    /// Constructs the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }

    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        if self.storage.is_empty() {
            return;
        }
        let mut record = self.storage.aggregate();
        record.insert("step", RecordValue::Scalar(step as f32));
        self.buf.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_flush() {
        let mut recorder = BufferedRecorder::new();
        recorder.write(Record::from_scalar("a", 1.0));
        recorder.flush(10);
        assert_eq!(recorder.len(), 1);

        recorder.store(Record::from_scalar("loss", 2.0));
        recorder.store(Record::from_scalar("loss", 4.0));
        recorder.flush(20);
        assert_eq!(recorder.len(), 2);

        let last = recorder.iter().last().unwrap();
        assert_eq!(last.get_scalar("step").unwrap(), 20.0);
        assert_eq!(last.get_scalar("loss_mean").unwrap(), 3.0);
    }
}
