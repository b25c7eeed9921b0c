//! Aggregation of stored records.
use super::{Record, RecordValue};
use std::collections::HashSet;
use xxhash_rust::xxh3::Xxh3Builder;

/// Stores records and aggregates them into one.
///
/// Scalars stored more than once under a key are summarized as
/// `{key}_min`, `{key}_max`, `{key}_mean` and `{key}_median`. Any other
/// value, or a scalar stored once, is kept as the most recent value.
#[derive(Debug, Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn median(mut vs: Vec<f32>) -> f32 {
    vs.sort_by(|x, y| x.total_cmp(y));
    vs[vs.len() / 2]
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn keys(&self) -> HashSet<String, Xxh3Builder> {
        let mut keys = HashSet::<String, Xxh3Builder>::default();
        for record in self.data.iter() {
            keys.extend(record.keys().cloned());
        }
        keys
    }

    fn scalars(&self, key: &str) -> Vec<f32> {
        self.data
            .iter()
            .filter_map(|record| match record.get(key) {
                Some(RecordValue::Scalar(v)) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Aggregates the stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();

        for key in self.keys().iter() {
            let latest = self.data.iter().rev().find_map(|r| r.get(key)).cloned();
            match latest {
                Some(RecordValue::Scalar(_)) => {
                    let vs = self.scalars(key);
                    if vs.len() > 1 {
                        let min = vs.iter().fold(f32::MAX, |m, &v| m.min(v));
                        let max = vs.iter().fold(f32::MIN, |m, &v| m.max(v));
                        let mean = vs.iter().sum::<f32>() / vs.len() as f32;
                        record.insert(format!("{}_min", key), RecordValue::Scalar(min));
                        record.insert(format!("{}_max", key), RecordValue::Scalar(max));
                        record.insert(format!("{}_mean", key), RecordValue::Scalar(mean));
                        record.insert(
                            format!("{}_median", key),
                            RecordValue::Scalar(median(vs)),
                        );
                    } else {
                        record.insert(key.clone(), RecordValue::Scalar(vs[0]));
                    }
                }
                Some(value) => record.insert(key.clone(), value),
                None => {}
            }
        }

        self.data.clear();
        record
    }
}
