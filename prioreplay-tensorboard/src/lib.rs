//! TensorBoard recorder for prioreplay.
//!
//! [`TensorboardRecorder`] writes [`Record`]s, for example the summaries of
//! [`PerSampler::record`](prioreplay_core::sampler::PerSampler::record),
//! to TFRecord event files readable by TensorBoard.
use chrono::Local;
use log::warn;
use prioreplay_core::record::{Record, RecordStorage, RecordValue, Recorder};
use std::{collections::HashMap, path::Path};
use tensorboard_rs::summary_writer::SummaryWriter;

/// Returns a run directory name `MM-DD-HH-MM-<pid>`, prefixed with `name` if not empty.
pub fn unique_run_name(name: &str) -> String {
    let suffix = Local::now().format("%m-%d-%H-%M");
    let pid = std::process::id();
    if name.is_empty() {
        format!("{}-{}", suffix, pid)
    } else {
        format!("{}-{}-{}", name, suffix, pid)
    }
}

/// Scales `data` to `[0, 255]` and lays it out as a 3-channel image.
///
/// Single-channel data is repeated on every channel.
fn to_image(data: &[f32], shape: &[usize]) -> Option<(Vec<u8>, [usize; 3])> {
    let (c, h, w) = match shape {
        &[h, w] => (1, h, w),
        &[c, h, w] if c == 1 || c == 3 => (c, h, w),
        _ => return None,
    };
    if data.len() != c * h * w {
        return None;
    }

    let min = data.iter().fold(f32::MAX, |m, &v| m.min(v));
    let max = data.iter().fold(f32::MIN, |m, &v| m.max(v));
    let scale = max - min;
    let pixels = data
        .iter()
        .map(|&v| {
            if scale > 0.0 {
                ((v - min) / scale * 255f32) as u8
            } else {
                0u8
            }
        })
        .collect::<Vec<_>>();

    let pixels = if c == 1 { pixels.repeat(3) } else { pixels };
    Some((pixels, [3, h, w]))
}

/// Writes records to TFRecord.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    step_key: String,
    ignore_unsupported_value: bool,
    storage: RecordStorage,
}

impl TensorboardRecorder {
    /// Constructs a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            step_key: "opt_steps".to_string(),
            ignore_unsupported_value: true,
            storage: RecordStorage::new(),
        }
    }

    /// Constructs a [`TensorboardRecorder`] warning on values it cannot write.
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new_with_check_unsupported_value<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            ignore_unsupported_value: false,
            ..Self::new(logdir)
        }
    }

    /// Sets the key of the scalar used as the step in [`Recorder::write`].
    pub fn step_key(mut self, step_key: impl Into<String>) -> Self {
        self.step_key = step_key.into();
        self
    }

    /// Writes scalars sharing `main_tag` as one chart.
    ///
    /// Each scalar goes to its own run under `<logdir>/<main_tag>/<tag>`.
    pub fn log_scalars(&mut self, main_tag: &str, scalars: &HashMap<String, f32>, step: usize) {
        self.writer.add_scalars(main_tag, scalars, step);
    }

    fn write_at(&mut self, record: &Record, step: usize) {
        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::DateTime(_) => {}
                RecordValue::Array2(data, shape) => self.add_image(k, data, shape, step),
                RecordValue::Array3(data, shape) => self.add_image(k, data, shape, step),
                _ => {
                    if !self.ignore_unsupported_value {
                        warn!("Unsupported value for TensorBoard: {:?}", (k, v));
                    }
                }
            }
        }
    }

    fn add_image(&mut self, tag: &str, data: &[f32], shape: &[usize], step: usize) {
        match to_image(data, shape) {
            Some((pixels, dim)) => self.writer.add_image(tag, pixels.as_slice(), &dim, step),
            None => warn!("Cannot write {} with shape {:?} as an image", tag, shape),
        }
    }
}

impl Recorder for TensorboardRecorder {
    /// Writes a record at the step stored under the step key.
    ///
    /// Scalars and 2- or 3-dimensional arrays are written; date times are
    /// discarded. A record without the step is dropped with a warning.
    fn write(&mut self, record: Record) {
        match record.get_scalar(&self.step_key) {
            Ok(step) => self.write_at(&record, step as usize),
            Err(e) => warn!("Record dropped, no step: {}", e),
        }
    }

    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    /// Writes aggregated records at `step`, then flushes the event file.
    fn flush(&mut self, step: i64) {
        if !self.storage.is_empty() {
            let record = self.storage.aggregate();
            self.write_at(&record, step.max(0) as usize);
        }
        self.writer.flush();
    }
}
