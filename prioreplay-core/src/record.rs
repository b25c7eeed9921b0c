//! Records and recorders for telemetry.
//!
//! The sum tree and the sampler report numeric summaries as a [`Record`],
//! a map from string keys to [`RecordValue`]s. A [`Recorder`] writes records
//! to some destination, either immediately or aggregated over a period with
//! [`RecordStorage`].
//!
//! * [`NullRecorder`] discards everything.
//! * [`BufferedRecorder`] keeps records in memory.
//! * [`TextRecorder`] writes timestamped status lines to the terminal and/or a text file.
//!
//! The TensorBoard recorder lives in the `prioreplay-tensorboard` crate.
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;
mod text_recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
pub use storage::RecordStorage;
pub use text_recorder::TextRecorder;
