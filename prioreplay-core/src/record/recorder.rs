use super::Record;

/// Writes records to an output destination.
///
/// Records given to [`Recorder::write`] are written immediately. Records given to
/// [`Recorder::store`] are kept until [`Recorder::flush`], which writes values
/// aggregated over them at the given step.
pub trait Recorder {
    /// Writes a record.
    fn write(&mut self, record: Record);

    /// Stores a record for later aggregation.
    fn store(&mut self, record: Record);

    /// Writes values aggregated from the stored records.
    fn flush(&mut self, step: i64);
}
