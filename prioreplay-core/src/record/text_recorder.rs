use super::{Record, RecordStorage, RecordValue, Recorder};
use crate::error::PrioError;
use anyhow::Result;
use chrono::Local;
use log::{log, warn, Level};
use serde::Serialize;
use serde_yaml::Value;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Writes records as timestamped status lines.
///
/// Lines go to the terminal through the [`log`] facade, to a text file, or
/// both. Lines less severe than the minimum level (`Info` by default) are
/// skipped on both outputs.
pub struct TextRecorder {
    terminal: bool,
    txt_path: Option<PathBuf>,
    min_level: Level,
    storage: RecordStorage,
}

fn format_value(v: &RecordValue) -> String {
    match v {
        RecordValue::Scalar(v) => format!("{}", v),
        RecordValue::DateTime(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        RecordValue::Array1(v) => format!("{:?}", v),
        RecordValue::Array2(_, s) => format!("<array {}x{}>", s[0], s[1]),
        RecordValue::Array3(_, s) => format!("<array {}x{}x{}>", s[0], s[1], s[2]),
        RecordValue::String(s) => s.clone(),
    }
}

fn format_yaml(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(vs) => format!(
            "[{}]",
            vs.iter().map(format_yaml).collect::<Vec<_>>().join(", ")
        ),
        Value::Mapping(_) => pretty(v, 0),
    }
}

/// Renders nested mappings as `key: value` lines, nested keys indented by two tabs.
fn pretty(v: &Value, indent: usize) -> String {
    let mapping = match v {
        Value::Mapping(m) => m,
        _ => return format!("{}{}\n", "\t".repeat(indent), format_yaml(v)),
    };
    let mut ret = String::new();
    for (key, value) in mapping.iter() {
        ret.push_str(&format!("{}{}: ", "\t".repeat(indent), format_yaml(key)));
        match value {
            Value::Mapping(_) => {
                ret.push('\n');
                ret.push_str(&pretty(value, indent + 2));
            }
            _ => {
                ret.push_str(&format_yaml(value));
                ret.push('\n');
            }
        }
    }
    ret
}

impl TextRecorder {
    /// Constructs the recorder.
    ///
    /// When `txt_path` is given, lines are appended to that file and its
    /// parent directory is created if needed. At least one output is required.
    pub fn new(terminal: bool, txt_path: Option<impl AsRef<Path>>) -> Result<Self> {
        let txt_path = txt_path.map(|p| p.as_ref().to_path_buf());
        if !terminal && txt_path.is_none() {
            return Err(PrioError::InvalidConfig(
                "at least one of the terminal and the text file should be enabled".to_string(),
            )
            .into());
        }
        if let Some(dir) = txt_path.as_ref().and_then(|p| p.parent()) {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        Ok(Self {
            terminal,
            txt_path,
            min_level: Level::Info,
            storage: RecordStorage::new(),
        })
    }

    /// Sets the least severe level that is still written.
    pub fn min_level(mut self, min_level: Level) -> Self {
        self.min_level = min_level;
        self
    }

    /// Path of the text file, if any.
    pub fn txt_path(&self) -> Option<&Path> {
        self.txt_path.as_deref()
    }

    /// Writes one status line at [`Level::Info`].
    pub fn log_str(&self, s: &str) -> Result<()> {
        self.log_str_at(Level::Info, s)
    }

    /// Writes one status line at `level`, unless it is less severe than the minimum level.
    pub fn log_str_at(&self, level: Level, s: &str) -> Result<()> {
        if level > self.min_level {
            return Ok(());
        }
        self.emit(level, s)
    }

    /// Writes `data` as an indented `key: value` listing under `tag`.
    ///
    /// The listing is written regardless of the minimum level.
    pub fn log_dict<T: Serialize>(&self, tag: &str, data: &T) -> Result<()> {
        let value = serde_yaml::to_value(data)?;
        self.emit(Level::Info, &format!("{}\n{}", tag, pretty(&value, 0)))
    }

    fn emit(&self, level: Level, s: &str) -> Result<()> {
        let time = Local::now().format("%Y-%m-%d %H:%M:%S");
        if self.terminal {
            log!(level, "[{}]\t{}", time, s);
        }
        if let Some(path) = &self.txt_path {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "[{}]\t{}", time, s)?;
        }
        Ok(())
    }

    /// Formats a record as `key=value` pairs sorted by key.
    pub fn format_record(record: &Record) -> String {
        let mut items = record
            .iter()
            .map(|(k, v)| format!("{}={}", k, format_value(v)))
            .collect::<Vec<_>>();
        items.sort();
        items.join(", ")
    }
}

impl Recorder for TextRecorder {
    fn write(&mut self, record: Record) {
        if record.is_empty() {
            return;
        }
        if let Err(e) = self.log_str(&Self::format_record(&record)) {
            warn!("Failed to write a record: {}", e);
        }
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
        self.write(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_requires_output() {
        assert!(TextRecorder::new(false, None::<PathBuf>).is_err());
    }

    #[test]
    fn test_min_level() -> Result<()> {
        let dir = TempDir::new("text_recorder")?;
        let path = dir.path().join("logs.txt");
        let recorder = TextRecorder::new(false, Some(&path))?.min_level(Level::Warn);

        recorder.log_str("sampling started")?;
        recorder.log_str_at(Level::Debug, "tree rebuilt")?;
        recorder.log_str_at(Level::Warn, "priority clipped")?;
        recorder.log_str_at(Level::Error, "empty distribution")?;

        let text = fs::read_to_string(&path)?;
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("\tpriority clipped"));
        assert!(lines[1].ends_with("\tempty distribution"));

        Ok(())
    }

    #[test]
    fn test_log_dict() -> Result<()> {
        #[derive(Serialize)]
        struct Inner {
            capacity: usize,
            normalize: String,
        }

        #[derive(Serialize)]
        struct Outer {
            alpha: f64,
            seeds: Vec<u64>,
            sampler: Inner,
        }

        let data = Outer {
            alpha: 0.5,
            seeds: vec![1, 2],
            sampler: Inner {
                capacity: 8,
                normalize: "All".to_string(),
            },
        };

        let dir = TempDir::new("text_recorder")?;
        let path = dir.path().join("logs.txt");
        let recorder = TextRecorder::new(false, Some(&path))?.min_level(Level::Error);
        recorder.log_dict("config", &data)?;

        let text = fs::read_to_string(&path)?;
        assert!(text.contains("\tconfig\nalpha: 0.5\nseeds: [1, 2]\nsampler: \n"));
        assert!(text.contains("\n\t\tcapacity: 8\n\t\tnormalize: All\n"));

        Ok(())
    }

    #[test]
    fn test_write_to_file() -> Result<()> {
        let dir = TempDir::new("text_recorder")?;
        let path = dir.path().join("run").join("logs.txt");
        let mut recorder = TextRecorder::new(false, Some(&path))?;

        let mut record = Record::from_scalar("loss", 0.5);
        record.insert("phase", RecordValue::String("warmup".to_string()));
        recorder.write(record);
        recorder.store(Record::from_scalar("per_total", 2.0));
        recorder.flush(100);

        let text = fs::read_to_string(&path)?;
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("\tloss=0.5, phase=warmup"));
        assert!(lines[1].ends_with("\tper_total=2, step=100"));

        Ok(())
    }
}
