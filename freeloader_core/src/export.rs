//! CSV export and import of run data.
//!
//! Layout: a block of metadata rows (the software version alone on the first
//! row, then `label,value` pairs), the column header `Timestamp,Position,Weight`,
//! then one row per sample. Timestamps are RFC 3339 with nanoseconds.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};

use crate::error::{FreeloaderError, Result};
use crate::sample::Sample;
use crate::util::{unused_stream_path, write_atomic};

pub const COLUMNS: [&str; 3] = ["Timestamp", "Position", "Weight"];

const OPERATOR: &str = "Operator Initials";
const SAMPLE_NAME: &str = "Sample Name";
const MATERIAL: &str = "Material Code";
const LOT: &str = "Lot #";
const SAMPLE_TYPE: &str = "Sample Type";

/// Free-text information recorded ahead of the samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMetadata {
    pub software_version: String,
    pub operator: Option<String>,
    pub sample_name: Option<String>,
    pub material_code: Option<String>,
    pub lot: Option<String>,
    pub sample_type: Option<String>,
}

impl RunMetadata {
    pub fn new(software_version: impl Into<String>) -> Self {
        Self {
            software_version: software_version.into(),
            ..Self::default()
        }
    }

    fn labelled(&self) -> [(&'static str, Option<&str>); 5] {
        [
            (OPERATOR, self.operator.as_deref()),
            (SAMPLE_NAME, self.sample_name.as_deref()),
            (MATERIAL, self.material_code.as_deref()),
            (LOT, self.lot.as_deref()),
            (SAMPLE_TYPE, self.sample_type.as_deref()),
        ]
    }

    fn set(&mut self, label: &str, value: String) -> bool {
        let slot = match label {
            OPERATOR => &mut self.operator,
            SAMPLE_NAME => &mut self.sample_name,
            MATERIAL => &mut self.material_code,
            LOT => &mut self.lot,
            SAMPLE_TYPE => &mut self.sample_type,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// Metadata and samples read back from a data file.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFile {
    pub metadata: RunMetadata,
    pub samples: Vec<Sample>,
}

/// Destination for samples as they are recorded.
pub trait SampleSink {
    fn write_sample(&mut self, sample: &Sample) -> std::io::Result<()>;
}

fn io_err(e: impl std::fmt::Display) -> eyre::Report {
    eyre::Report::new(FreeloaderError::Io(e.to_string()))
}

fn writer<W: Write>(w: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(w)
}

fn write_header<W: Write>(w: &mut csv::Writer<W>, meta: &RunMetadata) -> csv::Result<()> {
    w.write_record([meta.software_version.as_str()])?;
    for (label, value) in meta.labelled() {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            w.write_record([label, v])?;
        }
    }
    w.write_record(COLUMNS)
}

fn write_row<W: Write>(w: &mut csv::Writer<W>, s: &Sample) -> csv::Result<()> {
    w.write_record([
        s.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, false),
        s.position.to_string(),
        s.weight.to_string(),
    ])
}

/// Write a complete data file to `out`.
pub fn write_csv<W: Write>(out: W, meta: &RunMetadata, samples: &[Sample]) -> Result<()> {
    let mut w = writer(out);
    write_header(&mut w, meta).map_err(io_err)?;
    for s in samples {
        write_row(&mut w, s).map_err(io_err)?;
    }
    w.flush().map_err(io_err)
}

/// Write a complete data file to `path`, replacing it atomically.
pub fn save_csv(path: &Path, meta: &RunMetadata, samples: &[Sample]) -> Result<()> {
    let mut buf = Vec::new();
    write_csv(&mut buf, meta, samples)?;
    write_atomic(path, &buf).map_err(|e| io_err(format!("{}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), samples = samples.len(), "data saved");
    Ok(())
}

fn export_err(line: Option<u64>, msg: impl std::fmt::Display) -> eyre::Report {
    let at = line.map(|l| format!("line {l}: ")).unwrap_or_default();
    eyre::Report::new(FreeloaderError::Export(format!("{at}{msg}")))
}

/// Parse a file written by `write_csv` or a `CsvSampleSink`.
pub fn read_csv<R: Read>(input: R) -> Result<RunFile> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut metadata = RunMetadata::default();
    let mut samples = Vec::new();
    let mut in_data = false;
    let mut first = true;

    for rec in rdr.records() {
        let rec = rec.map_err(|e| export_err(None, e))?;
        let line = rec.position().map(csv::Position::line);
        if !in_data {
            if rec.iter().eq(COLUMNS) {
                in_data = true;
            } else if first {
                metadata.software_version = rec.get(0).unwrap_or_default().to_string();
            } else {
                let label = rec.get(0).unwrap_or_default();
                let value = rec.get(1).unwrap_or_default().to_string();
                if !metadata.set(label, value) {
                    tracing::debug!(label, "ignoring unknown metadata row");
                }
            }
            first = false;
            continue;
        }

        if rec.iter().all(str::is_empty) {
            continue;
        }
        if rec.len() != 3 {
            return Err(export_err(line, format!("expected 3 fields, got {}", rec.len())));
        }
        let timestamp = DateTime::parse_from_rfc3339(&rec[0])
            .map_err(|e| export_err(line, format!("timestamp {:?}: {e}", &rec[0])))?
            .with_timezone(&Local);
        let position = rec[1]
            .parse::<i32>()
            .map_err(|e| export_err(line, format!("position {:?}: {e}", &rec[1])))?;
        let weight = rec[2]
            .parse::<f64>()
            .map_err(|e| export_err(line, format!("weight {:?}: {e}", &rec[2])))?;
        samples.push(Sample::new(timestamp, position, weight));
    }

    if !in_data {
        return Err(export_err(None, "missing Timestamp,Position,Weight header"));
    }
    Ok(RunFile { metadata, samples })
}

pub fn load_csv(path: &Path) -> Result<RunFile> {
    let f = fs::File::open(path).map_err(|e| io_err(format!("{}: {e}", path.display())))?;
    read_csv(std::io::BufReader::new(f))
}

/// Streams samples to a CSV writer, flushing after every row.
pub struct CsvSampleSink<W: Write> {
    inner: csv::Writer<W>,
}

impl<W: Write> std::fmt::Debug for CsvSampleSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSampleSink").finish_non_exhaustive()
    }
}

impl<W: Write> CsvSampleSink<W> {
    /// Write the metadata block and column header to `out`.
    pub fn new(out: W, meta: &RunMetadata) -> std::io::Result<Self> {
        let mut inner = writer(out);
        write_header(&mut inner, meta)?;
        inner.flush()?;
        Ok(Self { inner })
    }
}

impl<W: Write> SampleSink for CsvSampleSink<W> {
    fn write_sample(&mut self, sample: &Sample) -> std::io::Result<()> {
        write_row(&mut self.inner, sample)?;
        self.inner.flush()
    }
}

/// Create `motor_movement_data_<timestamp>.txt` in `dir` and write its header.
pub fn create_stream_file(
    dir: &Path,
    meta: &RunMetadata,
    now: DateTime<Local>,
) -> Result<(PathBuf, CsvSampleSink<fs::File>)> {
    fs::create_dir_all(dir).map_err(|e| io_err(format!("{}: {e}", dir.display())))?;
    let path = unused_stream_path(dir, &now);
    let file = fs::File::create(&path).map_err(|e| io_err(format!("{}: {e}", path.display())))?;
    let sink = CsvSampleSink::new(file, meta)
        .map_err(|e| io_err(format!("{}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "streaming samples");
    Ok((path, sink))
}
