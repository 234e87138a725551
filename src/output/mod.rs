//! Persisted selection results
//!
//! A run is written only once it has completed: every format is staged to a
//! temporary file first and renamed into place after all of them succeeded.
//! A failed rename removes the files this write already placed, so a failed
//! run never leaves a partial set of outputs behind.
//!
//! ## Text format
//!
//! `plotting-points_<budget>.txt`, one drawn point per line in dequeue order:
//!
//! ```text
//! <location>, <error>, (<train c>, <train a>, <train i>), (<test c>, <test a>, <test i>)
//! 0, 0.0, (0.0, 0.0, 0.0), (0.0, 0.0, 0.0)
//! 8, -0.0, (0.95, 0.0, 0.05), (0.8, 0.05, 0.15)
//! ```

mod columnar;

pub use columnar::{read_parquet_records, to_record_batch, write_parquet};

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checkpoint::Location;
use crate::metrics::Metrics;
use crate::run::RunRecord;
use crate::selector::Selection;
use crate::{Error, Result};

/// Output file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `plotting-points_<budget>.txt`
    Text,
    /// `plotting-points_<budget>.json` with run metadata
    Json,
    /// `plotting-points_<budget>.parquet`
    Parquet,
}

impl OutputFormat {
    /// File extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
            Self::Parquet => "parquet",
        }
    }

    /// File name for a run with `budget`.
    #[must_use]
    pub fn file_name(self, budget: usize) -> String {
        format!("plotting-points_{budget}.{}", self.extension())
    }
}

/// One persisted drawn point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawnRecord {
    /// Checkpoint location
    pub location: Location,
    /// Checkpoint name; not stored in the text format
    pub checkpoint: Option<String>,
    /// Priority score at selection time
    pub error: f64,
    /// Train metrics
    pub train: Metrics,
    /// Test metrics
    pub test: Metrics,
}

impl DrawnRecord {
    /// Text-format line, without trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        let [tc, ta, ti] = self.train.to_array();
        let [sc, sa, si] = self.test.to_array();
        format!(
            "{}, {:?}, ({tc:?}, {ta:?}, {ti:?}), ({sc:?}, {sa:?}, {si:?})",
            self.location, self.error
        )
    }

    /// Parse a text-format line. `line_no` is used in errors only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] if the line does not hold a
    /// location followed by seven numbers.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let malformed = |reason: String| Error::MalformedRecord {
            line: line_no,
            reason,
        };

        let fields: Vec<&str> = line
            .trim()
            .split(',')
            .map(|f| f.trim_matches(|c: char| c == ' ' || c == '(' || c == ')'))
            .collect();
        if fields.len() != 8 {
            return Err(malformed(format!("expected 8 fields, found {}", fields.len())));
        }

        let location = fields[0]
            .parse::<Location>()
            .map_err(|e| malformed(format!("location '{}': {e}", fields[0])))?;

        let mut numbers = [0.0_f64; 7];
        for (slot, raw) in numbers.iter_mut().zip(&fields[1..]) {
            *slot = raw
                .parse::<f64>()
                .map_err(|e| malformed(format!("value '{raw}': {e}")))?;
        }

        Ok(Self {
            location,
            checkpoint: None,
            error: numbers[0],
            train: Metrics::new(numbers[1], numbers[2], numbers[3]),
            test: Metrics::new(numbers[4], numbers[5], numbers[6]),
        })
    }
}

/// Drawn points of a selection as records, in dequeue order.
#[must_use]
pub fn records(selection: &Selection) -> Vec<DrawnRecord> {
    selection
        .points()
        .map(|p| DrawnRecord {
            location: p.location(),
            checkpoint: selection.checkpoint_name(p.location()).map(str::to_string),
            error: p.error(),
            train: *p.train(),
            test: *p.test(),
        })
        .collect()
}

/// JSON report: run metadata plus records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    /// Run lifecycle
    pub run: RunRecord,
    /// Number of checkpoints N
    pub checkpoint_count: usize,
    /// Test accuracy of the final checkpoint (baseline end value)
    pub final_test_accuracy: f64,
    /// Drawn points in dequeue order
    pub records: Vec<DrawnRecord>,
}

impl SelectionReport {
    /// Report for a completed selection.
    #[must_use]
    pub fn new(selection: &Selection, run: RunRecord) -> Self {
        let baseline = selection.baseline().values();
        Self {
            run,
            checkpoint_count: selection.checkpoint_count(),
            final_test_accuracy: baseline.last().copied().unwrap_or(0.0),
            records: records(selection),
        }
    }
}

/// Write text-format records.
///
/// # Errors
///
/// Returns an IO error if writing fails.
pub fn write_points<W: Write>(writer: &mut W, records: &[DrawnRecord]) -> Result<()> {
    for record in records {
        writeln!(writer, "{}", record.to_line())?;
    }
    Ok(())
}

/// Read a text-format points file.
///
/// # Errors
///
/// Returns an IO error or [`Error::MalformedRecord`] for unparsable lines.
pub fn read_points_file<P: AsRef<Path>>(path: P) -> Result<Vec<DrawnRecord>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(DrawnRecord::parse_line(&line, i + 1)?);
    }
    Ok(records)
}

/// Write every requested format for a completed selection into `dir`.
///
/// Files are staged as `.<name>.partial` and renamed only after all formats
/// were written. On error the staged files are removed, and if a rename
/// fails the outputs already renamed by this call are removed too.
///
/// # Errors
///
/// Returns IO, JSON, Arrow or Parquet errors from the writers.
pub fn write_outputs(
    dir: &Path,
    selection: &Selection,
    run: &RunRecord,
    formats: &[OutputFormat],
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let report = SelectionReport::new(selection, run.clone());

    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(formats.len());
    let result = stage_outputs(dir, &report, selection.budget(), formats, &mut staged);

    if let Err(e) = result {
        for (partial, _) in &staged {
            let _ = std::fs::remove_file(partial);
        }
        return Err(e);
    }

    commit_staged(&staged)
}

// Renames every staged file into place. A failed rename removes the targets
// already committed by this call along with the remaining staged files.
fn commit_staged(staged: &[(PathBuf, PathBuf)]) -> Result<Vec<PathBuf>> {
    let mut written: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (i, (partial, target)) in staged.iter().enumerate() {
        if let Err(e) = std::fs::rename(partial, target) {
            warn!(path = %target.display(), error = %e, "Rolling back selection outputs");
            for committed in &written {
                let _ = std::fs::remove_file(committed);
            }
            for (pending, _) in &staged[i..] {
                let _ = std::fs::remove_file(pending);
            }
            return Err(e.into());
        }
        info!(path = %target.display(), "Wrote selection output");
        written.push(target.clone());
    }
    Ok(written)
}

fn stage_outputs(
    dir: &Path,
    report: &SelectionReport,
    budget: usize,
    formats: &[OutputFormat],
    staged: &mut Vec<(PathBuf, PathBuf)>,
) -> Result<()> {
    for &format in formats {
        let name = format.file_name(budget);
        let target = dir.join(&name);
        let partial = dir.join(format!(".{name}.partial"));
        staged.push((partial.clone(), target));

        let file = File::create(&partial)?;
        match format {
            OutputFormat::Text => {
                let mut writer = BufWriter::new(file);
                write_points(&mut writer, &report.records)?;
                writer.flush()?;
            }
            OutputFormat::Json => {
                let mut writer = BufWriter::new(file);
                serde_json::to_writer_pretty(&mut writer, report)?;
                writer.flush()?;
            }
            OutputFormat::Parquet => {
                let batch = to_record_batch(&report.records)?;
                write_parquet(file, &batch)?;
            }
        }
    }
    Ok(())
}
