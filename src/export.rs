use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::history::RollingHistory;

pub const CSV_HEADER: [&str; 4] = ["X", "Y", "Z", "Heading"];

/// Integral readings (everything the serial device sends) print without a
/// fractional part; simulated readings keep their shortest round-trip form.
fn format_axis(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Where an export landed and how many data rows it holds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
}

/// Write the header and one row per entry, oldest first. Returns the row count.
///
/// Rows end in CRLF and headings always carry a decimal point, so a live
/// capture reads `1,0,0,0.0`.
pub fn write_csv<W: Write>(writer: W, history: &RollingHistory) -> Result<usize> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);

    // Header goes out explicitly so an empty history still yields one
    wtr.write_record(CSV_HEADER)?;

    let mut rows = 0;
    for entry in history.iter() {
        wtr.write_record([
            format_axis(entry.sample.x),
            format_axis(entry.sample.y),
            format_axis(entry.sample.z),
            format!("{:?}", entry.heading),
        ])?;
        rows += 1;
    }
    wtr.flush()?;
    Ok(rows)
}

/// Replace the file at `path` with the full contents of `history`.
pub fn export_csv(path: &Path, history: &RollingHistory) -> Result<ExportSummary> {
    let file = File::create(path)?;
    let rows = write_csv(file, history)?;
    Ok(ExportSummary {
        path: path.to_path_buf(),
        rows,
    })
}
