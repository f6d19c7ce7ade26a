use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;

use crate::error::CurateError;
use crate::fs_util;

pub const MISSING: &str = "n/a";
pub const FILENAME_COLUMN: &str = "filename";
pub const ACQ_TIME_COLUMN: &str = "acq_time";

const ACQ_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A session's `_scans.tsv`, held in memory between load and rewrite.
#[derive(Debug, Clone)]
pub struct ScansTable {
    path: Utf8PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    filename_col: usize,
    acq_time_col: usize,
}

impl ScansTable {
    pub fn read(path: &Utf8Path) -> Result<Self, CurateError> {
        if !path.is_file() {
            return Err(CurateError::ScansMissing(path.as_std_path().to_path_buf()));
        }
        let file = std::fs::File::open(path)
            .map_err(|err| CurateError::Filesystem(format!("open {path}: {err}")))?;
        Self::from_reader(path, file)
    }

    pub fn from_reader<R: Read>(path: &Utf8Path, reader: R) -> Result<Self, CurateError> {
        let parse_err = |message: String| CurateError::ScansParse {
            path: path.as_std_path().to_path_buf(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|err| parse_err(err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let column = |name: &str| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| CurateError::ScansColumnMissing {
                    path: path.as_std_path().to_path_buf(),
                    column: name.to_string(),
                })
        };
        let filename_col = column(FILENAME_COLUMN)?;
        let acq_time_col = column(ACQ_TIME_COLUMN)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| parse_err(err.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
            filename_col,
            acq_time_col,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn filenames(&self) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row[self.filename_col].as_str())
            .collect()
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.row(filename).is_some()
    }

    pub fn row(&self, filename: &str) -> Option<&[String]> {
        self.rows
            .iter()
            .find(|row| row[self.filename_col] == filename)
            .map(Vec::as_slice)
    }

    /// Value of `column` in the row for `filename`.
    pub fn value(&self, filename: &str, column: &str) -> Option<&str> {
        let col = self.headers.iter().position(|header| header == column)?;
        self.row(filename).map(|row| row[col].as_str())
    }

    /// Rewrites every row whose filename equals `from`; returns how many matched.
    pub fn rename(&mut self, from: &str, to: &str) -> usize {
        let mut matched = 0;
        for row in &mut self.rows {
            if row[self.filename_col] == from {
                row[self.filename_col] = to.to_string();
                matched += 1;
            }
        }
        matched
    }

    /// Appends a copy of the first row for `source` with its filename set to `filename`.
    pub fn clone_row(&mut self, source: &str, filename: &str) -> Result<(), CurateError> {
        let mut row = self
            .row(source)
            .ok_or_else(|| CurateError::ScansRowMissing(source.to_string()))?
            .to_vec();
        row[self.filename_col] = filename.to_string();
        self.rows.push(row);
        Ok(())
    }

    /// Stable sort by acquisition time, then filename. Rows without a usable
    /// acquisition time go last.
    pub fn sort(&mut self) {
        let (acq, name) = (self.acq_time_col, self.filename_col);
        self.rows.sort_by(|a, b| {
            AcqTime::parse(&a[acq])
                .cmp(&AcqTime::parse(&b[acq]))
                .then_with(|| a[name].cmp(&b[name]))
        });
    }

    pub fn to_tsv_bytes(&self) -> Result<Vec<u8>, CurateError> {
        let write_err = |err: csv::Error| CurateError::Filesystem(err.to_string());
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&self.headers).map_err(write_err)?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|cell| {
                    if cell.is_empty() {
                        MISSING
                    } else {
                        cell.as_str()
                    }
                }))
                .map_err(write_err)?;
        }
        writer
            .into_inner()
            .map_err(|err| CurateError::Filesystem(err.to_string()))
    }

    /// Replaces the file on disk, which must still exist, unless its content
    /// would not change. Returns whether it was rewritten.
    pub fn write_if_changed(&self) -> Result<bool, CurateError> {
        if !self.path.is_file() {
            return Err(CurateError::ScansMissing(
                self.path.as_std_path().to_path_buf(),
            ));
        }
        let rendered = self.to_tsv_bytes()?;
        let current = std::fs::read(&self.path)
            .map_err(|err| CurateError::Filesystem(format!("read {}: {err}", self.path)))?;
        if current == rendered {
            return Ok(false);
        }
        fs_util::write_bytes_atomic(&self.path, &rendered)?;
        Ok(true)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum AcqTime<'a> {
    Timestamp(NaiveDateTime),
    Text(&'a str),
    Missing,
}

impl<'a> AcqTime<'a> {
    fn parse(value: &'a str) -> Self {
        let value = value.trim();
        if value.is_empty() || value == MISSING {
            return Self::Missing;
        }
        ACQ_TIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .map(Self::Timestamp)
            .unwrap_or(Self::Text(value))
    }
}
