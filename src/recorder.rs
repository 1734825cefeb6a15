use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use crate::config::LogConfig;
use crate::drivers::AcquisitionError;
use crate::types::Sample;

/// Where and how the log file is written.
#[derive(Clone, Debug)]
pub struct LogSettings {
    pub path: PathBuf,
    pub delimiter: u8,
    pub include_header: bool,
    pub time_format: String,
    pub sensor_names: Vec<String>,
}

impl LogSettings {
    pub fn new(log: &LogConfig, path: PathBuf, sensor_names: Vec<String>) -> Self {
        Self {
            path,
            // LogConfig::validate only accepts ASCII delimiters
            delimiter: u8::try_from(log.delimiter).unwrap_or(b'\t'),
            include_header: log.include_header,
            time_format: log.time_format.clone(),
            sensor_names,
        }
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["Time".to_owned(), "HeatFlux_Wm2".to_owned()];
        header.extend(self.sensor_names.iter().cloned());
        header
    }
}

/// Appends samples to a delimited log file, one synced row per sample.
///
/// The file is opened lazily in append mode; a header is written only when
/// the file is new or empty, so reopening an existing log just continues it.
/// A row that fails to write stays queued and is retried ahead of the next
/// sample and again on [`PersistentLogger::flush`]. Any bytes a failed write
/// left behind are cut off again, so a retried row never lands twice.
pub struct PersistentLogger {
    settings: LogSettings,
    file: Option<File>,
    pending: VecDeque<Sample>,
    rows_written: usize,
}

impl PersistentLogger {
    pub fn new(settings: LogSettings) -> Self {
        Self { settings, file: None, pending: VecDeque::new(), rows_written: 0 }
    }

    /// Like [`PersistentLogger::new`] but creates the file up front.
    pub fn open(settings: LogSettings) -> Result<Self, AcquisitionError> {
        let mut logger = Self::new(settings);
        logger.ensure_file()?;
        Ok(logger)
    }

    pub fn path(&self) -> &Path {
        &self.settings.path
    }

    /// Rows accepted but not yet on disk.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn append(&mut self, sample: &Sample) -> Result<(), AcquisitionError> {
        self.pending.push_back(sample.clone());
        self.drain()
    }

    pub fn flush(&mut self) -> Result<(), AcquisitionError> {
        self.drain()
    }

    fn drain(&mut self) -> Result<(), AcquisitionError> {
        while let Some(sample) = self.pending.front() {
            let line = encode(self.settings.delimiter, &self.record(sample))
                .map_err(|e| persistence(&self.settings.path, e))?;
            let path = self.settings.path.clone();
            let file = self.ensure_file()?;
            if let Err(err) = write_line(file, &line) {
                // reopen on the next attempt
                self.file = None;
                return Err(persistence(&path, err));
            }
            // the row is on disk once written; a failed sync is not retried
            if let Err(err) = file.sync_data() {
                log::warn!("could not sync {}: {err}", path.display());
            }
            self.pending.pop_front();
            self.rows_written += 1;
        }
        Ok(())
    }

    fn record(&self, sample: &Sample) -> Vec<String> {
        let mut row = Vec::with_capacity(2 + sample.temperatures.len());
        row.push(sample.timestamp.format(&self.settings.time_format).to_string());
        row.push(sample.heat_flux.to_string());
        row.extend(sample.temperatures.iter().map(f64::to_string));
        row
    }

    fn ensure_file(&mut self) -> Result<&mut File, AcquisitionError> {
        if self.file.is_none() {
            let path = &self.settings.path;
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).map_err(|e| persistence(path, e))?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| persistence(path, e))?;
            let is_empty = file.metadata().map_err(|e| persistence(path, e))?.len() == 0;
            if self.settings.include_header && is_empty {
                let header = encode(self.settings.delimiter, &self.settings.header())
                    .map_err(|e| persistence(path, e))?;
                write_line(&mut file, &header).map_err(|e| persistence(path, e))?;
            }
            log::info!("logging samples to {}", path.display());
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| persistence(&self.settings.path, "log file unavailable"))
    }
}

/// One delimited line, quoted the way `csv` quotes it.
fn encode(delimiter: u8, fields: &[String]) -> Result<Vec<u8>, String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(fields).map_err(|e| e.to_string())?;
    writer.into_inner().map_err(|e| e.error().to_string())
}

/// Writes a whole line or nothing: a short write is truncated back off.
fn write_line(file: &mut File, line: &[u8]) -> io::Result<()> {
    let offset = file.metadata().map(|m| m.len()).ok();
    let written = file.write_all(line).and_then(|()| file.flush());
    if written.is_err() {
        if let Some(offset) = offset {
            if let Err(err) = file.set_len(offset) {
                log::warn!("could not drop partial row: {err}");
            }
        }
    }
    written
}

impl Drop for PersistentLogger {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            log::error!("{} rows could not be saved: {err}", self.pending.len());
        }
    }
}

fn persistence(path: &Path, err: impl std::fmt::Display) -> AcquisitionError {
    AcquisitionError::Persistence { path: path.to_path_buf(), reason: err.to_string() }
}
