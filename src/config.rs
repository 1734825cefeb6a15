//! Startup configuration.
//!
//! Settings are read once from an optional JSON file, then selectively
//! overridden from the command line. Every field has a default so an empty
//! `{}` file is valid; the defaults describe the bench setup the logger was
//! first written for (one heat-flux plate on a 9215 module, one K-type
//! thermocouple on a 9213).
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use crate::drivers::device::{ThermocoupleChannels, ThermocoupleType, VoltageChannel};
use crate::drivers::AcquisitionError;
/// Which device implementation the engine opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    NiDaqmx,
    Simulated,
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfiguration {
    pub voltage_channel: String,
    /// Sensor calibration in V per W/m².
    pub sensitivity: f64,
    pub voltage_min: f64,
    pub voltage_max: f64,
    pub thermocouple_channels: Vec<String>,
    /// One name per physical thermocouple channel, in channel order.
    pub sensor_names: Vec<String>,
    pub thermocouple_type: ThermocoupleType,
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub sample_rate_hz: f64,
    pub burst_size: usize,
    pub logging_interval_secs: f64,
    pub read_timeout_secs: f64,
    pub tick_ms: u64,
}
impl Default for ChannelConfiguration {
    fn default() -> Self {
        Self {
            voltage_channel: "cDAQ1Mod1/ai0".to_owned(),
            sensitivity: 46.7e-6,
            voltage_min: -5.0,
            voltage_max: 5.0,
            thermocouple_channels: vec!["cDAQ1Mod4/ai0".to_owned()],
            sensor_names: vec!["Window".to_owned()],
            thermocouple_type: ThermocoupleType::K,
            temperature_min: 0.0,
            temperature_max: 100.0,
            sample_rate_hz: 100.0,
            burst_size: 100,
            logging_interval_secs: 60.0,
            read_timeout_secs: 10.0,
            tick_ms: 100,
        }
    }
}
impl ChannelConfiguration {
    pub fn validate(&self) -> Result<(), AcquisitionError> {
        let invalid = |msg: String| Err(AcquisitionError::Configuration(msg));
        if self.sensitivity == 0.0 || !self.sensitivity.is_finite() {
            return invalid(format!("sensitivity must be non-zero, got {}", self.sensitivity));
        }
        if self.voltage_channel.trim().is_empty() {
            return invalid("voltage channel is empty".into());
        }
        if self.thermocouple_channels.iter().all(|c| c.trim().is_empty()) {
            return invalid("at least one thermocouple channel is required".into());
        }
        if self.sensor_names.is_empty() {
            return invalid("at least one sensor name is required".into());
        }
        if !(self.sample_rate_hz > 0.0 && self.sample_rate_hz.is_finite()) {
            return invalid(format!("sample rate must be positive, got {}", self.sample_rate_hz));
        }
        if self.burst_size == 0 {
            return invalid("burst size must be at least 1".into());
        }
        if !(self.logging_interval_secs > 0.0 && self.logging_interval_secs.is_finite()) {
            return invalid(format!(
                "logging interval must be positive, got {}",
                self.logging_interval_secs
            ));
        }
        if !(self.read_timeout_secs > 0.0 && self.read_timeout_secs.is_finite()) {
            return invalid(format!("read timeout must be positive, got {}", self.read_timeout_secs));
        }
        if self.tick_ms == 0 {
            return invalid("tick period must be at least 1 ms".into());
        }
        let spans = [
            ("logging interval", self.logging_interval_secs),
            ("read timeout", self.read_timeout_secs),
            ("burst duration", self.burst_size as f64 / self.sample_rate_hz),
        ];
        for (what, secs) in spans {
            if Duration::try_from_secs_f64(secs).is_err() {
                return invalid(format!("{what} of {secs} s is out of range"));
            }
        }
        if self.voltage_min >= self.voltage_max || self.temperature_min >= self.temperature_max {
            return invalid("input ranges must have min < max".into());
        }
        if self.burst_duration() > self.logging_interval() {
            log::warn!(
                "burst of {} samples at {} Hz takes {:?}, longer than the {:?} logging interval; cadence will drift",
                self.burst_size,
                self.sample_rate_hz,
                self.burst_duration(),
                self.logging_interval()
            );
        }
        Ok(())
    }
    // 超出 Duration 范围的值由 validate 拒绝
    pub fn logging_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.logging_interval_secs).unwrap_or(Duration::MAX)
    }
    pub fn burst_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.burst_size as f64 / self.sample_rate_hz)
            .unwrap_or(Duration::MAX)
    }
    pub fn read_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.read_timeout_secs).unwrap_or(Duration::MAX)
    }
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
    pub fn voltage(&self) -> VoltageChannel {
        VoltageChannel {
            physical: self.voltage_channel.clone(),
            name: "Flux".to_owned(),
            min_volts: self.voltage_min,
            max_volts: self.voltage_max,
        }
    }
    pub fn thermocouples(&self) -> ThermocoupleChannels {
        ThermocoupleChannels {
            physical: self.thermocouple_channels.clone(),
            kind: self.thermocouple_type,
            min_celsius: self.temperature_min,
            max_celsius: self.temperature_max,
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub delimiter: char,
    pub include_header: bool,
    /// chrono `strftime` pattern for the `Time` column.
    pub time_format: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            file_prefix: "flux_thermal_log".to_owned(),
            delimiter: '\t',
            include_header: true,
            time_format: "%Y-%m-%d %H:%M:%S".to_owned(),
        }
    }
}
impl LogConfig {
    pub fn validate(&self) -> Result<(), AcquisitionError> {
        if !self.delimiter.is_ascii() || self.delimiter == '"' || self.delimiter == '\n' {
            return Err(AcquisitionError::Configuration(format!(
                "unusable log delimiter {:?}",
                self.delimiter
            )));
        }
        if self.time_format.trim().is_empty() {
            return Err(AcquisitionError::Configuration("time format is empty".into()));
        }
        if StrftimeItems::new(&self.time_format).any(|item| item == Item::Error) {
            return Err(AcquisitionError::Configuration(format!(
                "bad time format {:?}",
                self.time_format
            )));
        }
        Ok(())
    }
    /// `<output_dir>/<prefix>_<label>.csv`
    pub fn file_for_label(&self, label: &str) -> PathBuf {
        let label: String = label
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        let name = if label.is_empty() {
            format!("{}.csv", self.file_prefix)
        } else {
            format!("{}_{}.csv", self.file_prefix, label)
        };
        self.output_dir.join(name)
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub channels: ChannelConfiguration,
    pub log: LogConfig,
    pub device: DeviceKind,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            channels: ChannelConfiguration::default(),
            log: LogConfig::default(),
            device: DeviceKind::NiDaqmx,
        }
    }
}
impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(settings)
    }
    pub fn validate(&self) -> Result<(), AcquisitionError> {
        self.channels.validate()?;
        self.log.validate()
    }
}
