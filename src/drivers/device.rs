use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use crate::drivers::clock::ManualClock;
use crate::drivers::AcquisitionError;
/// One burst: channels x samples, voltage channel first.
pub type BurstMatrix = Array2<f64>;
/// Junction type used by the driver to linearize thermocouple voltages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThermocoupleType {
    B,
    E,
    J,
    K,
    N,
    R,
    S,
    T,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleMode {
    /// Acquire exactly the configured number of samples per start.
    Finite,
    Continuous,
}
/// Voltage input channel description.
#[derive(Clone, Debug, PartialEq)]
pub struct VoltageChannel {
    pub physical: String,
    pub name: String,
    pub min_volts: f64,
    pub max_volts: f64,
}
/// Thermocouple input channel(s) description. `physical` may name a range
/// such as `cDAQ1Mod2/ai0:5`.
#[derive(Clone, Debug, PartialEq)]
pub struct ThermocoupleChannels {
    pub physical: Vec<String>,
    pub kind: ThermocoupleType,
    pub min_celsius: f64,
    pub max_celsius: f64,
}
/// The data-acquisition interface the acquirer drives. Configure once, then
/// start/read/stop any number of times before `close`.
pub trait DaqDevice {
    /// Adds the channels and returns the total channel count of the task.
    fn configure_channels(
        &mut self,
        voltage: &VoltageChannel,
        thermocouples: &ThermocoupleChannels,
    ) -> Result<usize, AcquisitionError>;
    fn set_timing(
        &mut self,
        rate_hz: f64,
        mode: SampleMode,
        samples_per_channel: usize,
    ) -> Result<(), AcquisitionError>;
    fn start(&mut self) -> Result<(), AcquisitionError>;
    fn read(
        &mut self,
        samples_per_channel: usize,
        timeout: Duration,
    ) -> Result<BurstMatrix, AcquisitionError>;
    fn stop(&mut self) -> Result<(), AcquisitionError>;
    fn close(&mut self) -> Result<(), AcquisitionError>;
}
impl<D: DaqDevice + ?Sized> DaqDevice for Box<D> {
    fn configure_channels(
        &mut self,
        voltage: &VoltageChannel,
        thermocouples: &ThermocoupleChannels,
    ) -> Result<usize, AcquisitionError> {
        (**self).configure_channels(voltage, thermocouples)
    }
    fn set_timing(
        &mut self,
        rate_hz: f64,
        mode: SampleMode,
        samples_per_channel: usize,
    ) -> Result<(), AcquisitionError> {
        (**self).set_timing(rate_hz, mode, samples_per_channel)
    }
    fn start(&mut self) -> Result<(), AcquisitionError> {
        (**self).start()
    }
    fn read(
        &mut self,
        samples_per_channel: usize,
        timeout: Duration,
    ) -> Result<BurstMatrix, AcquisitionError> {
        (**self).read(samples_per_channel, timeout)
    }
    fn stop(&mut self) -> Result<(), AcquisitionError> {
        (**self).stop()
    }
    fn close(&mut self) -> Result<(), AcquisitionError> {
        (**self).close()
    }
}
/// Builds a burst matrix from per-channel rows, rejecting ragged input.
pub fn burst_from_rows(rows: Vec<Vec<f64>>) -> Result<BurstMatrix, AcquisitionError> {
    let channels = rows.len();
    let per_channel = rows.first().map(|r| r.len()).unwrap_or(0);
    if let Some(bad) = rows.iter().position(|r| r.len() != per_channel) {
        return Err(AcquisitionError::InvalidInput(format!(
            "channel {bad} has {} samples, expected {per_channel}",
            rows[bad].len()
        )));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((channels, per_channel), flat)
        .map_err(|e| AcquisitionError::InvalidInput(e.to_string()))
}
/// Number of physical channels named by a DAQmx-style channel list
/// (`Dev1/ai0`, `Dev1/ai0:5`, comma separated).
pub fn physical_channel_count(spec: &str) -> Result<usize, AcquisitionError> {
    let mut total = 0;
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let last = part.rsplit('/').next().unwrap_or(part);
        let Some((lo, hi)) = last.split_once(':') else {
            total += 1;
            continue;
        };
        let lo_digits: String = lo.chars().skip_while(|c| !c.is_ascii_digit()).collect();
        let lo: usize = lo_digits
            .parse()
            .map_err(|_| AcquisitionError::DeviceConfiguration(format!("bad channel range {part}")))?;
        let hi: usize = hi
            .parse()
            .map_err(|_| AcquisitionError::DeviceConfiguration(format!("bad channel range {part}")))?;
        total += hi.abs_diff(lo) + 1;
    }
    if total == 0 {
        return Err(AcquisitionError::DeviceConfiguration(format!(
            "no physical channels in {spec:?}"
        )));
    }
    Ok(total)
}
fn count_thermocouples(thermocouples: &ThermocoupleChannels) -> Result<usize, AcquisitionError> {
    thermocouples
        .physical
        .iter()
        .map(|spec| physical_channel_count(spec))
        .sum()
}
/// Bench device that produces plausible flux and temperature readings without
/// hardware. Reads block for the burst duration like a finite acquisition.
pub struct SimulatedDevice {
    sensitivity: f64,
    base_flux: f64,
    base_celsius: f64,
    failure_rate: f64,
    channels: usize,
    rate_hz: f64,
    running: bool,
    phase: f64,
}
impl SimulatedDevice {
    pub fn new(sensitivity: f64) -> Self {
        Self {
            sensitivity,
            base_flux: 35.0,
            base_celsius: 21.0,
            failure_rate: 0.0,
            channels: 0,
            rate_hz: 0.0,
            running: false,
            phase: 0.0,
        }
    }
    /// Probability in `[0, 1]` that a read fails with a timeout.
    /// NaN counts as zero.
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = if failure_rate.is_nan() { 0.0 } else { failure_rate.clamp(0.0, 1.0) };
        self
    }
}
impl DaqDevice for SimulatedDevice {
    fn configure_channels(
        &mut self,
        voltage: &VoltageChannel,
        thermocouples: &ThermocoupleChannels,
    ) -> Result<usize, AcquisitionError> {
        if voltage.physical.trim().is_empty() {
            return Err(AcquisitionError::DeviceConfiguration(
                "voltage channel is empty".into(),
            ));
        }
        self.channels = 1 + count_thermocouples(thermocouples)?;
        Ok(self.channels)
    }
    fn set_timing(
        &mut self,
        rate_hz: f64,
        _mode: SampleMode,
        samples_per_channel: usize,
    ) -> Result<(), AcquisitionError> {
        if rate_hz <= 0.0 || samples_per_channel == 0 {
            return Err(AcquisitionError::DeviceConfiguration(format!(
                "unsupported timing {rate_hz} Hz x {samples_per_channel}"
            )));
        }
        self.rate_hz = rate_hz;
        Ok(())
    }
    fn start(&mut self) -> Result<(), AcquisitionError> {
        self.running = true;
        Ok(())
    }
    fn read(
        &mut self,
        samples_per_channel: usize,
        timeout: Duration,
    ) -> Result<BurstMatrix, AcquisitionError> {
        if !self.running {
            return Err(AcquisitionError::DeviceIo("task not started".into()));
        }
        let burst = Duration::try_from_secs_f64(samples_per_channel as f64 / self.rate_hz)
            .map_err(|e| AcquisitionError::InvalidInput(format!("burst duration: {e}")))?;
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.failure_rate) {
            thread::sleep(timeout.min(burst));
            return Err(AcquisitionError::AcquisitionTimeout { timeout });
        }
        thread::sleep(burst);
        self.phase += 0.05;
        let flux = self.base_flux + 5.0 * self.phase.sin();
        let mut data = Array2::zeros((self.channels, samples_per_channel));
        for ((ch, _), value) in data.indexed_iter_mut() {
            *value = if ch == 0 {
                (flux + rng.gen_range(-0.5..0.5)) * self.sensitivity
            } else {
                self.base_celsius + ch as f64 * 0.3 + 0.5 * self.phase.cos() + rng.gen_range(-0.05..0.05)
            };
        }
        Ok(data)
    }
    fn stop(&mut self) -> Result<(), AcquisitionError> {
        self.running = false;
        Ok(())
    }
    fn close(&mut self) -> Result<(), AcquisitionError> {
        self.running = false;
        Ok(())
    }
}
/// Call counters shared between a [`ScriptedDevice`] and the code observing it.
#[derive(Debug, Default)]
pub struct DeviceCounters {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub reads: AtomicUsize,
    pub closes: AtomicUsize,
}
impl DeviceCounters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}
/// One scripted response to `read`.
#[derive(Clone, Debug)]
pub enum ScriptedRead {
    Burst(Vec<Vec<f64>>),
    Timeout,
    IoFailure(String),
}
/// In-memory device for tests and deterministic playback.
pub struct ScriptedDevice {
    channels: usize,
    reads: VecDeque<ScriptedRead>,
    fallback: Option<ScriptedRead>,
    reject_setup: Option<String>,
    clock: Option<(ManualClock, Duration)>,
    counters: Arc<DeviceCounters>,
}
impl ScriptedDevice {
    pub fn new(reads: impl IntoIterator<Item = ScriptedRead>) -> Self {
        Self {
            channels: 0,
            reads: reads.into_iter().collect(),
            fallback: None,
            reject_setup: None,
            clock: None,
            counters: Arc::new(DeviceCounters::default()),
        }
    }
    /// Response used once the scripted queue is empty.
    pub fn repeating(mut self, read: ScriptedRead) -> Self {
        self.fallback = Some(read);
        self
    }
    pub fn rejecting_setup(mut self, reason: &str) -> Self {
        self.reject_setup = Some(reason.to_owned());
        self
    }
    /// Every read advances `clock` by `burst`, standing in for the blocking read.
    pub fn advancing(mut self, clock: ManualClock, burst: Duration) -> Self {
        self.clock = Some((clock, burst));
        self
    }
    pub fn counters(&self) -> Arc<DeviceCounters> {
        Arc::clone(&self.counters)
    }
}
impl DaqDevice for ScriptedDevice {
    fn configure_channels(
        &mut self,
        _voltage: &VoltageChannel,
        thermocouples: &ThermocoupleChannels,
    ) -> Result<usize, AcquisitionError> {
        if let Some(reason) = &self.reject_setup {
            return Err(AcquisitionError::DeviceConfiguration(reason.clone()));
        }
        self.channels = 1 + count_thermocouples(thermocouples)?;
        Ok(self.channels)
    }
    fn set_timing(
        &mut self,
        _rate_hz: f64,
        _mode: SampleMode,
        _samples_per_channel: usize,
    ) -> Result<(), AcquisitionError> {
        Ok(())
    }
    fn start(&mut self) -> Result<(), AcquisitionError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn read(
        &mut self,
        _samples_per_channel: usize,
        timeout: Duration,
    ) -> Result<BurstMatrix, AcquisitionError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        if let Some((clock, burst)) = &self.clock {
            clock.advance(*burst);
        }
        let next = self.reads.pop_front().or_else(|| self.fallback.clone());
        match next {
            Some(ScriptedRead::Burst(rows)) => burst_from_rows(rows),
            Some(ScriptedRead::Timeout) => Err(AcquisitionError::AcquisitionTimeout { timeout }),
            Some(ScriptedRead::IoFailure(reason)) => Err(AcquisitionError::DeviceIo(reason)),
            None => Err(AcquisitionError::DeviceIo("script exhausted".into())),
        }
    }
    fn stop(&mut self) -> Result<(), AcquisitionError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn close(&mut self) -> Result<(), AcquisitionError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn channel_ranges_are_expanded() {
        assert_eq!(physical_channel_count("cDAQ1Mod4/ai0").unwrap(), 1);
        assert_eq!(physical_channel_count("cDAQ1Mod2/ai0:5").unwrap(), 6);
        assert_eq!(physical_channel_count("Dev1/ai0, Dev1/ai3:4").unwrap(), 3);
        assert!(physical_channel_count("  ").is_err());
        assert!(physical_channel_count("Dev1/ai0:x").is_err());
    }
    #[test]
    fn nan_failure_rate_never_fails_a_read() {
        let mut device = SimulatedDevice::new(46.7e-6).with_failure_rate(f64::NAN);
        let voltage = VoltageChannel {
            physical: "cDAQ1Mod1/ai0".into(),
            name: "flux".into(),
            min_volts: -5.0,
            max_volts: 5.0,
        };
        let thermocouples = ThermocoupleChannels {
            physical: vec!["cDAQ1Mod4/ai0".into()],
            kind: ThermocoupleType::K,
            min_celsius: 0.0,
            max_celsius: 100.0,
        };
        assert_eq!(device.configure_channels(&voltage, &thermocouples).unwrap(), 2);
        device.set_timing(1000.0, SampleMode::Finite, 2).unwrap();
        device.start().unwrap();
        for _ in 0..5 {
            assert_eq!(device.read(2, Duration::from_secs(1)).unwrap().dim(), (2, 2));
        }
        let device = SimulatedDevice::new(46.7e-6).with_failure_rate(7.0);
        assert_eq!(device.failure_rate, 1.0);
    }
    #[test]
    fn ragged_rows_are_rejected() {
        let err = burst_from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, AcquisitionError::InvalidInput(_)));
        let ok = burst_from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(ok.dim(), (2, 2));
        assert_eq!(ok[[1, 0]], 3.0);
    }
    #[test]
    fn scripted_device_plays_back_then_repeats() {
        let mut device = ScriptedDevice::new(vec![ScriptedRead::Timeout])
            .repeating(ScriptedRead::Burst(vec![vec![1.0]]));
        let timeout = Duration::from_secs(1);
        assert!(matches!(
            device.read(1, timeout),
            Err(AcquisitionError::AcquisitionTimeout { .. })
        ));
        assert_eq!(device.read(1, timeout).unwrap()[[0, 0]], 1.0);
        assert_eq!(device.read(1, timeout).unwrap()[[0, 0]], 1.0);
        assert_eq!(DeviceCounters::get(&device.counters().reads), 3);
    }
}
