use std::path::PathBuf;
use std::time::Duration;
use chrono::TimeDelta;
use crate::config::ChannelConfiguration;
use crate::drivers::acquirer::{AcquisitionHandle, SampleAcquirer};
use crate::drivers::clock::Clock;
use crate::drivers::convert::{convert_flux, convert_temperature};
use crate::drivers::device::DaqDevice;
use crate::drivers::history::{HistoryStore, HistoryView};
use crate::drivers::AcquisitionError;
use crate::recorder::PersistentLogger;
use crate::types::{LiveView, Sample, ViewEvent};
/// Scheduler phases. `Acquiring`, `Accepted` and `Failed` are passed through
/// within a single tick; `tick` reports the one the tick ended in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Acquiring,
    Accepted,
    Failed,
    Stopped,
}
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AcquisitionState {
    /// Monotonic instant of the tick that opened the gate for the last
    /// accepted sample.
    pub last_sample_time: Option<Duration>,
    pub running: bool,
    pub sample_count: usize,
}
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub samples: usize,
    pub failures: usize,
    pub pending_rows: usize,
    pub log_path: PathBuf,
}
/// Fixed-interval acquisition loop. Sole owner of the device handle, the
/// history writer and the log.
pub struct AcquisitionScheduler<D: DaqDevice, V: LiveView, C: Clock> {
    config: ChannelConfiguration,
    handle: Option<AcquisitionHandle<D>>,
    history: HistoryStore,
    logger: PersistentLogger,
    view: V,
    clock: C,
    state: AcquisitionState,
    phase: SchedulerState,
    failures: usize,
}
impl<D: DaqDevice, V: LiveView, C: Clock> AcquisitionScheduler<D, V, C> {
    /// Validates the configuration and opens the device. Any error here is a
    /// setup error and the loop never starts.
    pub fn start(
        config: ChannelConfiguration,
        device: D,
        logger: PersistentLogger,
        mut view: V,
        clock: C,
    ) -> Result<Self, AcquisitionError> {
        let opened = config
            .validate()
            .and_then(|()| SampleAcquirer::open(&config, device));
        let handle = match opened {
            Ok(handle) => handle,
            Err(err) => {
                view.report(ViewEvent::Fatal(err.to_string()));
                return Err(err);
            }
        };
        log::info!(
            "acquisition started: every {:?}, {} samples @ {} Hz per point",
            config.logging_interval(),
            config.burst_size,
            config.sample_rate_hz
        );
        Ok(Self {
            config,
            handle: Some(handle),
            history: HistoryStore::new(),
            logger,
            view,
            clock,
            state: AcquisitionState {
                running: true,
                ..AcquisitionState::default()
            },
            phase: SchedulerState::Idle,
            failures: 0,
        })
    }
    pub fn state(&self) -> &AcquisitionState {
        &self.state
    }
    pub fn phase(&self) -> SchedulerState {
        self.phase
    }
    pub fn history(&self) -> HistoryView {
        self.history.view()
    }
    pub fn view(&self) -> &V {
        &self.view
    }
    pub fn logger(&self) -> &PersistentLogger {
        &self.logger
    }
    pub fn failures(&self) -> usize {
        self.failures
    }
    /// Runs ticks until the view asks to stop.
    pub fn run(mut self) -> RunSummary {
        let period = self.config.tick_period();
        while self.tick() != SchedulerState::Stopped {
            self.clock.sleep(period);
        }
        self.summary()
    }
    /// One idle tick: checks the stop signal, then takes a sample if one is due.
    pub fn tick(&mut self) -> SchedulerState {
        if self.phase == SchedulerState::Stopped {
            return SchedulerState::Stopped;
        }
        if self.view.is_closed() {
            self.stop();
            return SchedulerState::Stopped;
        }
        let now = self.clock.elapsed();
        if !self.is_due(now) {
            return SchedulerState::Idle;
        }
        self.phase = SchedulerState::Acquiring;
        let outcome = match self.acquire() {
            Ok(sample) => self.accept(sample, now),
            Err(err) => {
                self.fail(err);
                SchedulerState::Failed
            }
        };
        self.phase = SchedulerState::Idle;
        outcome
    }
    /// Closes the device and flushes the log. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.phase == SchedulerState::Stopped {
            return;
        }
        self.phase = SchedulerState::Stopped;
        self.state.running = false;
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.close() {
                log::warn!("device close failed: {err}");
            }
        }
        if let Err(err) = self.logger.flush() {
            log::error!(
                "{} rows could not be written to {}: {err}",
                self.logger.pending(),
                self.logger.path().display()
            );
            self.view.report(ViewEvent::PersistenceFailed(err.to_string()));
        }
        log::info!("acquisition stopped after {} samples", self.state.sample_count);
        self.view.report(ViewEvent::Stopped {
            samples: self.state.sample_count,
        });
    }
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            samples: self.state.sample_count,
            failures: self.failures,
            pending_rows: self.logger.pending(),
            log_path: self.logger.path().to_path_buf(),
        }
    }
    /// No catch-up: however late the tick, at most one sample is due.
    fn is_due(&self, now: Duration) -> bool {
        match self.state.last_sample_time {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.config.logging_interval(),
        }
    }
    fn acquire(&mut self) -> Result<Sample, AcquisitionError> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| AcquisitionError::DeviceIo("device is closed".into()))?;
        let burst = SampleAcquirer::read_burst(
            handle,
            self.config.burst_size,
            self.config.read_timeout(),
        )?;
        let means = SampleAcquirer::average(&burst)?;
        let Some((&voltage, temperatures)) = means.split_first() else {
            return Err(AcquisitionError::InvalidInput("burst has no channels".into()));
        };
        if temperatures.len() != self.config.sensor_names.len() {
            return Err(AcquisitionError::InvalidInput(format!(
                "{} thermocouple readings for {} sensors",
                temperatures.len(),
                self.config.sensor_names.len()
            )));
        }
        let heat_flux = convert_flux(voltage, self.config.sensitivity)?;
        let mut timestamp = self.clock.wall();
        if let Some(previous) = self.history.view().last() {
            if timestamp <= previous.timestamp {
                timestamp = previous.timestamp + TimeDelta::microseconds(1);
            }
        }
        Ok(Sample {
            timestamp,
            heat_flux,
            temperatures: temperatures.iter().copied().map(convert_temperature).collect(),
        })
    }
    fn accept(&mut self, sample: Sample, gate: Duration) -> SchedulerState {
        self.phase = SchedulerState::Accepted;
        let count = match self.history.append(sample.clone()) {
            Ok(count) => count,
            Err(err) => {
                self.fail(err);
                return SchedulerState::Failed;
            }
        };
        self.state.sample_count = count;
        self.state.last_sample_time = Some(gate);
        log::info!(
            "[{}] Point #{count} captured: {:.2} W/m², {:?} °C",
            sample.timestamp.format("%m-%d %H:%M:%S"),
            sample.heat_flux,
            sample.temperatures
        );
        if let Err(err) = self.logger.append(&sample) {
            log::error!(
                "{err}; {} rows kept in memory for retry",
                self.logger.pending()
            );
            self.view.report(ViewEvent::PersistenceFailed(err.to_string()));
        }
        self.view.refresh(&self.history.view());
        SchedulerState::Accepted
    }
    fn fail(&mut self, err: AcquisitionError) {
        self.phase = SchedulerState::Failed;
        self.failures += 1;
        log::warn!("sample skipped, retrying on next tick: {err}");
        self.view.report(ViewEvent::AcquisitionFailed(err.to_string()));
    }
}
impl<D: DaqDevice, V: LiveView, C: Clock> Drop for AcquisitionScheduler<D, V, C> {
    fn drop(&mut self) {
        self.stop();
    }
}
