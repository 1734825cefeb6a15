// src/engine.rs
use std::thread::{self, JoinHandle};
use crate::config::{DeviceKind, Settings};
use crate::drivers::{
    AcquisitionError, AcquisitionScheduler, DaqDevice, NiDaqmxDevice, RunSummary, SimulatedDevice,
    SystemClock,
};
use crate::recorder::{LogSettings, PersistentLogger};
use crate::types::{LiveView, ViewEvent};

/// Everything the acquisition thread needs, fixed at startup.
pub struct EngineSetup {
    pub settings: Settings,
    pub log: LogSettings,
    /// Probability of an injected timeout per burst on the simulated device.
    pub simulated_failure_rate: f64,
}

fn open_device(setup: &EngineSetup) -> Result<Box<dyn DaqDevice>, AcquisitionError> {
    match setup.settings.device {
        DeviceKind::NiDaqmx => Ok(Box::new(NiDaqmxDevice::connect()?)),
        DeviceKind::Simulated => Ok(Box::new(
            SimulatedDevice::new(setup.settings.channels.sensitivity)
                .with_failure_rate(setup.simulated_failure_rate),
        )),
    }
}

/// Runs the acquisition loop on its own thread so a slow window never delays
/// a burst. The device is created on that thread and never leaves it.
pub fn spawn_thread<V>(setup: EngineSetup, mut view: V) -> JoinHandle<Result<RunSummary, AcquisitionError>>
where
    V: LiveView + Send + 'static,
{
    thread::spawn(move || {
        // 1. 打开设备
        let device = match open_device(&setup) {
            Ok(device) => device,
            Err(err) => {
                log::error!("cannot open device: {err}");
                view.report(ViewEvent::Fatal(err.to_string()));
                return Err(err);
            }
        };

        // 2. 日志文件 (延迟打开，写失败不会中断采集)
        let logger = PersistentLogger::new(setup.log);

        // 3. 调度循环
        let scheduler = AcquisitionScheduler::start(
            setup.settings.channels,
            device,
            logger,
            view,
            SystemClock::new(),
        )
        .map_err(|err| {
            log::error!("acquisition setup failed: {err}");
            err
        })?;
        let summary = scheduler.run();
        log::info!(
            "{} samples, {} skipped bursts, {} rows unsaved, log at {}",
            summary.samples,
            summary.failures,
            summary.pending_rows,
            summary.log_path.display()
        );
        Ok(summary)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogConfig, Settings};
    use crate::drivers::HistoryView;
    use crate::types::StopSignal;
    use std::sync::mpsc::{channel, Sender};

    struct StopAfter {
        stop: StopSignal,
        after: usize,
        tx: Sender<usize>,
    }

    impl LiveView for StopAfter {
        fn is_closed(&self) -> bool {
            self.stop.is_requested()
        }
        fn refresh(&mut self, history: &HistoryView) {
            self.tx.send(history.len()).ok();
            if history.len() >= self.after {
                self.stop.request();
            }
        }
    }

    #[test]
    fn simulated_run_logs_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings { device: DeviceKind::Simulated, ..Settings::default() };
        settings.channels.sample_rate_hz = 1000.0;
        settings.channels.burst_size = 5;
        settings.channels.logging_interval_secs = 0.02;
        settings.channels.tick_ms = 5;
        let path = dir.path().join("sim.csv");
        let log = LogSettings::new(&LogConfig::default(), path.clone(), settings.channels.sensor_names.clone());
        let (tx, rx) = channel();
        let view = StopAfter { stop: StopSignal::new(), after: 3, tx };
        let summary = spawn_thread(
            EngineSetup { settings, log, simulated_failure_rate: 0.0 },
            view,
        )
        .join()
        .unwrap()
        .unwrap();
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.pending_rows, 0);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn invalid_settings_end_the_thread_with_a_fatal_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings { device: DeviceKind::Simulated, ..Settings::default() };
        settings.channels.sensitivity = 0.0;
        let log = LogSettings::new(&LogConfig::default(), dir.path().join("x.csv"), vec!["Window".into()]);
        let (tx, _rx) = channel();
        let view = StopAfter { stop: StopSignal::new(), after: 1, tx };
        let err = spawn_thread(EngineSetup { settings, log, simulated_failure_rate: 0.0 }, view)
            .join()
            .unwrap()
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
