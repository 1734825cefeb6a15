use std::time::Duration;
use ndarray::Axis;
use crate::config::ChannelConfiguration;
use crate::drivers::device::{BurstMatrix, DaqDevice, SampleMode};
use crate::drivers::AcquisitionError;
/// An opened, configured device. Closes the device exactly once: either via
/// [`AcquisitionHandle::close`] or when dropped.
pub struct AcquisitionHandle<D: DaqDevice> {
    device: D,
    channels: usize,
    closed: bool,
}
impl<D: DaqDevice> AcquisitionHandle<D> {
    pub fn channels(&self) -> usize {
        self.channels
    }
    pub fn close(mut self) -> Result<(), AcquisitionError> {
        self.release()
    }
    fn release(&mut self) -> Result<(), AcquisitionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        log::debug!("closing acquisition device");
        self.device.close()
    }
}
impl<D: DaqDevice> Drop for AcquisitionHandle<D> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("device close failed: {err}");
        }
    }
}
/// Burst reads against a configured device, reduced to one value per channel.
pub struct SampleAcquirer;
impl SampleAcquirer {
    /// Configures the voltage and thermocouple channels plus finite timing.
    /// The device is closed again if any setup step fails.
    pub fn open<D: DaqDevice>(
        config: &ChannelConfiguration,
        device: D,
    ) -> Result<AcquisitionHandle<D>, AcquisitionError> {
        let mut handle = AcquisitionHandle {
            device,
            channels: 0,
            closed: false,
        };
        let channels = handle
            .device
            .configure_channels(&config.voltage(), &config.thermocouples())?;
        let expected = 1 + config.sensor_names.len();
        if channels != expected {
            return Err(AcquisitionError::DeviceConfiguration(format!(
                "device reports {channels} channels but {expected} are configured (1 flux + {} sensors)",
                config.sensor_names.len()
            )));
        }
        handle
            .device
            .set_timing(config.sample_rate_hz, SampleMode::Finite, config.burst_size)?;
        handle.channels = channels;
        log::debug!(
            "acquisition configured: {channels} channels, {} samples at {} Hz",
            config.burst_size,
            config.sample_rate_hz
        );
        Ok(handle)
    }
    /// One finite acquisition of `n_samples` per channel. The task is stopped
    /// again whether or not the read succeeded.
    pub fn read_burst<D: DaqDevice>(
        handle: &mut AcquisitionHandle<D>,
        n_samples: usize,
        timeout: Duration,
    ) -> Result<BurstMatrix, AcquisitionError> {
        if handle.closed {
            return Err(AcquisitionError::DeviceIo("device already closed".into()));
        }
        handle.device.start()?;
        let read = handle.device.read(n_samples, timeout);
        let stopped = handle.device.stop();
        let burst = read?;
        stopped?;
        if burst.nrows() != handle.channels {
            return Err(AcquisitionError::DeviceIo(format!(
                "burst has {} channels, expected {}",
                burst.nrows(),
                handle.channels
            )));
        }
        Ok(burst)
    }
    /// Arithmetic mean of each channel row.
    pub fn average(burst: &BurstMatrix) -> Result<Vec<f64>, AcquisitionError> {
        if burst.nrows() == 0 {
            return Err(AcquisitionError::InvalidInput("burst has no channels".into()));
        }
        let means = burst
            .mean_axis(Axis(1))
            .ok_or_else(|| AcquisitionError::InvalidInput("burst channels are empty".into()))?;
        Ok(means.to_vec())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::device::{burst_from_rows, DeviceCounters, ScriptedDevice, ScriptedRead};
    use ndarray::Array2;
    fn config() -> ChannelConfiguration {
        ChannelConfiguration {
            sensitivity: 50e-6,
            ..ChannelConfiguration::default()
        }
    }
    #[test]
    fn average_is_the_row_mean() {
        let burst = burst_from_rows(vec![vec![0.001, 0.0011, 0.0009], vec![20.0, 22.0, 24.0]]).unwrap();
        let avg = SampleAcquirer::average(&burst).unwrap();
        assert_eq!(avg.len(), 2);
        assert!((avg[0] - 0.001).abs() < 1e-12);
        assert!((avg[1] - 22.0).abs() < 1e-12);
    }
    #[test]
    fn single_sample_bursts_average_to_themselves() {
        let burst = burst_from_rows(vec![vec![1.5], vec![-2.0], vec![7.25]]).unwrap();
        assert_eq!(SampleAcquirer::average(&burst).unwrap(), vec![1.5, -2.0, 7.25]);
    }
    #[test]
    fn empty_rows_are_invalid_input() {
        let empty: BurstMatrix = Array2::zeros((2, 0));
        assert!(matches!(
            SampleAcquirer::average(&empty),
            Err(AcquisitionError::InvalidInput(_))
        ));
        let none: BurstMatrix = Array2::zeros((0, 3));
        assert!(matches!(
            SampleAcquirer::average(&none),
            Err(AcquisitionError::InvalidInput(_))
        ));
    }
    #[test]
    fn read_burst_stops_even_when_the_read_fails() {
        let device = ScriptedDevice::new(vec![
            ScriptedRead::Timeout,
            ScriptedRead::Burst(vec![vec![0.001; 4], vec![21.0; 4]]),
        ]);
        let counters = device.counters();
        let mut handle = SampleAcquirer::open(&config(), device).unwrap();
        let timeout = Duration::from_secs(10);
        assert!(matches!(
            SampleAcquirer::read_burst(&mut handle, 4, timeout),
            Err(AcquisitionError::AcquisitionTimeout { .. })
        ));
        let burst = SampleAcquirer::read_burst(&mut handle, 4, timeout).unwrap();
        assert_eq!(burst.dim(), (2, 4));
        assert_eq!(DeviceCounters::get(&counters.starts), 2);
        assert_eq!(DeviceCounters::get(&counters.stops), 2);
    }
    #[test]
    fn channel_count_mismatch_is_a_setup_error() {
        let mut cfg = config();
        cfg.thermocouple_channels = vec!["cDAQ1Mod2/ai0:5".into()];
        let device = ScriptedDevice::new(Vec::new());
        let counters = device.counters();
        let err = SampleAcquirer::open(&cfg, device).err().unwrap();
        assert!(matches!(err, AcquisitionError::DeviceConfiguration(_)));
        assert_eq!(DeviceCounters::get(&counters.closes), 1);
    }
    #[test]
    fn rejected_setup_is_fatal() {
        let device = ScriptedDevice::new(Vec::new()).rejecting_setup("no such port");
        let err = SampleAcquirer::open(&config(), device).err().unwrap();
        assert!(err.is_fatal());
    }
    #[test]
    fn close_runs_once() {
        let device = ScriptedDevice::new(Vec::new());
        let counters = device.counters();
        let handle = SampleAcquirer::open(&config(), device).unwrap();
        handle.close().unwrap();
        assert_eq!(DeviceCounters::get(&counters.closes), 1);
        let device = ScriptedDevice::new(Vec::new());
        let counters = device.counters();
        drop(SampleAcquirer::open(&config(), device).unwrap());
        assert_eq!(DeviceCounters::get(&counters.closes), 1);
    }
}
