use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("device rejected channel setup: {0}")]
    DeviceConfiguration(String),
    #[error("burst read timed out after {timeout:?}")]
    AcquisitionTimeout { timeout: Duration },
    #[error("device I/O failure: {0}")]
    DeviceIo(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to persist sample to {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },
    #[error("failed to render plot: {0}")]
    Plot(String),
    #[error("sample at {next} is not after the previous sample at {previous}")]
    OutOfOrder { previous: String, next: String },
}
impl AcquisitionError {
    /// Setup errors stop the process; everything else is retried on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AcquisitionError::Configuration(_) | AcquisitionError::DeviceConfiguration(_)
        )
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for AcquisitionError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        AcquisitionError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for AcquisitionError {
    fn from(value: image::ImageError) -> Self {
        AcquisitionError::Plot(value.to_string())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn only_setup_errors_are_fatal() {
        assert!(AcquisitionError::Configuration("zero".into()).is_fatal());
        assert!(AcquisitionError::DeviceConfiguration("port".into()).is_fatal());
        assert!(!AcquisitionError::AcquisitionTimeout {
            timeout: Duration::from_secs(10)
        }
        .is_fatal());
        assert!(!AcquisitionError::DeviceIo("unplugged".into()).is_fatal());
        assert!(!AcquisitionError::Persistence {
            path: PathBuf::from("log.csv"),
            reason: "disk full".into()
        }
        .is_fatal());
    }
}
