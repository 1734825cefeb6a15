// src/drivers/mod.rs
pub mod acquirer;
pub mod clock;
pub mod convert;
pub mod device;
pub mod error;
pub mod history;
pub mod nidaqmx;
pub mod plot;
pub mod scheduler;
// 公开导出常用类型，方便外部调用
pub use acquirer::{AcquisitionHandle, SampleAcquirer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use convert::{convert_flux, convert_temperature};
pub use device::{
    BurstMatrix, DaqDevice, SampleMode, ScriptedDevice, ScriptedRead, SimulatedDevice,
    ThermocoupleType,
};
pub use error::AcquisitionError;
pub use history::{HistoryStore, HistoryView};
pub use nidaqmx::NiDaqmxDevice;
pub use plot::{render_history_png, PlotStyle};
pub use scheduler::{AcquisitionScheduler, AcquisitionState, RunSummary, SchedulerState};
