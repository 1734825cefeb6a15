use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_double};
use std::ptr;
use std::time::Duration;
use anyhow::{Context, Result};
use libloading::Library;
use ndarray::Array2;
use once_cell::sync::OnceCell;
use crate::drivers::device::{
    BurstMatrix, DaqDevice, SampleMode, ThermocoupleChannels, ThermocoupleType, VoltageChannel,
};
use crate::drivers::AcquisitionError;
#[cfg(windows)]
const LIBRARY_NAME: &str = "nicaiu.dll";
#[cfg(not(windows))]
const LIBRARY_NAME: &str = "libnidaqmx.so";
type TaskHandle = *mut c_void;
// Constants from NIDAQmx.h
const VAL_CFG_DEFAULT: i32 = -1;
const VAL_VOLTS: i32 = 10348;
const VAL_DEG_C: i32 = 10143;
const VAL_BUILT_IN: i32 = 10200;
const VAL_RISING: i32 = 10280;
const VAL_FINITE_SAMPS: i32 = 10178;
const VAL_CONT_SAMPS: i32 = 10123;
const VAL_GROUP_BY_CHANNEL: u32 = 0;
const ERROR_SAMPLES_NOT_YET_AVAILABLE: i32 = -200284;
const ERROR_OPERATION_TIMED_OUT: i32 = -200474;
fn thermocouple_code(kind: ThermocoupleType) -> i32 {
    match kind {
        ThermocoupleType::B => 10047,
        ThermocoupleType::E => 10055,
        ThermocoupleType::J => 10072,
        ThermocoupleType::K => 10073,
        ThermocoupleType::N => 10077,
        ThermocoupleType::R => 10082,
        ThermocoupleType::S => 10085,
        ThermocoupleType::T => 10086,
    }
}
struct DaqmxApi {
    #[allow(dead_code)]
    lib: Library,
    create_task: unsafe extern "C" fn(*const c_char, *mut TaskHandle) -> i32,
    create_ai_voltage_chan: unsafe extern "C" fn(
        TaskHandle,
        *const c_char,
        *const c_char,
        i32,
        c_double,
        c_double,
        i32,
        *const c_char,
    ) -> i32,
    create_ai_thrmcpl_chan: unsafe extern "C" fn(
        TaskHandle,
        *const c_char,
        *const c_char,
        c_double,
        c_double,
        i32,
        i32,
        i32,
        c_double,
        *const c_char,
    ) -> i32,
    cfg_samp_clk_timing:
        unsafe extern "C" fn(TaskHandle, *const c_char, c_double, i32, i32, u64) -> i32,
    get_task_num_chans: unsafe extern "C" fn(TaskHandle, *mut u32) -> i32,
    start_task: unsafe extern "C" fn(TaskHandle) -> i32,
    stop_task: unsafe extern "C" fn(TaskHandle) -> i32,
    clear_task: unsafe extern "C" fn(TaskHandle) -> i32,
    read_analog_f64: unsafe extern "C" fn(
        TaskHandle,
        i32,
        c_double,
        u32,
        *mut c_double,
        u32,
        *mut i32,
        *mut u32,
    ) -> i32,
    get_extended_error_info: unsafe extern "C" fn(*mut c_char, u32) -> i32,
}
impl DaqmxApi {
    fn load() -> Result<Self> {
        let lib = unsafe { Library::new(LIBRARY_NAME) }
            .with_context(|| format!("{LIBRARY_NAME} not found; is NI-DAQmx installed?"))?;
        // Safety: signatures follow NIDAQmx.h.
        unsafe {
            Ok(Self {
                create_task: *lib.get(b"DAQmxCreateTask\0")?,
                create_ai_voltage_chan: *lib.get(b"DAQmxCreateAIVoltageChan\0")?,
                create_ai_thrmcpl_chan: *lib.get(b"DAQmxCreateAIThrmcplChan\0")?,
                cfg_samp_clk_timing: *lib.get(b"DAQmxCfgSampClkTiming\0")?,
                get_task_num_chans: *lib.get(b"DAQmxGetTaskNumChans\0")?,
                start_task: *lib.get(b"DAQmxStartTask\0")?,
                stop_task: *lib.get(b"DAQmxStopTask\0")?,
                clear_task: *lib.get(b"DAQmxClearTask\0")?,
                read_analog_f64: *lib.get(b"DAQmxReadAnalogF64\0")?,
                get_extended_error_info: *lib.get(b"DAQmxGetExtendedErrorInfo\0")?,
                lib,
            })
        }
    }
    fn instance() -> Result<&'static DaqmxApi> {
        static API: OnceCell<DaqmxApi> = OnceCell::new();
        API.get_or_try_init(Self::load)
    }
    fn error_message(&self, code: i32) -> String {
        let mut buf = vec![0 as c_char; 2048];
        let status = unsafe { (self.get_extended_error_info)(buf.as_mut_ptr(), buf.len() as u32) };
        if status != 0 {
            return format!("DAQmx error {code}");
        }
        let bytes: Vec<u8> = buf.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
        format!("DAQmx error {code}: {}", String::from_utf8_lossy(&bytes).trim())
    }
    /// Negative codes are errors; positive codes are warnings and only logged.
    fn check(
        &self,
        code: i32,
        ctx: &str,
        wrap: impl FnOnce(String) -> AcquisitionError,
    ) -> Result<(), AcquisitionError> {
        if code < 0 {
            return Err(wrap(format!("{ctx}: {}", self.error_message(code))));
        }
        if code > 0 {
            log::warn!("{ctx}: DAQmx warning {code}");
        }
        Ok(())
    }
}
fn c_string(value: &str) -> Result<CString, AcquisitionError> {
    CString::new(value)
        .map_err(|_| AcquisitionError::DeviceConfiguration(format!("invalid channel name {value:?}")))
}
/// NI-DAQmx task holding the flux voltage channel and the thermocouple
/// channel(s), loaded at runtime from the vendor driver library.
pub struct NiDaqmxDevice {
    api: &'static DaqmxApi,
    task: TaskHandle,
    channels: usize,
    running: bool,
}
impl NiDaqmxDevice {
    pub fn connect() -> Result<Self, AcquisitionError> {
        let api = DaqmxApi::instance()
            .map_err(|e| AcquisitionError::DeviceConfiguration(format!("{e:#}")))?;
        let mut task: TaskHandle = ptr::null_mut();
        let name = c_string("")?;
        let code = unsafe { (api.create_task)(name.as_ptr(), &mut task as *mut TaskHandle) };
        api.check(code, "DAQmxCreateTask", AcquisitionError::DeviceConfiguration)?;
        log::debug!("DAQmx task created");
        Ok(Self {
            api,
            task,
            channels: 0,
            running: false,
        })
    }
    fn ensure_open(&self) -> Result<(), AcquisitionError> {
        if self.task.is_null() {
            return Err(AcquisitionError::DeviceIo("DAQmx task already cleared".into()));
        }
        Ok(())
    }
}
impl DaqDevice for NiDaqmxDevice {
    fn configure_channels(
        &mut self,
        voltage: &VoltageChannel,
        thermocouples: &ThermocoupleChannels,
    ) -> Result<usize, AcquisitionError> {
        self.ensure_open()?;
        let physical = c_string(&voltage.physical)?;
        let name = c_string(&voltage.name)?;
        let code = unsafe {
            (self.api.create_ai_voltage_chan)(
                self.task,
                physical.as_ptr(),
                name.as_ptr(),
                VAL_CFG_DEFAULT,
                voltage.min_volts,
                voltage.max_volts,
                VAL_VOLTS,
                ptr::null(),
            )
        };
        self.api.check(code, "DAQmxCreateAIVoltageChan", AcquisitionError::DeviceConfiguration)?;
        for spec in &thermocouples.physical {
            let physical = c_string(spec)?;
            let code = unsafe {
                (self.api.create_ai_thrmcpl_chan)(
                    self.task,
                    physical.as_ptr(),
                    ptr::null(),
                    thermocouples.min_celsius,
                    thermocouples.max_celsius,
                    VAL_DEG_C,
                    thermocouple_code(thermocouples.kind),
                    VAL_BUILT_IN,
                    0.0,
                    ptr::null(),
                )
            };
            self.api.check(code, "DAQmxCreateAIThrmcplChan", AcquisitionError::DeviceConfiguration)?;
        }
        let mut count: u32 = 0;
        let code = unsafe { (self.api.get_task_num_chans)(self.task, &mut count as *mut u32) };
        self.api.check(code, "DAQmxGetTaskNumChans", AcquisitionError::DeviceConfiguration)?;
        self.channels = count as usize;
        Ok(self.channels)
    }
    fn set_timing(
        &mut self,
        rate_hz: f64,
        mode: SampleMode,
        samples_per_channel: usize,
    ) -> Result<(), AcquisitionError> {
        self.ensure_open()?;
        let mode = match mode {
            SampleMode::Finite => VAL_FINITE_SAMPS,
            SampleMode::Continuous => VAL_CONT_SAMPS,
        };
        let code = unsafe {
            (self.api.cfg_samp_clk_timing)(
                self.task,
                ptr::null(),
                rate_hz,
                VAL_RISING,
                mode,
                samples_per_channel as u64,
            )
        };
        self.api.check(code, "DAQmxCfgSampClkTiming", AcquisitionError::DeviceConfiguration)
    }
    fn start(&mut self) -> Result<(), AcquisitionError> {
        self.ensure_open()?;
        let code = unsafe { (self.api.start_task)(self.task) };
        self.api.check(code, "DAQmxStartTask", AcquisitionError::DeviceIo)?;
        self.running = true;
        Ok(())
    }
    fn read(
        &mut self,
        samples_per_channel: usize,
        timeout: Duration,
    ) -> Result<BurstMatrix, AcquisitionError> {
        self.ensure_open()?;
        let mut buf = vec![0.0f64; samples_per_channel * self.channels];
        let mut read: i32 = 0;
        let code = unsafe {
            (self.api.read_analog_f64)(
                self.task,
                samples_per_channel as i32,
                timeout.as_secs_f64(),
                VAL_GROUP_BY_CHANNEL,
                buf.as_mut_ptr(),
                buf.len() as u32,
                &mut read as *mut i32,
                ptr::null_mut(),
            )
        };
        if code == ERROR_SAMPLES_NOT_YET_AVAILABLE || code == ERROR_OPERATION_TIMED_OUT {
            return Err(AcquisitionError::AcquisitionTimeout { timeout });
        }
        self.api.check(code, "DAQmxReadAnalogF64", AcquisitionError::DeviceIo)?;
        if read as usize != samples_per_channel {
            return Err(AcquisitionError::DeviceIo(format!(
                "read {read} samples per channel, requested {samples_per_channel}"
            )));
        }
        Array2::from_shape_vec((self.channels, samples_per_channel), buf)
            .map_err(|e| AcquisitionError::DeviceIo(e.to_string()))
    }
    fn stop(&mut self) -> Result<(), AcquisitionError> {
        if self.task.is_null() || !self.running {
            return Ok(());
        }
        let code = unsafe { (self.api.stop_task)(self.task) };
        self.running = false;
        self.api.check(code, "DAQmxStopTask", AcquisitionError::DeviceIo)
    }
    fn close(&mut self) -> Result<(), AcquisitionError> {
        if self.task.is_null() {
            return Ok(());
        }
        let code = unsafe { (self.api.clear_task)(self.task) };
        self.task = ptr::null_mut();
        self.running = false;
        log::debug!("DAQmx task cleared");
        self.api.check(code, "DAQmxClearTask", AcquisitionError::DeviceIo)
    }
}
impl Drop for NiDaqmxDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
