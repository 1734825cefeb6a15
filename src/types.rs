// src/types.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Local};
use crate::drivers::HistoryView;

/// One accepted measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    /// W/m²
    pub heat_flux: f64,
    /// °C, one per configured thermocouple sensor
    pub temperatures: Vec<f64>,
}

// 停止信号：窗口关闭或 Ctrl+C 都会置位
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// 调度器报告给界面的事件
#[derive(Clone, Debug, PartialEq)]
pub enum ViewEvent {
    /// Setup failed; the loop never started.
    Fatal(String),
    AcquisitionFailed(String),
    PersistenceFailed(String),
    Stopped { samples: usize },
}

/// Display side of the acquisition loop. The scheduler only ever hands it a
/// read-only [`HistoryView`].
pub trait LiveView {
    /// `true` once the operator has asked the loop to end.
    fn is_closed(&self) -> bool;
    /// Called after every accepted sample. Must stay cheap: it runs on the
    /// acquisition thread between ticks.
    fn refresh(&mut self, history: &HistoryView);
    fn report(&mut self, _event: ViewEvent) {}
}

// 后台发给 GUI 的消息
#[derive(Clone, Debug)]
pub enum EngineMessage {
    Log(String),
    /// Carries a handle onto the history so the window can pull new points.
    SampleAccepted { count: usize, history: HistoryView },
    AcquisitionFailed(String),
    Fatal(String),
    Stopped { samples: usize },
}
