// src/visualizer.rs
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use eframe::egui;
use once_cell::sync::OnceCell;
use crate::drivers::{render_history_png, HistoryView, PlotStyle};
use crate::types::{EngineMessage, LiveView, StopSignal, ViewEvent};

/// Engine-side half of the GUI: forwards scheduler events to the window over
/// a channel and wakes its event loop. The window reads samples straight from
/// the shared history.
pub struct ChannelView {
    tx: Sender<EngineMessage>,
    stop: StopSignal,
    // 界面创建后才有 egui Context
    repaint: Arc<OnceCell<egui::Context>>,
}

impl ChannelView {
    pub fn new(
        tx: Sender<EngineMessage>,
        stop: StopSignal,
        repaint: Arc<OnceCell<egui::Context>>,
    ) -> Self {
        Self { tx, stop, repaint }
    }

    fn send(&self, msg: EngineMessage) {
        // the window may already be gone during shutdown
        self.tx.send(msg).ok();
        if let Some(ctx) = self.repaint.get() {
            ctx.request_repaint();
        }
    }
}

impl LiveView for ChannelView {
    fn is_closed(&self) -> bool {
        self.stop.is_requested()
    }

    fn refresh(&mut self, history: &HistoryView) {
        self.send(EngineMessage::SampleAccepted {
            count: history.len(),
            history: history.clone(),
        });
    }

    fn report(&mut self, event: ViewEvent) {
        let msg = match event {
            ViewEvent::Fatal(e) => EngineMessage::Fatal(e),
            ViewEvent::AcquisitionFailed(e) => EngineMessage::AcquisitionFailed(e),
            ViewEvent::PersistenceFailed(e) => EngineMessage::Log(format!("⚠ log write failed: {e}")),
            ViewEvent::Stopped { samples } => EngineMessage::Stopped { samples },
        };
        self.send(msg);
    }
}

/// Headless view: re-renders a two-panel PNG after every accepted sample.
pub struct SnapshotView {
    stop: StopSignal,
    path: Option<PathBuf>,
    sensor_names: Vec<String>,
    style: PlotStyle,
}

impl SnapshotView {
    pub fn new(stop: StopSignal, path: Option<PathBuf>, sensor_names: Vec<String>) -> Self {
        Self { stop, path, sensor_names, style: PlotStyle::default() }
    }
}

impl LiveView for SnapshotView {
    fn is_closed(&self) -> bool {
        self.stop.is_requested()
    }

    fn refresh(&mut self, history: &HistoryView) {
        let Some(path) = &self.path else { return };
        let written = render_history_png(&history.snapshot(), &self.sensor_names, &self.style)
            .and_then(|png| {
                fs::write(path, png).map_err(|e| crate::drivers::AcquisitionError::Plot(e.to_string()))
            });
        if let Err(err) = written {
            log::warn!("snapshot {} not updated: {err}", path.display());
        }
    }

    fn report(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::Stopped { samples } => println!("Stopped. {samples} points captured."),
            ViewEvent::Fatal(e) => eprintln!("Acquisition could not start: {e}"),
            ViewEvent::AcquisitionFailed(_) | ViewEvent::PersistenceFailed(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::HistoryStore;
    use std::sync::mpsc::channel;

    #[test]
    fn channel_view_forwards_events_and_stop() {
        let (tx, rx) = channel();
        let stop = StopSignal::new();
        let mut view = ChannelView::new(tx, stop.clone(), Arc::new(OnceCell::new()));
        assert!(!view.is_closed());
        view.refresh(&HistoryStore::new().view());
        view.report(ViewEvent::AcquisitionFailed("timeout".into()));
        view.report(ViewEvent::Stopped { samples: 3 });
        stop.request();
        assert!(view.is_closed());
        let msgs: Vec<EngineMessage> = rx.try_iter().collect();
        assert!(matches!(msgs[0], EngineMessage::SampleAccepted { count: 0, .. }));
        assert!(matches!(msgs[1], EngineMessage::AcquisitionFailed(_)));
        assert!(matches!(msgs[2], EngineMessage::Stopped { samples: 3 }));
    }

    #[test]
    fn snapshot_view_without_a_path_does_nothing() {
        let mut view = SnapshotView::new(StopSignal::new(), None, vec!["Window".into()]);
        view.refresh(&HistoryStore::new().view());
        assert!(!view.is_closed());
    }
}
