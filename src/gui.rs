// src/gui.rs
use std::sync::mpsc::Receiver;
use std::time::Duration;
use chrono::{DateTime, Local};
use eframe::egui;
use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotPoints};
use crate::drivers::HistoryView;
use crate::types::{EngineMessage, Sample, StopSignal};

const SENSOR_COLORS: [Color32; 6] = [
    Color32::from_rgb(255, 80, 80),
    Color32::from_rgb(80, 220, 120),
    Color32::from_rgb(255, 0, 255),
    Color32::from_rgb(0, 255, 255),
    Color32::YELLOW,
    Color32::WHITE,
];

pub struct FluxMonitorApp {
    // 历史数据 (只读)
    history: Option<HistoryView>,
    cursor: usize,
    started: Option<DateTime<Local>>,
    flux_points: Vec<[f64; 2]>,
    temp_points: Vec<Vec<[f64; 2]>>,
    sensor_names: Vec<String>,
    latest: Option<Sample>,

    // 状态
    status: String,
    skipped: usize,
    stopped: bool,
    log_messages: Vec<String>,

    // 通讯管道
    rx: Receiver<EngineMessage>,
    stop: StopSignal,
}

impl FluxMonitorApp {
    pub fn new(
        rx: Receiver<EngineMessage>,
        stop: StopSignal,
        sensor_names: Vec<String>,
        log_path: String,
    ) -> Self {
        Self {
            history: None,
            cursor: 0,
            started: None,
            flux_points: Vec::new(),
            temp_points: vec![Vec::new(); sensor_names.len()],
            sensor_names,
            latest: None,
            status: "Waiting for first sample...".to_owned(),
            skipped: 0,
            stopped: false,
            log_messages: vec![format!("Logging to {log_path}")],
            rx,
            stop,
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > 12 {
            self.log_messages.remove(0);
        }
    }

    // 只拉取上次之后新增的样本
    fn pull_new_samples(&mut self) {
        let Some(history) = &self.history else { return };
        let fresh = history.tail(self.cursor);
        self.cursor += fresh.len();
        for sample in fresh {
            let start = *self.started.get_or_insert(sample.timestamp);
            let minutes = (sample.timestamp - start).num_milliseconds() as f64 / 60_000.0;
            self.flux_points.push([minutes, sample.heat_flux]);
            for (points, value) in self.temp_points.iter_mut().zip(&sample.temperatures) {
                points.push([minutes, *value]);
            }
            self.latest = Some(sample);
        }
    }

    // 关闭窗口即停止采集
    fn watch_close(&mut self, close_requested: bool) {
        if close_requested && !self.stop.is_requested() {
            self.stop.request();
            self.log("window closed, stopping");
        }
    }

    fn handle_messages(&mut self, ctx: &egui::Context) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                EngineMessage::Log(s) => self.log(&s),
                EngineMessage::SampleAccepted { count, history } => {
                    self.history.get_or_insert(history);
                    self.status = format!("{count} points captured");
                }
                EngineMessage::AcquisitionFailed(e) => {
                    self.skipped += 1;
                    self.log(&format!("burst skipped: {e}"));
                }
                EngineMessage::Fatal(e) => {
                    self.stopped = true;
                    self.status = "Acquisition failed to start".to_owned();
                    self.log(&e);
                }
                EngineMessage::Stopped { samples } => {
                    self.stopped = true;
                    let msg = format!("Stopped. {samples} points captured.");
                    self.log(&msg);
                    self.status = msg;
                    // Ctrl+C 等外部停止时关闭窗口
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            }
        }
        self.pull_new_samples();
    }
}

impl eframe::App for FluxMonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. 消息处理
        self.watch_close(ctx.input(|i| i.viewport().close_requested()));
        self.handle_messages(ctx);

        // 2. 侧边栏：状态与日志
        egui::SidePanel::left("L").min_width(260.0).show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("Heat Flux Monitor");
            ui.separator();
            let colour = if self.stopped { Color32::YELLOW } else { Color32::GREEN };
            ui.label(egui::RichText::new(&self.status).color(colour));
            if let Some(sample) = &self.latest {
                ui.label(format!("Last: {}", sample.timestamp.format("%H:%M:%S")));
                ui.monospace(format!("Flux  {:>9.3} W/m²", sample.heat_flux));
                for (name, t) in self.sensor_names.iter().zip(&sample.temperatures) {
                    ui.monospace(format!("{name:<5} {t:>9.2} °C"));
                }
            }
            if self.skipped > 0 {
                ui.label(egui::RichText::new(format!("{} bursts skipped", self.skipped)).small());
            }
            ui.add_space(10.0);
            if ui.add_enabled(!self.stopped, egui::Button::new("⏹ STOP")).clicked() {
                self.stop.request();
                self.log("stop requested");
            }
            ui.add_space(10.0);
            egui::ScrollArea::vertical().max_height(200.0).show(ui, |ui| {
                for m in &self.log_messages {
                    ui.monospace(m);
                }
            });
        });

        // 3. 主区域：上热流，下温度
        egui::CentralPanel::default().show(ctx, |ui| {
            let half = (ui.available_height() - 30.0).max(100.0) / 2.0;
            ui.label("Heat flux (W/m²)");
            Plot::new("flux_plot")
                .height(half)
                .auto_bounds_x()
                .auto_bounds_y()
                .show(ui, |plot_ui| {
                    if !self.flux_points.is_empty() {
                        plot_ui.line(
                            Line::new(PlotPoints::new(self.flux_points.clone()))
                                .name("Heat flux")
                                .color(Color32::from_rgb(0, 160, 255)),
                        );
                    }
                });
            ui.label("Temperature (°C) vs minutes");
            Plot::new("temp_plot")
                .height(half)
                .legend(Legend::default())
                .auto_bounds_x()
                .auto_bounds_y()
                .show(ui, |plot_ui| {
                    for (i, (name, points)) in self.sensor_names.iter().zip(&self.temp_points).enumerate() {
                        if !points.is_empty() {
                            let col = SENSOR_COLORS[i % SENSOR_COLORS.len()];
                            plot_ui.line(Line::new(PlotPoints::new(points.clone())).name(name).color(col));
                        }
                    }
                });
        });

        // 新样本到来时引擎会主动唤醒；这里只做兜底轮询
        ctx.request_repaint_after(Duration::from_millis(500));
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::HistoryStore;
    use chrono::TimeDelta;
    use std::sync::mpsc::channel;

    #[test]
    fn pulls_only_new_samples_from_history() {
        let (tx, rx) = channel();
        let mut app = FluxMonitorApp::new(rx, StopSignal::new(), vec!["Window".into()], "x.csv".into());
        let mut store = HistoryStore::new();
        let start = Local::now();
        for i in 0..2 {
            store
                .append(Sample {
                    timestamp: start + TimeDelta::seconds(60 * i),
                    heat_flux: 10.0 + i as f64,
                    temperatures: vec![21.0],
                })
                .unwrap();
        }
        tx.send(EngineMessage::SampleAccepted { count: 2, history: store.view() }).unwrap();
        app.handle_messages(&egui::Context::default());
        assert_eq!(app.flux_points, vec![[0.0, 10.0], [1.0, 11.0]]);
        assert_eq!(app.temp_points[0].len(), 2);

        store
            .append(Sample {
                timestamp: start + TimeDelta::seconds(120),
                heat_flux: 12.0,
                temperatures: vec![22.0],
            })
            .unwrap();
        tx.send(EngineMessage::SampleAccepted { count: 3, history: store.view() }).unwrap();
        app.handle_messages(&egui::Context::default());
        assert_eq!(app.flux_points.len(), 3);
        assert_eq!(app.status, "3 points captured");
    }

    #[test]
    fn stop_and_failures_update_status() {
        let (tx, rx) = channel();
        let stop = StopSignal::new();
        let mut app = FluxMonitorApp::new(rx, stop.clone(), vec!["Window".into()], "x.csv".into());
        tx.send(EngineMessage::AcquisitionFailed("timeout".into())).unwrap();
        tx.send(EngineMessage::Stopped { samples: 0 }).unwrap();
        app.handle_messages(&egui::Context::default());
        assert_eq!(app.skipped, 1);
        assert!(app.stopped);
        assert!(!stop.is_requested());
    }

    #[test]
    fn closing_the_window_requests_a_stop() {
        let (tx, rx) = channel();
        let stop = StopSignal::new();
        let mut app = FluxMonitorApp::new(rx, stop.clone(), vec!["Window".into()], "x.csv".into());
        app.watch_close(false);
        assert!(!stop.is_requested());
        app.watch_close(true);
        assert!(stop.is_requested());
        assert_eq!(app.log_messages.last().map(String::as_str), Some("> window closed, stopping"));
        tx.send(EngineMessage::Stopped { samples: 2 }).unwrap();
        app.handle_messages(&egui::Context::default());
        assert_eq!(app.status, "Stopped. 2 points captured.");
    }
}
