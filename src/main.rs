// src/main.rs
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use eframe::egui;
use once_cell::sync::OnceCell;
use thermoflux::config::{DeviceKind, Settings};
use thermoflux::drivers::{AcquisitionError, RunSummary};
use thermoflux::engine::{self, EngineSetup};
use thermoflux::gui::FluxMonitorApp;
use thermoflux::recorder::LogSettings;
use thermoflux::types::StopSignal;
use thermoflux::visualizer::{ChannelView, SnapshotView};

#[derive(Parser, Debug)]
#[command(name = "thermoflux")]
#[command(about = "Heat-flux and thermocouple logger", long_about = None)]
struct Cli {
    /// JSON settings file; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run label appended to the log file name (prompted for when omitted)
    #[arg(long)]
    label: Option<String>,

    /// Directory for the log file
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Seconds between logged samples
    #[arg(long)]
    interval: Option<f64>,

    /// Use the simulated device instead of NI-DAQmx
    #[arg(long)]
    simulate: bool,

    /// Run without a window
    #[arg(long)]
    headless: bool,

    /// PNG written after every sample in headless mode
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Probability of an injected timeout per burst (simulated device only)
    #[arg(long, default_value_t = 0.0)]
    sim_failure_rate: f64,
}

// 读取运行标签
fn prompt_label() -> Result<String> {
    print!("Enter a label for this run: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read run label")?;
    Ok(line.trim().to_owned())
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = &cli.output_dir {
        settings.log.output_dir = dir.clone();
    }
    if let Some(secs) = cli.interval {
        settings.channels.logging_interval_secs = secs;
    }
    if cli.simulate {
        settings.device = DeviceKind::Simulated;
    }
    settings.validate()?;
    Ok(settings)
}

// enable_all 在各平台都会打开信号所需的驱动
fn signal_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")
}

// Ctrl+C 只负责置位停止信号，收尾由调度器完成
fn watch_ctrl_c(stop: StopSignal) -> Result<()> {
    let runtime = signal_runtime()?;
    thread::spawn(move || {
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("ctrl-c received, stopping");
                stop.request();
            }
        });
    });
    Ok(())
}

fn finish(handle: JoinHandle<Result<RunSummary, AcquisitionError>>) -> Result<()> {
    let summary = handle
        .join()
        .map_err(|_| anyhow!("acquisition thread panicked"))??;
    println!(
        "Stopped. {} points captured ({} bursts skipped). Log: {}",
        summary.samples,
        summary.failures,
        summary.log_path.display()
    );
    if summary.pending_rows > 0 {
        return Err(anyhow!(
            "{} rows could not be written to {}",
            summary.pending_rows,
            summary.log_path.display()
        ));
    }
    Ok(())
}

// 入口函数
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let label = match &cli.label {
        Some(label) => label.clone(),
        None => prompt_label()?,
    };
    let path = settings.log.file_for_label(&label);
    let log = LogSettings::new(&settings.log, path.clone(), settings.channels.sensor_names.clone());
    println!("Logging to {}", path.display());

    let stop = StopSignal::new();
    watch_ctrl_c(stop.clone())?;
    let sensor_names = settings.channels.sensor_names.clone();
    let setup = EngineSetup {
        settings,
        log,
        simulated_failure_rate: cli.sim_failure_rate,
    };

    if cli.headless {
        let view = SnapshotView::new(stop, cli.snapshot.clone(), sensor_names);
        return finish(engine::spawn_thread(setup, view));
    }

    // 1. 后台引擎
    let (tx, rx) = channel();
    let repaint = Arc::new(OnceCell::new());
    let view = ChannelView::new(tx, stop.clone(), Arc::clone(&repaint));
    let handle = engine::spawn_thread(setup, view);

    // 2. 界面 (阻塞直到窗口关闭)
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title("Heat Flux Monitor"),
        ..Default::default()
    };
    let app_stop = stop.clone();
    let log_path = path.display().to_string();
    eframe::run_native(
        "thermoflux",
        options,
        Box::new(move |cc| {
            repaint.set(cc.egui_ctx.clone()).ok();
            Box::new(FluxMonitorApp::new(rx, app_stop, sensor_names, log_path))
        }),
    )
    .map_err(|e| anyhow!("window failed: {e}"))?;

    // 3. 窗口关闭后等待引擎收尾
    stop.request();
    finish(handle)
}
