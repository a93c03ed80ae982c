//! recwatchd entrypoint.
//!
//! A small wiring daemon around recwatch-core: it consumes recording
//! descriptor events as JSON lines on stdin, tails the platform log for
//! privacy-toggle correlation, and publishes deduplicated audio-state
//! snapshots on stdout. On-device deployments replace the stdin feed
//! with real platform bindings; the engine does not change.

use clap::{Parser, Subcommand};
use recwatch_core::ledger::SessionLedger;
use recwatch_core::logscan::{CommandLogSource, LogWatcher, LogWatcherHandle};
use recwatch_core::monitor::{AudioStateMonitor, AudioSystem, AudioSystemState, ChangeReporter};
use recwatch_core::pixel::{is_single_color, PixelBlockDetector};
use recwatch_core::probe::Prober;
use recwatch_core::rolling::RollingLog;
use std::env;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod platform;

use config::RuntimeConfig;
use platform::{JsonMemberHost, ReplayAudioFeed};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const FINAL_DRAIN_WAIT: Duration = Duration::from_millis(300);

#[derive(Parser)]
#[command(name = "recwatchd", about = "Recording attribution and privacy-toggle monitor")]
struct Cli {
    /// Path to the runtime config file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume descriptor events on stdin and watch the platform log.
    Monitor {
        /// Do not spawn the platform log watcher.
        #[arg(long)]
        no_log_watch: bool,
    },
    /// Run both pixel detectors over an image file.
    Inspect { image: PathBuf },
    /// Watch only the platform log for privacy-toggle correlation.
    ScanLog,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let config = match config::load_runtime_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load runtime config; using defaults");
            RuntimeConfig::default()
        }
    };

    match cli.command {
        Command::Monitor { no_log_watch } => run_monitor(&config, no_log_watch),
        Command::Inspect { image } => run_inspect(&config, &image),
        Command::ScanLog => run_scan_log(&config),
    }
}

fn init_logging() {
    let debug_enabled = env::var("RECWATCH_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_monitor(config: &RuntimeConfig, no_log_watch: bool) {
    let log = RollingLog::with_capacity(config.rolling.capacity);
    let ledger = SessionLedger::new(log.clone());
    ledger.set_owner_id(own_process_name());
    tracing::debug!("{}", ledger.debug_summary());
    let prober = Arc::new(Prober::new(Box::new(JsonMemberHost), log.clone()));

    let feed = ReplayAudioFeed::new();
    let system: Arc<dyn AudioSystem> = Arc::new(feed.clone());

    let monitor = AudioStateMonitor::new(
        Arc::clone(&system),
        ledger.clone(),
        Arc::clone(&prober),
        log.clone(),
    );
    let reporter = ChangeReporter::new(Arc::clone(&system), ledger, prober, log.clone());

    let (report_tx, report_rx) = mpsc::channel();
    let reporter_listener = match system.register_listener(report_tx) {
        Ok(listener) => Some(listener),
        Err(err) => {
            warn!(error = %err, "Change reporter not registered");
            None
        }
    };

    let subscription = monitor.subscribe();
    let watcher = if no_log_watch {
        None
    } else {
        start_log_watcher(config, &log)
    };

    info!("recwatchd monitor started; descriptor events on stdin");
    let pump = feed.pump(BufReader::new(io::stdin()));

    loop {
        for state in subscription.states().try_iter() {
            publish_state(&state);
        }
        while report_rx.try_recv().is_ok() {
            reporter.report();
        }
        if let Some(watcher) = &watcher {
            for signal in watcher.signals().try_iter() {
                info!(at = %signal.detected_at, "Camera privacy-toggle correlation signal");
            }
        }
        if feed.is_finished() {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    // Let in-flight notifications drain before the final read-out.
    thread::sleep(FINAL_DRAIN_WAIT);
    for state in subscription.states().try_iter() {
        publish_state(&state);
    }
    while report_rx.try_recv().is_ok() {
        reporter.report();
    }
    if let Some(listener) = reporter_listener {
        system.unregister_listener(listener);
    }
    let _ = pump.join();

    println!("--- rolling log ---");
    for entry in log.entries() {
        println!("{entry}");
    }
}

fn publish_state(state: &AudioSystemState) {
    match serde_json::to_string(state) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!(error = %err, "Failed to serialize audio state"),
    }
}

fn start_log_watcher(config: &RuntimeConfig, log: &RollingLog) -> Option<LogWatcherHandle> {
    let scan = &config.logscan;
    let clear_args: Vec<&str> = scan.clear_args.iter().map(String::as_str).collect();
    let follow_args: Vec<&str> = scan.follow_args.iter().map(String::as_str).collect();

    match CommandLogSource::spawn(&scan.program, &clear_args, &follow_args) {
        Ok(source) => Some(LogWatcher::start_with_timeout(
            Box::new(source),
            log.clone(),
            Duration::from_millis(scan.block_timeout_ms),
        )),
        Err(err) => {
            log.error(format!("Log watcher unavailable: {err}"));
            None
        }
    }
}

fn run_inspect(config: &RuntimeConfig, path: &Path) {
    let frame = match image::open(path) {
        Ok(decoded) => decoded.to_rgba8(),
        Err(err) => {
            error!(path = %path.display(), error = %err, "Failed to decode image");
            std::process::exit(1);
        }
    };

    let detector = PixelBlockDetector::with_thresholds(config.detector);
    let verdict = detector.analyze(&frame);
    let repeated = is_single_color(&frame);

    println!("frame: {}x{}", frame.width(), frame.height());
    println!(
        "statistical: disabled={} confidence={:.2}",
        verdict.disabled, verdict.confidence
    );
    println!("repeated-pixel: {repeated}");
    if verdict.disabled || repeated {
        println!("camera appears to be blocked by a privacy toggle");
    }
}

fn run_scan_log(config: &RuntimeConfig) {
    let log = RollingLog::with_capacity(config.rolling.capacity);
    let Some(watcher) = start_log_watcher(config, &log) else {
        error!(program = %config.logscan.program, "Failed to start the platform log feed");
        std::process::exit(1);
    };

    info!(program = %config.logscan.program, "Watching platform log for privacy-toggle correlation");
    while let Ok(signal) = watcher.signals().recv() {
        println!("camera privacy-toggle signal at {}", signal.detected_at);
    }
    watcher.stop();

    for entry in log.entries() {
        println!("{entry}");
    }
}

fn own_process_name() -> String {
    let mut system = sysinfo::System::new();
    system.refresh_processes();
    sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| system.process(pid).map(|process| process.name().to_string()))
        .unwrap_or_else(|| format!("pid:{}", std::process::id()))
}
