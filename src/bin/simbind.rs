// Simbind CLI
// Validate, migrate and exercise binding documents against an offline simulator

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use simbind_core::document::{self, LoadReport};
use simbind_core::{
    ConnectionStatus, DeviceEvent, DispatchOutcome, Dispatcher, EngineInput, KeySink,
    LogOutputSink, OffsetCache, Settings, Transition,
};

/// Hardware input to flight simulator binding engine
#[derive(Parser, Debug)]
#[command(name = "simbind")]
#[command(version)]
#[command(about = "Binds cockpit module inputs and outputs to flight simulator actions", long_about = None)]
struct Args {
    /// Binding document (XML)
    #[arg(short, long, value_name = "DOCUMENT")]
    document: PathBuf,

    /// Settings file (default: ~/.config/simbind/settings.toml)
    #[arg(short, long, value_name = "SETTINGS")]
    settings: Option<PathBuf>,

    /// Validate the document and exit
    #[arg(long)]
    check_config: bool,

    /// Serial of a connected module; repeat for each. With --check-config,
    /// bindings on other modules are reported.
    #[arg(long = "connected", value_name = "SERIAL")]
    connected: Vec<String>,

    /// Write the document in the current generation to this path and exit
    #[arg(long, value_name = "PATH")]
    migrate_to: Option<PathBuf>,

    /// Replay device events from a file (lines: SERIAL PIN press|release|repeat)
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Cycle test frames through the outputs for this many seconds
    #[arg(long, value_name = "SECS")]
    test_mode: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Engine wired to the in-process offset cache
struct OfflineEngine {
    sim: Arc<OffsetCache>,
    engine: Dispatcher,
}

impl OfflineEngine {
    fn new(settings: &Settings, report: &LoadReport) -> Result<Self> {
        let sim = Arc::new(OffsetCache::connected());
        let mut engine = Dispatcher::new(
            sim.clone(),
            key_sink()?,
            Box::new(LogOutputSink),
            settings.to_dispatch_settings(),
        );
        for warning in engine.bind(&report.document) {
            eprintln!("warning: {}", warning);
        }
        Ok(Self { sim, engine })
    }
}

/// Apply queued writes and log fired events, as a transport would
fn flush_offline(sim: &OffsetCache) -> Result<()> {
    for write in sim.flush()? {
        log::info!(
            "write 0x{:04X} ({} bytes) = {}",
            write.address,
            write.width.bytes(),
            write.value
        );
    }
    for event in sim.drain_events() {
        log::info!("event {} param {}", event.event_id, event.param);
    }
    Ok(())
}

#[cfg(feature = "uinput")]
fn key_sink() -> Result<Box<dyn KeySink>> {
    Ok(Box::new(simbind_core::VirtualKeyboard::new()?))
}

#[cfg(not(feature = "uinput"))]
fn key_sink() -> Result<Box<dyn KeySink>> {
    Ok(Box::new(simbind_core::RecordingKeySink::new()))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => {
            let settings = Settings::load_default().context("Failed to load default settings")?;
            if let Some(path) = Settings::default_path().filter(|p| p.exists()) {
                log::debug!("Loaded settings from {}", path.display());
            }
            Ok(settings)
        }
    }
}

fn print_report(report: &LoadReport) {
    for step in &report.migrations {
        println!("Migrated: {} (generation {})", step, step.generation());
    }
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
}

fn check_config(settings: &Settings, report: &LoadReport, connected: &[String]) -> Result<()> {
    let offline = OfflineEngine::new(settings, report)?;
    println!(
        "Document is valid: {} inputs ({} active), {} outputs ({} active), {} load warnings",
        report.document.input_count(),
        offline.engine.input_count(),
        report.document.output_count(),
        offline.engine.output_count(),
        report.warnings.len()
    );

    if connected.is_empty() {
        return Ok(());
    }
    let orphans = report.document.orphaned_serials(connected);
    if orphans.is_empty() {
        println!("All bindings refer to connected modules");
    }
    for orphan in &orphans {
        println!(
            "Module {} is not connected: {} inputs, {} outputs",
            orphan.serial,
            orphan.inputs.len(),
            orphan.outputs.len()
        );
    }
    Ok(())
}

/// Parse one replay line. Blank lines and `#` comments yield `None`.
fn parse_replay_line(line: &str) -> Result<Option<DeviceEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let parts: Vec<&str> = line.split_whitespace().collect();
    let [serial, pin, edge] = parts.as_slice() else {
        bail!("expected 'SERIAL PIN press|release|repeat', got '{}'", line);
    };
    let pin: u32 = pin.parse().with_context(|| format!("invalid pin '{}'", pin))?;
    let transition =
        Transition::from_name(edge).ok_or_else(|| anyhow!("invalid transition '{}'", edge))?;
    Ok(Some(DeviceEvent::new(*serial, pin, transition)))
}

fn replay(settings: &Settings, report: &LoadReport, path: &Path) -> Result<()> {
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file {}", path.display()))?;

    let mut offline = OfflineEngine::new(settings, report)?;
    offline.engine.notify_devices(ConnectionStatus::Connected);
    offline.engine.start()?;

    let mut handled = 0usize;
    let mut failed = 0usize;
    for (number, line) in script.lines().enumerate() {
        let Some(event) = parse_replay_line(line)
            .with_context(|| format!("{}:{}", path.display(), number + 1))?
        else {
            continue;
        };
        match offline.engine.dispatch(&event) {
            DispatchOutcome::Handled(summary) => {
                handled += summary.executed;
                failed += summary.failed;
            }
            DispatchOutcome::Dropped(reason) => log::warn!("Dropped line {}: {}", number + 1, reason),
        }
        flush_offline(&offline.sim)?;
        offline.engine.tick(Instant::now());
    }

    offline.engine.stop();
    println!("Replay finished: {} actions executed, {} failed", handled, failed);
    Ok(())
}

fn install_signal_handler(running: Arc<AtomicBool>) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    thread::spawn(move || {
        if let Ok(mut signals) = Signals::new([SIGINT, SIGTERM]) {
            if signals.forever().next().is_some() {
                running.store(false, Ordering::SeqCst);
            }
        }
    });
}

/// Run the engine loop on its own thread until `deadline` or a signal
fn run_engine(
    settings: &Settings,
    report: &LoadReport,
    startup: &[EngineInput],
    deadline: Option<Instant>,
) -> Result<()> {
    let OfflineEngine { sim, mut engine } = OfflineEngine::new(settings, report)?;
    let running = Arc::new(AtomicBool::new(true));
    install_signal_handler(running.clone());

    let (tx, rx) = channel();
    let handle = {
        let running = running.clone();
        thread::spawn(move || engine.run(rx, &running))
    };
    send_all(&tx, startup)?;

    let poll = settings.poll_interval();
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            tx.send(EngineInput::StopTestMode)
                .map_err(|_| anyhow!("engine stopped unexpectedly"))?;
            break;
        }
        flush_offline(&sim)?;
        thread::sleep(poll);
    }

    running.store(false, Ordering::SeqCst);
    drop(tx);
    handle
        .join()
        .map_err(|_| anyhow!("engine thread panicked"))?;
    flush_offline(&sim)?;
    Ok(())
}

fn send_all(tx: &Sender<EngineInput>, inputs: &[EngineInput]) -> Result<()> {
    for input in inputs {
        tx.send(input.clone())
            .map_err(|_| anyhow!("engine stopped unexpectedly"))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = load_settings(args.settings.as_deref())?;
    let report = document::load_file(&args.document)
        .with_context(|| format!("Failed to load document {}", args.document.display()))?;
    print_report(&report);

    if args.check_config {
        return check_config(&settings, &report, &args.connected);
    }

    if let Some(target) = args.migrate_to.as_deref() {
        document::save_file(&report.document, target)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        println!(
            "Wrote {} (version {})",
            target.display(),
            document::CURRENT_VERSION
        );
        return Ok(());
    }

    if let Some(path) = args.replay.as_deref() {
        return replay(&settings, &report, path);
    }

    if let Some(secs) = args.test_mode {
        let deadline = Instant::now() + Duration::from_secs(secs);
        return run_engine(
            &settings,
            &report,
            &[
                EngineInput::DeviceLink(ConnectionStatus::Connected),
                EngineInput::StartTestMode,
            ],
            Some(deadline),
        );
    }

    log::info!("Running offline; press Ctrl-C to stop");
    run_engine(
        &settings,
        &report,
        &[EngineInput::DeviceLink(ConnectionStatus::Connected)],
        None,
    )
}
