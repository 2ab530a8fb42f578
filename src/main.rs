//! thermolog: Linux entry point.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                      │
//! │  I2cdev ─▶ ChannelMultiplexer ─▶ BusSampler   LogRecordSink   │
//! │  CdevPin (cool, heat)            CdevPin (trigger)            │
//! │                                                               │
//! │  ──────────────── Port Trait Boundary ───────────────────     │
//! │                                                               │
//! │   MeasurementTask ──[slot]──▶ ActuatorScheduler (cool)        │
//! │   window · law    ──[slot]──▶ ActuatorScheduler (heat)        │
//! │                                                               │
//! │   Supervisor: start · wait · stop (lines forced off)          │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage:
//!
//! - `thermolog [config.json]`: regulate until SIGINT/SIGTERM or Enter.
//! - `thermolog trace [config.json]`: wait for the trigger input, log one
//!   raw trace, exit. Both actuator lines stay off.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use std::{fs, io, thread};

use anyhow::{Context, Result};
use log::{error, info, warn};

use thermolog::adapters::linux::{self, LinuxHardware};
use thermolog::adapters::log_sink::LogRecordSink;
use thermolog::app::ports::{NoTrigger, SafeOff, SamplePort, TriggerSource};
use thermolog::app::service::MeasurementTask;
use thermolog::channels::CancelToken;
use thermolog::config::{RuntimeConfig, SystemConfig};
use thermolog::control::ActuatorKind;
use thermolog::control::law::ThermalController;
use thermolog::drivers::actuator::SharedLine;
use thermolog::drivers::trigger::EdgeTrigger;
use thermolog::sampling::{SamplingEngine, triggered_trace};
use thermolog::scheduler::ActuatorScheduler;
use thermolog::sensors::BusSampler;
use thermolog::sensors::multiplexer::ChannelMultiplexer;
use thermolog::supervisor::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Regulate,
    Trace,
}

/// `[trace] [config.json]`
fn parse_args() -> (Mode, Option<String>) {
    let mut args = std::env::args().skip(1).peekable();
    let mode = if args.next_if(|a| a == "trace").is_some() {
        Mode::Trace
    } else {
        Mode::Regulate
    };
    (mode, args.next())
}

fn load_config(path: Option<String>) -> Result<SystemConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            let config = SystemConfig::from_json(&text).with_context(|| format!("parsing {path}"))?;
            info!("Config loaded from {}", path);
            Ok(config)
        }
        None => {
            info!("No config file given, using defaults");
            Ok(SystemConfig::default())
        }
    }
}

/// One triggered capture, logged row by row under the `trace` target.
fn run_trace(
    sampler: &mut BusSampler<linux_embedded_hal::I2cdev>,
    trigger: &mut dyn TriggerSource,
    timeout: Duration,
    rt: &RuntimeConfig,
) -> Result<()> {
    let cancel = CancelToken::new();
    linux::cancel_on_signal(cancel.clone())?;
    if let Err(e) = sampler.prime() {
        warn!("Trace: priming failed, continuing: {}", e);
    }
    let trace = triggered_trace(sampler, trigger, timeout, rt.trace, rt.sampling.wait_policy, &cancel)?;
    for row in &trace.rows {
        let values: Vec<String> = row.values.iter().map(|v| format!("{v:.4}")).collect();
        info!(target: "trace", "{:.6}\t{}", row.offset.as_secs_f64(), values.join("\t"));
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("thermolog v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Configuration ──────────────────────────────────────
    let (mode, path) = parse_args();
    let config = load_config(path)?;
    let rt = config.validate().context("invalid configuration")?;

    // ── 2. Hardware ───────────────────────────────────────────
    let want_trigger = mode == Mode::Trace || rt.trigger_timeout.is_some();
    let hw = LinuxHardware::open(&config.hardware, want_trigger)?;
    let mux = match config.multiplexer.family {
        Some(family) => ChannelMultiplexer::new(
            hw.bus,
            family,
            config.multiplexer.address,
            config.multiplexer.verify_selection,
        )
        .context("multiplexer init")?,
        None => ChannelMultiplexer::passthrough(hw.bus),
    };
    let mut sampler = BusSampler::new(mux, rt.descriptors.clone(), rt.settle_delay)?;

    let cool_line = Arc::new(SharedLine::new(ActuatorKind::Cool, hw.cool));
    let heat_line = Arc::new(SharedLine::new(ActuatorKind::Heat, hw.heat));
    let mut trigger: Box<dyn TriggerSource + Send> = match hw.trigger {
        Some(pin) => Box::new(EdgeTrigger::new(pin)),
        None => Box::new(NoTrigger),
    };

    if mode == Mode::Trace {
        cool_line.force_off()?;
        heat_line.force_off()?;
        let timeout = Duration::from_millis(config.trigger.timeout_ms);
        return run_trace(&mut sampler, &mut *trigger, timeout, &rt);
    }

    // ── 3. Tasks ──────────────────────────────────────────────
    let lines: Vec<Arc<dyn SafeOff>> = vec![cool_line.clone(), heat_line.clone()];
    let line_count = lines.len();
    let mut supervisor = Supervisor::new(lines, rt.shutdown_timeout);
    linux::cancel_on_signal(supervisor.cancel_token())?;
    let slots = supervisor.slots();
    let measure = MeasurementTask::new(
        SamplingEngine::new(sampler, rt.sampling),
        ThermalController::new(rt.control.clone()),
        LogRecordSink::new(),
        trigger,
        slots.clone(),
    )
    .with_trigger_timeout(rt.trigger_timeout)
    .with_record_every(rt.record_every);
    let cool = ActuatorScheduler::new(cool_line, slots.cool.clone(), rt.actuators);
    let heat = ActuatorScheduler::new(heat_line, slots.heat.clone(), rt.actuators);
    supervisor.start(measure, cool, heat)?;

    // ── 4. Run until a signal, Enter or a task failure ───────
    let cancel = supervisor.cancel_token();
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(n) if n > 0 => {
                    info!("Stop requested");
                    cancel.cancel();
                }
                // EOF: detached from a terminal; signals still stop us.
                Ok(_) => {}
                Err(e) => warn!("stdin read failed: {}", e),
            }
        })
        .context("spawning stdin watcher")?;

    supervisor.wait();
    let report = supervisor.stop();
    if report.is_clean(line_count) {
        Ok(())
    } else {
        error!("Unclean shutdown: {:?}", report);
        anyhow::bail!("unclean shutdown")
    }
}
