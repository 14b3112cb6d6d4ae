//! Analog hub CLI
//!
//! Lists analogue keyboards and prints the aggregated key buffer.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use analog_hub::analog_transport::{DeviceSource, Key, VirtualKeyboard, VirtualSource};
use analog_hub::{AnalogHub, DeviceEventType, DeviceId, HubConfig};
use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::{Cli, Commands};

/// Buffer size used by `watch`
const WATCH_CAPACITY: usize = 64;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config_path = cli.config.clone().unwrap_or_else(HubConfig::default_path);
    let config = HubConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    match cli.command {
        Commands::List { json } => {
            let source = open_source(cli.demo, &config);
            list(source.source(), json)?;
        }
        Commands::Watch {
            interval_ms,
            device,
        } => {
            let source = open_source(cli.demo, &config);
            watch(
                source,
                config,
                Duration::from_millis(interval_ms.max(1)),
                device.unwrap_or(DeviceId::ANY),
            )?;
        }
        Commands::Read { code, device } => {
            let Source { inner, demo } = open_source(cli.demo, &config);
            let settle = config.read_timeout() * 4;
            let hub = AnalogHub::initialise(inner, config, None)?;
            std::thread::sleep(settle);
            println!("{:.3}", hub.read_one(code, device.unwrap_or(DeviceId::ANY)));
            hub.shutdown();
            drop(demo);
        }
        Commands::Config { write } => show_config(&config, &config_path, write)?,
    }

    Ok(())
}

/// A source plus whatever keeps it alive
struct Source {
    inner: Box<dyn DeviceSource>,
    demo: Option<Demo>,
}

impl Source {
    fn source(&self) -> &dyn DeviceSource {
        &*self.inner
    }
}

fn open_source(demo: bool, config: &HubConfig) -> Source {
    if demo {
        let virtual_source = Arc::new(VirtualSource::new());
        let demo = Demo::start(&virtual_source);
        Source {
            inner: Box::new(virtual_source),
            demo: Some(demo),
        }
    } else {
        Source {
            inner: analog_hub::default_source(config),
            demo: None,
        }
    }
}

fn list(source: &dyn DeviceSource, json: bool) -> anyhow::Result<()> {
    let devices = source.enumerate().context("Device enumeration failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No analogue keyboards found");
        return Ok(());
    }
    for device in &devices {
        println!(
            "{}  {:04X}:{:04X}  {:<32} {:?} ({})",
            DeviceId::new(device.vid, device.pid),
            device.vid,
            device.pid,
            device.product_name,
            device.transport_type,
            device.device_path
        );
    }
    Ok(())
}

fn watch(source: Source, config: HubConfig, interval: Duration, filter: DeviceId) -> anyhow::Result<()> {
    let Source { inner, demo } = source;
    let hub = AnalogHub::initialise(inner, config, None)?;
    let mut events = hub.subscribe();
    info!(
        "Watching {} device(s), Ctrl-C to stop",
        hub.initial_device_count()
    );

    let running = setup_interrupt_handler();
    while running.load(Ordering::SeqCst) {
        loop {
            match events.try_recv() {
                Ok(event) => {
                    let verb = match event.event_type {
                        DeviceEventType::Connected => "connected",
                        DeviceEventType::Disconnected => "disconnected",
                    };
                    println!("{} ({}) {}", event.device.name, event.device.id, verb);
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }

        let entries = hub.read_full_buffer(WATCH_CAPACITY, filter);
        if !entries.is_empty() {
            let line: Vec<String> = entries
                .iter()
                .map(|e| format!("0x{:03X}={:.2}", e.code, e.magnitude))
                .collect();
            println!("{}", line.join(" "));
        }
        std::thread::sleep(interval);
    }

    hub.shutdown();
    drop(demo);
    Ok(())
}

fn show_config(config: &HubConfig, path: &Path, write: bool) -> anyhow::Result<()> {
    if write {
        config
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    } else {
        println!("# {}", path.display());
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

/// Set up a Ctrl-C handler that clears the returned flag
fn setup_interrupt_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .ok();

    running
}

/// Scripted keyboard for `--demo`: rolls W, A, S, D in and out
struct Demo {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Demo {
    fn start(source: &VirtualSource) -> Self {
        let keyboard = source.plug(0x0001, 0x000A, "Demo Keyboard");
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("analog-demo".into())
            .spawn(move || run_demo(&keyboard, &thread_stop))
            .ok();
        Self { stop, thread }
    }
}

impl Drop for Demo {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_demo(keyboard: &VirtualKeyboard, stop: &AtomicBool) {
    const KEYS: [Key; 4] = [Key::W, Key::A, Key::S, Key::D];
    let start = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        let t = start.elapsed().as_secs_f32();
        let key = KEYS[(t as usize) % KEYS.len()];
        // One second per key, pressed down and back up
        let phase = t.fract();
        let magnitude = (phase * std::f32::consts::PI).sin();
        if magnitude > 0.05 {
            keyboard.set_keys(&[(key, magnitude)]);
        } else {
            keyboard.release_all();
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    keyboard.release_all();
}
