//! Tycoon host - runs Lua plugins against a sandbox park.
//!
//! This is the composition root that wires all components together.
//!
//! Startup order:
//! 1. Initialize tracing
//! 2. Load `engine.toml` from the tycoon config directory
//! 3. Create the park and the ActionExecutor
//! 4. Create the ScriptEngine, then load and start plugins
//! 5. Read console lines from stdin and tick the engine until `quit`

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tycoon_actions::{ActionExecutor, GameState};
use tycoon_core::EngineConfig;
use tycoon_plugin_api::ScriptEngine;

const TICK: Duration = Duration::from_millis(25);

/// Initialize the tracing subscriber for structured logging.
///
/// Log levels can be controlled via the `RUST_LOG` environment variable:
/// - `RUST_LOG=debug` - Enable debug logs for all modules
/// - `RUST_LOG=info,tycoon_plugin_api=debug` - Debug for the plugin engine only
///
/// The default is `info` with debug for every `tycoon_*` crate.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info")
            .add_directive("tycoon=debug".parse().expect("valid directive"))
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();
}

fn load_config() -> EngineConfig {
    if let Err(e) = tycoon_core::ensure_config_dir() {
        tracing::error!("Failed to create config directory: {}", e);
    }
    match EngineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load engine.toml, using defaults: {}", e);
            EngineConfig::default()
        }
    }
}

/// Forward stdin lines to the engine console until `quit` or end of input.
fn spawn_console(engine: &ScriptEngine, running: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    let console = engine.console_handle();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "quit" || line == "exit" {
                break;
            }
            let outcome = console.eval(line).and_then(|handle| handle.blocking_wait());
            match outcome {
                Ok(Ok(text)) => println!("{}", text),
                Ok(Err(message)) => eprintln!("error: {}", message),
                Err(e) => {
                    tracing::error!("Console unavailable: {}", e);
                    break;
                }
            }
        }
        running.store(false, Ordering::SeqCst);
    })
}

fn main() {
    init_tracing();

    let config = load_config();
    tracing::info!(plugin_dir = %config.plugin_dir.display(), "Starting tycoon host");

    let mut park = GameState::sandbox();
    park.cheats.ignore_research_status = config.ignore_research_status;
    let executor = Arc::new(ActionExecutor::new(Arc::new(Mutex::new(park))));

    let engine = match ScriptEngine::new(config, executor) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to create script engine: {}", e);
            std::process::exit(1);
        }
    };

    let loaded = engine.load_plugins().len();
    let started = engine.start_plugins();
    tracing::info!("Loaded {} plugins, {} started", loaded, started);

    let running = Arc::new(AtomicBool::new(true));
    let console = spawn_console(&engine, Arc::clone(&running));

    while running.load(Ordering::SeqCst) {
        let tick_start = Instant::now();
        engine.update();
        if let Some(rest) = TICK.checked_sub(tick_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    // One last tick so a pending console request resolves.
    engine.update();
    engine.shutdown();
    let _ = console.join();
}
