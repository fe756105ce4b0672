//! WireCanvas - headless runner
//!
//! Loads the configuration and a document, starts the runtime thread, connects
//! every bridge and logs what happens. Type `save` to write the document, or
//! `quit` (or close stdin) to save and exit.

use anyhow::Context;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wirecanvas::{
    bridge::{list_ports, MemoryFactory, SerialFactory, TransportFactory},
    config::{AppConfig, Document, LoggingConfig},
    runtime::{self, RuntimeMessage},
    types::ObjectId,
};

const USAGE: &str = "usage: wirecanvas [document.json] [--dry-run]";

/// Port name handed to bridges without one when running against the memory transport.
const DRY_RUN_PORT: &str = "dry-run";

struct Args {
    document: Option<PathBuf>,
    dry_run: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        document: None,
        dry_run: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dry-run" => args.dry_run = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => anyhow::bail!("unknown option {}\n{}", flag, USAGE),
            path => {
                if args.document.replace(PathBuf::from(path)).is_some() {
                    anyhow::bail!("more than one document given\n{}", USAGE);
                }
            }
        }
    }
    Ok(args)
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .context("invalid log filter")?;
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {:?}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "wirecanvas.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

fn log_message(msg: &RuntimeMessage) {
    match msg {
        RuntimeMessage::Snapshot(snapshot) => {
            tracing::debug!("{} objects settled", snapshot.objects.len())
        }
        RuntimeMessage::ConnectionStatus { bridge, status } => {
            tracing::info!("Bridge {}: {}", bridge, status)
        }
        RuntimeMessage::Notice(text) => tracing::warn!("{}", text),
        RuntimeMessage::PropagationFailed { root, error } => {
            tracing::warn!("Write to {} failed: {}", root, error)
        }
        RuntimeMessage::DocumentSaved(path) => tracing::info!("Saved {:?}", path),
        RuntimeMessage::Shutdown => tracing::info!("Runtime stopped"),
    }
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let (mut config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    let _log_guard = init_logging(&config.logging)?;
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }
    tracing::info!("Starting WireCanvas");

    let document_path = args
        .document
        .or_else(|| config.document_path())
        .context("could not determine a document path")?;
    // Refuse to start on a document that does not parse; it is saved back on exit
    let document = Document::open(&document_path)
        .with_context(|| format!("could not load document {:?}", document_path))?;
    let bridges: Vec<ObjectId> = document
        .objects
        .iter()
        .filter_map(|o| o.as_bridge())
        .map(|b| b.id.clone())
        .collect();
    tracing::info!(
        "Loaded {:?}: {} objects, {} bridges",
        document_path,
        document.objects.len(),
        bridges.len()
    );

    let factory: Box<dyn TransportFactory> = if args.dry_run {
        tracing::info!("Dry run: bridges use an in-memory transport");
        config.serial.port.get_or_insert_with(|| DRY_RUN_PORT.to_string());
        Box::new(MemoryFactory::new())
    } else {
        match list_ports() {
            Ok(ports) => tracing::info!("Serial ports: {:?}", ports),
            Err(e) => tracing::warn!("Could not enumerate serial ports: {}", e),
        }
        Box::new(SerialFactory::new(config.serial.read_timeout()))
    };

    let (handle, join) = runtime::spawn(config, Some(factory), document)?;
    for id in bridges {
        handle.connect(id);
    }

    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("spawning stdin reader")?;

    loop {
        crossbeam_channel::select! {
            recv(handle.msg_rx) -> msg => match msg {
                Ok(msg) => log_message(&msg),
                Err(_) => break,
            },
            recv(line_rx) -> line => match line.as_deref().map(str::trim) {
                Ok("quit") | Err(_) => break,
                Ok("save") => handle.save_document(document_path.clone()),
                Ok("") => {}
                Ok(other) => tracing::warn!("Unknown command {:?} (try `save` or `quit`)", other),
            },
        }
    }

    tracing::info!("Shutting down...");
    handle.save_document(document_path.clone());
    handle.shutdown();
    while let Some(msg) = handle.recv_timeout(Duration::from_secs(2)) {
        log_message(&msg);
        if msg == RuntimeMessage::Shutdown {
            break;
        }
    }
    join.join()
        .map_err(|_| anyhow::anyhow!("runtime thread panicked"))?;
    Ok(())
}
