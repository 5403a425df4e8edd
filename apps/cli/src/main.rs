use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ptpip_core::{
    DeviceInfo, EventCode, EventListener, Guid, OperationCode, PtpCode, PtpIpSession,
    SessionConfig, TracingListener,
};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "PTP/IP Camera Control Tool", long_about = None)]
struct Args {
    /// Path to a TOML session config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Responder host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Responder port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Initiator GUID, 32 hex digits (overrides config)
    #[arg(long)]
    guid: Option<Guid>,

    /// Initiator name (overrides config)
    #[arg(long)]
    name: Option<String>,

    /// PTP session ID used by commands that need an open session
    #[arg(long, default_value_t = 1)]
    session_id: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show device info
    Info,
    /// List storages
    Storages,
    /// List objects
    Objects {
        /// Storage ID (default: all storages)
        #[arg(long, value_parser = parse_u32, default_value = "0xFFFFFFFF")]
        storage: u32,
    },
    /// Download an object
    Get {
        /// Object handle
        #[arg(value_parser = parse_u32)]
        handle: u32,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Fetch the thumbnail instead of the object
        #[arg(long)]
        thumb: bool,
    },
    /// Trigger a capture and wait for it to complete
    Capture {
        /// Storage ID (0: responder chooses)
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        storage: u32,
        /// Seconds to wait for CaptureComplete
        #[arg(long, default_value_t = 10)]
        wait: u64,
    },
    /// Log events for a while
    Listen {
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Send a keep-alive probe
    Probe,
}

impl Command {
    /// Whether the command runs inside an OpenSession/CloseSession pair.
    fn needs_session(&self) -> bool {
        !matches!(self, Command::Info | Command::Probe)
    }
}

/// Accepts decimal or `0x`-prefixed hex.
fn parse_u32(text: &str) -> Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", text, e))
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(guid) = args.guid {
        config.guid = guid;
    }
    if let Some(name) = &args.name {
        config.name = name.clone();
    }
    Ok(config)
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    info!(addr = %config.addr(), "Connecting to responder...");
    let mut session = PtpIpSession::open(&config)
        .with_context(|| format!("connecting to {}", config.addr()))?;

    let needs_session = args.command.needs_session();
    if needs_session {
        session.open_session(args.session_id)?;
    }
    let result = execute(&mut session, args.command);
    if needs_session && let Err(e) = session.close_session() {
        warn!(error = %e, "CloseSession failed");
    }
    result?;

    session.close();
    Ok(())
}

fn execute(session: &mut PtpIpSession, command: Command) -> Result<()> {
    match command {
        Command::Info => {
            let device = session.get_device_info()?;
            print_device_info(&device);
        }
        Command::Probe => {
            session.probe()?;
            println!("{} answered probe", session.responder().name);
        }
        Command::Storages => {
            for id in session.get_storage_ids()? {
                let storage = session.get_storage_info(id)?;
                println!(
                    "0x{:08X}  {:<16} {:>8} MiB free of {:>8} MiB{}",
                    id,
                    storage.storage_description,
                    storage.free_space_in_bytes >> 20,
                    storage.max_capacity >> 20,
                    if storage.is_read_only() { "  (read-only)" } else { "" }
                );
            }
        }
        Command::Objects { storage } => {
            let handles = session.get_object_handles(storage, 0, 0)?;
            info!(count = handles.len(), "Objects found");
            for handle in handles {
                let object = session.get_object_info(handle)?;
                println!(
                    "0x{:08X}  {:<24} {:>10}  {}",
                    handle,
                    object.filename,
                    object.object_compressed_size,
                    object.capture_date
                );
            }
        }
        Command::Get {
            handle,
            output,
            thumb,
        } => {
            let data = if thumb {
                session.get_thumb(handle)?
            } else {
                session.get_object(handle)?
            };
            std::fs::write(&output, &data)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(bytes = data.len(), path = %output.display(), "Object saved");
        }
        Command::Capture { storage, wait } => capture(session, storage, Duration::from_secs(wait))?,
        Command::Listen { seconds } => {
            session.add_listener(Arc::new(TracingListener));
            info!(seconds, "Listening for events");
            thread::sleep(Duration::from_secs(seconds));
        }
    }
    Ok(())
}

enum CaptureEvent {
    ObjectAdded(u32),
    Complete(u32),
}

struct CaptureWatcher {
    events: Mutex<mpsc::Sender<CaptureEvent>>,
}

impl CaptureWatcher {
    fn send(&self, event: CaptureEvent) {
        if let Ok(events) = self.events.lock() {
            let _ = events.send(event);
        }
    }
}

impl EventListener for CaptureWatcher {
    fn on_object_added(&self, object_handle: u32) {
        self.send(CaptureEvent::ObjectAdded(object_handle));
    }

    fn on_capture_complete(&self, transaction_id: u32) {
        self.send(CaptureEvent::Complete(transaction_id));
    }
}

fn capture(session: &mut PtpIpSession, storage: u32, wait: Duration) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let watcher: Arc<dyn EventListener> = Arc::new(CaptureWatcher {
        events: Mutex::new(tx),
    });
    session.add_listener(Arc::clone(&watcher));

    let transaction_id = session.initiate_capture(storage, 0)?;
    info!(tx_id = transaction_id, "Capture initiated");

    let deadline = Instant::now() + wait;
    let outcome = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(CaptureEvent::ObjectAdded(handle)) => println!("New object 0x{:08X}", handle),
            Ok(CaptureEvent::Complete(id)) if id == transaction_id => break Ok(()),
            Ok(CaptureEvent::Complete(_)) => {}
            Err(RecvTimeoutError::Timeout) => {
                break Err(anyhow::anyhow!("no CaptureComplete within {:?}", wait));
            }
            Err(RecvTimeoutError::Disconnected) => {
                break Err(anyhow::anyhow!("event channel closed"));
            }
        }
    };

    session.remove_listener(&watcher);
    outcome?;
    println!("Capture complete");
    Ok(())
}

fn print_device_info(device: &DeviceInfo) {
    println!("Manufacturer:   {}", device.manufacturer);
    println!("Model:          {}", device.model);
    println!("Version:        {}", device.device_version);
    println!("Serial:         {}", device.serial_number);
    println!(
        "PTP version:    {}.{:02}",
        device.standard_version / 100,
        device.standard_version % 100
    );
    if !device.vendor_extension_desc.is_empty() {
        println!(
            "Extension:      0x{:08X} {}",
            device.vendor_extension_id, device.vendor_extension_desc
        );
    }
    println!("Operations:");
    for &code in &device.operations_supported {
        println!("  {}", OperationCode::from_code(code));
    }
    println!("Events:");
    for &code in &device.events_supported {
        println!("  {}", EventCode::from_code(code));
    }
    let vendor_ops = device
        .operations_supported
        .iter()
        .filter(|&&code| OperationCode::from_code(code).is_vendor_extended())
        .count();
    if vendor_ops > 0 {
        println!("({} vendor-extended operations)", vendor_ops);
    }
}
