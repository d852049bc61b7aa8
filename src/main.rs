use clap::Parser;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use serialbowl::config::ConfigLoader;
use serialbowl::registry::poll_once;
use serialbowl::{
    logging, ConfigBridge, ConfigStore, Connection, ConnectionParameters, EventSender, FileStore,
    Flow, MemoryStore, Notification, SystemTransport, Transport,
};

/// How long one turn of the main loop waits for an event.
const TICK: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(
    name = "serialbowl",
    version,
    about = "Serial console that survives unplugging the device.",
    long_about = "Connects stdin and stdout to a serial device. Received bytes go to stdout, \
                  status lines to stderr. When the device disappears, serialbowl waits for it \
                  and reconnects. Settings given here are remembered for the next run."
)]
struct Args {
    /// Serial device to open, e.g. /dev/ttyUSB0 or COM3
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Settings file to use instead of the standard locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not reconnect automatically after the device is lost
    #[arg(long)]
    no_reconnect: bool,

    /// List present serial devices and exit
    #[arg(short, long)]
    list: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("serialbowl: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    logging::init(&loader.settings().logging);

    let transport: Arc<dyn Transport> = Arc::new(SystemTransport);
    if args.list {
        for port in poll_once(transport.as_ref())?.iter() {
            println!("{port}");
        }
        return Ok(());
    }

    let store: Arc<dyn ConfigStore> = match FileStore::from_loader(loader) {
        Ok(store) => Arc::new(store),
        Err(error) => {
            warn!(%error, "settings will not be saved");
            Arc::new(MemoryStore::new())
        }
    };

    let mut conn = Connection::new(transport, ConnectionParameters::default());
    conn.subscribe(print_notification);
    if let Err(error) = conn.refresh_ports() {
        warn!(%error, "could not list serial devices");
    }
    ConfigBridge::attach(&mut conn, store);

    if let Some(port) = args.port {
        conn.set_port(port);
    }
    if let Some(baud) = args.baud {
        conn.set_baud_rate(baud)?;
    }
    if args.no_reconnect {
        conn.set_reconnect_automatically(false);
    }

    conn.open()?;
    spawn_stdin_reader(conn.sender())?;

    while conn.process(TICK) == Flow::Continue {}
    conn.close(true);
    Ok(())
}

fn print_notification(notification: &Notification) {
    match notification {
        Notification::DataReceived(bytes) => {
            let mut stdout = io::stdout().lock();
            if stdout.write_all(bytes).and_then(|()| stdout.flush()).is_err() {
                debug!("stdout closed");
            }
        }
        Notification::Status(text) => eprintln!("--- {text} ---"),
        Notification::StateChanged(state) => debug!(%state, "state changed"),
        Notification::ParameterChanged { field, value } => debug!(%field, %value, "parameter"),
        Notification::PortsChanged(_) => {}
    }
}

/// Forward stdin to the device until EOF, then ask the loop to stop.
fn spawn_stdin_reader(sender: EventSender) -> io::Result<()> {
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buffer = [0u8; 1024];
            loop {
                match stdin.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if !sender.send_input(buffer[..n].to_vec()) {
                            return;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
            sender.shutdown();
        })?;
    Ok(())
}
