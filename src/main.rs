use atlas_serial::config::{Config, ConfigLoader, LogFormat, LoggingConfig, WorkspacePaths};
use atlas_serial::error::{AppError, AppResult};
use atlas_serial::port::{list_ports, SerialPort};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "atlas-serial",
    version,
    about = "Talk to a serial device: list ports, send data, print received lines, inspect modem lines."
)]
struct Args {
    /// Configuration file (overrides ATLAS_SERIAL_CONFIG and the workspace config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial device path or alias
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Print structured output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial ports present on this system
    List,
    /// Write DATA to the port
    Send {
        data: String,
        /// Append the configured line delimiter
        #[arg(long)]
        eol: bool,
    },
    /// Print lines received from the port
    Listen {
        /// Stop after this many lines
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Show the modem status lines (CTS, DSR, RI, CD)
    Lines,
    /// Write DATA and read the same number of bytes back
    Loopback { data: String },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> AppResult<()> {
    let mut config = match args.config {
        Some(ref path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    }
    .into_config();

    if let Some(port) = args.port {
        config.serial.port = Some(port);
    }
    if let Some(baud) = args.baud {
        config.serial.baud = baud;
    }
    config.validate()?;

    init_logging(&config.logging)?;
    debug!(?config, "configuration loaded");

    match args.command {
        Command::List => list(args.json),
        Command::Send { data, eol } => send(&config, data, eol),
        Command::Listen { count } => listen(&config, count),
        Command::Lines => lines(&config, args.json),
        Command::Loopback { data } => loopback(&config, data),
    }
}

fn init_logging(logging: &LoggingConfig) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| AppError::Logging(e.to_string()))?;

    let (writer, ansi) = match logging.file {
        Some(ref file) => {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                WorkspacePaths::from_env()?.log_file(file)
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_writer(writer);

    let result = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    result.map_err(|e| AppError::Logging(e.to_string()))
}

fn open_port(config: &Config) -> AppResult<SerialPort> {
    let name = config.serial.port.as_deref().ok_or(AppError::NoPort)?;
    let path = config.serial.resolve_port(name);
    let port = SerialPort::new(path, config.serial.to_settings());
    port.open()?;
    Ok(port)
}

fn list(json: bool) -> AppResult<()> {
    let ports = list_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for info in ports {
        match (info.vid, info.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}\t{:04x}:{:04x}\t{}",
                info.name,
                vid,
                pid,
                info.product.or(info.manufacturer).unwrap_or_default()
            ),
            _ => println!("{}", info.name),
        }
    }
    Ok(())
}

fn send(config: &Config, data: String, eol: bool) -> AppResult<()> {
    let port = open_port(config)?;
    let mut payload = data.into_bytes();
    if eol {
        payload.extend_from_slice(config.serial.eol.as_bytes());
    }

    let written = port.write(&payload)?;
    if written < payload.len() {
        warn!(written, requested = payload.len(), "write timed out before completion");
    }
    port.flush_output()?;
    info!(port = %port.port(), bytes = written, "data sent");
    Ok(())
}

fn listen(config: &Config, count: Option<usize>) -> AppResult<()> {
    config.serial.require_read_timeout()?;
    let port = open_port(config)?;
    let eol = config.serial.eol.as_str();
    let mut stdout = std::io::stdout().lock();
    let mut received = 0usize;

    while count.map_or(true, |n| received < n) {
        let line = port.read_line_string(config.serial.max_line, eol)?;
        if line.is_empty() {
            continue;
        }
        stdout.write_all(line.strip_suffix(eol).unwrap_or(&line).as_bytes())?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
        received += 1;
    }
    Ok(())
}

fn lines(config: &Config, json: bool) -> AppResult<()> {
    let port = open_port(config)?;
    let status = port.modem_status()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!(
            "CTS={} DSR={} RI={} CD={}",
            u8::from(status.cts),
            u8::from(status.dsr),
            u8::from(status.ri),
            u8::from(status.cd)
        );
    }
    Ok(())
}

fn loopback(config: &Config, data: String) -> AppResult<()> {
    let port = open_port(config)?;
    port.flush_input()?;

    let sent = port.write(data.as_bytes())?;
    let mut echo = Vec::with_capacity(sent);
    port.read_to_vec(&mut echo, sent)?;

    println!("{}", String::from_utf8_lossy(&echo));
    if echo != data.as_bytes() {
        return Err(AppError::LoopbackMismatch {
            sent,
            received: echo.len(),
        });
    }
    info!(port = %port.port(), bytes = sent, "loopback verified");
    Ok(())
}
