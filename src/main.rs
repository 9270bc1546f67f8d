use clap::Parser;
use nexbox_qc::busy::BusyCheck;
use nexbox_qc::config::{Config, ConfigLoader};
use nexbox_qc::{logging, QcError, QcRunner};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "nexbox-qc",
    version,
    about = "RS-232 loopback and modem-line self-test for nexBox units.",
    long_about = "Sends a random payload through a TX/RX loopback plug and optionally checks the RTS/CTS and DTR/DSR/DCD/RI jumpers. A device held by another process is skipped, never taken over. Prints a PASS/WARN/ERROR report on stdout and exits non-zero only when an ERROR was recorded."
)]
struct Args {
    /// Configuration file (defaults to the standard search path).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial device under test.
    #[arg(short, long, value_name = "PATH")]
    device: Option<String>,

    /// Baud rate for the loopback exchange.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Loopback read deadline in seconds.
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Payload length in bytes.
    #[arg(long, value_name = "N")]
    bytes: Option<usize>,

    /// Run the RS-232 checks.
    #[arg(long, overrides_with = "no_rs232_test")]
    rs232_test: bool,

    /// Skip every RS-232 check.
    #[arg(long)]
    no_rs232_test: bool,

    /// Also check the modem-line jumpers.
    #[arg(long, overrides_with = "no_rs232_modem")]
    rs232_modem: bool,

    /// Do not check modem lines.
    #[arg(long)]
    no_rs232_modem: bool,

    /// How to detect processes holding the device.
    #[arg(long, value_enum)]
    busy_check: Option<BusyCheck>,

    /// Product Serial Number to print in the report.
    #[arg(long)]
    serial_number: Option<String>,

    /// List serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,

    /// Write the effective configuration to FILE and exit.
    #[arg(long, value_name = "FILE")]
    write_config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Command-line values win over file and environment.
    fn apply(&self, config: &mut Config) {
        let serial = &mut config.serial;
        if let Some(ref device) = self.device {
            serial.device = device.clone();
        }
        if let Some(baud) = self.baud {
            serial.baud = baud;
        }
        if let Some(timeout) = self.timeout {
            serial.timeout_secs = timeout;
        }
        if let Some(bytes) = self.bytes {
            serial.payload_bytes = bytes;
        }
        if let Some(enabled) = switch(self.rs232_test, self.no_rs232_test) {
            serial.rs232_test = enabled;
        }
        if let Some(enabled) = switch(self.rs232_modem, self.no_rs232_modem) {
            serial.modem_enabled = enabled;
        }
        if let Some(busy_check) = self.busy_check {
            serial.busy_check = busy_check;
        }
        if let Some(ref serial_number) = self.serial_number {
            config.identity.serial_number = Some(serial_number.clone());
        }
    }
}

fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            println!("[ERROR] nexbox-qc: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, QcError> {
    // Enumeration must work even when the configuration is broken.
    if args.list_ports {
        list_ports();
        return Ok(ExitCode::SUCCESS);
    }

    let loader = match args.config {
        Some(ref path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let config_path = loader.config_path.clone();
    let mut config = loader.into_config();
    args.apply(&mut config);

    logging::init(&config.logging, args.verbose);
    match config_path {
        Some(path) => debug!(path = %path.display(), "configuration loaded"),
        None => debug!("no configuration file, using defaults"),
    }

    config.validate()?;

    if args.print_config || args.write_config.is_some() {
        let loader = ConfigLoader {
            config_path: None,
            config,
        };
        if let Some(ref path) = args.write_config {
            loader.save_to(path)?;
            info!(path = %path.display(), "configuration written");
        }
        if args.print_config {
            let text = toml::to_string_pretty(loader.config())
                .map_err(nexbox_qc::ConfigError::from)?;
            print!("{text}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let report = QcRunner::from_config(config).run().await;
    print!("{report}");

    Ok(if report.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn list_ports() {
    match serialport::available_ports() {
        Ok(ports) if ports.is_empty() => println!("no serial ports found"),
        Ok(ports) => {
            for port in ports {
                let kind = match port.port_type {
                    serialport::SerialPortType::UsbPort(info) => format!(
                        "USB {:04x}:{:04x} {}",
                        info.vid,
                        info.pid,
                        info.product.unwrap_or_default()
                    ),
                    serialport::SerialPortType::PciPort => "PCI".to_string(),
                    serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                    serialport::SerialPortType::Unknown => "unknown".to_string(),
                };
                println!("{}\t{}", port.port_name, kind.trim_end());
            }
        }
        Err(e) => println!("[WARN] ports: could not enumerate serial ports: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "nexbox-qc",
            "--device",
            "/dev/ttyS4",
            "--baud",
            "9600",
            "--rs232-modem",
            "--busy-check",
            "none",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.serial.device, "/dev/ttyS4");
        assert_eq!(config.serial.baud, 9600);
        assert!(config.serial.modem_enabled);
        assert_eq!(config.serial.busy_check, BusyCheck::None);
        assert!(config.serial.rs232_test);
    }

    #[tokio::test]
    async fn test_list_ports_ignores_unreadable_config() {
        let missing = "/nonexistent/nexbox-qc/qc.toml";

        let args = Args::parse_from([
            "nexbox-qc",
            "--list-ports",
            "--config",
            missing,
            "--bytes",
            "0",
        ]);
        assert!(run(args).await.is_ok());

        let args = Args::parse_from(["nexbox-qc", "--config", missing]);
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().starts_with("cannot read config file"), "{err}");
    }

    #[test]
    fn test_disable_switch() {
        let args = Args::parse_from(["nexbox-qc", "--no-rs232-test"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert!(!config.serial.rs232_test);
        assert_eq!(switch(false, false), None);
    }
}
