//! Utility functions for hardware testing.
//!
//! Provides helpers for port discovery and reading the bench setup from the
//! environment.

use nexbox_qc::loopback::LoopbackSettings;
use serialport::{available_ports, SerialPortInfo, SerialPortType};
use std::env;
use std::time::Duration;

/// Bench configuration from environment.
pub struct TestPortConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub loopback_enabled: bool,
    pub modem_jumpers: bool,
}

impl TestPortConfig {
    /// `TEST_PORT` is required; `TEST_BAUD`, `TEST_LOOPBACK=1` and
    /// `TEST_MODEM=1` describe the plug fitted to it.
    pub fn from_env() -> Option<Self> {
        let port_name = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(115200);
        let loopback_enabled = env::var("TEST_LOOPBACK").ok().as_deref() == Some("1");
        let modem_jumpers = env::var("TEST_MODEM").ok().as_deref() == Some("1");

        Some(TestPortConfig {
            port_name,
            baud_rate,
            loopback_enabled,
            modem_jumpers,
        })
    }

    /// Tester settings for this bench.
    pub fn settings(&self) -> LoopbackSettings {
        LoopbackSettings {
            device: self.port_name.clone(),
            baud_rate: self.baud_rate,
            timeout: Duration::from_secs(2),
            payload_len: 64,
            byte_loopback: true,
            modem_lines: self.modem_jumpers,
        }
    }
}

/// Skip test if hardware is not available.
pub fn skip_without_hardware() -> Option<TestPortConfig> {
    let config = TestPortConfig::from_env();
    if config.is_none() {
        println!("Skipping hardware test: TEST_PORT not set");
        print_available_ports();
    }
    config
}

/// Print available ports for debugging.
pub fn print_available_ports() {
    let ports: Vec<SerialPortInfo> = available_ports().unwrap_or_default();
    if ports.is_empty() {
        println!("No serial ports detected on this system");
        return;
    }

    println!("Available serial ports ({}):", ports.len());
    for port in &ports {
        match &port.port_type {
            SerialPortType::UsbPort(usb_info) => println!(
                "  {} (USB {:04x}:{:04x})",
                port.port_name, usb_info.vid, usb_info.pid
            ),
            _ => println!("  {}", port.port_name),
        }
    }
}
