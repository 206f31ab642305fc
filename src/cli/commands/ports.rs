//! `ports`: list serial ports

use anyhow::Result;

use crate::utils::serial::list_serial_ports;

pub fn execute_ports_command() -> Result<()> {
    let ports = list_serial_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("  {:<24} {}", port.port, port.description);
    }
    Ok(())
}
