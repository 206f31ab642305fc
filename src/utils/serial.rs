//! Serial port discovery for the upload port picker

use serde::{Deserialize, Serialize};
use serialport::SerialPortType;

use crate::errors::{FlasherError, Result};

/// A serial port a board might be attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortSummary {
    pub port: String,
    pub description: String,
    pub usb: bool,
}

/// Every serial port the OS reports, USB ports first
pub fn list_serial_ports() -> Result<Vec<SerialPortSummary>> {
    let ports = serialport::available_ports()
        .map_err(|e| FlasherError::Io(std::io::Error::other(e.to_string())))?;

    let mut summaries: Vec<SerialPortSummary> = ports
        .into_iter()
        .map(|port| {
            let (description, usb) = match &port.port_type {
                SerialPortType::UsbPort(info) => (
                    match (&info.manufacturer, &info.product) {
                        (Some(m), Some(p)) => format!("{} {}", m, p),
                        (Some(m), None) => m.clone(),
                        (None, Some(p)) => p.clone(),
                        (None, None) => format!("USB {:04x}:{:04x}", info.vid, info.pid),
                    },
                    true,
                ),
                SerialPortType::PciPort => ("PCI".to_string(), false),
                SerialPortType::BluetoothPort => ("Bluetooth".to_string(), false),
                SerialPortType::Unknown => ("Unknown".to_string(), false),
            };
            SerialPortSummary {
                port: port.port_name,
                description,
                usb,
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.usb.cmp(&a.usb).then_with(|| a.port.cmp(&b.port)));
    Ok(summaries)
}
