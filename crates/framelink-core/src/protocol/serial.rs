//! Serial port devices
//!
//! Port enumeration plus the `serialport`-backed [`Device`] implementation
//! used for real hardware.

use serialport::{SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{Device, ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Combined USB identifier (`vid << 16 | pid`), when both are known.
    ///
    /// Useful for picking a specific adapter out of an enumeration without
    /// depending on the unstable device path.
    pub fn usb_id(&self) -> Option<u32> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => Some(((vid as u32) << 16) | pid as u32),
            _ => None,
        }
    }
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let mut port = Self {
            name: info.port_name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        };
        if let SerialPortType::UsbPort(usb) = info.port_type {
            port.vid = Some(usb.vid);
            port.pid = Some(usb.pid);
            port.manufacturer = usb.manufacturer;
            port.product = usb.product;
            port.serial_number = usb.serial_number;
        }
        port
    }
}

/// List the available serial ports, sorted by name.
pub fn list_ports() -> Result<Vec<PortInfo>, ProtocolError> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}

/// Serial line settings applied when a [`SerialDevice`] opens its port.
///
/// The framing layer assumes a transparent byte pipe, so the line is always
/// configured 8N1 without flow control; only speed and read timeout vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Open and configure a port according to `settings`.
pub fn open_port(
    name: &str,
    settings: &SerialSettings,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    serialport::new(name, settings.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(settings.timeout_ms))
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(name.to_string()),
            _ => ProtocolError::SerialError(e.to_string()),
        })
}

/// Read timeouts are part of normal polling, not failures.
fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

/// A [`Device`] backed by a real serial port
pub struct SerialDevice {
    port_name: String,
    settings: SerialSettings,
    handle: Option<Box<dyn SerialPort>>,
}

impl SerialDevice {
    /// Create a device for `port_name` without opening it.
    ///
    /// Fails if the port name is empty; whether the port exists is only
    /// known once [`Device::open`] runs.
    pub fn new(
        port_name: impl Into<String>,
        settings: SerialSettings,
    ) -> Result<Self, ProtocolError> {
        let port_name = port_name.into();
        if port_name.trim().is_empty() {
            return Err(ProtocolError::InvalidPort(port_name));
        }
        Ok(Self {
            port_name,
            settings,
            handle: None,
        })
    }

    /// Settings this device opens its port with
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

impl std::fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDevice")
            .field("port_name", &self.port_name)
            .field("settings", &self.settings)
            .field("open", &self.handle.is_some())
            .finish()
    }
}

impl Device for SerialDevice {
    fn open(&mut self) -> bool {
        if self.handle.is_some() {
            return true;
        }
        match open_port(&self.port_name, &self.settings) {
            Ok(port) => {
                debug!(port = %self.port_name, baud = self.settings.baud_rate, "serial port opened");
                self.handle = Some(port);
                true
            }
            Err(e) => {
                debug!(port = %self.port_name, error = %e, "serial open failed");
                false
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut port) = self.handle.take() {
            let _ = port.flush();
            debug!(port = %self.port_name, "serial port closed");
        }
    }

    fn flush(&mut self) {
        if let Some(port) = self.handle.as_mut() {
            let _ = port.flush();
        }
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn write(&mut self, data: &[u8]) -> usize {
        match self.handle.as_mut() {
            Some(port) => match port.write_all(data) {
                Ok(()) => data.len(),
                Err(e) => {
                    warn!(port = %self.port_name, error = %e, "serial write failed");
                    0
                }
            },
            None => 0,
        }
    }

    fn read(&mut self, size: usize) -> Option<Vec<u8>> {
        let port = self.handle.as_mut()?;
        let mut buf = vec![0u8; size];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Some(buf)
            }
            Err(e) if is_timeout(&e) => Some(Vec::new()),
            Err(e) => {
                warn!(port = %self.port_name, error = %e, "serial read failed");
                None
            }
        }
    }

    fn read_until(&mut self, delimiter: u8) -> Option<Vec<u8>> {
        let deadline = Instant::now() + Duration::from_millis(self.settings.timeout_ms);
        let mut out = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            let port = self.handle.as_mut()?;
            match port.read(&mut byte) {
                Ok(1) => {
                    out.push(byte[0]);
                    if byte[0] == delimiter {
                        return Some(out);
                    }
                }
                Ok(_) => {}
                Err(e) if is_timeout(&e) => return Some(out),
                Err(e) => {
                    warn!(port = %self.port_name, error = %e, "serial read failed");
                    return None;
                }
            }
            if Instant::now() >= deadline {
                return Some(out);
            }
        }
    }

    fn port(&self) -> Option<&str> {
        Some(&self.port_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports_does_not_panic() {
        if let Ok(ports) = list_ports() {
            for port in &ports {
                println!("Found port: {} - {:?}", port.name, port.product);
            }
        }
    }

    #[test]
    fn test_empty_port_name_rejected() {
        let err = SerialDevice::new("  ", SerialSettings::default());
        assert!(matches!(err, Err(ProtocolError::InvalidPort(_))));
    }

    #[test]
    fn test_usb_id_combines_vid_pid() {
        let mut info = PortInfo {
            name: "/dev/ttyACM0".to_string(),
            vid: Some(0x2341),
            pid: Some(0x0043),
            manufacturer: None,
            product: None,
            serial_number: None,
        };
        assert_eq!(info.usb_id(), Some(0x2341_0043));

        info.pid = None;
        assert_eq!(info.usb_id(), None);
    }

    #[test]
    fn test_default_settings() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(settings.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_unopened_device_io() {
        let mut device =
            SerialDevice::new("/dev/null-port-that-does-not-exist", SerialSettings::default())
                .expect("name is non-empty");
        assert!(!device.is_open());
        assert_eq!(device.write(&[1, 2, 3]), 0);
        assert_eq!(device.read(4), None);
        assert_eq!(device.read_until(0x00), None);
        assert_eq!(device.port(), Some("/dev/null-port-that-does-not-exist"));
    }
}
