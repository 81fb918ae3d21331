//! Serial port links
//!
//! Provides the blocking byte link the EBB driver runs on, plus port
//! enumeration and EBB recognition.
//!
//! Reads use a short timeout so the driver's I/O loop can interleave
//! writes, shutdown checks and reads without dedicated threads.

use penkit_core::{ConnectionError, Result};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

/// USB vendor id of the EBB's microcontroller.
pub const EBB_VID: u16 = 0x04D8;
/// USB product id of the EBB.
pub const EBB_PID: u16 = 0xFD92;

const EBB_MANUFACTURERS: [&str; 2] = ["SchmalzHaus", "SchmalzHaus LLC"];

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB SchmalzHaus EiBotBoard")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// Whether a port looks like an EiBotBoard, by manufacturer string or by
/// USB vendor/product id.
pub fn is_ebb(info: &SerialPortInfo) -> bool {
    if let Some(mfg) = info.manufacturer.as_deref() {
        if EBB_MANUFACTURERS.contains(&mfg) {
            return true;
        }
    }
    info.vid == Some(EBB_VID) && info.pid == Some(EBB_PID)
}

/// List available serial ports on the system
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => Ok(ports.iter().map(to_port_info).collect()),
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(ConnectionError::Enumeration {
                reason: e.to_string(),
            }
            .into())
        }
    }
}

/// Names of the connected ports that look like EBBs.
pub fn list_ebb_ports() -> Result<Vec<String>> {
    Ok(list_ports()?
        .into_iter()
        .filter(is_ebb)
        .map(|p| p.port_name)
        .collect())
}

fn to_port_info(port: &serialport::SerialPortInfo) -> SerialPortInfo {
    let info = SerialPortInfo::new(&port.port_name, get_port_description(port));
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
            if let Some(ref mfg) = usb_info.manufacturer {
                info = info.with_manufacturer(mfg);
            }
            if let Some(ref serial) = usb_info.serial_number {
                info = info.with_serial_number(serial);
            }
            info
        }
        _ => info,
    }
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Low-level byte link to a device
///
/// `read` returns `ErrorKind::TimedOut` (or `WouldBlock`) when nothing
/// arrived within the link's timeout. Any other error means the link is
/// gone.
pub trait SerialLink: Send {
    /// Write data to the link
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read whatever data is available
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the port name
    fn name(&self) -> String;

    /// Close the link
    fn close(&mut self) -> io::Result<()>;
}

/// Trait for serial port I/O operations
pub trait ReadWrite: Read + Write + Send {}
impl<T: Read + Write + Send> ReadWrite for T {}

/// Real serial port implementation using serialport crate
pub struct RealSerialLink {
    name: String,
    port: Option<Box<dyn ReadWrite>>,
}

impl RealSerialLink {
    /// Open a serial port at `baud_rate` with the given read timeout.
    pub fn open(port_name: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let builder = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None);

        match builder.open_native() {
            Ok(port) => {
                debug!("Opened serial port {}", port_name);
                Ok(RealSerialLink {
                    name: port_name.to_string(),
                    port: Some(Box::new(port)),
                })
            }
            Err(e) => {
                warn!("Failed to open serial port {}: {}", port_name, e);
                Err(ConnectionError::FailedToOpen {
                    port: port_name.to_string(),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn ReadWrite>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl SerialLink for RealSerialLink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port()?.read(buf)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        // dropping the native handle closes the descriptor
        self.port = None;
        Ok(())
    }
}

/// Finds and opens device links. Discovery goes through this so tests can
/// supply in-memory links.
pub trait LinkProvider: Send + Sync {
    /// Names of the ports that look like EBBs, in enumeration order.
    fn list_ebb_ports(&self) -> Result<Vec<String>>;

    /// Open the named port.
    fn open(&self, port: &str) -> Result<Box<dyn SerialLink>>;
}

/// Provider backed by the operating system's serial ports.
#[derive(Debug, Clone)]
pub struct SystemLinkProvider {
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for SystemLinkProvider {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout: Duration::from_millis(10),
        }
    }
}

impl LinkProvider for SystemLinkProvider {
    fn list_ebb_ports(&self) -> Result<Vec<String>> {
        list_ebb_ports()
    }

    fn open(&self, port: &str) -> Result<Box<dyn SerialLink>> {
        let link = RealSerialLink::open(port, self.baud_rate, self.read_timeout)?;
        Ok(Box::new(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ebb_by_manufacturer() {
        let info = SerialPortInfo::new("/dev/ttyACM0", "USB").with_manufacturer("SchmalzHaus");
        assert!(is_ebb(&info));
        let info = SerialPortInfo::new("/dev/ttyACM0", "USB").with_manufacturer("SchmalzHaus LLC");
        assert!(is_ebb(&info));
    }

    #[test]
    fn test_is_ebb_by_usb_ids() {
        let info = SerialPortInfo::new("COM4", "USB").with_usb_ids(0x04D8, 0xFD92);
        assert!(is_ebb(&info));
        let info = SerialPortInfo::new("COM4", "USB").with_usb_ids(0x04D8, 0x000A);
        assert!(!is_ebb(&info));
    }

    #[test]
    fn test_other_ports_are_not_ebbs() {
        let info = SerialPortInfo::new("/dev/ttyUSB0", "USB FTDI")
            .with_manufacturer("FTDI")
            .with_usb_ids(0x0403, 0x6001);
        assert!(!is_ebb(&info));
        assert!(!is_ebb(&SerialPortInfo::new("/dev/ttyS0", "Serial Port")));
    }
}
