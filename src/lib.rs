//! Reset and boot-mode strobes for microcontrollers attached to FTDI UARTs.
//!
//! Serial flashing tools reset a target and select its boot mode by toggling the DTR and RTS
//! modem control lines. Many FTDI cables and breakout boards do not bring those lines out, or wire
//! them to the wrong pins. This crate puts the FTDI port into asynchronous bit-bang mode whenever a
//! tool touches DTR or RTS, drives two arbitrary port pins instead (see [`PinMap`]), and switches
//! back to UART mode before any data is transferred or a status line is queried.
//!
//! The pieces:
//!
//! * [`FtdiSerial`] is a plain serial connection to an FTDI port, opened from an [`FtdiUrl`].
//! * [`GpioMappedSerial`] wraps such a connection and performs the DTR/RTS remapping.
//! * [`bootstrap`] runs one of the [`tool`]s with a [`PortFactory`] that hands out
//!   [`GpioMappedSerial`] connections, regardless of the port the tool was asked to use.

#![doc(html_root_url = "https://docs.rs/ftdi-strobe/0.0.0")]
// Deny a few warnings in doctests, since rustdoc `allow`s many warnings by default
#![doc(test(attr(deny(unused_imports, unused_must_use))))]
#![warn(missing_debug_implementations, rust_2018_idioms)]

mod bitmode;
pub mod bootstrap;
mod error;
mod mapped;
#[cfg(test)]
mod mock;
mod mode;
mod pins;
mod port;
mod prop;
mod serial;
pub mod tool;
mod transport;
mod uart;
mod url;

use prop::DeviceProps;
use std::{cell::RefCell, cell::RefMut, fmt, rc::Rc, time::Duration};

pub use bitmode::BitMode;
pub use error::{Error, ErrorKind};
pub use mapped::GpioMappedSerial;
pub use mode::ModeSwitch;
pub use pins::{PinMap, Pins};
pub use port::{Port, ResetFlags};
pub use serial::{DataBits, FlowControl, ModemStatus, Parity, SerialSettings, StopBits};
pub use tool::{FtdiFactory, OpenOptions, PortFactory, Tool};
pub use transport::{RawDevice, SerialPort};
pub use uart::FtdiSerial;
pub use url::{DeviceSelector, FtdiUrl};

/// A result type with the error hardwired to [`Error`].
///
/// [`Error`]: struct.Error.html
pub type Result<T> = std::result::Result<T, Error>;

/// FTDI's USB vendor ID.
pub const VID_FTDI: u16 = 0x0403;

/// Product IDs used by FTDI's official devices.
pub const PIDS_FTDI: &[u16] = &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015];

/// USB device type providing shared access from multiple ports.
type UsbHandle = Rc<RefCell<rusb::DeviceHandle<rusb::GlobalContext>>>;

#[derive(Debug, Copy, Clone)]
#[repr(u8)]
enum ControlReq {
    Reset = 0x00,
    SetModemCtrl = 0x01,
    SetFlowCtrl = 0x02,
    SetBaudrate = 0x03,
    SetData = 0x04,
    PollModemStatus = 0x05,
    SetBitmode = 0x0B,
}

/// Bulk endpoints of one interface.
#[derive(Debug, Copy, Clone)]
struct Endpoints {
    ep_in: u8,
    ep_out: u8,
    packet_size: u16,
}

/// An FTDI USB device.
pub struct Ftdi {
    device: UsbHandle,
    timeout: Duration,
    properties: &'static DeviceProps,
    endpoints: Vec<Endpoints>,
}

const REQ_TYPE_VENDOR: u8 = 0x02 << 5;
const REQ_RECIPIENT_DEVICE: u8 = 0x00;
const REQ_DIR_OUT: u8 = 0x00;
const REQ_DIR_IN: u8 = 0x80;

const REQ_READ: u8 = REQ_TYPE_VENDOR | REQ_RECIPIENT_DEVICE | REQ_DIR_IN;
const REQ_WRITE: u8 = REQ_TYPE_VENDOR | REQ_RECIPIENT_DEVICE | REQ_DIR_OUT;

impl Ftdi {
    const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

    /// Opens the device selected by an `ftdi://` URL.
    ///
    /// Without explicit IDs in the URL, any of FTDI's own VID/PID combinations match.
    pub fn open_url(url: &FtdiUrl) -> Result<Self> {
        let list = rusb::devices().map_err(Error::usb)?;
        let mut matching = Vec::new();
        for device in list.iter() {
            let descr = device.device_descriptor().map_err(Error::usb)?;
            let vid_matches = descr.vendor_id() == url.vendor().unwrap_or(VID_FTDI);
            let pid_matches = match url.product() {
                Some(pid) => descr.product_id() == pid,
                None => PIDS_FTDI.contains(&descr.product_id()),
            };
            if vid_matches && pid_matches {
                matching.push(device);
            }
        }

        log::debug!("{} device(s) match {}", matching.len(), url);

        match url.selector() {
            DeviceSelector::Index(n) => match matching.into_iter().nth(*n) {
                Some(device) => Self::open(device),
                None => Err(Error::new(ErrorKind::NoDeviceFound, url.to_string())),
            },
            DeviceSelector::Serial(serial) => {
                let found = find_by_serial(matching, serial, |device| {
                    let ftdi = Self::open(device)?;
                    let serial = ftdi.serial()?;
                    Ok((ftdi, serial))
                });
                found.ok_or_else(|| Error::new(ErrorKind::NoDeviceFound, url.to_string()))
            }
        }
    }

    fn open(device: rusb::Device<rusb::GlobalContext>) -> Result<Self> {
        log::debug!("Ftdi::open(device = {:?})", device);

        let descr = device.device_descriptor().map_err(Error::usb)?;

        if descr.num_configurations() != 1 {
            log::error!(
                "device has {} configurations, expected 1",
                descr.num_configurations()
            );
            return Err(Error::from_kind(ErrorKind::UnsupportedDevice));
        }

        let conf_descr = device.active_config_descriptor().map_err(Error::usb)?;

        // Every interface must have vendor descriptors and a pair of bulk endpoints.
        let mut endpoints = Vec::new();
        for intf in conf_descr.interfaces() {
            let mut iter = intf.descriptors();
            let descr = match iter.next() {
                Some(descr) => descr,
                None => {
                    log::error!("missing interface descriptor");
                    return Err(Error::from_kind(ErrorKind::UnsupportedDevice));
                }
            };

            if iter.next().is_some() {
                log::error!("found extra interface descriptor");
                return Err(Error::from_kind(ErrorKind::UnsupportedDevice));
            }

            let (mut ep_in, mut ep_out, mut packet_size) = (None, None, 0);
            for ep in descr.endpoint_descriptors() {
                if ep.transfer_type() != rusb::TransferType::Bulk {
                    continue;
                }
                packet_size = ep.max_packet_size();
                match ep.direction() {
                    rusb::Direction::In => ep_in = Some(ep.address()),
                    rusb::Direction::Out => ep_out = Some(ep.address()),
                }
            }

            match (ep_in, ep_out) {
                (Some(ep_in), Some(ep_out)) if packet_size > 2 => endpoints.push(Endpoints {
                    ep_in,
                    ep_out,
                    packet_size,
                }),
                _ => {
                    log::error!(
                        "interface {} lacks a pair of bulk endpoints",
                        descr.interface_number()
                    );
                    return Err(Error::from_kind(ErrorKind::UnsupportedDevice));
                }
            }
        }

        let version = descr.device_version();
        if version.minor() != 0 || version.sub_minor() != 0 {
            return Err(Error::from_kind(ErrorKind::UnsupportedDevice));
        }

        let properties = match prop::lookup(version.major()) {
            Some(props) => props,
            None => return Err(Error::from_kind(ErrorKind::UnsupportedDevice)),
        };

        if endpoints.len() != usize::from(properties.ports) {
            log::error!(
                "device reports {} interfaces, expected {}",
                endpoints.len(),
                properties.ports
            );
            return Err(Error::from_kind(ErrorKind::UnsupportedDevice));
        }

        if !properties.bitbang {
            log::error!("{} has no bit-bang mode", properties.model);
            return Err(Error::from_kind(ErrorKind::UnsupportedDevice));
        }

        let device = device.open().map_err(|e| {
            if cfg!(windows) && matches!(e, rusb::Error::NotSupported | rusb::Error::NotFound) {
                // Provide a more helpful error message on non-plug-and-play platforms.
                Error::new(
                    ErrorKind::Usb,
                    format!(
                        "{} (this error may be caused by not having the WinUSB driver installed; \
                            use Zadig (https://zadig.akeo.ie/) to install it for the FTDI device; \
                            this will replace any existing driver)",
                        e
                    ),
                )
            } else {
                Error::new(ErrorKind::Usb, e)
            }
        })?;

        Ok(Self {
            device: Rc::new(RefCell::new(device)),
            properties,
            timeout: Self::DEFAULT_TIMEOUT,
            endpoints,
        })
    }

    fn dev(&self) -> RefMut<'_, rusb::DeviceHandle<rusb::GlobalContext>> {
        self.device.borrow_mut()
    }

    /// Reads the serial number string from the device.
    pub fn serial(&self) -> Result<String> {
        let dev = self.dev();
        let descr = dev.device().device_descriptor().map_err(Error::usb)?;
        dev.read_serial_number_string_ascii(&descr)
            .map_err(Error::usb)
    }

    /// Returns the FTDI model identification.
    ///
    /// This is looked up using the version reported by the device, which uniquely identifies
    /// different generations of products.
    pub fn model(&self) -> &str {
        self.properties.model
    }

    /// Returns the number of ports this device has.
    pub fn num_ports(&self) -> u8 {
        self.properties.ports
    }

    /// Opens a port of this device.
    ///
    /// This will claim the corresponding USB interface and lock it for other applications. The
    /// port is purged and left in UART mode.
    ///
    /// The port will inherit `self`'s USB timeout.
    ///
    /// # Parameters
    ///
    /// * **`port`**: The port index. Must be in range `0..self.num_ports()`, or this method will
    ///   panic.
    pub fn open_port(&self, port: u8) -> Result<Port> {
        assert!(
            port < self.num_ports(),
            "port {} out of range (device only has {})",
            port,
            self.num_ports()
        );

        Port::open(self, port)
    }
}

/// Opens candidates in order until one reports `serial`.
///
/// A candidate that cannot be opened (busy, no permission) is skipped.
fn find_by_serial<D, T>(
    candidates: Vec<D>,
    serial: &str,
    mut open: impl FnMut(D) -> Result<(T, String)>,
) -> Option<T> {
    for candidate in candidates {
        match open(candidate) {
            Ok((found, s)) if s == serial => return Some(found),
            Ok((_, s)) => log::debug!("skipping device with serial number {}", s),
            Err(e) => log::warn!("skipping device that failed to open: {}", e),
        }
    }
    None
}

impl fmt::Debug for Ftdi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ftdi")
            .field("timeout", &self.timeout)
            .field("properties", &self.properties)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}
