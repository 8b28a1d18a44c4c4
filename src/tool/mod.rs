//! Serial tools that can be run through the bootstrap.
//!
//! A tool never opens a serial port by itself. It asks the [`PortFactory`] it was started with,
//! passing along whatever port name its command line named, and gets back a connection it can
//! use like a normal serial port. The factory used by the bootstrap, [`FtdiFactory`], ignores the
//! requested name and always hands out a [`GpioMappedSerial`] on its configured FTDI device.

use std::ffi::OsString;
use std::thread;
use std::time::{Duration, Instant};

use structopt::clap;
use structopt::StructOpt;

use crate::pins::PinMap;
use crate::serial::SerialSettings;
use crate::transport::SerialPort;
use crate::uart::FtdiSerial;
use crate::url::FtdiUrl;
use crate::{Error, ErrorKind, GpioMappedSerial, Result};

mod esptool;
mod miniterm;
pub mod reset;

pub use esptool::Esptool;
pub use miniterm::Miniterm;

/// Options for opening a connection through a [`PortFactory`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub settings: SerialSettings,
    /// Return the connection closed, so that line states can be set before opening it.
    pub do_not_open: bool,
}

impl OpenOptions {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            do_not_open: false,
        }
    }
}

/// Creates serial connections for a tool.
pub trait PortFactory {
    /// Returns a connection for the port named `url`.
    fn serial_for_url(&self, url: &str, options: &OpenOptions) -> Result<Box<dyn SerialPort>>;
}

/// A program that can be started by the bootstrap.
pub trait Tool {
    /// Name of the tool. The bootstrap picks the tool whose name occurs in its first argument.
    fn name(&self) -> &'static str;

    /// Runs the tool.
    ///
    /// `args` is the tool's complete argument vector, starting with the tool path, exactly as if
    /// it had been invoked directly.
    fn run(&self, args: Vec<OsString>, ports: &dyn PortFactory) -> Result<()>;
}

/// Returns all tools built into this crate.
pub fn builtin() -> Vec<Box<dyn Tool>> {
    vec![Box::new(Esptool), Box::new(Miniterm)]
}

/// Hands out DTR/RTS-remapped connections on a fixed FTDI device.
#[derive(Debug, Clone)]
pub struct FtdiFactory {
    url: FtdiUrl,
    pins: PinMap,
}

impl FtdiFactory {
    pub fn new(url: FtdiUrl, pins: PinMap) -> Self {
        Self { url, pins }
    }

    pub fn url(&self) -> &FtdiUrl {
        &self.url
    }
}

impl PortFactory for FtdiFactory {
    fn serial_for_url(&self, url: &str, options: &OpenOptions) -> Result<Box<dyn SerialPort>> {
        log::debug!("port `{}` requested, using {}", url, self.url);

        let serial = FtdiSerial::new(self.url.clone(), options.settings.clone());
        let mut port = GpioMappedSerial::new(serial, self.pins);
        if !options.do_not_open {
            port.open()?;
        }
        Ok(Box::new(port))
    }
}

/// Parses a tool's command line.
///
/// Returns `None` if help or version information was requested (and printed).
fn parse_args<O: StructOpt>(args: Vec<OsString>) -> Result<Option<O>> {
    match O::from_iter_safe(args) {
        Ok(opts) => Ok(Some(opts)),
        Err(e) => match e.kind {
            clap::ErrorKind::HelpDisplayed | clap::ErrorKind::VersionDisplayed => {
                println!("{}", e.message);
                Ok(None)
            }
            _ => Err(Error::new(ErrorKind::Usage, e.message)),
        },
    }
}

/// Collects everything the target sends during `duration`.
fn capture(port: &mut dyn SerialPort, duration: Duration) -> Result<Vec<u8>> {
    let start = Instant::now();
    let mut data = Vec::new();
    loop {
        let chunk = port.read(0)?;
        if start.elapsed() >= duration {
            data.extend(chunk);
            return Ok(data);
        }
        if chunk.is_empty() {
            thread::sleep(Duration::from_millis(10));
        }
        data.extend(chunk);
    }
}
