//! Process entry: picks a tool from the command line and runs it on the FTDI device.
//!
//! ```text
//! ftdi-strobe <path-to-tool> [tool-args...]
//! ```
//!
//! The tool is identified by its name occurring anywhere in the first argument, so both
//! `esptool` and `/home/me/.local/bin/esptool.py` select the `esptool` tool. The tool then sees
//! its arguments exactly as if it had been started directly.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use crate::pins::PinMap;
use crate::tool::{self, FtdiFactory, PortFactory, Tool};
use crate::url::FtdiUrl;
use crate::{Error, ErrorKind, Result};

/// The device connections are redirected to: interface 1 of the first FTDI device.
pub const DEVICE_URL: &str = "ftdi:///1";

/// Environment variable overriding [`DEVICE_URL`].
pub const DEVICE_URL_ENV: &str = "FTDI_STROBE_URL";

/// Checks whether a libusb context can be created.
pub fn probe_usb_backend() -> bool {
    rusb::Context::new().is_ok()
}

/// Selects and runs a tool.
pub struct Bootstrap {
    tools: Vec<Box<dyn Tool>>,
    /// Whether libusb has to be looked up next to the executable (Windows).
    driver_path_fix: bool,
    probe: fn() -> bool,
}

impl Bootstrap {
    /// Creates a bootstrap offering the built-in tools.
    pub fn new() -> Self {
        Self::with_tools(tool::builtin())
    }

    pub fn with_tools(tools: Vec<Box<dyn Tool>>) -> Self {
        Self {
            tools,
            driver_path_fix: cfg!(windows),
            probe: probe_usb_backend,
        }
    }

    /// Overrides whether the executable's directory is added to the library search path, and how
    /// the USB backend is probed afterwards.
    pub fn driver_path_fix(mut self, enabled: bool, probe: fn() -> bool) -> Self {
        self.driver_path_fix = enabled;
        self.probe = probe;
        self
    }

    /// Runs the tool named by `args[1]` with `args[1..]` and connections from `ports`.
    pub fn run<I>(&self, args: I, ports: &dyn PortFactory) -> Result<()>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut args: Vec<OsString> = args.into_iter().collect();
        if args.len() < 2 {
            let argv0 = args
                .first()
                .map(|arg| arg.to_string_lossy().into_owned())
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
            return Err(Error::new(
                ErrorKind::Usage,
                format!("Usage: {} <tool> [args...]", argv0),
            ));
        }

        log::info!("{} wrapper", env!("CARGO_PKG_NAME"));

        if self.driver_path_fix {
            ensure_usb_backend(self.probe)?;
        }

        let tool = self.resolve(&args[1])?;

        // The tool's argv[0] is its own path.
        args.remove(0);
        log::debug!("running {} with {:?}", tool.name(), args);
        tool.run(args, ports)
    }

    fn resolve(&self, arg: &OsString) -> Result<&dyn Tool> {
        let arg = arg.to_string_lossy();
        self.tools
            .iter()
            .find(|tool| arg.contains(tool.name()))
            .map(|tool| &**tool)
            .ok_or_else(|| Error::new(ErrorKind::UnknownTool, format!("from `{}`", arg)))
    }
}

impl fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.tools.iter().map(|tool| tool.name()).collect();
        f.debug_struct("Bootstrap")
            .field("tools", &names)
            .field("driver_path_fix", &self.driver_path_fix)
            .finish()
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

/// Adds the executable's directory to `PATH` and verifies that libusb initializes.
///
/// This only catches failures while initializing libusb at runtime. A `libusb-1.0.dll` that is
/// linked at load time and missing stops the process before `main` runs.
fn ensure_usb_backend(probe: fn() -> bool) -> Result<()> {
    let exe = env::current_exe()?;
    if let Some(dir) = exe.parent() {
        let mut paths: Vec<PathBuf> = env::var_os("PATH")
            .map(|path| env::split_paths(&path).collect())
            .unwrap_or_default();
        paths.push(dir.to_path_buf());
        let joined = env::join_paths(paths).map_err(Error::other)?;
        env::set_var("PATH", joined);
    }

    if probe() {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::UsbBackendMissing,
            "make sure that libusb-1.0.dll is in the program's directory",
        ))
    }
}

/// Reads the device URL from the environment, falling back to [`DEVICE_URL`].
pub fn device_url() -> Result<FtdiUrl> {
    match env::var(DEVICE_URL_ENV) {
        Ok(url) => url.parse(),
        Err(env::VarError::NotPresent) => DEVICE_URL.parse(),
        Err(e) => Err(Error::new(ErrorKind::InvalidUrl, e)),
    }
}

/// Runs the built-in tools on the configured FTDI device with the ESP pin mapping.
pub fn main<I>(args: I) -> Result<()>
where
    I: IntoIterator<Item = OsString>,
{
    let factory = FtdiFactory::new(device_url()?, PinMap::ESP);
    Bootstrap::new().run(args, &factory)
}
