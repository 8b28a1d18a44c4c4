//! DTR/RTS reset sequences for ESP chips.
//!
//! Development boards wire RTS to the chip's EN (reset) input and DTR to GPIO0, which the ROM
//! bootloader samples when leaving reset. Both lines are active-low: asserting RTS holds the chip
//! in reset, asserting DTR pulls GPIO0 low.

use std::str::FromStr;
use std::thread;
use std::time::Duration;

use crate::transport::SerialPort;
use crate::{Error, ErrorKind, Result};

/// How long EN is held low.
const RESET_PULSE: Duration = Duration::from_millis(100);

/// How long GPIO0 is held low after EN was released.
pub const DEFAULT_BOOT_DELAY: Duration = Duration::from_millis(50);

/// Resets the chip into the ROM's serial download mode.
pub fn classic_reset(port: &mut dyn SerialPort, boot_delay: Duration) -> Result<()> {
    log::debug!("resetting into download mode");
    port.set_dtr(false)?; // GPIO0 high
    port.set_rts(true)?; // EN low, chip in reset
    thread::sleep(RESET_PULSE);
    port.set_dtr(true)?; // GPIO0 low
    port.set_rts(false)?; // EN high, chip out of reset
    thread::sleep(boot_delay);
    port.set_dtr(false)?; // GPIO0 high, done
    Ok(())
}

/// Resets the chip into the application in flash.
///
/// GPIO0 is released first, or the ROM would enter download mode again.
pub fn hard_reset(port: &mut dyn SerialPort) -> Result<()> {
    log::debug!("hard resetting");
    port.set_dtr(false)?;
    port.set_rts(true)?;
    thread::sleep(RESET_PULSE);
    port.set_rts(false)?;
    Ok(())
}

/// What to do before talking to the chip.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Before {
    DefaultReset,
    NoReset,
}

/// What to do when done.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum After {
    HardReset,
    NoReset,
}

impl Before {
    pub const VARIANTS: &'static [&'static str] = &["default_reset", "no_reset"];

    pub fn apply(self, port: &mut dyn SerialPort) -> Result<()> {
        match self {
            Before::DefaultReset => classic_reset(port, DEFAULT_BOOT_DELAY),
            Before::NoReset => Ok(()),
        }
    }
}

impl After {
    pub const VARIANTS: &'static [&'static str] = &["hard_reset", "no_reset"];

    pub fn apply(self, port: &mut dyn SerialPort) -> Result<()> {
        match self {
            After::HardReset => hard_reset(port),
            After::NoReset => Ok(()),
        }
    }
}

impl FromStr for Before {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default_reset" => Ok(Before::DefaultReset),
            "no_reset" => Ok(Before::NoReset),
            _ => Err(Error::new(
                ErrorKind::Usage,
                format!("invalid --before value `{}`", s),
            )),
        }
    }
}

impl FromStr for After {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hard_reset" => Ok(After::HardReset),
            "no_reset" => Ok(After::NoReset),
            _ => Err(Error::new(
                ErrorKind::Usage,
                format!("invalid --after value `{}`", s),
            )),
        }
    }
}
