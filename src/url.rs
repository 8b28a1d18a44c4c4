//! `ftdi://` device URLs.
//!
//! The format follows the one established by other FTDI tooling:
//!
//! ```text
//! ftdi://[vendor[:product[:index|:serial]]]/interface
//! ```
//!
//! Every device field may be left empty to match any device. `vendor` and `product` are either
//! numbers (decimal or `0x`-prefixed hex) or well-known names such as `ftdi` or `232r`. The
//! interface is 1-based.

use std::{fmt, str::FromStr};

use crate::{Error, ErrorKind, VID_FTDI};

/// Selects one device among several that match the vendor and product IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// The `n`-th matching device, in enumeration order.
    Index(usize),
    /// The device reporting this serial number string.
    Serial(String),
}

/// A parsed `ftdi://` device URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtdiUrl {
    vendor: Option<u16>,
    product: Option<u16>,
    selector: DeviceSelector,
    interface: u8,
}

const SCHEME: &str = "ftdi://";

const PRODUCT_NAMES: &[(&str, u16)] = &[
    ("232", 0x6001),
    ("232r", 0x6001),
    ("232am", 0x6001),
    ("232bm", 0x6001),
    ("2232", 0x6010),
    ("2232c", 0x6010),
    ("2232d", 0x6010),
    ("2232h", 0x6010),
    ("4232", 0x6011),
    ("4232h", 0x6011),
    ("232h", 0x6014),
    ("ft-x", 0x6015),
    ("230x", 0x6015),
    ("231x", 0x6015),
    ("234x", 0x6015),
];

impl FtdiUrl {
    /// Returns the USB vendor ID to match, if restricted.
    pub fn vendor(&self) -> Option<u16> {
        self.vendor
    }

    /// Returns the USB product ID to match, if restricted.
    pub fn product(&self) -> Option<u16> {
        self.product
    }

    /// Returns the selector picking one of the matching devices.
    pub fn selector(&self) -> &DeviceSelector {
        &self.selector
    }

    /// Returns the 1-based interface number.
    pub fn interface(&self) -> u8 {
        self.interface
    }

    /// Returns the 0-based port index corresponding to the interface.
    pub fn port_index(&self) -> u8 {
        self.interface - 1
    }
}

fn invalid(url: &str, why: impl fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidUrl, format!("`{}`: {}", url, why))
}

fn parse_number(s: &str) -> Option<u16> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn parse_vendor(url: &str, s: &str) -> Result<Option<u16>, Error> {
    match s {
        "" => Ok(None),
        "ftdi" => Ok(Some(VID_FTDI)),
        _ => parse_number(s)
            .map(Some)
            .ok_or_else(|| invalid(url, format_args!("unknown vendor `{}`", s))),
    }
}

fn parse_product(url: &str, s: &str) -> Result<Option<u16>, Error> {
    if s.is_empty() {
        return Ok(None);
    }

    let lower = s.to_ascii_lowercase();
    if let Some((_, pid)) = PRODUCT_NAMES.iter().find(|(name, _)| *name == lower) {
        return Ok(Some(*pid));
    }

    parse_number(s)
        .map(Some)
        .ok_or_else(|| invalid(url, format_args!("unknown product `{}`", s)))
}

impl FromStr for FtdiUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let rest = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid(url, "expected `ftdi://` scheme"))?;

        let slash = rest
            .rfind('/')
            .ok_or_else(|| invalid(url, "missing `/interface`"))?;
        let (device, interface) = (&rest[..slash], &rest[slash + 1..]);

        let interface = match interface.parse::<u8>() {
            Ok(n) if n >= 1 => n,
            _ => {
                return Err(invalid(
                    url,
                    format_args!("interface `{}` is not a number >= 1", interface),
                ))
            }
        };

        let mut fields = device.split(':');
        let vendor = parse_vendor(url, fields.next().unwrap_or(""))?;
        let product = parse_product(url, fields.next().unwrap_or(""))?;
        let selector = match fields.next().unwrap_or("") {
            "" => DeviceSelector::Index(0),
            s if s.bytes().all(|b| b.is_ascii_digit()) => {
                DeviceSelector::Index(s.parse().map_err(|e| invalid(url, e))?)
            }
            s => DeviceSelector::Serial(s.to_string()),
        };

        if fields.next().is_some() {
            return Err(invalid(url, "too many device fields"));
        }

        Ok(Self {
            vendor,
            product,
            selector,
            interface,
        })
    }
}

impl fmt::Display for FtdiUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SCHEME)?;
        if let Some(vid) = self.vendor {
            write!(f, "0x{:04x}", vid)?;
        }
        if let Some(pid) = self.product {
            write!(f, ":0x{:04x}", pid)?;
        }
        match &self.selector {
            DeviceSelector::Index(0) => {}
            DeviceSelector::Index(n) => write!(f, ":{}", n)?,
            DeviceSelector::Serial(s) => write!(f, ":{}", s)?,
        }
        write!(f, "/{}", self.interface)
    }
}
