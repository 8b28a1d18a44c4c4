use std::{error, fmt, io};

/// The error type used by this library.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    inner: Option<Box<dyn error::Error + Send + Sync>>,
}

/// List of specific kinds of errors that may occur when using this library.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A USB I/O error was encountered.
    ///
    /// This usually indicates that there is a permission problem, that a driver or another
    /// application is using the device, or that the device was unplugged.
    Usb,

    /// No matching device was found.
    NoDeviceFound,

    /// A device was opened that is incompatible with this library.
    UnsupportedDevice,

    /// An operation that needs an open connection was attempted on a closed one.
    NotOpen,

    /// An `ftdi://` device URL could not be parsed.
    InvalidUrl,

    /// A DTR/RTS remapping targets the TXD pin, more than one pin, or the same pin twice.
    InvalidPinMap,

    /// The command line was missing the tool argument.
    Usage,

    /// The tool to wrap could not be determined from the command line.
    UnknownTool,

    /// The libusb backend could not be loaded.
    UsbBackendMissing,

    /// An I/O error on the host side (stdout, stdin, ...).
    Io,

    /// Other errors that don't fit the other variants.
    Other,
}

impl Error {
    pub(crate) fn new(
        kind: ErrorKind,
        inner: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            inner: Some(inner.into()),
        }
    }

    pub(crate) fn usb(inner: rusb::Error) -> Self {
        Self {
            kind: ErrorKind::Usb,
            inner: Some(Box::new(inner)),
        }
    }

    pub(crate) fn other(inner: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        Self::new(ErrorKind::Other, inner)
    }

    pub(crate) fn from_kind(kind: ErrorKind) -> Self {
        Self { kind, inner: None }
    }

    /// Returns the `ErrorKind` most closely describing this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::new(ErrorKind::Io, e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Usage errors carry the complete message.
        if let (ErrorKind::Usage, Some(inner)) = (self.kind, &self.inner) {
            return write!(f, "{}", inner);
        }

        let msg = match self.kind {
            ErrorKind::Usb => "USB error",
            ErrorKind::NoDeviceFound => "no matching devices found",
            ErrorKind::UnsupportedDevice => "device is not supported",
            ErrorKind::NotOpen => "port is not open",
            ErrorKind::InvalidUrl => "invalid device URL",
            ErrorKind::InvalidPinMap => "invalid pin mapping",
            ErrorKind::Usage => "missing tool argument",
            ErrorKind::UnknownTool => "unable to determine module",
            ErrorKind::UsbBackendMissing => "libusb1 backend was not found",
            ErrorKind::Io => "I/O error",
            ErrorKind::Other => "other error",
        };

        match &self.inner {
            Some(inner) => write!(f, "{}: {}", msg, inner),
            None => f.write_str(msg),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.inner.as_ref().map(|e| &**e as &dyn error::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_inner() {
        let e = Error::new(ErrorKind::UnknownTool, "from `/usr/bin/avrdude`");
        assert_eq!(
            e.to_string(),
            "unable to determine module: from `/usr/bin/avrdude`"
        );
        assert_eq!(e.kind(), ErrorKind::UnknownTool);
    }

    #[test]
    fn usage_is_printed_verbatim() {
        let e = Error::new(ErrorKind::Usage, "Usage: ftdi-strobe <tool> [args...]");
        assert_eq!(e.to_string(), "Usage: ftdi-strobe <tool> [args...]");
    }

    #[test]
    fn io_errors_convert() {
        let e: Error = io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed").into();
        assert_eq!(e.kind(), ErrorKind::Io);
        assert!(error::Error::source(&e).is_some());
    }
}
