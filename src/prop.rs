//! Device property database.

#[derive(Debug)]
pub(crate) struct DeviceProps {
    /// Device model name.
    pub model: &'static str,
    /// Number of ports (USB interfaces).
    pub ports: u8,
    /// Whether this is a high-speed `-H` device.
    ///
    /// These have a 120 MHz baud rate clock in addition to the 48 MHz one.
    pub hi_speed: bool,
    /// Whether the port supports asynchronous bit-bang mode.
    pub bitbang: bool,
}

impl DeviceProps {
    /// Whether the baud rate divisor's `wIndex` must carry the interface number.
    pub fn multi_port(&self) -> bool {
        self.ports > 1
    }
}

/// Map from `bcdDevice` major version to the device properties (or `None` if that version does not
/// correspond to a known device).
pub(crate) static DEVICES: &[Option<DeviceProps>] = &[
    None, // 0.00
    None, // 1.00
    // 2.00
    Some(DeviceProps {
        model: "FT232AM",
        ports: 1,
        hi_speed: false,
        bitbang: false,
    }),
    None, // 3.00
    // 4.00
    Some(DeviceProps {
        model: "FT232BM",
        ports: 1,
        hi_speed: false,
        bitbang: true,
    }),
    // 5.00
    Some(DeviceProps {
        model: "FT2232C",
        ports: 2,
        hi_speed: false,
        bitbang: true,
    }),
    // 6.00
    Some(DeviceProps {
        model: "FT232R",
        ports: 1,
        hi_speed: false,
        bitbang: true,
    }),
    // 7.00
    Some(DeviceProps {
        model: "FT2232H",
        ports: 2,
        hi_speed: true,
        bitbang: true,
    }),
    // 8.00
    Some(DeviceProps {
        model: "FT4232H",
        ports: 4,
        hi_speed: true,
        bitbang: true,
    }),
    // 9.00
    Some(DeviceProps {
        model: "FT232H",
        ports: 1,
        hi_speed: true,
        bitbang: true,
    }),
    // 10.00
    Some(DeviceProps {
        model: "FT-X",
        ports: 1,
        hi_speed: false,
        bitbang: true,
    }),
];

/// Looks up the properties of a device from its `bcdDevice` major version.
pub(crate) fn lookup(major: u8) -> Option<&'static DeviceProps> {
    DEVICES.get(usize::from(major)).and_then(Option::as_ref)
}
