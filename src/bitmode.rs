/// Operating modes a port is switched between.
///
/// FTDI chips know more modes (MPSSE, synchronous bit-bang, FIFO modes, ...), but only these two
/// are needed to toggle GPIO strobes next to a UART.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(u8)]
pub enum BitMode {
    /// RS-232 to USB converter mode, the default after reset.
    Reset = 0x00,
    /// Asynchronous bit-bang mode: bytes written to the port are latched onto the pins.
    Bitbang = 0x01,
}

impl BitMode {
    /// Encodes the `wValue` of a `SetBitmode` request.
    ///
    /// The low byte is the pin direction mask (1 = output), the high byte selects the mode.
    pub(crate) fn request_value(self, direction_mask: u8) -> u16 {
        u16::from(self as u8) << 8 | u16::from(direction_mask)
    }
}

impl Default for BitMode {
    fn default() -> Self {
        BitMode::Reset
    }
}
