//! The seams between serial tools, the GPIO adapter, and the FTDI device.

use std::time::Duration;

use crate::bitmode::BitMode;
use crate::serial::FlowControl;
use crate::Result;

/// A serial connection as seen by a flashing or monitoring tool.
///
/// Control line setters take the logical ("asserted") state of the line.
pub trait SerialPort {
    /// Opens the connection. Control line states set before opening are applied now.
    fn open(&mut self) -> Result<()>;

    /// Closes the connection. Closing a closed connection does nothing.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Reads up to `size` bytes, blocking until they arrived or the read timeout elapsed.
    fn read(&mut self, size: usize) -> Result<Vec<u8>>;

    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Discards data received but not yet read.
    fn reset_input_buffer(&mut self) -> Result<()>;

    /// Discards data written but not yet transmitted.
    fn reset_output_buffer(&mut self) -> Result<()>;

    /// Holds the TX line in the break condition for `duration`.
    fn send_break(&mut self, duration: Duration) -> Result<()>;

    /// Enters or leaves the break condition.
    fn set_break(&mut self, level: bool) -> Result<()>;

    fn set_dtr(&mut self, level: bool) -> Result<()>;

    fn set_rts(&mut self, level: bool) -> Result<()>;

    /// Clear To Send.
    fn cts(&mut self) -> Result<bool>;

    /// Data Set Ready.
    fn dsr(&mut self) -> Result<bool>;

    /// Ring Indicator.
    fn ri(&mut self) -> Result<bool>;

    /// Carrier Detect.
    fn cd(&mut self) -> Result<bool>;
}

/// Raw access below the serial abstraction, needed to drive pins in bit-bang mode.
pub trait RawDevice {
    /// Programs pin directions and operating mode.
    fn set_bitmode(&mut self, direction_mask: u8, mode: BitMode) -> Result<()>;

    /// Programs the UART's hardware handshake.
    fn set_flow_control(&mut self, flow: FlowControl) -> Result<()>;

    /// Drives the UART's own RTS output, bypassing any remapping.
    fn set_rts_line(&mut self, level: bool) -> Result<()>;

    /// Writes bytes to the data endpoint without any mode handling.
    fn write_raw(&mut self, data: &[u8]) -> Result<usize>;

    /// Performs one low-level read. Returns 0 when nothing is buffered.
    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize>;
}
