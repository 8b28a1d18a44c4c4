//! UART-mode requests.

use std::time::Duration;

use bitflags::bitflags;

use crate::{ControlReq, Error, ErrorKind, Port, Result};

bitflags! {
    pub struct ModemStatus: u16 {
        /// Clear to send.
        const CTS = 1 << 4;
        /// Data set ready.
        const DSR = 1 << 5;
        /// Ring indicator.
        const RI = 1 << 6;
        /// Data carrier detect.
        const DCD = 1 << 7;
        /// Data ready.
        const DR = 1 << 8;
        /// Overrun error.
        const OE = 1 << 9;
        /// Parity error.
        const PE = 1 << 10;
        /// Framing error.
        const FE = 1 << 11;
        /// Break interrupt.
        const BI = 1 << 12;
        /// Transmitter holding register empty.
        const THRE = 1 << 13;
        /// Transmitter empty.
        const TEMT = 1 << 14;
        /// Error in RECV FIFO.
        const ERR = 1 << 15;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlowControl {
    Disabled,
    RtsCts,
    DtrDsr,
    XonXoff,
}

impl Default for FlowControl {
    fn default() -> Self {
        FlowControl::Disabled
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Parity {
    None = 0x00,
    Odd = 0x01,
    Even = 0x02,
    Mark = 0x03,
    Space = 0x04,
}

impl Default for Parity {
    fn default() -> Self {
        Parity::None
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StopBits {
    Stop1 = 0x00,
    Stop15 = 0x01,
    Stop2 = 0x02,
}

impl Default for StopBits {
    fn default() -> Self {
        StopBits::Stop1
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DataBits {
    Seven = 7,
    Eight = 8,
}

impl Default for DataBits {
    fn default() -> Self {
        DataBits::Eight
    }
}

/// Line configuration applied when a connection is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Read timeout. `None` blocks until the requested number of bytes arrived.
    pub timeout: Option<Duration>,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            timeout: Some(Duration::from_secs(1)),
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
        }
    }
}

const MODEM_CTRL_SET_DTR_HIGH: u16 = 0x0101;
const MODEM_CTRL_SET_DTR_LOW: u16 = 0x0100;
const MODEM_CTRL_SET_RTS_HIGH: u16 = 0x0202;
const MODEM_CTRL_SET_RTS_LOW: u16 = 0x0200;

/// 48 MHz base clock of all chips.
const C_CLK: u32 = 48_000_000;
/// 120 MHz clock of `-H` devices.
const H_CLK: u32 = 120_000_000;

/// Encoded baud rate divisor, split into the `wValue` and `wIndex` of `SetBaudrate`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct BaudDivisor {
    pub value: u16,
    pub index: u16,
    /// Baud rate actually achieved.
    pub actual: u32,
}

/// Finds the divisor closest to `baud` for a clock of `clk / clk_div`.
///
/// Returns the achieved rate and the 17-bit encoded divisor (14 integer bits, 3 fractional bits
/// in a scrambled encoding).
fn clock_bits(baud: u32, clk: u32, clk_div: u32) -> (u32, u32) {
    const FRAC_CODE: [u32; 8] = [0, 3, 2, 4, 1, 5, 6, 7];

    if baud >= clk / clk_div {
        (clk / clk_div, 0)
    } else if baud >= clk / (clk_div + clk_div / 2) {
        (clk / (clk_div + clk_div / 2), 1)
    } else if baud >= clk / (2 * clk_div) {
        (clk / (2 * clk_div), 2)
    } else {
        // All in units of 1/8 of the divisor, rounded to nearest.
        let scaled = u64::from(clk) * 16 / u64::from(clk_div);
        let divisor = scaled / u64::from(baud);
        let best = ((divisor + 1) / 2).min(0x1ffff);
        let achieved = scaled / best;
        let achieved = (achieved + 1) / 2;
        let encoded = (best >> 3) as u32 | FRAC_CODE[(best & 7) as usize] << 14;
        (achieved as u32, encoded)
    }
}

/// Computes the `SetBaudrate` request for a non-AM chip.
///
/// `interface` is the 1-based interface number, which multi-port and `-H` chips expect in the low
/// byte of `wIndex`.
pub(crate) fn baud_divisor(
    baud: u32,
    hi_speed: bool,
    multi_port: bool,
    interface: u8,
) -> Result<BaudDivisor> {
    if baud == 0 {
        return Err(Error::new(ErrorKind::Other, "baud rate must be > 0"));
    }

    let (actual, encoded) = if hi_speed && u64::from(baud) * 10 > u64::from(H_CLK / 0x3fff) {
        let (actual, encoded) = clock_bits(baud, H_CLK, 10);
        (actual, encoded | 0x20000)
    } else {
        clock_bits(baud, C_CLK, 16)
    };

    // Reject rates more than ~5% off.
    let (lo, hi) = (actual.min(baud), actual.max(baud));
    if u64::from(lo) * 21 < u64::from(hi) * 20 {
        return Err(Error::other(format!(
            "unsupported baud rate {} (closest achievable is {})",
            baud, actual
        )));
    }

    let value = (encoded & 0xffff) as u16;
    let index = if hi_speed || multi_port {
        ((encoded >> 8) & 0xff00) as u16 | u16::from(interface)
    } else {
        (encoded >> 16) as u16
    };

    Ok(BaudDivisor {
        value,
        index,
        actual,
    })
}

/// Encodes the `wValue` of a `SetData` request.
pub(crate) fn line_properties(
    bits: DataBits,
    parity: Parity,
    stop: StopBits,
    break_condition: bool,
) -> u16 {
    let bits = bits as u16;
    let parity = parity as u16;
    let stop = stop as u16;
    let break_condition = break_condition as u16;
    bits | parity << 8 | stop << 11 | break_condition << 14
}

/// Functionality available when in serial mode.
impl Port {
    pub fn poll_modem_status(&self) -> Result<ModemStatus> {
        let mut buf = [0; 2];
        self.read_control(ControlReq::PollModemStatus, 0, &mut buf)?;
        Ok(ModemStatus::from_bits_truncate(u16::from_le_bytes(buf)))
    }

    /// Sets or clears the Data Terminal Ready (DTR) bit.
    ///
    /// Note that the DTR output pin is inverted (DTR#), so the pin state will be the opposite of
    /// `dtr`.
    pub fn set_dtr(&mut self, dtr: bool) -> Result<()> {
        let value = if dtr {
            MODEM_CTRL_SET_DTR_HIGH
        } else {
            MODEM_CTRL_SET_DTR_LOW
        };
        self.write_control(ControlReq::SetModemCtrl, value, &[])
    }

    /// Sets or clears the Request To Send (RTS) bit.
    ///
    /// Note that the RTS output pin is inverted (RTS#), so the pin state will be the opposite of
    /// `rts`.
    pub fn set_rts(&mut self, rts: bool) -> Result<()> {
        let value = if rts {
            MODEM_CTRL_SET_RTS_HIGH
        } else {
            MODEM_CTRL_SET_RTS_LOW
        };
        self.write_control(ControlReq::SetModemCtrl, value, &[])
    }

    pub fn set_flow_control(&mut self, flow: FlowControl) -> Result<()> {
        let value = match flow {
            FlowControl::Disabled => 0x0000,
            FlowControl::RtsCts => 0x0100,
            FlowControl::DtrDsr => 0x0200,
            FlowControl::XonXoff => 0x0400,
        };

        // The handshake selection goes into the high byte of `wIndex`.
        let index = value | u16::from(self.index()) + 1;
        self.write_control_indexed(ControlReq::SetFlowCtrl, 0, index, &[])
    }

    pub fn set_line_properties(
        &mut self,
        bits: DataBits,
        parity: Parity,
        stop: StopBits,
        break_condition: bool,
    ) -> Result<()> {
        let value = line_properties(bits, parity, stop, break_condition);
        self.write_control(ControlReq::SetData, value, &[])
    }

    /// Programs the baud rate generator and returns the rate actually achieved.
    pub fn set_baud_rate(&mut self, baud: u32) -> Result<u32> {
        if !self.properties.bitbang {
            // AM chips use a different divisor encoding.
            return Err(Error::from_kind(ErrorKind::UnsupportedDevice));
        }

        let divisor = baud_divisor(
            baud,
            self.properties.hi_speed,
            self.properties.multi_port(),
            self.index() + 1,
        )?;
        log::debug!("baud rate {} -> {:?}", baud, divisor);
        self.write_control_indexed(ControlReq::SetBaudrate, divisor.value, divisor.index, &[])?;
        Ok(divisor.actual)
    }
}
