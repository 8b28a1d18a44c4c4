//! Communication with device ports/interfaces.
//!
//! `lib.rs` deals with device discovery and opening, while this module deals with claiming and
//! communicating with individual ports/interfaces of a device.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bitflags::bitflags;

use crate::bitmode::BitMode;
use crate::prop::DeviceProps;
use crate::{ControlReq, Endpoints, Error, Ftdi, Result, UsbHandle, REQ_READ, REQ_WRITE};

bitflags! {
    pub struct ResetFlags: u16 {
        /// Flushes the chip's TX FIFO (host to target).
        const PURGE_TX = 1;
        /// Flushes the chip's RX FIFO (target to host).
        const PURGE_RX = 2;
        const PURGE_RX_TX = 1 | 2;
    }
}

// FIXME: Hack needed since you can't move out of types that impl `Drop`.
struct ReleaseOnDrop {
    /// Port/Interface index (0-based).
    index: u8,
    device: UsbHandle,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        log::debug!("releasing interface {}", self.index);
        self.device.borrow_mut().release_interface(self.index).ok();
    }
}

/// A claimed port on an FTDI device.
///
/// Devices may have anywhere between 1 to 4 ports that can be individually claimed by different
/// applications. A port maps to a USB Interface.
pub struct Port {
    device: ReleaseOnDrop,
    timeout: Duration,
    endpoints: Endpoints,
    pub(crate) properties: &'static DeviceProps,
    /// Payload bytes received in a bulk transfer but not yet handed out.
    pending: VecDeque<u8>,
}

impl Port {
    pub(crate) fn open(parent: &Ftdi, index: u8) -> Result<Self> {
        let endpoints = parent.endpoints[usize::from(index)];

        let mut dev = parent.dev();
        if cfg!(target_os = "linux") && dev.kernel_driver_active(index).unwrap_or(false) {
            log::debug!("detaching kernel driver from interface {}", index);
            dev.detach_kernel_driver(index).map_err(Error::usb)?;
        }
        dev.claim_interface(index).map_err(Error::usb)?;
        drop(dev);

        let mut this = Self {
            device: ReleaseOnDrop {
                device: parent.device.clone(),
                index,
            },
            timeout: parent.timeout,
            endpoints,
            properties: parent.properties,
            pending: VecDeque::new(),
        };

        this.reset(ResetFlags::PURGE_RX_TX)?;
        this.set_bitmode(0, BitMode::Reset)?;

        Ok(this)
    }

    pub(crate) fn read_control(
        &self,
        request: ControlReq,
        value: u16,
        buf: &mut [u8],
    ) -> Result<()> {
        let n = self
            .device
            .device
            .borrow_mut()
            .read_control(
                REQ_READ,
                request as u8,
                value,
                self.w_index(),
                buf,
                self.timeout,
            )
            .map_err(Error::usb)?;
        if n != buf.len() {
            return Err(Error::other(format!(
                "read {} bytes, expected {}",
                n,
                buf.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn write_control(&self, request: ControlReq, value: u16, buf: &[u8]) -> Result<()> {
        self.write_control_indexed(request, value, self.w_index(), buf)
    }

    /// Like `write_control`, but with a caller-provided `wIndex`.
    ///
    /// The baud rate request smuggles divisor bits through the index field.
    pub(crate) fn write_control_indexed(
        &self,
        request: ControlReq,
        value: u16,
        index: u16,
        buf: &[u8],
    ) -> Result<()> {
        log::trace!(
            "control out: req={:?} value={:#06x} index={:#06x}",
            request,
            value,
            index
        );
        let n = self
            .device
            .device
            .borrow_mut()
            .write_control(REQ_WRITE, request as u8, value, index, buf, self.timeout)
            .map_err(Error::usb)?;
        if n != buf.len() {
            return Err(Error::other(format!(
                "wrote {} bytes, expected {}",
                n,
                buf.len()
            )));
        }

        Ok(())
    }

    /// `wIndex` addressing this port: bInterfaceNumber + 1.
    fn w_index(&self) -> u16 {
        u16::from(self.device.index) + 1
    }

    /// Programs the pin directions and operating mode of the port.
    ///
    /// `direction_mask` has a 1 bit for every pin that is to be driven as an output. It is
    /// ignored in [`BitMode::Reset`].
    pub fn set_bitmode(&mut self, direction_mask: u8, mode: BitMode) -> Result<()> {
        log::debug!(
            "port {}: set_bitmode({:?}, mask = {:#010b})",
            self.index(),
            mode,
            direction_mask
        );
        self.write_control(ControlReq::SetBitmode, mode.request_value(direction_mask), &[])
    }

    /// Returns this Port's 0-based index.
    pub fn index(&self) -> u8 {
        self.device.index
    }

    /// Resets the port, optionally purging the RX and/or TX buffer.
    ///
    /// Note that this will not reset all internal state.
    pub fn reset(&mut self, flags: ResetFlags) -> Result<()> {
        if flags.contains(ResetFlags::PURGE_RX) {
            self.pending.clear();
        }
        if flags == ResetFlags::PURGE_RX_TX {
            // Purging both is two requests; value 0 would reset the whole SIO instead.
            self.write_control(ControlReq::Reset, ResetFlags::PURGE_RX.bits(), &[])?;
            return self.write_control(ControlReq::Reset, ResetFlags::PURGE_TX.bits(), &[]);
        }
        self.write_control(ControlReq::Reset, flags.bits(), &[])
    }

    /// Performs a single bulk read and returns the number of payload bytes copied into `buf`.
    ///
    /// Returns 0 when the chip had nothing buffered. Every USB packet the chip sends starts with 2
    /// modem status bytes, which are removed here.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            let packet_size = usize::from(self.endpoints.packet_size);
            let mut raw = vec![0; packet_size * 8];
            let n = match self.device.device.borrow_mut().read_bulk(
                self.endpoints.ep_in,
                &mut raw,
                self.timeout,
            ) {
                Ok(n) => n,
                Err(rusb::Error::Timeout) => 0,
                Err(e) => return Err(Error::usb(e)),
            };

            let payload = strip_modem_status(&mut raw[..n], packet_size);
            self.pending.extend(&raw[..payload]);
        }

        let n = buf.len().min(self.pending.len());
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    /// Writes all of `data` to the bulk OUT endpoint.
    ///
    /// In UART mode the bytes are transmitted on TXD, in bit-bang mode each byte is latched onto
    /// the output pins.
    pub fn write_data(&mut self, data: &[u8]) -> Result<usize> {
        let mut offset = 0;
        while offset < data.len() {
            let n = self
                .device
                .device
                .borrow_mut()
                .write_bulk(self.endpoints.ep_out, &data[offset..], self.timeout)
                .map_err(Error::usb)?;
            if n == 0 {
                return Err(Error::other("device accepted no data"));
            }
            offset += n;
        }
        Ok(offset)
    }
}

/// Removes the 2-byte modem status header from each `packet_size` chunk of a bulk transfer.
///
/// The payload is compacted to the front of `data`. Returns the number of payload bytes.
fn strip_modem_status(data: &mut [u8], packet_size: usize) -> usize {
    let mut write_pos = 0;

    for pkt_start in (0..data.len()).step_by(packet_size) {
        let pkt_end = (pkt_start + packet_size).min(data.len());
        if pkt_end - pkt_start <= 2 {
            continue;
        }

        let payload = pkt_start + 2..pkt_end;
        let len = payload.len();
        data.copy_within(payload, write_pos);
        write_pos += len;
    }

    write_pos
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("index", &self.index())
            .field("model", &self.properties.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}
