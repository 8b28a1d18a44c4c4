//! The plain FTDI UART connection.

use std::thread;
use std::time::{Duration, Instant};

use crate::bitmode::BitMode;
use crate::port::ResetFlags;
use crate::serial::{FlowControl, ModemStatus, SerialSettings};
use crate::transport::{RawDevice, SerialPort};
use crate::url::FtdiUrl;
use crate::{Error, ErrorKind, Ftdi, Port, Result};

/// A serial connection to one port of an FTDI device, opened from an `ftdi://` URL.
///
/// DTR and RTS drive the chip's own modem control outputs. Both start out deasserted, so DTR# and
/// RTS# stay high in UART mode unless a caller asserts them.
#[derive(Debug)]
pub struct FtdiSerial {
    url: FtdiUrl,
    settings: SerialSettings,
    port: Option<Port>,
    dtr: bool,
    rts: bool,
    break_condition: bool,
}

impl FtdiSerial {
    /// Creates a closed connection. Nothing is accessed until [`SerialPort::open`] is called.
    pub fn new(url: FtdiUrl, settings: SerialSettings) -> Self {
        Self {
            url,
            settings,
            port: None,
            dtr: false,
            rts: false,
            break_condition: false,
        }
    }

    pub fn url(&self) -> &FtdiUrl {
        &self.url
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn port(&mut self) -> Result<&mut Port> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::from_kind(ErrorKind::NotOpen))
    }

    fn modem_status(&mut self) -> Result<ModemStatus> {
        self.port()?.poll_modem_status()
    }

    fn configure(&self, port: &mut Port) -> Result<()> {
        let actual = port.set_baud_rate(self.settings.baud_rate)?;
        if actual != self.settings.baud_rate {
            log::debug!(
                "requested {} baud, running at {}",
                self.settings.baud_rate,
                actual
            );
        }
        port.set_line_properties(
            self.settings.data_bits,
            self.settings.parity,
            self.settings.stop_bits,
            self.break_condition,
        )?;
        port.set_flow_control(FlowControl::Disabled)?;
        port.set_dtr(self.dtr)?;
        port.set_rts(self.rts)?;
        Ok(())
    }
}

impl SerialPort for FtdiSerial {
    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Err(Error::other("port is already open"));
        }

        let ftdi = Ftdi::open_url(&self.url)?;
        if self.url.port_index() >= ftdi.num_ports() {
            return Err(Error::new(
                ErrorKind::InvalidUrl,
                format!(
                    "{} has {} interface(s), `{}` selects interface {}",
                    ftdi.model(),
                    ftdi.num_ports(),
                    self.url,
                    self.url.interface()
                ),
            ));
        }

        let mut port = ftdi.open_port(self.url.port_index())?;
        self.configure(&mut port)?;
        log::info!("opened {} at {} ({} baud)", ftdi.model(), self.url, self.settings.baud_rate);

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::debug!("closed {}", self.url);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        let timeout = self.settings.timeout;
        let port = self.port()?;

        let mut buf = vec![0; size];
        let mut filled = 0;
        let start = Instant::now();
        while filled < size {
            filled += port.read_data(&mut buf[filled..])?;
            match timeout {
                Some(timeout) if filled < size && start.elapsed() >= timeout => break,
                _ => {}
            }
        }

        buf.truncate(filled);
        Ok(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.port()?.write_data(data)
    }

    fn reset_input_buffer(&mut self) -> Result<()> {
        self.port()?.reset(ResetFlags::PURGE_RX)
    }

    fn reset_output_buffer(&mut self) -> Result<()> {
        self.port()?.reset(ResetFlags::PURGE_TX)
    }

    fn send_break(&mut self, duration: Duration) -> Result<()> {
        self.set_break(true)?;
        thread::sleep(duration);
        self.set_break(false)
    }

    fn set_break(&mut self, level: bool) -> Result<()> {
        self.break_condition = level;
        let settings = self.settings.clone();
        self.port()?.set_line_properties(
            settings.data_bits,
            settings.parity,
            settings.stop_bits,
            level,
        )
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.dtr = level;
        match &mut self.port {
            Some(port) => port.set_dtr(level),
            None => Ok(()),
        }
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.rts = level;
        match &mut self.port {
            Some(port) => port.set_rts(level),
            None => Ok(()),
        }
    }

    fn cts(&mut self) -> Result<bool> {
        Ok(self.modem_status()?.contains(ModemStatus::CTS))
    }

    fn dsr(&mut self) -> Result<bool> {
        Ok(self.modem_status()?.contains(ModemStatus::DSR))
    }

    fn ri(&mut self) -> Result<bool> {
        Ok(self.modem_status()?.contains(ModemStatus::RI))
    }

    fn cd(&mut self) -> Result<bool> {
        Ok(self.modem_status()?.contains(ModemStatus::DCD))
    }
}

impl RawDevice for FtdiSerial {
    fn set_bitmode(&mut self, direction_mask: u8, mode: BitMode) -> Result<()> {
        self.port()?.set_bitmode(direction_mask, mode)
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> Result<()> {
        self.port()?.set_flow_control(flow)
    }

    fn set_rts_line(&mut self, level: bool) -> Result<()> {
        self.rts = level;
        self.port()?.set_rts(level)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<usize> {
        self.port()?.write_data(data)
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.port()?.read_data(buf)
    }
}
