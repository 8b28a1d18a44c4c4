//! A recording stand-in for an FTDI port.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::bitmode::BitMode;
use crate::pins::PinMap;
use crate::serial::{FlowControl, ModemStatus};
use crate::tool::{OpenOptions, PortFactory};
use crate::transport::{RawDevice, SerialPort};
use crate::{Error, ErrorKind, GpioMappedSerial, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open,
    Close,
    Read(usize),
    Write(Vec<u8>),
    ResetInput,
    ResetOutput,
    SendBreak(Duration),
    SetBreak(bool),
    SetDtr(bool),
    SetRts(bool),
    Status,
    SetBitmode(u8, BitMode),
    SetFlowControl(FlowControl),
    SetRtsLine(bool),
    WriteRaw(Vec<u8>),
    ReadRaw,
}

#[derive(Debug, Default)]
pub struct MockDevice {
    pub calls: Vec<Call>,
    pub open: bool,
    /// Bytes the "target" has sent.
    pub rx: VecDeque<u8>,
    pub status: Option<ModemStatus>,
    /// Bytes the "target" sends each time it leaves reset (EN rising in the ESP wiring).
    pub boot_output: Vec<u8>,
    en_high: bool,
}

impl MockDevice {
    pub fn opened() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    pub fn bitmode_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::SetBitmode(..)))
            .count()
    }

    /// Bytes written through the raw (bit-bang) path.
    pub fn gpio_writes(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::WriteRaw(data) => Some(data.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn check_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::from_kind(ErrorKind::NotOpen))
        }
    }

    fn status(&mut self, flag: ModemStatus) -> Result<bool> {
        self.check_open()?;
        self.calls.push(Call::Status);
        Ok(self.status.unwrap_or_else(ModemStatus::empty).contains(flag))
    }
}

impl SerialPort for MockDevice {
    fn open(&mut self) -> Result<()> {
        self.calls.push(Call::Open);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.calls.push(Call::Close);
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        self.check_open()?;
        self.calls.push(Call::Read(size));
        let n = size.min(self.rx.len());
        Ok(self.rx.drain(..n).collect())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.check_open()?;
        self.calls.push(Call::Write(data.to_vec()));
        Ok(data.len())
    }

    fn reset_input_buffer(&mut self) -> Result<()> {
        self.check_open()?;
        self.calls.push(Call::ResetInput);
        self.rx.clear();
        Ok(())
    }

    fn reset_output_buffer(&mut self) -> Result<()> {
        self.check_open()?;
        self.calls.push(Call::ResetOutput);
        Ok(())
    }

    fn send_break(&mut self, duration: Duration) -> Result<()> {
        self.check_open()?;
        self.calls.push(Call::SendBreak(duration));
        Ok(())
    }

    fn set_break(&mut self, level: bool) -> Result<()> {
        self.check_open()?;
        self.calls.push(Call::SetBreak(level));
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.calls.push(Call::SetDtr(level));
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.calls.push(Call::SetRts(level));
        Ok(())
    }

    fn cts(&mut self) -> Result<bool> {
        self.status(ModemStatus::CTS)
    }

    fn dsr(&mut self) -> Result<bool> {
        self.status(ModemStatus::DSR)
    }

    fn ri(&mut self) -> Result<bool> {
        self.status(ModemStatus::RI)
    }

    fn cd(&mut self) -> Result<bool> {
        self.status(ModemStatus::DCD)
    }
}

impl RawDevice for MockDevice {
    fn set_bitmode(&mut self, direction_mask: u8, mode: BitMode) -> Result<()> {
        self.check_open()?;
        self.calls.push(Call::SetBitmode(direction_mask, mode));
        Ok(())
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> Result<()> {
        self.check_open()?;
        self.calls.push(Call::SetFlowControl(flow));
        Ok(())
    }

    fn set_rts_line(&mut self, level: bool) -> Result<()> {
        self.check_open()?;
        self.calls.push(Call::SetRtsLine(level));
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<usize> {
        self.check_open()?;
        self.calls.push(Call::WriteRaw(data.to_vec()));
        if let Some(&last) = data.last() {
            let en_high = last & PinMap::ESP.rts_to().bits() != 0;
            if en_high && !self.en_high {
                self.rx.extend(&self.boot_output);
            }
            self.en_high = en_high;
        }
        Ok(data.len())
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        self.calls.push(Call::ReadRaw);
        match (buf.first_mut(), self.rx.pop_front()) {
            (Some(slot), Some(byte)) => {
                *slot = byte;
                Ok(1)
            }
            (None, Some(byte)) => {
                self.rx.push_front(byte);
                Ok(0)
            }
            (_, None) => Ok(0),
        }
    }
}

/// A port handed out by [`MockFactory`], shared with the test that inspects it.
#[derive(Debug, Clone)]
pub struct SharedPort(Rc<RefCell<GpioMappedSerial<MockDevice>>>);

impl SerialPort for SharedPort {
    fn open(&mut self) -> Result<()> {
        self.0.borrow_mut().open()
    }

    fn close(&mut self) {
        self.0.borrow_mut().close()
    }

    fn is_open(&self) -> bool {
        self.0.borrow().is_open()
    }

    fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        self.0.borrow_mut().read(size)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.0.borrow_mut().write(data)
    }

    fn reset_input_buffer(&mut self) -> Result<()> {
        self.0.borrow_mut().reset_input_buffer()
    }

    fn reset_output_buffer(&mut self) -> Result<()> {
        self.0.borrow_mut().reset_output_buffer()
    }

    fn send_break(&mut self, duration: Duration) -> Result<()> {
        self.0.borrow_mut().send_break(duration)
    }

    fn set_break(&mut self, level: bool) -> Result<()> {
        self.0.borrow_mut().set_break(level)
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.0.borrow_mut().set_dtr(level)
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.0.borrow_mut().set_rts(level)
    }

    fn cts(&mut self) -> Result<bool> {
        self.0.borrow_mut().cts()
    }

    fn dsr(&mut self) -> Result<bool> {
        self.0.borrow_mut().dsr()
    }

    fn ri(&mut self) -> Result<bool> {
        self.0.borrow_mut().ri()
    }

    fn cd(&mut self) -> Result<bool> {
        self.0.borrow_mut().cd()
    }
}

/// Hands out GPIO-mapped connections on a single [`MockDevice`].
#[derive(Debug)]
pub struct MockFactory {
    port: Rc<RefCell<GpioMappedSerial<MockDevice>>>,
    requests: RefCell<Vec<(String, OpenOptions)>>,
}

impl Default for MockFactory {
    fn default() -> Self {
        Self {
            port: Rc::new(RefCell::new(GpioMappedSerial::new(
                MockDevice::default(),
                PinMap::ESP,
            ))),
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl MockFactory {
    pub fn with_rx(data: &[u8]) -> Self {
        let this = Self::default();
        this.port.borrow_mut().get_mut().rx.extend(data);
        this
    }

    /// The target answers every release from reset with `data`.
    pub fn with_boot_output(data: &[u8]) -> Self {
        let this = Self::default();
        this.port.borrow_mut().get_mut().boot_output = data.to_vec();
        this
    }

    pub fn calls(&self) -> Vec<Call> {
        self.port.borrow().get_ref().calls.clone()
    }

    pub fn gpio_writes(&self) -> Vec<u8> {
        self.port.borrow().get_ref().gpio_writes()
    }

    pub fn rx_empty(&self) -> bool {
        self.port.borrow().get_ref().rx.is_empty()
    }

    pub fn last_request(&self) -> Option<(String, OpenOptions)> {
        self.requests.borrow().last().cloned()
    }
}

impl PortFactory for MockFactory {
    fn serial_for_url(&self, url: &str, options: &OpenOptions) -> Result<Box<dyn SerialPort>> {
        self.requests
            .borrow_mut()
            .push((url.to_string(), options.clone()));
        let mut port = SharedPort(self.port.clone());
        if !options.do_not_open {
            port.open()?;
        }
        Ok(Box::new(port))
    }
}
