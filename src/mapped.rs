//! DTR/RTS remapping onto bit-bang GPIOs.

use std::time::Duration;

use crate::bitmode::BitMode;
use crate::mode::ModeSwitch;
use crate::pins::PinMap;
use crate::transport::{RawDevice, SerialPort};
use crate::Result;

/// A serial connection whose DTR and RTS lines are driven as GPIOs.
///
/// Setting DTR or RTS switches the wrapped port into bit-bang mode and writes a single byte with
/// the remapped pins (active-low, like the real modem control outputs) and TXD held at its idle
/// level. Every other operation switches back to UART mode first, including the modem status
/// queries, which read UART registers.
///
/// While the connection is closed, line changes are only recorded; they are applied on `open`.
#[derive(Debug)]
pub struct GpioMappedSerial<T> {
    inner: T,
    pins: PinMap,
    mode: ModeSwitch,
    dtr: bool,
    rts: bool,
}

impl<T: SerialPort + RawDevice> GpioMappedSerial<T> {
    /// Wraps `inner`. Both lines start out asserted.
    pub fn new(inner: T, pins: PinMap) -> Self {
        Self {
            inner,
            pins,
            mode: ModeSwitch::new(),
            dtr: true,
            rts: true,
        }
    }

    pub fn pins(&self) -> &PinMap {
        &self.pins
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Returns the mode the wrapped port was last switched to.
    pub fn mode(&self) -> BitMode {
        self.mode.current()
    }

    fn ensure_mode(&mut self, mode: BitMode) -> Result<()> {
        if !self.inner.is_open() {
            return Ok(());
        }
        self.mode.transition(mode, &mut self.inner, &self.pins)?;
        Ok(())
    }

    fn update_gpio_state(&mut self) -> Result<()> {
        if !self.inner.is_open() {
            return Ok(());
        }
        self.ensure_mode(BitMode::Bitbang)?;

        let out = self.pins.output(self.dtr, self.rts);
        log::trace!("gpio <- {:#010b} (dtr={}, rts={})", out.bits(), self.dtr, self.rts);
        self.inner.write_raw(&[out.bits()])?;
        Ok(())
    }

    /// Reads whatever is buffered right now, one byte at a time, until a read comes back empty.
    fn drain(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut byte = [0];
        while self.inner.read_raw(&mut byte)? != 0 {
            buf.push(byte[0]);
        }
        Ok(buf)
    }
}

impl<T: SerialPort + RawDevice> SerialPort for GpioMappedSerial<T> {
    fn open(&mut self) -> Result<()> {
        self.inner.open()?;
        self.mode.reset();
        self.update_gpio_state()
    }

    fn close(&mut self) {
        self.inner.close();
        self.mode.reset();
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Reads up to `size` bytes.
    ///
    /// A `size` of 0 drains the receive buffer instead of blocking, returning everything that is
    /// available (possibly nothing).
    fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        self.ensure_mode(BitMode::Reset)?;
        if size == 0 {
            self.drain()
        } else {
            self.inner.read(size)
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_mode(BitMode::Reset)?;
        self.inner.write(data)
    }

    fn reset_input_buffer(&mut self) -> Result<()> {
        self.ensure_mode(BitMode::Reset)?;
        self.inner.reset_input_buffer()
    }

    fn reset_output_buffer(&mut self) -> Result<()> {
        self.ensure_mode(BitMode::Reset)?;
        self.inner.reset_output_buffer()
    }

    fn send_break(&mut self, duration: Duration) -> Result<()> {
        self.ensure_mode(BitMode::Reset)?;
        self.inner.send_break(duration)
    }

    fn set_break(&mut self, level: bool) -> Result<()> {
        self.ensure_mode(BitMode::Reset)?;
        self.inner.set_break(level)
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.dtr = level;
        self.update_gpio_state()
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.rts = level;
        self.update_gpio_state()
    }

    fn cts(&mut self) -> Result<bool> {
        self.ensure_mode(BitMode::Reset)?;
        self.inner.cts()
    }

    fn dsr(&mut self) -> Result<bool> {
        self.ensure_mode(BitMode::Reset)?;
        self.inner.dsr()
    }

    fn ri(&mut self) -> Result<bool> {
        self.ensure_mode(BitMode::Reset)?;
        self.inner.ri()
    }

    fn cd(&mut self) -> Result<bool> {
        self.ensure_mode(BitMode::Reset)?;
        self.inner.cd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockDevice};
    use crate::pins::Pins;
    use crate::serial::{FlowControl, ModemStatus};
    use crate::ErrorKind;

    fn opened() -> GpioMappedSerial<MockDevice> {
        let mut port = GpioMappedSerial::new(MockDevice::default(), PinMap::ESP);
        port.open().unwrap();
        port.get_mut().calls.clear();
        port
    }

    #[test]
    fn open_applies_line_state() {
        let mut port = GpioMappedSerial::new(MockDevice::default(), PinMap::ESP);
        port.set_dtr(false).unwrap();
        assert!(port.get_ref().calls.is_empty());

        port.open().unwrap();
        assert_eq!(
            port.get_ref().calls,
            vec![
                Call::Open,
                Call::SetBitmode(0b0001_1001, BitMode::Bitbang),
                Call::WriteRaw(vec![(Pins::TXD | Pins::CTS).bits()]),
            ]
        );
        assert_eq!(port.mode(), BitMode::Bitbang);
    }

    #[test]
    fn closed_port_ignores_line_changes() {
        let mut port = GpioMappedSerial::new(MockDevice::default(), PinMap::ESP);
        port.set_dtr(false).unwrap();
        port.set_rts(false).unwrap();
        assert!(port.get_ref().calls.is_empty());
        assert_eq!(port.mode(), BitMode::Reset);
    }

    #[test]
    fn line_changes_write_active_low_bytes() {
        let mut port = opened();
        port.set_dtr(false).unwrap();
        port.set_rts(true).unwrap();
        port.set_rts(false).unwrap();
        port.set_dtr(true).unwrap();
        port.set_rts(true).unwrap();

        assert_eq!(
            port.get_ref().gpio_writes(),
            vec![0b0000_1001, 0b0000_1001, 0b0001_1001, 0b0001_0001, 0b0000_0001]
        );
        // Already in bit-bang mode since `open`.
        assert_eq!(port.get_ref().bitmode_calls(), 0);
    }

    #[test]
    fn txd_stays_idle_for_any_line_sequence() {
        let mut port = opened();
        let levels = [true, false, false, true, true, false, true, true];
        for (i, &level) in levels.iter().enumerate() {
            if i % 3 == 0 {
                port.set_rts(level).unwrap();
            } else {
                port.set_dtr(level).unwrap();
            }
            port.write(b"x").unwrap();
        }

        let writes = port.get_ref().gpio_writes();
        assert_eq!(writes.len(), levels.len());
        assert!(writes.iter().all(|b| b & Pins::TXD.bits() != 0));
    }

    #[test]
    fn repeated_line_state_still_writes() {
        let mut port = opened();
        port.set_dtr(true).unwrap();
        port.set_dtr(true).unwrap();
        assert_eq!(port.get_ref().gpio_writes(), vec![0b0000_0001, 0b0000_0001]);
    }

    #[test]
    fn data_operations_return_to_uart_once() {
        let mut port = opened();
        port.write(b"sync").unwrap();
        port.reset_input_buffer().unwrap();
        port.reset_output_buffer().unwrap();

        assert_eq!(
            port.get_ref().calls,
            vec![
                Call::SetBitmode(0, BitMode::Reset),
                Call::SetFlowControl(FlowControl::Disabled),
                Call::SetRtsLine(false),
                Call::Write(b"sync".to_vec()),
                Call::ResetInput,
                Call::ResetOutput,
            ]
        );
        assert_eq!(port.mode(), BitMode::Reset);
    }

    #[test]
    fn break_goes_through_uart() {
        let mut port = opened();
        port.send_break(Duration::from_millis(250)).unwrap();
        port.set_break(false).unwrap();

        let calls = &port.get_ref().calls;
        assert_eq!(calls[0], Call::SetBitmode(0, BitMode::Reset));
        assert_eq!(
            &calls[3..],
            &[
                Call::SendBreak(Duration::from_millis(250)),
                Call::SetBreak(false)
            ]
        );
    }

    #[test]
    fn status_queries_force_uart_mode() {
        let mut port = opened();
        port.get_mut().status = Some(ModemStatus::CTS | ModemStatus::DCD);

        type Port = GpioMappedSerial<MockDevice>;
        let queries: [fn(&mut Port) -> Result<bool>; 4] = [
            <Port as SerialPort>::cts,
            <Port as SerialPort>::dsr,
            <Port as SerialPort>::ri,
            <Port as SerialPort>::cd,
        ];

        for query in &queries {
            port.set_rts(false).unwrap();
            assert_eq!(port.mode(), BitMode::Bitbang);
            port.get_mut().calls.clear();

            query(&mut port).unwrap();
            assert_eq!(port.get_ref().calls[0], Call::SetBitmode(0, BitMode::Reset));
            assert_eq!(port.get_ref().calls.last(), Some(&Call::Status));
        }

        assert!(port.cts().unwrap());
        assert!(!port.dsr().unwrap());
        assert!(!port.ri().unwrap());
        assert!(port.cd().unwrap());
    }

    #[test]
    fn zero_sized_read_drains_buffer() {
        let mut port = opened();
        port.get_mut().rx.extend(b"ets Jun  8 2016");

        let data = port.read(0).unwrap();
        assert_eq!(data, b"ets Jun  8 2016");

        let raw_reads = port
            .get_ref()
            .calls
            .iter()
            .filter(|c| **c == Call::ReadRaw)
            .count();
        // One read per byte plus the empty one that ends the drain.
        assert_eq!(raw_reads, data.len() + 1);
        assert!(!port.get_ref().calls.contains(&Call::Read(0)));

        assert!(port.read(0).unwrap().is_empty());
    }

    #[test]
    fn sized_read_delegates() {
        let mut port = opened();
        port.get_mut().rx.extend(b"abcdef");

        assert_eq!(port.read(4).unwrap(), b"abcd");
        assert!(port.get_ref().calls.contains(&Call::Read(4)));
        assert!(!port.get_ref().calls.contains(&Call::ReadRaw));
    }

    #[test]
    fn closed_port_errors_propagate() {
        let mut port = GpioMappedSerial::new(MockDevice::default(), PinMap::ESP);
        assert_eq!(port.write(b"x").unwrap_err().kind(), ErrorKind::NotOpen);
        assert_eq!(port.cts().unwrap_err().kind(), ErrorKind::NotOpen);
        assert!(port.get_ref().bitmode_calls() == 0);
    }

    #[test]
    fn reopen_restarts_in_uart_mode() {
        let mut port = opened();
        port.set_rts(false).unwrap();
        port.close();
        assert_eq!(port.mode(), BitMode::Reset);

        port.get_mut().calls.clear();
        port.open().unwrap();
        assert_eq!(
            port.get_ref().calls,
            vec![
                Call::Open,
                Call::SetBitmode(0b0001_1001, BitMode::Bitbang),
                Call::WriteRaw(vec![0b0001_0001]),
            ]
        );
    }
}
