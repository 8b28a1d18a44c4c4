use crate::bitmode::BitMode;
use crate::pins::PinMap;
use crate::serial::FlowControl;
use crate::transport::RawDevice;
use crate::Result;

/// Tracks whether a port is in UART or bit-bang mode and reprograms it on transitions.
///
/// Ports come out of `open` in [`BitMode::Reset`], which is also the initial state.
#[derive(Debug, Default)]
pub struct ModeSwitch {
    current: BitMode,
}

impl ModeSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> BitMode {
        self.current
    }

    /// Forgets the tracked mode after the port was (re)opened in UART mode.
    pub fn reset(&mut self) {
        self.current = BitMode::Reset;
    }

    /// Switches `device` to `target` unless it is already in that mode.
    ///
    /// Returns whether the device was reprogrammed. Entering bit-bang mode makes TXD and both
    /// remapped pins outputs. Leaving it also disables hardware flow control and deasserts RTS,
    /// since bit-bang mode leaves the handshake state undefined.
    pub fn transition<D>(
        &mut self,
        target: BitMode,
        device: &mut D,
        pins: &PinMap,
    ) -> Result<bool>
    where
        D: RawDevice + ?Sized,
    {
        if self.current == target {
            return Ok(false);
        }

        log::debug!("mode {:?} -> {:?}", self.current, target);
        match target {
            BitMode::Bitbang => {
                device.set_bitmode(pins.direction_mask().bits(), BitMode::Bitbang)?;
            }
            BitMode::Reset => {
                device.set_bitmode(0, BitMode::Reset)?;
                device.set_flow_control(FlowControl::Disabled)?;
                device.set_rts_line(false)?;
            }
        }

        self.current = target;
        Ok(true)
    }
}
