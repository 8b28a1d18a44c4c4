//! Bit-bang pin assignment.
//!
//! In bit-bang mode the 8 UART pins of a port become GPIOs D0-D7 (FTDI AN_184). The serial tool's
//! DTR and RTS outputs are remapped onto two of them.

use bitflags::bitflags;

use crate::{Error, ErrorKind, Result};

bitflags! {
    /// The pins of an 8-bit port, named after their UART function.
    pub struct Pins: u8 {
        /// D0.
        const TXD = 1 << 0;
        /// D1.
        const RXD = 1 << 1;
        /// D2.
        const RTS = 1 << 2;
        /// D3.
        const CTS = 1 << 3;
        /// D4.
        const DTR = 1 << 4;
        /// D5.
        const DSR = 1 << 5;
        /// D6.
        const DCD = 1 << 6;
        /// D7.
        const RI = 1 << 7;
    }
}

/// Where the tool's DTR and RTS lines end up in bit-bang mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PinMap {
    dtr_to: Pins,
    rts_to: Pins,
}

impl PinMap {
    /// The wiring of ESP boards strobed through an FTDI cable: DTR drives GPIO0 through the CTS
    /// pin, RTS drives EN through the DTR pin.
    pub const ESP: PinMap = PinMap {
        dtr_to: Pins::CTS,
        rts_to: Pins::DTR,
    };

    /// Creates a mapping, checking that both targets are distinct single pins other than TXD.
    pub fn new(dtr_to: Pins, rts_to: Pins) -> Result<Self> {
        for (line, pin) in &[("DTR", dtr_to), ("RTS", rts_to)] {
            if pin.bits().count_ones() != 1 {
                return Err(Error::new(
                    ErrorKind::InvalidPinMap,
                    format!("{} must map to exactly one pin, got {:?}", line, pin),
                ));
            }
            if pin.contains(Pins::TXD) {
                return Err(Error::new(
                    ErrorKind::InvalidPinMap,
                    format!("{} cannot be mapped onto TXD", line),
                ));
            }
        }

        if dtr_to == rts_to {
            return Err(Error::new(
                ErrorKind::InvalidPinMap,
                format!("DTR and RTS both map to {:?}", dtr_to),
            ));
        }

        Ok(Self { dtr_to, rts_to })
    }

    pub fn dtr_to(&self) -> Pins {
        self.dtr_to
    }

    pub fn rts_to(&self) -> Pins {
        self.rts_to
    }

    /// Pins driven as outputs in bit-bang mode.
    pub fn direction_mask(&self) -> Pins {
        Pins::TXD | self.dtr_to | self.rts_to
    }

    /// Computes the output byte for the given logical line states.
    ///
    /// The lines are active-low, so an asserted line drives its pin low. TXD is always kept high
    /// (UART idle) so the target does not see a start bit.
    pub fn output(&self, dtr: bool, rts: bool) -> Pins {
        let mut out = Pins::TXD;
        if !dtr {
            out |= self.dtr_to;
        }
        if !rts {
            out |= self.rts_to;
        }
        out
    }
}

impl Default for PinMap {
    fn default() -> Self {
        Self::ESP
    }
}
