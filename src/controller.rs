//! Adapters for a button/knob controller surface (an AKAI APC style pad controller):
//! button dispatch, knob state tracking with LED feedback and the mapping of knobs and
//! buttons onto synthesizer parameters.

pub mod controls;
pub mod dispatch;
pub mod knobs;

use std::sync::{Arc, Mutex};

use strum::{Display, EnumCount, FromRepr};

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Button LED colors of the controller surface. The discriminants are the velocity values
/// the hardware expects in LED note-on messages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumCount, FromRepr)]
#[repr(u8)]
pub enum LedColor {
    #[default]
    Off = 0,
    Green = 1,
    GreenBlink = 2,
    Red = 3,
    RedBlink = 4,
    Yellow = 5,
    YellowBlink = 6,
}

// -------------------------------------------------------------------------------------------------

/// The pluggable LED output of the physical controller surface.
pub trait LedOutput: Send {
    /// Light the LED of the button with the given note in the given color.
    fn set_led(&mut self, note: u8, color: LedColor) -> Result<(), Error>;
}

/// A shared handle to the controller surface's LED output. All panels write their feedback
/// through the same output device.
pub type SharedLedOutput = Arc<Mutex<dyn LedOutput>>;

/// Wrap an LED output impl into a shared handle.
pub fn shared_led_output(led: impl LedOutput + 'static) -> SharedLedOutput {
    Arc::new(Mutex::new(led))
}

// -------------------------------------------------------------------------------------------------

/// An LED output which swallows all updates. Used when running without controller hardware.
pub struct NullLedOutput;

impl LedOutput for NullLedOutput {
    fn set_led(&mut self, _note: u8, _color: LedColor) -> Result<(), Error> {
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_colors_map_to_velocity_codes() {
        assert_eq!(LedColor::Off as u8, 0);
        assert_eq!(LedColor::Green as u8, 1);
        assert_eq!(LedColor::YellowBlink as u8, 6);
        // velocity codes round-trip through the discriminants
        for code in 0..LedColor::COUNT as u8 {
            assert_eq!(LedColor::from_repr(code).unwrap() as u8, code);
        }
        assert_eq!(LedColor::from_repr(7), None);
    }
}
