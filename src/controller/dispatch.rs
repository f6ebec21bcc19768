use crate::{
    controller::{LedColor, SharedLedOutput},
    midi::{MidiMessage, MidiProcessor, CONTROL_SURFACE_CHANNEL},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Routes button presses and releases of the controller surface to registered listeners
/// and drives the button LEDs.
///
/// Buttons arrive as note events on the control surface MIDI channel: the 40 pads of the
/// grid on notes 0..=39 and the function button bank on notes 64..=71. The panel owns its
/// listener lists; listeners receive plain button notes and hold no handle back to the
/// panel.
pub struct DispatchPanel {
    led: SharedLedOutput,
    pressed_listeners: Vec<Box<dyn FnMut(u8) + Send>>,
    released_listeners: Vec<Box<dyn FnMut(u8) + Send>>,
}

impl DispatchPanel {
    /// Create a new dispatch panel writing LED feedback to the given output.
    pub fn new(led: SharedLedOutput) -> Self {
        Self {
            led,
            pressed_listeners: Vec::new(),
            released_listeners: Vec::new(),
        }
    }

    /// Returns true for notes which address a button on the surface.
    pub fn is_button(note: u8) -> bool {
        note <= 39 || (64..=71).contains(&note)
    }

    /// Light a button's LED. Fails for notes which address no button.
    pub fn set_color(&self, note: u8, color: LedColor) -> Result<(), Error> {
        if !Self::is_button(note) {
            return Err(Error::ParameterError(format!(
                "Invalid button note: {note}"
            )));
        }
        self.led.lock().unwrap().set_led(note, color)
    }

    /// Register a listener for button presses.
    pub fn add_button_pressed_listener(&mut self, listener: impl FnMut(u8) + Send + 'static) {
        self.pressed_listeners.push(Box::new(listener));
    }

    /// Register a listener for button releases.
    pub fn add_button_released_listener(&mut self, listener: impl FnMut(u8) + Send + 'static) {
        self.released_listeners.push(Box::new(listener));
    }
}

impl MidiProcessor for DispatchPanel {
    fn matches(&self, message: &MidiMessage) -> bool {
        match *message {
            MidiMessage::NoteOn { channel, note, .. }
            | MidiMessage::NoteOff { channel, note } => {
                channel == CONTROL_SURFACE_CHANNEL && Self::is_button(note)
            }
            MidiMessage::ControlChange { .. } => false,
        }
    }

    fn process(&mut self, message: &MidiMessage) {
        match *message {
            MidiMessage::NoteOn { note, .. } => {
                for listener in &mut self.pressed_listeners {
                    listener(note);
                }
            }
            MidiMessage::NoteOff { note, .. } => {
                for listener in &mut self.released_listeners {
                    listener(note);
                }
            }
            MidiMessage::ControlChange { .. } => {}
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::controller::{shared_led_output, LedOutput, NullLedOutput};

    #[test]
    fn button_notes_are_matched() {
        let panel = DispatchPanel::new(shared_led_output(NullLedOutput));
        let button = |note| MidiMessage::NoteOn {
            channel: 0,
            note,
            velocity: 127,
        };
        assert!(panel.matches(&button(0)));
        assert!(panel.matches(&button(39)));
        assert!(panel.matches(&button(64)));
        assert!(panel.matches(&button(71)));
        assert!(!panel.matches(&button(40)));
        assert!(!panel.matches(&button(63)));
        assert!(!panel.matches(&button(127)));
        // playing notes are on another channel
        assert!(!panel.matches(&MidiMessage::NoteOn {
            channel: 1,
            note: 30,
            velocity: 127
        }));
    }

    #[test]
    fn presses_and_releases_reach_listeners() {
        let mut panel = DispatchPanel::new(shared_led_output(NullLedOutput));
        let pressed = Arc::new(Mutex::new(Vec::new()));
        let released = Arc::new(Mutex::new(Vec::new()));
        panel.add_button_pressed_listener({
            let pressed = Arc::clone(&pressed);
            move |note| pressed.lock().unwrap().push(note)
        });
        panel.add_button_released_listener({
            let released = Arc::clone(&released);
            move |note| released.lock().unwrap().push(note)
        });

        panel.process(&MidiMessage::NoteOn {
            channel: 0,
            note: 21,
            velocity: 127,
        });
        panel.process(&MidiMessage::NoteOff {
            channel: 0,
            note: 21,
        });

        assert_eq!(*pressed.lock().unwrap(), vec![21]);
        assert_eq!(*released.lock().unwrap(), vec![21]);
    }

    #[test]
    fn led_colors_are_validated() {
        struct Recorder(Arc<Mutex<Vec<(u8, LedColor)>>>);
        impl LedOutput for Recorder {
            fn set_led(&mut self, note: u8, color: LedColor) -> Result<(), Error> {
                self.0.lock().unwrap().push((note, color));
                Ok(())
            }
        }

        let recorded = Arc::new(Mutex::new(Vec::new()));
        let panel = DispatchPanel::new(shared_led_output(Recorder(Arc::clone(&recorded))));
        panel.set_color(22, LedColor::Green).unwrap();
        panel.set_color(64, LedColor::Red).unwrap();
        assert!(panel.set_color(50, LedColor::Green).is_err());
        assert_eq!(
            *recorded.lock().unwrap(),
            vec![(22, LedColor::Green), (64, LedColor::Red)]
        );
    }
}
