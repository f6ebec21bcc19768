use std::sync::{Arc, Mutex};

use crate::{
    controller::{dispatch::DispatchPanel, LedColor, SharedLedOutput},
    midi::{MidiMessage, MidiProcessor, CONTROL_SURFACE_CHANNEL},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Number of knobs on the controller surface.
pub const KNOB_COUNT: usize = 8;

// -------------------------------------------------------------------------------------------------

/// Tracks the surface's eight knobs and their sync state against internal target values,
/// with LED feedback on the knobs' dispatch buttons.
///
/// Knob hardware only reports absolute positions, and the position is unknown until the
/// knob gets turned for the first time. A knob therefore only writes through to its target
/// value once it is "in sync": the reported position matched the target once, or the user
/// explicitly committed the knob's position by pressing the knob's dispatch button.
///
/// The dispatch button LEDs show the sync state:
///
/// * `Off`: knob position unknown, not in sync
/// * `GreenBlink`: knob position unknown, but the target will follow the next report
/// * `Green`: knob and target are in sync
/// * `Red`: knob position is above the target
/// * `Yellow`: knob position is below the target
///
/// Value listeners get notified whenever a target value changes, with the knob index and
/// the new value.
pub struct KnobPanel {
    led: SharedLedOutput,
    midi_values: [Option<u8>; KNOB_COUNT],
    target_values: [u8; KNOB_COUNT],
    synced: [bool; KNOB_COUNT],
    listeners: Vec<Box<dyn FnMut(usize, u8) + Send>>,
}

impl KnobPanel {
    /// The dispatch button note of each knob, in knob order.
    pub const DISPATCH_NOTES: [u8; KNOB_COUNT] = [36, 37, 38, 39, 28, 29, 30, 31];
    /// The MIDI CC number of each knob, in knob order.
    pub const KNOB_CONTROLS: [u8; KNOB_COUNT] = [48, 49, 50, 51, 52, 53, 54, 55];

    /// Create a new knob panel with all knob positions unknown and all targets at zero.
    pub fn new(led: SharedLedOutput) -> Self {
        let mut panel = Self {
            led,
            midi_values: [None; KNOB_COUNT],
            target_values: [0; KNOB_COUNT],
            synced: [false; KNOB_COUNT],
            listeners: Vec::new(),
        };
        for index in 0..KNOB_COUNT {
            panel.update_led(index);
        }
        panel
    }

    /// The last reported position of a knob, if any.
    pub fn midi_value(&self, index: usize) -> Result<Option<u8>, Error> {
        Self::validate_index(index)?;
        Ok(self.midi_values[index])
    }

    /// The current target value of a knob.
    pub fn target_value(&self, index: usize) -> Result<u8, Error> {
        Self::validate_index(index)?;
        Ok(self.target_values[index])
    }

    /// Returns true when the knob's position writes through to its target value.
    pub fn is_synced(&self, index: usize) -> Result<bool, Error> {
        Self::validate_index(index)?;
        Ok(self.synced[index])
    }

    /// Assign a new target value to a knob, e.g. when a control initializes its defaults.
    /// The knob stays or becomes synced only when its known position matches the value.
    pub fn set_target_value(&mut self, index: usize, value: u8) -> Result<(), Error> {
        Self::validate_index(index)?;
        Self::validate_value(value)?;
        self.synced[index] = self.midi_values[index] == Some(value);
        self.target_values[index] = value;
        self.notify(index, value);
        self.update_led(index);
        Ok(())
    }

    /// Register a listener for target value changes.
    pub fn add_value_listener(&mut self, listener: impl FnMut(usize, u8) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Handle a press of one of the knobs' dispatch buttons: the knob is forced into sync,
    /// committing its current position as target value when the position is known. Other
    /// buttons are ignored.
    pub fn handle_button(&mut self, note: u8) {
        let Some(index) = Self::DISPATCH_NOTES.iter().position(|&n| n == note) else {
            return;
        };
        self.synced[index] = true;
        if let Some(value) = self.midi_values[index] {
            // set_target_value re-derives the sync flag, which holds as midi == value
            if let Err(err) = self.set_target_value(index, value) {
                log::warn!("Failed to commit knob {index} value: {err}");
            }
        } else {
            self.update_led(index);
        }
    }

    /// Track a newly reported knob position. `None` (position unknown) loses sync; a
    /// position equal to the target gains sync; a synced knob writes its position through
    /// to the target value.
    fn update_midi_value(&mut self, index: usize, value: Option<u8>) {
        self.midi_values[index] = value;
        match value {
            None => {
                self.synced[index] = false;
            }
            Some(value) => {
                if !self.synced[index] {
                    self.synced[index] = value == self.target_values[index];
                }
                if self.synced[index] {
                    self.target_values[index] = value;
                    self.notify(index, value);
                }
            }
        }
        self.update_led(index);
    }

    fn notify(&mut self, index: usize, value: u8) {
        for listener in &mut self.listeners {
            listener(index, value);
        }
    }

    fn update_led(&self, index: usize) {
        let color = match self.midi_values[index] {
            None => {
                if self.synced[index] {
                    LedColor::GreenBlink
                } else {
                    LedColor::Off
                }
            }
            Some(midi) if midi > self.target_values[index] => LedColor::Red,
            Some(midi) if midi < self.target_values[index] => LedColor::Yellow,
            Some(_) => LedColor::Green,
        };
        if let Err(err) = self
            .led
            .lock()
            .unwrap()
            .set_led(Self::DISPATCH_NOTES[index], color)
        {
            log::warn!("Failed to update knob {index} LED: {err}");
        }
    }

    fn validate_index(index: usize) -> Result<(), Error> {
        if index >= KNOB_COUNT {
            return Err(Error::ParameterError(format!(
                "Invalid knob index: {index}. Must be in range [0, {}]",
                KNOB_COUNT - 1
            )));
        }
        Ok(())
    }

    fn validate_value(value: u8) -> Result<(), Error> {
        if value > 127 {
            return Err(Error::ParameterError(format!(
                "Invalid knob value: {value}. Must be in range [0, 127]"
            )));
        }
        Ok(())
    }
}

impl MidiProcessor for KnobPanel {
    fn matches(&self, message: &MidiMessage) -> bool {
        matches!(
            message,
            MidiMessage::ControlChange {
                channel: CONTROL_SURFACE_CHANNEL,
                controller,
                ..
            } if Self::KNOB_CONTROLS.contains(controller)
        )
    }

    fn process(&mut self, message: &MidiMessage) {
        if let MidiMessage::ControlChange {
            controller, value, ..
        } = *message
        {
            let index = Self::KNOB_CONTROLS
                .iter()
                .position(|&c| c == controller)
                .expect("Unmatched control change message");
            self.update_midi_value(index, Some(value));
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Forward the dispatch panel's button presses to a shared knob panel, so dispatch button
/// presses can commit knob values.
pub fn connect_dispatch_buttons(dispatch: &mut DispatchPanel, panel: Arc<Mutex<KnobPanel>>) {
    dispatch.add_button_pressed_listener(move |note| panel.lock().unwrap().handle_button(note));
}

// -------------------------------------------------------------------------------------------------
