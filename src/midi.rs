//! MIDI message model, parsing and a small processor pipeline for dispatching messages to
//! the synthesizer and to controller surface adapters.

#[cfg(feature = "midir-input")]
pub mod input;

use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;

use crate::SynthController;

// -------------------------------------------------------------------------------------------------

/// The MIDI channel which carries playing notes.
pub const NOTE_INPUT_CHANNEL: u8 = 1;
/// The MIDI channel which carries controller surface buttons and knobs.
pub const CONTROL_SURFACE_CHANNEL: u8 = 0;

// -------------------------------------------------------------------------------------------------

/// The subset of MIDI messages the synthesizer consumes. All other messages are dropped
/// at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiMessage {
    /// Parse a raw MIDI message. Returns `None` for malformed bytes and for unsupported
    /// message types, which are silently ignored by the input pipeline.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 3 || bytes[1] > 127 || bytes[2] > 127 {
            return None;
        }
        let channel = bytes[0] & 0x0f;
        match bytes[0] & 0xf0 {
            0x90 => Some(Self::NoteOn {
                channel,
                note: bytes[1],
                velocity: bytes[2],
            }),
            0x80 => Some(Self::NoteOff {
                channel,
                note: bytes[1],
            }),
            0xb0 => Some(Self::ControlChange {
                channel,
                controller: bytes[1],
                value: bytes[2],
            }),
            _ => None,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A single stage in the MIDI input pipeline.
///
/// Each incoming message is offered to every registered processor: `matches` filters,
/// `process` consumes. Processors never see messages they did not match.
pub trait MidiProcessor: Send {
    /// Return true if the message should be processed by this processor.
    fn matches(&self, message: &MidiMessage) -> bool;
    /// Process a matched message.
    fn process(&mut self, message: &MidiMessage);
}

/// Shared processors can be registered in a [`MidiDispatcher`] and still be accessed
/// from elsewhere.
impl<P: MidiProcessor> MidiProcessor for Arc<Mutex<P>> {
    fn matches(&self, message: &MidiMessage) -> bool {
        self.lock().unwrap().matches(message)
    }
    fn process(&mut self, message: &MidiMessage) {
        self.lock().unwrap().process(message);
    }
}

// -------------------------------------------------------------------------------------------------

/// Fans incoming MIDI messages out to a list of registered processors.
#[derive(Default)]
pub struct MidiDispatcher {
    processors: Vec<Box<dyn MidiProcessor>>,
}

impl MidiDispatcher {
    /// Create a new dispatcher with an empty processor list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a processor to the pipeline.
    pub fn add_processor(&mut self, processor: impl MidiProcessor + 'static) {
        self.processors.push(Box::new(processor));
    }

    /// Offer a single message to all registered processors.
    pub fn dispatch(&mut self, message: &MidiMessage) {
        for processor in &mut self.processors {
            if processor.matches(message) {
                processor.process(message);
            }
        }
    }

    /// Dispatch all messages arriving on the given channel until all senders are dropped.
    /// This is the main loop of a MIDI worker thread.
    pub fn run(&mut self, receiver: &Receiver<MidiMessage>) {
        while let Ok(message) = receiver.recv() {
            self.dispatch(&message);
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A processor which logs every message, for tracing the MIDI input.
pub struct MidiMessageLogger;

impl MidiProcessor for MidiMessageLogger {
    fn matches(&self, _message: &MidiMessage) -> bool {
        true
    }
    fn process(&mut self, message: &MidiMessage) {
        log::debug!("MIDI: {message:?}");
    }
}

// -------------------------------------------------------------------------------------------------

/// Routes note events from the note input channel into the synthesizer's voice pool.
///
/// Note-ons with velocity 0 are treated as note-offs, as many keyboards send them that way.
pub struct NoteInputProcessor {
    controller: SynthController,
}

impl NoteInputProcessor {
    /// Create a new note processor which plays on the given synthesizer.
    pub fn new(controller: SynthController) -> Self {
        Self { controller }
    }
}

impl MidiProcessor for NoteInputProcessor {
    fn matches(&self, message: &MidiMessage) -> bool {
        matches!(
            message,
            MidiMessage::NoteOn {
                channel: NOTE_INPUT_CHANNEL,
                ..
            } | MidiMessage::NoteOff {
                channel: NOTE_INPUT_CHANNEL,
                ..
            }
        )
    }

    fn process(&mut self, message: &MidiMessage) {
        match *message {
            MidiMessage::NoteOn { note, velocity, .. } => {
                if let Err(err) = self.controller.note_on(note, velocity) {
                    log::warn!("Failed to strike note {note}: {err}");
                }
            }
            MidiMessage::NoteOff { note, .. } => {
                self.controller.note_off(note);
            }
            MidiMessage::ControlChange { .. } => {}
        }
    }
}

// -------------------------------------------------------------------------------------------------
