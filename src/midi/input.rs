//! MIDI transport impl using [midir](https://github.com/Boddlnagg/midir): forwards parsed
//! messages from a hardware input port into a channel and drives controller LEDs through a
//! hardware output port.

use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::{
    controller::{LedColor, LedOutput},
    midi::MidiMessage,
    Error,
};

// -------------------------------------------------------------------------------------------------

const CLIENT_NAME: &str = "polyfm";

// -------------------------------------------------------------------------------------------------

/// List the names of all available MIDI input ports.
pub fn input_port_names() -> Result<Vec<String>, Error> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|err| Error::MidiDeviceError(err.to_string()))?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

// -------------------------------------------------------------------------------------------------

/// A connected MIDI input which parses incoming bytes and forwards all supported messages
/// into a channel. Unsupported or malformed messages are dropped silently.
///
/// The connection stays open for the lifetime of this object.
pub struct MidirInput {
    #[allow(dead_code)]
    connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidirInput {
    /// Connect to the first input port whose name starts with the given prefix.
    pub fn connect(port_name_prefix: &str, sender: Sender<MidiMessage>) -> Result<Self, Error> {
        let midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|err| Error::MidiDeviceError(err.to_string()))?;

        let ports = midi_in.ports();
        let (port, port_name) = ports
            .iter()
            .filter_map(|port| {
                let name = midi_in.port_name(port).ok()?;
                name.starts_with(port_name_prefix).then_some((port, name))
            })
            .next()
            .ok_or_else(|| {
                Error::MidiDeviceError(format!(
                    "No MIDI input port starting with '{port_name_prefix}' found"
                ))
            })?;

        log::info!("Using MIDI input port: {port_name}");
        let connection = midi_in
            .connect(
                port,
                CLIENT_NAME,
                move |_timestamp, bytes, _| {
                    if let Some(message) = MidiMessage::from_bytes(bytes) {
                        if sender.send(message).is_err() {
                            log::warn!("MIDI receiver is gone, dropping message");
                        }
                    }
                },
                (),
            )
            .map_err(|err| Error::MidiDeviceError(err.to_string()))?;

        Ok(Self {
            connection,
            port_name,
        })
    }

    /// Name of the connected input port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

// -------------------------------------------------------------------------------------------------

/// Controller surface LED output which sends LED colors as note-on velocities through a
/// MIDI output port.
pub struct MidirLedOutput {
    connection: MidiOutputConnection,
}

impl MidirLedOutput {
    /// Connect to the first output port whose name starts with the given prefix.
    pub fn connect(port_name_prefix: &str) -> Result<Self, Error> {
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|err| Error::MidiDeviceError(err.to_string()))?;

        let ports = midi_out.ports();
        let (port, port_name) = ports
            .iter()
            .filter_map(|port| {
                let name = midi_out.port_name(port).ok()?;
                name.starts_with(port_name_prefix).then_some((port, name))
            })
            .next()
            .ok_or_else(|| {
                Error::MidiDeviceError(format!(
                    "No MIDI output port starting with '{port_name_prefix}' found"
                ))
            })?;

        log::info!("Using MIDI output port: {port_name}");
        let connection = midi_out
            .connect(port, CLIENT_NAME)
            .map_err(|err| Error::MidiDeviceError(err.to_string()))?;
        Ok(Self { connection })
    }
}

impl LedOutput for MidirLedOutput {
    fn set_led(&mut self, note: u8, color: LedColor) -> Result<(), Error> {
        self.connection
            .send(&[0x90, note, color as u8])
            .map_err(|err| Error::MidiDeviceError(err.to_string()))
    }
}
