//! The complete controller synthesizer: notes and knobs from an AKAI APC Key 25 via MIDI,
//! audio through the default output device, LED feedback on the controller pads.

use std::{
    io::stdin,
    sync::{Arc, Mutex},
    thread,
};

use polyfm::{
    controller::{
        controls::{EnvelopeControls, OperatorControls, WaveControls},
        dispatch::DispatchPanel,
        knobs::{connect_dispatch_buttons, KnobPanel},
        shared_led_output, NullLedOutput, SharedLedOutput,
    },
    midi::{
        input::{input_port_names, MidirInput, MidirLedOutput},
        MidiDispatcher, MidiMessageLogger, NoteInputProcessor,
    },
    CpalOutput, Synth, SynthConfig,
};

const CONTROLLER_NAME: &str = "APC Key 25";

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), polyfm::Error> {
    simple_logger::SimpleLogger::new().init().unwrap();

    println!("Available MIDI inputs: {:?}", input_port_names()?);

    // audio output and synth
    let output = CpalOutput::open()?;
    let mut synth = Synth::new(output, SynthConfig::default(), None)?;

    // controller surface LEDs, when the controller's MIDI output is reachable
    let led: SharedLedOutput = match MidirLedOutput::connect(CONTROLLER_NAME) {
        Ok(led) => shared_led_output(led),
        Err(err) => {
            log::warn!("Running without controller LEDs: {err}");
            shared_led_output(NullLedOutput)
        }
    };

    // panels and parameter controls
    let mut dispatch = DispatchPanel::new(Arc::clone(&led));
    let mut knobs = KnobPanel::new(Arc::clone(&led));
    EnvelopeControls::attach(&mut knobs, synth.controller())?;
    OperatorControls::attach(&mut knobs, synth.controller())?;
    WaveControls::attach(&mut dispatch, synth.controller(), Arc::clone(&led))?;
    let knobs = Arc::new(Mutex::new(knobs));
    connect_dispatch_buttons(&mut dispatch, Arc::clone(&knobs));

    // MIDI input pipeline
    let mut dispatcher = MidiDispatcher::new();
    dispatcher.add_processor(MidiMessageLogger);
    dispatcher.add_processor(NoteInputProcessor::new(synth.controller()));
    dispatcher.add_processor(Arc::new(Mutex::new(dispatch)));
    dispatcher.add_processor(knobs);

    let (midi_send, midi_recv) = crossbeam_channel::unbounded();
    let _input = MidirInput::connect(CONTROLLER_NAME, midi_send)?;
    thread::spawn(move || dispatcher.run(&midi_recv));

    println!("Playing. Press enter to quit...");
    let mut line = String::new();
    stdin().read_line(&mut line).ok();

    synth.close();
    Ok(())
}
