//! Renders a short scripted melody into "polyfm-demo.wav", offline and deterministic.

use std::time::Duration;

use polyfm::{AdsrParameters, Synth, SynthConfig, WavOutput, Waveform};

fn main() -> Result<(), polyfm::Error> {
    simple_logger::SimpleLogger::new().init().unwrap();

    let config = SynthConfig::default();
    let output = WavOutput::open("polyfm-demo.wav", config.sample_rate)?;
    let mut synth = Synth::new(output, config, None)?;
    let controller = synth.controller();

    // shape the patch
    controller.set_waveform(0, Waveform::Sine)?;
    controller.set_waveform(1, Waveform::Sine)?;
    controller.set_fm_enabled(true);
    controller.set_modulation_index(2.0)?;
    controller.set_envelope_parameters(&AdsrParameters::new(
        Duration::from_millis(20),
        Duration::from_millis(100),
        0.8,
        Duration::from_millis(300),
        true,
    )?)?;

    // a little arpeggio
    for note in [60u8, 64, 67, 72] {
        controller.note_on(note, 100)?;
        synth.sink_mut().render(Duration::from_millis(400))?;
        controller.note_off(note);
        synth.sink_mut().render(Duration::from_millis(200))?;
    }

    // and a final chord
    for note in [60u8, 64, 67] {
        controller.note_on(note, 100)?;
    }
    synth.sink_mut().render(Duration::from_secs(1))?;
    for note in [60u8, 64, 67] {
        controller.note_off(note);
    }
    synth.sink_mut().render(Duration::from_secs(1))?;

    synth.sink_mut().finalize()?;
    println!("Wrote polyfm-demo.wav");
    Ok(())
}
