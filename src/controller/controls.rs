//! Maps the controller surface's knobs and buttons onto synthesizer parameters.

use std::time::Duration;

use crate::{
    controller::{dispatch::DispatchPanel, knobs::KnobPanel, LedColor, SharedLedOutput},
    source::{envelope::AdsrParameters, oscillator::Waveform},
    Error, SynthController,
};

// -------------------------------------------------------------------------------------------------

/// Map of a knob position onto an envelope time.
///
/// The curve is convex: `t = (10 ^ (1.7 · v / 127) - 1) / 9` seconds, which gives fine
/// control over short times and stretches up to roughly 5.5 s at full deflection.
pub fn knob_time(value: u8) -> Duration {
    Duration::from_secs_f64((10f64.powf(1.7 * value as f64 / 127.0) - 1.0) / 9.0)
}

/// Map of a knob position onto the symmetric operator amplitude spread `k` in
/// `[-0.9, 0.9]`, with the center detented at zero.
pub fn knob_amplitude_spread(value: u8) -> f64 {
    if value < 64 {
        -0.9 * (1.0 - value as f64 / 63.0)
    } else {
        0.9 * (value - 64) as f64 / 63.0
    }
}

/// Map of a knob position onto an integer modulation index in `0..=15`.
pub fn knob_modulation_index(value: u8) -> u8 {
    (15 * value as u16 / 127) as u8
}

// -------------------------------------------------------------------------------------------------

/// Binds the envelope knobs (attack, decay, sustain, release) to the synthesizer's
/// envelope parameters.
///
/// Times use the convex [`knob_time`] curve, sustain is linear. The constructor pushes the
/// default patch targets to the knob panel, so the LED feedback reflects the actual
/// envelope right from the start.
pub struct EnvelopeControls {
    attack: Duration,
    decay: Duration,
    sustain: f64,
    release: Duration,
    synth: SynthController,
}

impl EnvelopeControls {
    const ATTACK_KNOB: usize = 4;
    const DECAY_KNOB: usize = 5;
    const SUSTAIN_KNOB: usize = 6;
    const RELEASE_KNOB: usize = 7;

    /// Default patch: attack 0.05 s, decay 0.1 s, sustain 90%, release 0.25 s as knob
    /// positions.
    const DEFAULT_TARGETS: [(usize, u8); 4] = [
        (Self::ATTACK_KNOB, 12),
        (Self::DECAY_KNOB, 21),
        (Self::SUSTAIN_KNOB, 115),
        (Self::RELEASE_KNOB, 39),
    ];

    /// Wire envelope controls up to the given knob panel and synthesizer: pushes the
    /// default patch and registers a knob listener which keeps the envelopes updated.
    pub fn attach(knobs: &mut KnobPanel, synth: SynthController) -> Result<(), Error> {
        let mut controls = Self {
            attack: Duration::ZERO,
            decay: Duration::ZERO,
            sustain: 0.0,
            release: Duration::ZERO,
            synth,
        };
        for (knob, value) in Self::DEFAULT_TARGETS {
            knobs.set_target_value(knob, value)?;
            controls.apply_knob(knob, value);
        }
        controls.push_parameters()?;

        knobs.add_value_listener(move |knob, value| {
            if controls.apply_knob(knob, value) {
                if let Err(err) = controls.push_parameters() {
                    log::warn!("Failed to update envelope parameters: {err}");
                }
            }
        });
        Ok(())
    }

    /// Apply a knob change to the local envelope shape. Returns true when the knob was
    /// one of the envelope knobs.
    fn apply_knob(&mut self, knob: usize, value: u8) -> bool {
        match knob {
            Self::ATTACK_KNOB => self.attack = knob_time(value),
            Self::DECAY_KNOB => self.decay = knob_time(value),
            Self::SUSTAIN_KNOB => self.sustain = value as f64 / 127.0,
            Self::RELEASE_KNOB => self.release = knob_time(value),
            _ => return false,
        }
        true
    }

    fn push_parameters(&self) -> Result<(), Error> {
        let parameters =
            AdsrParameters::new(self.attack, self.decay, self.sustain, self.release, true)?;
        self.synth.set_envelope_parameters(&parameters)
    }
}

// -------------------------------------------------------------------------------------------------

/// Binds the operator balance and modulation index knobs to the synthesizer.
///
/// Knob 0 spreads the two operator amplitudes symmetrically around 1.0, knob 1 sets the
/// integer quantized modulation index.
pub struct OperatorControls {
    synth: SynthController,
}

impl OperatorControls {
    const AMPLITUDE_KNOB: usize = 0;
    const MODULATION_KNOB: usize = 1;

    /// Default patch: centered amplitudes and modulation index 1 as knob positions.
    const DEFAULT_TARGETS: [(usize, u8); 2] =
        [(Self::AMPLITUDE_KNOB, 64), (Self::MODULATION_KNOB, 9)];

    /// Wire the operator knobs up to the given knob panel and synthesizer.
    pub fn attach(knobs: &mut KnobPanel, synth: SynthController) -> Result<(), Error> {
        let mut controls = Self { synth };
        for (knob, value) in Self::DEFAULT_TARGETS {
            knobs.set_target_value(knob, value)?;
            controls.apply_knob(knob, value)?;
        }
        knobs.add_value_listener(move |knob, value| {
            if let Err(err) = controls.apply_knob(knob, value) {
                log::warn!("Failed to update operator parameters: {err}");
            }
        });
        Ok(())
    }

    fn apply_knob(&mut self, knob: usize, value: u8) -> Result<(), Error> {
        match knob {
            Self::AMPLITUDE_KNOB => {
                let spread = knob_amplitude_spread(value);
                self.synth.set_amplitudes([1.0 - spread, 1.0 + spread])
            }
            Self::MODULATION_KNOB => self
                .synth
                .set_modulation_index(knob_modulation_index(value) as f64),
            _ => Ok(()),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Binds the waveform, FM mode and modulation index buttons to the synthesizer, with LED
/// feedback.
///
/// * Buttons 22 and 23 cycle the waveform of operator 0 and 1 through off, sine, sawtooth
///   and square. The button LED shows the current shape (off/green/yellow/red).
/// * Button 21 toggles FM mode: green when enabled, yellow when the operators are mixed.
/// * Buttons 64 and 65 decrement and increment the modulation index, saturating in
///   `0..=15`. Their LEDs turn off at the respective end of the range.
pub struct WaveControls {
    waveforms: [Waveform; 2],
    fm_enabled: bool,
    modulation_index: u8,
    synth: SynthController,
    led: SharedLedOutput,
}

impl WaveControls {
    const WAVE_BUTTONS: [u8; 2] = [22, 23];
    const FM_BUTTON: u8 = 21;
    const MODULATION_DOWN_BUTTON: u8 = 64;
    const MODULATION_UP_BUTTON: u8 = 65;

    const MAX_MODULATION_INDEX: u8 = 15;

    /// Wire the wave buttons up to the given dispatch panel and synthesizer: pushes the
    /// default patch (both operators sine, FM on, modulation index 1) and registers a
    /// button listener.
    pub fn attach(
        dispatch: &mut DispatchPanel,
        synth: SynthController,
        led: SharedLedOutput,
    ) -> Result<(), Error> {
        let mut controls = Self {
            waveforms: [Waveform::Sine; 2],
            fm_enabled: true,
            modulation_index: 1,
            synth,
            led,
        };
        for operator_index in 0..controls.waveforms.len() {
            controls.push_waveform(operator_index)?;
        }
        controls.push_fm_enabled();
        controls.push_modulation_index()?;

        dispatch.add_button_pressed_listener(move |note| controls.handle_button(note));
        Ok(())
    }

    fn handle_button(&mut self, note: u8) {
        let result = match note {
            note if Self::WAVE_BUTTONS.contains(&note) => {
                let operator_index = usize::from(note == Self::WAVE_BUTTONS[1]);
                self.waveforms[operator_index] = self.waveforms[operator_index].cycled();
                self.push_waveform(operator_index)
            }
            Self::FM_BUTTON => {
                self.fm_enabled = !self.fm_enabled;
                self.push_fm_enabled();
                Ok(())
            }
            Self::MODULATION_DOWN_BUTTON => {
                self.modulation_index = self.modulation_index.saturating_sub(1);
                self.push_modulation_index()
            }
            Self::MODULATION_UP_BUTTON => {
                self.modulation_index =
                    (self.modulation_index + 1).min(Self::MAX_MODULATION_INDEX);
                self.push_modulation_index()
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            log::warn!("Failed to apply button {note}: {err}");
        }
    }

    fn push_waveform(&mut self, operator_index: usize) -> Result<(), Error> {
        let waveform = self.waveforms[operator_index];
        self.synth.set_waveform(operator_index, waveform)?;
        self.set_led(Self::WAVE_BUTTONS[operator_index], Self::waveform_color(waveform));
        Ok(())
    }

    fn push_fm_enabled(&mut self) {
        self.synth.set_fm_enabled(self.fm_enabled);
        let color = if self.fm_enabled {
            LedColor::Green
        } else {
            LedColor::Yellow
        };
        self.set_led(Self::FM_BUTTON, color);
    }

    fn push_modulation_index(&mut self) -> Result<(), Error> {
        self.synth
            .set_modulation_index(self.modulation_index as f64)?;
        // show the directions which still have headroom
        let down = if self.modulation_index > 0 {
            LedColor::Red
        } else {
            LedColor::Off
        };
        let up = if self.modulation_index < Self::MAX_MODULATION_INDEX {
            LedColor::Red
        } else {
            LedColor::Off
        };
        self.set_led(Self::MODULATION_DOWN_BUTTON, down);
        self.set_led(Self::MODULATION_UP_BUTTON, up);
        Ok(())
    }

    fn waveform_color(waveform: Waveform) -> LedColor {
        match waveform {
            Waveform::Off => LedColor::Off,
            Waveform::Sine => LedColor::Green,
            Waveform::Sawtooth => LedColor::Yellow,
            Waveform::Square => LedColor::Red,
        }
    }

    fn set_led(&self, note: u8, color: LedColor) {
        if let Err(err) = self.led.lock().unwrap().set_led(note, color) {
            log::warn!("Failed to update LED of button {note}: {err}");
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{
        controller::{shared_led_output, LedOutput, NullLedOutput},
        midi::MidiProcessor,
        output::OutputSink,
        source::BlockSource,
        Synth, SynthConfig,
    };

    struct NullSink;
    impl OutputSink for NullSink {
        fn channel_count(&self) -> usize {
            1
        }
        fn sample_rate(&self) -> u32 {
            44100
        }
        fn play(&mut self, _source: Box<dyn BlockSource>) {}
        fn stop(&mut self) {}
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn close(&mut self) {}
    }

    struct LedRecorder(Arc<Mutex<HashMap<u8, LedColor>>>);
    impl LedOutput for LedRecorder {
        fn set_led(&mut self, note: u8, color: LedColor) -> Result<(), Error> {
            self.0.lock().unwrap().insert(note, color);
            Ok(())
        }
    }

    fn test_synth() -> Synth<NullSink> {
        Synth::new(NullSink, SynthConfig::default(), None).unwrap()
    }

    #[test]
    fn knob_time_curve() {
        assert_eq!(knob_time(0), Duration::ZERO);
        // the default patch positions resolve to the documented times
        assert!((knob_time(12).as_secs_f64() - 0.05).abs() < 0.005);
        assert!((knob_time(21).as_secs_f64() - 0.10).abs() < 0.005);
        assert!((knob_time(39).as_secs_f64() - 0.25).abs() < 0.01);
        // full deflection is roughly 5.5 s
        assert!((knob_time(127).as_secs_f64() - 5.458).abs() < 0.01);
        // the curve is monotonic
        for value in 0..127 {
            assert!(knob_time(value) < knob_time(value + 1));
        }
    }

    #[test]
    fn knob_amplitude_spread_curve() {
        assert!((knob_amplitude_spread(0) + 0.9).abs() < 1e-9);
        assert_eq!(knob_amplitude_spread(63), 0.0);
        assert_eq!(knob_amplitude_spread(64), 0.0);
        assert!((knob_amplitude_spread(127) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn knob_modulation_index_quantization() {
        assert_eq!(knob_modulation_index(0), 0);
        assert_eq!(knob_modulation_index(9), 1);
        assert_eq!(knob_modulation_index(64), 7);
        assert_eq!(knob_modulation_index(127), 15);
    }

    #[test]
    fn envelope_controls_push_the_default_patch() {
        let synth = test_synth();
        let mut knobs = KnobPanel::new(shared_led_output(NullLedOutput));
        EnvelopeControls::attach(&mut knobs, synth.controller()).unwrap();

        // the knob targets carry the default patch
        assert_eq!(knobs.target_value(4).unwrap(), 12);
        assert_eq!(knobs.target_value(6).unwrap(), 115);

        // and the voices got the matching envelope parameters
        let pool = synth.controller().pool();
        let pool = pool.lock().unwrap();
        let parameters = pool.voice(0).unwrap().operator(0).unwrap().envelope_parameters().clone();
        assert!((parameters.attack_time().as_secs_f64() - 0.05).abs() < 0.005);
        assert!((parameters.sustain_level() - 115.0 / 127.0).abs() < 1e-9);
        assert!(parameters.hold());
    }

    #[test]
    fn envelope_controls_follow_knob_changes() {
        let synth = test_synth();
        let mut knobs = KnobPanel::new(shared_led_output(NullLedOutput));
        EnvelopeControls::attach(&mut knobs, synth.controller()).unwrap();

        // commit the attack knob at full deflection
        knobs.handle_button(KnobPanel::DISPATCH_NOTES[4]);
        knobs.process(&crate::midi::MidiMessage::ControlChange {
            channel: 0,
            controller: KnobPanel::KNOB_CONTROLS[4],
            value: 127,
        });

        let pool = synth.controller().pool();
        let pool = pool.lock().unwrap();
        let parameters = pool.voice(0).unwrap().operator(0).unwrap().envelope_parameters().clone();
        assert!((parameters.attack_time().as_secs_f64() - 5.458).abs() < 0.01);
    }

    #[test]
    fn operator_controls_push_amplitudes_and_modulation() {
        let synth = test_synth();
        let mut knobs = KnobPanel::new(shared_led_output(NullLedOutput));
        OperatorControls::attach(&mut knobs, synth.controller()).unwrap();
        assert_eq!(knobs.target_value(1).unwrap(), 9);

        // spread the amplitudes all the way
        knobs.handle_button(KnobPanel::DISPATCH_NOTES[0]);
        knobs.process(&crate::midi::MidiMessage::ControlChange {
            channel: 0,
            controller: KnobPanel::KNOB_CONTROLS[0],
            value: 127,
        });
        // no direct observer for amplitudes, but the update must not error
        assert_eq!(knobs.target_value(0).unwrap(), 127);
    }

    #[test]
    fn wave_controls_cycle_waveforms_and_toggle_fm() {
        let synth = test_synth();
        let leds = Arc::new(Mutex::new(HashMap::new()));
        let led = shared_led_output(LedRecorder(Arc::clone(&leds)));
        let mut dispatch = DispatchPanel::new(Arc::clone(&led));
        WaveControls::attach(&mut dispatch, synth.controller(), led).unwrap();

        let press = |dispatch: &mut DispatchPanel, note| {
            dispatch.process(&crate::midi::MidiMessage::NoteOn {
                channel: 0,
                note,
                velocity: 127,
            });
        };

        // initial patch: sine on both operators, FM enabled
        assert_eq!(*leds.lock().unwrap().get(&22).unwrap(), LedColor::Green);
        assert_eq!(*leds.lock().unwrap().get(&21).unwrap(), LedColor::Green);
        {
            let pool = synth.controller().pool();
            let pool = pool.lock().unwrap();
            assert_eq!(pool.voice(0).unwrap().operator(0).unwrap().waveform(), Waveform::Sine);
            assert!(pool.voice(0).unwrap().fm_enabled());
        }

        // cycling operator 0: sine -> sawtooth
        press(&mut dispatch, 22);
        assert_eq!(*leds.lock().unwrap().get(&22).unwrap(), LedColor::Yellow);
        {
            let pool = synth.controller().pool();
            let pool = pool.lock().unwrap();
            assert_eq!(
                pool.voice(0).unwrap().operator(0).unwrap().waveform(),
                Waveform::Sawtooth
            );
            // operator 1 is untouched
            assert_eq!(pool.voice(0).unwrap().operator(1).unwrap().waveform(), Waveform::Sine);
        }

        // FM toggle
        press(&mut dispatch, 21);
        assert_eq!(*leds.lock().unwrap().get(&21).unwrap(), LedColor::Yellow);
        assert!(!synth.controller().pool().lock().unwrap().voice(0).unwrap().fm_enabled());
    }

    #[test]
    fn modulation_buttons_saturate() {
        let synth = test_synth();
        let leds = Arc::new(Mutex::new(HashMap::new()));
        let led = shared_led_output(LedRecorder(Arc::clone(&leds)));
        let mut dispatch = DispatchPanel::new(Arc::clone(&led));
        WaveControls::attach(&mut dispatch, synth.controller(), led).unwrap();

        let press = |dispatch: &mut DispatchPanel, note| {
            dispatch.process(&crate::midi::MidiMessage::NoteOn {
                channel: 0,
                note,
                velocity: 127,
            });
        };

        // initial index is 1: both directions lit
        assert_eq!(*leds.lock().unwrap().get(&64).unwrap(), LedColor::Red);
        assert_eq!(*leds.lock().unwrap().get(&65).unwrap(), LedColor::Red);

        // down to zero and further: saturates, down LED goes off
        press(&mut dispatch, 64);
        press(&mut dispatch, 64);
        assert_eq!(*leds.lock().unwrap().get(&64).unwrap(), LedColor::Off);

        let modulation_index = {
            let pool = synth.controller().pool();
            let pool = pool.lock().unwrap();
            pool.voice(0).unwrap().operator(0).unwrap().modulation_index()
        };
        assert_eq!(modulation_index, 0.0);

        // up to the top: up LED goes off at 15
        for _ in 0..20 {
            press(&mut dispatch, 65);
        }
        assert_eq!(*leds.lock().unwrap().get(&65).unwrap(), LedColor::Off);
        assert_eq!(*leds.lock().unwrap().get(&64).unwrap(), LedColor::Red);
    }
}
