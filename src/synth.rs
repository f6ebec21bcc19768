use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;

use crate::{
    allocator::VoiceAllocator,
    output::OutputSink,
    source::{envelope::AdsrParameters, mixed::VoiceMixer, oscillator::Waveform, voice::FmVoice},
    Error, SynthConfig,
};

// -------------------------------------------------------------------------------------------------

/// Events sent back from the audio thread to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthEvent {
    /// A voice's envelopes ran to completion, so its note binding got released.
    VoiceFinished {
        /// Id of the finished voice.
        voice: usize,
        /// The MIDI note the voice was playing, when it still was bound to one.
        note: Option<u8>,
    },
}

// -------------------------------------------------------------------------------------------------

/// A polyphonic two-operator FM synthesizer.
///
/// The synthesizer owns a fixed voice pool and an audio output sink for the process
/// lifetime. On construction it hands a [`VoiceMixer`] over the pool to the sink, which
/// pulls mixed sample blocks from the audio callback from then on.
///
/// Note and parameter changes arrive on the control (MIDI) thread through a
/// [`SynthController`] handle and are applied under the pool lock, so they interleave
/// cleanly with block pulls and take effect at the next block boundary.
pub struct Synth<Sink: OutputSink> {
    sink: Sink,
    config: SynthConfig,
    controller: SynthController,
}

impl<Sink: OutputSink> Synth<Sink> {
    /// Create a new synthesizer which plays into the given output sink.
    ///
    /// The sink must run at the config's sample rate: the voice pipeline never resamples.
    /// Pass an `event_send` channel to get notified about finished voices.
    pub fn new(
        sink: Sink,
        config: SynthConfig,
        event_send: Option<Sender<SynthEvent>>,
    ) -> Result<Self, Error> {
        config.validate()?;
        if sink.sample_rate() != config.sample_rate {
            return Err(Error::ParameterError(format!(
                "Output sink runs at {} Hz but the synth is configured for {} Hz",
                sink.sample_rate(),
                config.sample_rate
            )));
        }

        let pool = Arc::new(Mutex::new(VoiceAllocator::new(&config)));
        let mixer = VoiceMixer::new(Arc::clone(&pool), &config, event_send);

        let mut sink = sink;
        sink.play(Box::new(mixer));

        let controller = SynthController { pool, config };
        Ok(Self {
            sink,
            config,
            controller,
        })
    }

    /// The synthesizer's signal and pool configuration.
    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Get a cloneable control handle, e.g. to dispatch MIDI events from another thread.
    pub fn controller(&self) -> SynthController {
        self.controller.clone()
    }

    /// Access to the owned output sink.
    pub fn sink_mut(&mut self) -> &mut Sink {
        &mut self.sink
    }

    /// Strike or - with velocity 0 - release a note. See [`SynthController::note_on`].
    pub fn note_on(&self, note: u8, velocity: u8) -> Result<(), Error> {
        self.controller.note_on(note, velocity)
    }
    /// Release a note. See [`SynthController::note_off`].
    pub fn note_off(&self, note: u8) {
        self.controller.note_off(note);
    }

    /// Suspend the output stream.
    pub fn pause(&mut self) {
        self.sink.pause();
    }
    /// Resume a suspended output stream.
    pub fn resume(&mut self) {
        self.sink.resume();
    }

    /// Shut the synthesizer down: quiesce the output stream first, then drain the
    /// voice pool.
    pub fn close(&mut self) {
        self.sink.stop();
        self.sink.close();
        self.controller.pool.lock().unwrap().reset();
    }
}

// -------------------------------------------------------------------------------------------------

/// Cloneable control handle of a [`Synth`].
///
/// All controls are applied synchronously to the whole voice pool under the pool lock and
/// become audible at the next block boundary. The handle is the target of MIDI note input
/// and of the controller panel adapters.
#[derive(Clone)]
pub struct SynthController {
    pool: Arc<Mutex<VoiceAllocator>>,
    config: SynthConfig,
}

impl SynthController {
    /// Strike the given note, stealing the least recently struck voice if the pool is
    /// saturated. A note-on with velocity 0 is treated as note-off.
    pub fn note_on(&self, note: u8, velocity: u8) -> Result<(), Error> {
        if velocity == 0 {
            self.note_off(note);
            return Ok(());
        }
        self.pool.lock().unwrap().strike(note)?;
        Ok(())
    }

    /// Release the given note. The note keeps sounding through its envelope release stage.
    /// Unknown notes are ignored.
    pub fn note_off(&self, note: u8) {
        self.pool.lock().unwrap().release(note);
    }

    /// Release all currently playing notes.
    pub fn all_notes_off(&self) {
        self.pool.lock().unwrap().release_all();
    }

    /// Assign new envelope parameters to both operators of every voice.
    pub fn set_envelope_parameters(&self, parameters: &AdsrParameters) -> Result<(), Error> {
        let mut pool = self.pool.lock().unwrap();
        for operator_index in 0..FmVoice::OPERATOR_COUNT {
            pool.set_envelope_parameters(operator_index, parameters)?;
        }
        Ok(())
    }

    /// Set the waveform of one operator on every voice.
    pub fn set_waveform(&self, operator_index: usize, waveform: Waveform) -> Result<(), Error> {
        self.pool
            .lock()
            .unwrap()
            .set_waveform(operator_index, waveform)
    }

    /// Enable or disable frequency modulation on every voice.
    pub fn set_fm_enabled(&self, fm_enabled: bool) {
        self.pool.lock().unwrap().set_fm_enabled(fm_enabled);
    }

    /// Set the phase modulation depth in range `[0.0, 15.0]` on every voice.
    pub fn set_modulation_index(&self, modulation_index: f64) -> Result<(), Error> {
        self.pool
            .lock()
            .unwrap()
            .set_modulation_index(modulation_index)
    }

    /// Set the operator output weights on every voice.
    pub fn set_amplitudes(&self, amplitudes: [f64; 2]) -> Result<(), Error> {
        self.pool.lock().unwrap().set_amplitudes(amplitudes)
    }

    /// Number of voices in the pool.
    pub fn voice_count(&self) -> usize {
        self.config.voice_count
    }

    /// Access to the shared voice pool, for white-box inspection within the crate.
    pub(crate) fn pool(&self) -> Arc<Mutex<VoiceAllocator>> {
        Arc::clone(&self.pool)
    }

    /// Number of voices currently bound to notes.
    pub fn active_voice_count(&self) -> usize {
        self.pool.lock().unwrap().active_voice_count()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BlockSource;

    /// A sink which discards all samples, with the specs of the default config.
    struct NullSink {
        source: Option<Box<dyn BlockSource>>,
    }

    impl NullSink {
        fn new() -> Self {
            Self { source: None }
        }
    }

    impl OutputSink for NullSink {
        fn channel_count(&self) -> usize {
            1
        }
        fn sample_rate(&self) -> u32 {
            44100
        }
        fn play(&mut self, source: Box<dyn BlockSource>) {
            self.source = Some(source);
        }
        fn stop(&mut self) {
            self.source = None;
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn close(&mut self) {}
    }

    #[test]
    fn sink_sample_rate_must_match() {
        let config = SynthConfig {
            sample_rate: 48000,
            ..SynthConfig::default()
        };
        assert!(Synth::new(NullSink::new(), config, None).is_err());
        assert!(Synth::new(NullSink::new(), SynthConfig::default(), None).is_ok());
    }

    #[test]
    fn notes_are_dispatched_to_the_pool() {
        let synth = Synth::new(NullSink::new(), SynthConfig::default(), None).unwrap();
        let controller = synth.controller();

        controller.note_on(60, 100).unwrap();
        controller.note_on(64, 100).unwrap();
        assert_eq!(controller.active_voice_count(), 2);

        // velocity 0 acts as note off: the voice keeps its slot through release
        controller.note_on(60, 0).unwrap();
        assert_eq!(controller.active_voice_count(), 2);

        controller.all_notes_off();
        assert_eq!(controller.active_voice_count(), 2);

        assert!(controller.note_on(200, 100).is_err());
    }

    #[test]
    fn controls_are_fanned_out() {
        let synth = Synth::new(NullSink::new(), SynthConfig::default(), None).unwrap();
        let controller = synth.controller();

        controller.set_fm_enabled(false);
        controller.set_waveform(0, Waveform::Sawtooth).unwrap();
        controller.set_modulation_index(5.0).unwrap();
        controller
            .set_envelope_parameters(&AdsrParameters::default())
            .unwrap();
        controller.set_amplitudes([0.5, 1.5]).unwrap();

        assert!(controller.set_waveform(7, Waveform::Sine).is_err());
        assert!(controller.set_modulation_index(-2.0).is_err());
        assert!(controller.set_amplitudes([5.0, 5.0]).is_err());
    }

    #[test]
    fn concurrent_strike_and_release_stay_consistent() {
        let synth = Synth::new(NullSink::new(), SynthConfig::default(), None).unwrap();

        let strike_controller = synth.controller();
        let release_controller = synth.controller();
        let striker = std::thread::spawn(move || {
            for _ in 0..200 {
                for note in [60u8, 62, 64, 65, 67] {
                    strike_controller.note_on(note, 100).unwrap();
                }
            }
        });
        let releaser = std::thread::spawn(move || {
            for _ in 0..200 {
                for note in [60u8, 62, 64, 65, 67] {
                    release_controller.note_off(note);
                }
            }
        });
        striker.join().unwrap();
        releaser.join().unwrap();

        // whatever the interleaving was, the pool bookkeeping stayed consistent
        let pool = synth.controller.pool.lock().unwrap();
        let order = pool.order().to_vec();
        for &index in &order {
            assert_eq!(order.iter().filter(|&&i| i == index).count(), 1);
        }
        for note in [60u8, 62, 64, 65, 67] {
            if let Some(index) = pool.note_channel(note) {
                assert!(order.contains(&index));
            }
        }
    }
}
