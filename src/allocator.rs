use std::collections::HashMap;

use crate::{
    source::{envelope::AdsrParameters, oscillator::Waveform, voice::FmVoice},
    utils::note_to_frequency,
    Error, SynthConfig,
};

// -------------------------------------------------------------------------------------------------

/// Maps MIDI notes onto a fixed pool of [`FmVoice`]s with least-recently-struck stealing.
///
/// The allocator tracks which voice plays which note and in which order voices were struck.
/// When all voices are busy, the least recently struck one gets displaced: it is quickly
/// faded out via tunedown and immediately re-struck for the new note. Striking a note that
/// is already playing deterministically reuses its current voice.
///
/// Releasing a note only moves its voice into the envelope release stage: the voice keeps
/// its slot until both operator envelopes ran to completion and [`Self::channel_done`] gets
/// called by whoever pulls the voice (see [`VoiceMixer`](crate::VoiceMixer)).
///
/// The allocator holds no lock itself: shared access from the control and audio threads is
/// guarded by a single surrounding mutex, so bookkeeping never observes partial updates.
pub struct VoiceAllocator {
    voices: Vec<FmVoice>,
    /// Voice ids in strike order: the head is the least recently struck voice.
    order: Vec<usize>,
    /// Maps playing MIDI notes to the voice id they are assigned to.
    note_map: HashMap<u8, usize>,
}

impl VoiceAllocator {
    const MAX_MIDI_NOTE: u8 = 127;

    /// Create a new allocator with a voice pool built from the given config.
    pub fn new(config: &SynthConfig) -> Self {
        let voices = (0..config.voice_count)
            .map(|id| FmVoice::new(id, config.sample_rate, config.block_size))
            .collect();
        Self {
            voices,
            order: Vec::with_capacity(config.voice_count),
            note_map: HashMap::with_capacity(config.voice_count),
        }
    }

    /// Number of voices in the pool.
    #[inline]
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Number of voices currently assigned to notes.
    #[inline]
    pub fn active_voice_count(&self) -> usize {
        self.order.len()
    }

    /// Voice ids in strike order, least recently struck first.
    #[inline]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// The voice id the given note currently plays on, if any.
    pub fn note_channel(&self, note: u8) -> Option<usize> {
        self.note_map.get(&note).copied()
    }

    /// Access to a single voice in the pool.
    pub fn voice(&self, index: usize) -> Result<&FmVoice, Error> {
        self.voices.get(index).ok_or(Error::VoiceIndexError(index))
    }

    pub(crate) fn voice_mut(&mut self, index: usize) -> &mut FmVoice {
        &mut self.voices[index]
    }

    /// Assign a voice to the given note and strike it. Returns the voice id that got
    /// assigned.
    ///
    /// A note that is already playing reuses its current voice. Otherwise the
    /// lowest-numbered unused voice is taken, or - with the pool saturated - the least
    /// recently struck voice gets displaced. Displaced voices are faded out via tunedown
    /// before the new strike restarts their envelopes click-free.
    pub fn strike(&mut self, note: u8) -> Result<usize, Error> {
        Self::validate_note(note)?;

        // a restruck note stays on its current voice
        let current = self.note_map.get(&note).copied();
        if let Some(index) = current {
            self.voices[index].tunedown();
            self.free_slot(index);
        }
        let target = match current {
            Some(index) => index,
            None => self.find_voice(),
        };

        // displace whatever else the target voice was playing
        if self.order.contains(&target) {
            self.voices[target].tunedown();
            self.free_slot(target);
        }

        // retune first: a failing retune leaves the slot unbound instead of bound to a
        // voice which still plays the old fundamental
        let voice = &mut self.voices[target];
        voice.set_frequency(note_to_frequency(note))?;
        voice.strike();

        self.order.push(target);
        self.note_map.insert(note, target);
        Ok(target)
    }

    /// Move the voice playing the given note into its release stage. The voice keeps its
    /// slot until its envelopes finish. Unknown notes are ignored.
    pub fn release(&mut self, note: u8) {
        if let Some(&index) = self.note_map.get(&note) {
            self.voices[index].release();
        }
    }

    /// Release all currently playing notes.
    pub fn release_all(&mut self) {
        for &index in &self.order {
            self.voices[index].release();
        }
    }

    /// Stop all voices immediately and drop every note binding. Used on shutdown, after
    /// the audio stream got quiesced.
    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.stop();
        }
        self.order.clear();
        self.note_map.clear();
    }

    /// Unbind a voice whose envelopes ran to completion from its note and strike order
    /// slot. Returns the note the voice was playing, if it was still bound to one.
    pub fn channel_done(&mut self, index: usize) -> Option<u8> {
        let note = self
            .note_map
            .iter()
            .find_map(|(note, voice)| (*voice == index).then_some(*note));
        self.free_slot(index);
        note
    }

    /// Pick a voice for a new note: the lowest-numbered unused voice, or the least
    /// recently struck one when the pool is saturated.
    fn find_voice(&self) -> usize {
        (0..self.voices.len())
            .find(|index| !self.order.contains(index))
            .unwrap_or_else(|| self.order[0])
    }

    /// Remove a voice from the strike order and from its note binding, if any.
    fn free_slot(&mut self, index: usize) {
        self.order.retain(|&voice| voice != index);
        self.note_map.retain(|_, voice| *voice != index);
    }

    fn validate_note(note: u8) -> Result<(), Error> {
        if note > Self::MAX_MIDI_NOTE {
            return Err(Error::ParameterError(format!(
                "Invalid MIDI note: {note}. Must be in range [0, 127]"
            )));
        }
        Ok(())
    }

    // Parameter changes are fanned out synchronously to every voice in the pool. Callers
    // serialize fan-outs with strikes and block pulls via the surrounding pool lock, so a
    // strike never observes partially updated voices.

    /// Assign new envelope parameters to one operator of every voice.
    pub fn set_envelope_parameters(
        &mut self,
        operator_index: usize,
        parameters: &AdsrParameters,
    ) -> Result<(), Error> {
        for voice in &mut self.voices {
            voice.set_envelope_parameters(operator_index, parameters.clone())?;
        }
        Ok(())
    }

    /// Set the waveform of one operator of every voice.
    pub fn set_waveform(&mut self, operator_index: usize, waveform: Waveform) -> Result<(), Error> {
        for voice in &mut self.voices {
            voice.set_waveform(operator_index, waveform)?;
        }
        Ok(())
    }

    /// Enable or disable frequency modulation on every voice.
    pub fn set_fm_enabled(&mut self, fm_enabled: bool) {
        for voice in &mut self.voices {
            voice.set_fm_enabled(fm_enabled);
        }
    }

    /// Set the phase modulation depth on every voice.
    pub fn set_modulation_index(&mut self, modulation_index: f64) -> Result<(), Error> {
        for voice in &mut self.voices {
            voice.set_modulation_index(modulation_index)?;
        }
        Ok(())
    }

    /// Set the operator output weights on every voice.
    pub fn set_amplitudes(&mut self, amplitudes: [f64; 2]) -> Result<(), Error> {
        for voice in &mut self.voices {
            voice.set_amplitudes(amplitudes)?;
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
