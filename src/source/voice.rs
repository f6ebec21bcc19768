use crate::{
    source::{envelope::AdsrParameters, operator::Operator, oscillator::Waveform, BlockSource},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// A single polyphonic voice, built from two FM operators with a fixed topology.
///
/// Operator 0 is the carrier, operator 1 the modulator. With FM enabled the modulator's
/// output offsets the carrier's oscillator phase and only the carrier is audible. With FM
/// disabled both operators run standalone and the voice outputs their weighted mean.
///
/// Voices are created once with the pool and reassigned per note: `set_frequency` retunes
/// both operators to the new fundamental, `strike` restarts both envelopes. A voice is
/// finished once both operator envelopes ran to completion.
pub struct FmVoice {
    id: usize,
    carrier: Operator,
    modulator: Operator,
    fm_enabled: bool,
    amplitudes: [f64; 2],
    modulator_buffer: Vec<f64>,
}

impl FmVoice {
    /// Number of operators per voice.
    pub const OPERATOR_COUNT: usize = 2;

    const MAX_OPERATOR_AMPLITUDE: f64 = 2.0;

    /// Create a new voice with the given id and signal specs. FM is enabled by default.
    pub fn new(id: usize, sample_rate: u32, block_size: usize) -> Self {
        let mut carrier = Operator::new(sample_rate, block_size);
        carrier.set_modulated(true);
        let modulator = Operator::new(sample_rate, block_size);
        Self {
            id,
            carrier,
            modulator,
            fm_enabled: true,
            amplitudes: [1.0, 1.0],
            modulator_buffer: vec![0.0; block_size],
        }
    }

    /// The voice's id: its fixed slot index in the voice pool.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns true while frequency modulation is enabled.
    #[inline]
    pub fn fm_enabled(&self) -> bool {
        self.fm_enabled
    }
    /// Enable or disable frequency modulation. With FM enabled the carrier gets phase
    /// modulated by the second operator, else both operators are mixed to the output.
    pub fn set_fm_enabled(&mut self, fm_enabled: bool) {
        self.fm_enabled = fm_enabled;
        self.carrier.set_modulated(fm_enabled);
    }

    /// Assign new envelope parameters to a single operator.
    pub fn set_envelope_parameters(
        &mut self,
        operator_index: usize,
        parameters: AdsrParameters,
    ) -> Result<(), Error> {
        self.operator_mut(operator_index)?
            .set_envelope_parameters(parameters);
        Ok(())
    }

    /// Set the waveform of a single operator.
    pub fn set_waveform(&mut self, operator_index: usize, waveform: Waveform) -> Result<(), Error> {
        self.operator_mut(operator_index)?.set_waveform(waveform);
        Ok(())
    }

    /// Retune both operators to the given fundamental frequency in Hz.
    pub fn set_frequency(&mut self, frequency: f64) -> Result<(), Error> {
        self.carrier.set_frequency(frequency)?;
        self.modulator.set_frequency(frequency)?;
        Ok(())
    }

    /// Set the carrier's phase modulation depth in range `[0.0, 15.0]`.
    pub fn set_modulation_index(&mut self, modulation_index: f64) -> Result<(), Error> {
        self.carrier.set_modulation_index(modulation_index)
    }

    /// Set the two operator output weights in range `[0.0, 2.0]`.
    ///
    /// The weights shape the operator balance in the non-FM mix and scale the carrier
    /// output with FM enabled. The default of `[1.0, 1.0]` keeps the non-FM mix at the
    /// plain arithmetic mean of both operators.
    pub fn set_amplitudes(&mut self, amplitudes: [f64; 2]) -> Result<(), Error> {
        for amplitude in amplitudes {
            if !(0.0..=Self::MAX_OPERATOR_AMPLITUDE).contains(&amplitude) {
                return Err(Error::ParameterError(format!(
                    "Invalid operator amplitude: {amplitude}. Must be in range [0.0, {}]",
                    Self::MAX_OPERATOR_AMPLITUDE
                )));
            }
        }
        self.amplitudes = amplitudes;
        Ok(())
    }

    /// Access to a single operator.
    pub fn operator(&self, operator_index: usize) -> Result<&Operator, Error> {
        match operator_index {
            0 => Ok(&self.carrier),
            1 => Ok(&self.modulator),
            _ => Err(Error::OperatorIndexError(operator_index)),
        }
    }

    fn operator_mut(&mut self, operator_index: usize) -> Result<&mut Operator, Error> {
        match operator_index {
            0 => Ok(&mut self.carrier),
            1 => Ok(&mut self.modulator),
            _ => Err(Error::OperatorIndexError(operator_index)),
        }
    }

    /// Start a new envelope run on both operators with the next processed block.
    pub fn strike(&mut self) {
        self.carrier.strike();
        self.modulator.strike();
    }
    /// Move both operator envelopes into their release stage.
    pub fn release(&mut self) {
        self.carrier.release();
        self.modulator.release();
    }
    /// Quickly fade out both operators, e.g. before the voice gets reassigned.
    pub fn tunedown(&mut self) {
        self.carrier.tunedown();
        self.modulator.tunedown();
    }
    /// Immediately reset both operator envelopes to idle.
    pub fn stop(&mut self) {
        self.carrier.stop();
        self.modulator.stop();
    }

    /// Returns true once both operator envelopes ran to completion. Finished voices output
    /// silence until they are re-struck.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.carrier.is_finished() && self.modulator.is_finished()
    }

    /// Produce one block of samples.
    pub fn process(&mut self, output: &mut [f64]) {
        let len = output.len();
        debug_assert!(
            len <= self.modulator_buffer.len(),
            "Unexpected block length"
        );
        if self.fm_enabled {
            let modulator_block = &mut self.modulator_buffer[..len];
            self.modulator.process(modulator_block, None);
            self.carrier.process(output, Some(&self.modulator_buffer[..len]));
            let amplitude = self.amplitudes[0];
            if amplitude != 1.0 {
                for o in output.iter_mut() {
                    *o *= amplitude;
                }
            }
        } else {
            self.carrier.process(output, None);
            let modulator_block = &mut self.modulator_buffer[..len];
            self.modulator.process(modulator_block, None);
            let [carrier_amplitude, modulator_amplitude] = self.amplitudes;
            for (o, m) in output.iter_mut().zip(modulator_block.iter()) {
                *o = (*o * carrier_amplitude + *m * modulator_amplitude) / 2.0;
            }
        }
    }
}

impl BlockSource for FmVoice {
    fn write(&mut self, output: &mut [f64]) {
        self.process(output);
    }

    fn is_exhausted(&self) -> bool {
        self.is_finished()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const SAMPLE_RATE: u32 = 44100;
    const BLOCK_SIZE: usize = 441;

    fn held_parameters() -> AdsrParameters {
        AdsrParameters::new(Duration::ZERO, Duration::ZERO, 1.0, Duration::ZERO, true).unwrap()
    }

    fn sustained_voice(fm_enabled: bool) -> FmVoice {
        let mut voice = FmVoice::new(0, SAMPLE_RATE, BLOCK_SIZE);
        voice.set_fm_enabled(fm_enabled);
        for operator_index in 0..FmVoice::OPERATOR_COUNT {
            voice
                .set_envelope_parameters(operator_index, held_parameters())
                .unwrap();
            voice
                .set_waveform(operator_index, Waveform::Sine)
                .unwrap();
        }
        voice.strike();
        // consume the strike and let both envelopes settle at full sustain
        let mut block = vec![0.0; BLOCK_SIZE];
        voice.process(&mut block);
        voice.process(&mut block);
        // assign the frequency last, so both wavetables start at zero phase
        voice.set_frequency(441.0).unwrap();
        voice
    }

    #[test]
    fn operator_index_is_validated() {
        let mut voice = FmVoice::new(0, SAMPLE_RATE, BLOCK_SIZE);
        assert!(voice.set_waveform(2, Waveform::Sine).is_err());
        assert!(voice
            .set_envelope_parameters(5, AdsrParameters::default())
            .is_err());
        assert!(voice.operator(1).is_ok());
        assert!(voice.operator(2).is_err());
    }

    #[test]
    fn fm_disabled_mixes_the_operator_mean() {
        let mut voice = sustained_voice(false);
        let mut block = vec![0.0; BLOCK_SIZE];
        voice.process(&mut block);

        // both operators run the same sine at the same phase, so the mean equals one of them
        let period = SAMPLE_RATE as usize / 441;
        for (index, sample) in block.iter().enumerate() {
            let phase = std::f64::consts::TAU * (index % period) as f64 / period as f64;
            assert!((*sample - phase.sin()).abs() < 1e-9, "at sample {index}");
        }
    }

    #[test]
    fn fm_enabled_applies_phase_modulation() {
        let mut voice = sustained_voice(true);
        voice.set_modulation_index(3.0).unwrap();
        let mut block = vec![0.0; BLOCK_SIZE];
        voice.process(&mut block);

        let period = SAMPLE_RATE as usize / 441;
        for (index, sample) in block.iter().enumerate() {
            let phase = std::f64::consts::TAU * (index % period) as f64 / period as f64;
            let expected = (phase + 3.0 * phase.sin()).sin();
            assert!((*sample - expected).abs() < 1e-9, "at sample {index}");
        }
    }

    #[test]
    fn amplitudes_weight_the_mix() {
        let mut voice = sustained_voice(false);
        voice.set_amplitudes([0.5, 1.5]).unwrap();
        let mut block = vec![0.0; BLOCK_SIZE];
        voice.process(&mut block);

        let period = SAMPLE_RATE as usize / 441;
        for (index, sample) in block.iter().enumerate() {
            let phase = std::f64::consts::TAU * (index % period) as f64 / period as f64;
            let expected = (0.5 * phase.sin() + 1.5 * phase.sin()) / 2.0;
            assert!((*sample - expected).abs() < 1e-9, "at sample {index}");
        }

        assert!(voice.set_amplitudes([3.0, 1.0]).is_err());
        assert!(voice.set_amplitudes([-0.1, 1.0]).is_err());
    }

    #[test]
    fn voice_finishes_when_both_envelopes_finish() {
        let mut voice = sustained_voice(true);
        assert!(!voice.is_finished());

        voice.tunedown();
        let mut block = vec![0.0; BLOCK_SIZE];
        voice.process(&mut block);
        assert!(voice.is_finished());

        // a finished voice produces silence until re-struck
        voice.process(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));

        voice.strike();
        voice.process(&mut block);
        assert!(!voice.is_finished());
    }
}
