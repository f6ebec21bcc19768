use crate::{
    source::{
        envelope::{AdsrEnvelope, AdsrParameters},
        oscillator::{Waveform, WavetableOscillator},
        BlockSource,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// A single FM operator: one wavetable oscillator shaped by an ADSR envelope.
///
/// An operator optionally accepts the output of another operator as phase modulation input.
/// With modulation the oscillator runs in phase output mode and the waveform function is
/// applied after the phase got offset by the scaled modulator signal, which implements
/// classic two-operator frequency modulation:
///
/// `out[n] = waveform(phase[n] + modulation_index · modulator[n]) · envelope[n]`
///
/// Operators live in a fixed voice pool: frequency and waveform are reassigned on every
/// strike, the envelope state machine controls their audible lifetime.
pub struct Operator {
    oscillator: WavetableOscillator,
    envelope: AdsrEnvelope,
    modulation_index: f64,
    modulated: bool,
    envelope_buffer: Vec<f64>,
}

impl Operator {
    const MAX_MODULATION_INDEX: f64 = 15.0;

    /// Create a new operator with the given signal specs.
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            oscillator: WavetableOscillator::new(sample_rate, block_size),
            envelope: AdsrEnvelope::new(sample_rate),
            modulation_index: 1.0,
            modulated: false,
            envelope_buffer: vec![0.0; block_size],
        }
    }

    /// Get the operator's waveform.
    #[inline]
    pub fn waveform(&self) -> Waveform {
        self.oscillator.waveform()
    }
    /// Set the operator's waveform.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.oscillator.set_waveform(waveform);
    }

    /// Get the operator's fundamental frequency, if one got assigned.
    #[inline]
    pub fn frequency(&self) -> Option<f64> {
        self.oscillator.frequency()
    }
    /// Set the operator's fundamental frequency in Hz.
    pub fn set_frequency(&mut self, frequency: f64) -> Result<(), Error> {
        self.oscillator.set_frequency(frequency)
    }

    /// Get the phase modulation depth.
    #[inline]
    pub fn modulation_index(&self) -> f64 {
        self.modulation_index
    }
    /// Set the phase modulation depth in range `[0.0, 15.0]`.
    pub fn set_modulation_index(&mut self, modulation_index: f64) -> Result<(), Error> {
        if !(0.0..=Self::MAX_MODULATION_INDEX).contains(&modulation_index) {
            return Err(Error::ParameterError(format!(
                "Invalid modulation index: {modulation_index}. Must be in range [0.0, {}]",
                Self::MAX_MODULATION_INDEX
            )));
        }
        self.modulation_index = modulation_index;
        Ok(())
    }

    /// Returns true when the operator expects phase modulation input in `process`.
    #[inline]
    pub fn is_modulated(&self) -> bool {
        self.modulated
    }
    /// Enable or disable the phase modulation input. When enabled, `process` must be called
    /// with a modulator block of the same length as the output.
    pub fn set_modulated(&mut self, modulated: bool) {
        self.modulated = modulated;
        self.oscillator.set_phase_output(modulated);
    }

    /// Get the operator's envelope parameters.
    pub fn envelope_parameters(&self) -> &AdsrParameters {
        self.envelope.parameters()
    }
    /// Assign new envelope parameters, which take effect at the next block boundary.
    pub fn set_envelope_parameters(&mut self, parameters: AdsrParameters) {
        self.envelope.set_parameters(parameters);
    }

    /// Access to the operator's envelope.
    pub fn envelope(&self) -> &AdsrEnvelope {
        &self.envelope
    }

    /// Start a new envelope run with the next processed block.
    pub fn strike(&mut self) {
        self.envelope.strike();
    }
    /// Move the envelope into its release stage.
    pub fn release(&mut self) {
        self.envelope.release();
    }
    /// Quickly fade out the operator, e.g. before its voice gets reassigned.
    pub fn tunedown(&mut self) {
        self.envelope.tunedown();
    }
    /// Immediately reset the envelope to idle.
    pub fn stop(&mut self) {
        self.envelope.reset();
    }

    /// Returns true once the envelope ran to completion.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    /// Produce one block of samples, with optional phase modulation input from another
    /// operator. The modulation block must match the output block's length.
    pub fn process(&mut self, output: &mut [f64], modulation: Option<&[f64]>) {
        let len = output.len();
        debug_assert!(len <= self.envelope_buffer.len(), "Unexpected block length");
        debug_assert_eq!(
            self.modulated,
            modulation.is_some(),
            "Modulation input does not match the operator's modulation mode"
        );

        self.envelope.process(&mut self.envelope_buffer[..len]);
        self.oscillator.write(output);

        let envelope = &self.envelope_buffer[..len];
        match modulation {
            None => {
                for (o, e) in output.iter_mut().zip(envelope) {
                    *o *= *e;
                }
            }
            Some(modulator) => {
                debug_assert_eq!(modulator.len(), len, "Modulator block length mismatch");
                let waveform = self.oscillator.waveform();
                let modulation_index = self.modulation_index;
                for ((o, e), m) in output.iter_mut().zip(envelope).zip(modulator) {
                    *o = waveform.amplitude(*o + modulation_index * *m) * *e;
                }
            }
        }
    }
}

impl BlockSource for Operator {
    fn write(&mut self, output: &mut [f64]) {
        debug_assert!(
            !self.modulated,
            "A modulated operator cannot be pulled as standalone source"
        );
        self.process(output, None);
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
        // zero attack and decay with full sustain: the envelope is 1.0 right away
        AdsrParameters::new(Duration::ZERO, Duration::ZERO, 1.0, Duration::ZERO, true).unwrap()
    }

    fn striked_operator(waveform: Waveform, frequency: f64) -> Operator {
        let mut operator = Operator::new(SAMPLE_RATE, BLOCK_SIZE);
        operator.set_envelope_parameters(held_parameters());
        operator.set_waveform(waveform);
        operator.strike();
        // consume the strike and let the envelope settle at full sustain
        let mut block = vec![0.0; BLOCK_SIZE];
        operator.process(&mut block, None);
        operator.process(&mut block, None);
        // assign the frequency last, so the wavetable starts at zero phase
        operator.set_frequency(frequency).unwrap();
        operator
    }

    #[test]
    fn modulation_index_validation() {
        let mut operator = Operator::new(SAMPLE_RATE, BLOCK_SIZE);
        assert!(operator.set_modulation_index(-1.0).is_err());
        assert!(operator.set_modulation_index(16.0).is_err());
        assert!(operator.set_modulation_index(15.0).is_ok());
        assert!(operator.set_modulation_index(0.0).is_ok());
    }

    #[test]
    fn unmodulated_output_is_wave_times_envelope() {
        let mut operator = striked_operator(Waveform::Sine, 441.0);
        let mut block = vec![0.0; BLOCK_SIZE];
        operator.process(&mut block, None);

        // envelope is fully sustained, so the output is the raw sine table
        let period = SAMPLE_RATE as usize / 441;
        for (index, sample) in block.iter().enumerate().take(period) {
            let phase = std::f64::consts::TAU * index as f64 / period as f64;
            assert!((*sample - phase.sin()).abs() < 1e-9, "at sample {index}");
        }
    }

    #[test]
    fn modulated_output_applies_fm_formula() {
        let mut carrier = striked_operator(Waveform::Sine, 441.0);
        carrier.set_modulated(true);
        carrier.set_modulation_index(3.0).unwrap();
        let mut modulator = striked_operator(Waveform::Sine, 882.0);

        let mut modulator_block = vec![0.0; BLOCK_SIZE];
        modulator.process(&mut modulator_block, None);
        let mut block = vec![0.0; BLOCK_SIZE];
        carrier.process(&mut block, Some(&modulator_block));

        let carrier_period = SAMPLE_RATE as usize / 441;
        let modulator_period = SAMPLE_RATE as usize / 882;
        for index in 0..BLOCK_SIZE {
            let carrier_phase =
                std::f64::consts::TAU * (index % carrier_period) as f64 / carrier_period as f64;
            let modulator_phase = std::f64::consts::TAU * (index % modulator_period) as f64
                / modulator_period as f64;
            let expected = (carrier_phase + 3.0 * modulator_phase.sin()).sin();
            assert!((block[index] - expected).abs() < 1e-9, "at sample {index}");
        }
    }

    #[test]
    fn off_waveform_is_silent() {
        let mut operator = striked_operator(Waveform::Off, 441.0);
        let mut block = vec![1.0; BLOCK_SIZE];
        operator.process(&mut block, None);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn finished_operator_is_silent() {
        let mut operator = striked_operator(Waveform::Sine, 441.0);
        operator.tunedown();
        let mut block = vec![0.0; BLOCK_SIZE];
        operator.process(&mut block, None);
        assert!(operator.is_finished());

        operator.process(&mut block, None);
        assert!(block.iter().all(|s| *s == 0.0));
    }
}
