use std::f64::consts::TAU;

use strum::{Display, EnumCount, FromRepr};

use crate::{source::BlockSource, Error};

// -------------------------------------------------------------------------------------------------

/// Waveform shape of a single [`Operator`](super::operator::Operator) oscillator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumCount, FromRepr)]
#[repr(u8)]
pub enum Waveform {
    /// Produces silence.
    #[default]
    Off,
    Sine,
    Sawtooth,
    Square,
}

impl Waveform {
    /// The next waveform in cycling order, wrapping from [`Waveform::Square`] back
    /// to [`Waveform::Off`].
    pub fn cycled(self) -> Self {
        Self::from_repr((self as u8 + 1) % Self::COUNT as u8).unwrap_or_default()
    }

    /// Evaluate the waveform at the given phase in radians. All shapes are periodic in `2π`
    /// and accept phases outside of `[0, 2π)`, which happens when a phase gets offset by a
    /// frequency modulator.
    #[inline]
    pub fn amplitude(self, phase: f64) -> f64 {
        let cycle = (phase / TAU).rem_euclid(1.0);
        match self {
            Self::Off => 0.0,
            Self::Sine => phase.sin(),
            Self::Sawtooth => 2.0 * cycle - 1.0,
            Self::Square => {
                if cycle < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A single-cycle wavetable oscillator, emitting a looped stream of sample blocks at a fixed
/// fundamental frequency.
///
/// The table holds one waveform period of `⌊sample_rate / frequency⌋` samples over `[0, 2π)`
/// and is repeated until it covers at least one block, so a block wraps around the table at
/// most once and the phase stays continuous across blocks.
///
/// When used as a frequency modulation carrier the oscillator runs in phase output mode: it
/// emits the raw phase ramp instead of the shaped wave, so the owning operator can offset the
/// phase with a modulator signal before applying the waveform function.
pub struct WavetableOscillator {
    sample_rate: u32,
    block_size: usize,
    waveform: Waveform,
    frequency: Option<f64>,
    phase_output: bool,
    table: Vec<f64>,
    pos: usize,
}

impl WavetableOscillator {
    /// Create a new oscillator with the given signal specs. No table is built until a
    /// frequency is assigned: until then the oscillator emits silence.
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            waveform: Waveform::default(),
            frequency: None,
            phase_output: false,
            table: Vec::new(),
            pos: 0,
        }
    }

    /// Get the currently set waveform.
    #[inline]
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }
    /// Set a new waveform and rebuild the wavetable.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
        self.rebuild_table();
    }

    /// Get the currently set fundamental frequency, if any.
    #[inline]
    pub fn frequency(&self) -> Option<f64> {
        self.frequency
    }
    /// Set a new fundamental frequency in Hz and rebuild the wavetable. The playback
    /// position restarts at the table start.
    pub fn set_frequency(&mut self, frequency: f64) -> Result<(), Error> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(Error::ParameterError(format!(
                "Invalid oscillator frequency: {frequency}. Must be positive"
            )));
        }
        if frequency > self.sample_rate as f64 {
            return Err(Error::ParameterError(format!(
                "Invalid oscillator frequency: {frequency}. \
                 Must not exceed the sample rate of {}",
                self.sample_rate
            )));
        }
        self.frequency = Some(frequency);
        self.rebuild_table();
        Ok(())
    }

    /// Enable or disable raw phase ramp output and rebuild the wavetable.
    pub fn set_phase_output(&mut self, phase_output: bool) {
        if self.phase_output != phase_output {
            self.phase_output = phase_output;
            self.rebuild_table();
        }
    }

    /// Length of one waveform period in samples, if a frequency is set.
    pub fn period_len(&self) -> Option<usize> {
        self.frequency
            .map(|frequency| (self.sample_rate as f64 / frequency) as usize)
    }

    fn rebuild_table(&mut self) {
        let Some(period_len) = self.period_len() else {
            return;
        };
        debug_assert!(period_len >= 1);

        // one period of phase values over [0, 2π)
        let step = TAU / period_len as f64;
        self.table.clear();
        self.table.reserve(period_len.max(self.block_size));
        for index in 0..period_len {
            let phase = step * index as f64;
            if self.phase_output {
                self.table.push(phase);
            } else {
                self.table.push(self.waveform.amplitude(phase));
            }
        }
        // repeat the period until it covers a whole block, so that `write` wraps around
        // at most once per block
        while self.table.len() < self.block_size {
            for index in 0..period_len {
                let value = self.table[index];
                self.table.push(value);
            }
        }
        self.pos = 0;
    }
}

impl BlockSource for WavetableOscillator {
    fn write(&mut self, output: &mut [f64]) {
        if self.table.is_empty() {
            output.fill(0.0);
            return;
        }
        let mut pos = self.pos;
        for o in output.iter_mut() {
            *o = self.table[pos];
            pos += 1;
            if pos == self.table.len() {
                pos = 0;
            }
        }
        self.pos = pos;
    }

    fn is_exhausted(&self) -> bool {
        // oscillators loop forever - lifetime is controlled by the envelope
        false
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;
    const BLOCK_SIZE: usize = 441;

    #[test]
    fn waveform_cycling() {
        assert_eq!(Waveform::Off.cycled(), Waveform::Sine);
        assert_eq!(Waveform::Sine.cycled(), Waveform::Sawtooth);
        assert_eq!(Waveform::Sawtooth.cycled(), Waveform::Square);
        assert_eq!(Waveform::Square.cycled(), Waveform::Off);
    }

    #[test]
    fn waveform_shapes() {
        assert_eq!(Waveform::Off.amplitude(1.234), 0.0);
        assert!((Waveform::Sine.amplitude(0.0)).abs() < 1e-12);
        assert!((Waveform::Sine.amplitude(std::f64::consts::FRAC_PI_2) - 1.0).abs() < 1e-12);
        assert!((Waveform::Sawtooth.amplitude(0.0) + 1.0).abs() < 1e-12);
        assert!((Waveform::Sawtooth.amplitude(TAU * 0.75) - 0.5).abs() < 1e-12);
        assert_eq!(Waveform::Square.amplitude(0.1), 1.0);
        assert_eq!(Waveform::Square.amplitude(TAU * 0.6), -1.0);
        // phases outside [0, 2π) wrap around
        assert_eq!(Waveform::Square.amplitude(0.1 - TAU), 1.0);
        assert!(
            (Waveform::Sawtooth.amplitude(0.3) - Waveform::Sawtooth.amplitude(0.3 + TAU)).abs()
                < 1e-12
        );
    }

    #[test]
    fn unset_frequency_is_silent() {
        let mut oscillator = WavetableOscillator::new(SAMPLE_RATE, BLOCK_SIZE);
        oscillator.set_waveform(Waveform::Sine);
        let mut block = vec![1.0; BLOCK_SIZE];
        oscillator.write(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn invalid_frequencies_are_rejected() {
        let mut oscillator = WavetableOscillator::new(SAMPLE_RATE, BLOCK_SIZE);
        assert!(oscillator.set_frequency(0.0).is_err());
        assert!(oscillator.set_frequency(-440.0).is_err());
        assert!(oscillator.set_frequency(f64::NAN).is_err());
        assert!(oscillator.set_frequency(SAMPLE_RATE as f64 * 2.0).is_err());
        assert!(oscillator.set_frequency(440.0).is_ok());
    }

    #[test]
    fn table_covers_at_least_one_block() {
        let mut oscillator = WavetableOscillator::new(SAMPLE_RATE, BLOCK_SIZE);
        oscillator.set_waveform(Waveform::Sine);
        // 440 Hz has a period of 100 samples, well below the block size
        oscillator.set_frequency(440.0).unwrap();
        assert_eq!(oscillator.period_len(), Some(100));
        assert!(oscillator.table.len() >= BLOCK_SIZE);
        assert_eq!(oscillator.table.len() % 100, 0);
    }

    #[test]
    fn output_is_periodic() {
        let mut oscillator = WavetableOscillator::new(SAMPLE_RATE, BLOCK_SIZE);
        oscillator.set_waveform(Waveform::Sine);
        oscillator.set_frequency(441.0).unwrap();
        let period = oscillator.period_len().unwrap();
        assert_eq!(period, 100);

        let mut stream = vec![0.0; BLOCK_SIZE * 4];
        for block in stream.chunks_mut(BLOCK_SIZE) {
            oscillator.write(block);
        }
        for (index, sample) in stream.iter().enumerate().skip(period) {
            assert_eq!(*sample, stream[index - period], "at sample {index}");
        }
    }

    #[test]
    fn phase_output_emits_ramp() {
        let mut oscillator = WavetableOscillator::new(SAMPLE_RATE, BLOCK_SIZE);
        oscillator.set_waveform(Waveform::Sine);
        oscillator.set_phase_output(true);
        oscillator.set_frequency(441.0).unwrap();
        let period = oscillator.period_len().unwrap();

        let mut block = vec![0.0; BLOCK_SIZE];
        oscillator.write(&mut block);
        // linear ramp over [0, 2π) per period
        assert_eq!(block[0], 0.0);
        let step = TAU / period as f64;
        for (index, phase) in block.iter().enumerate().take(period) {
            assert!((*phase - step * index as f64).abs() < 1e-9);
        }
        // next period starts over at zero phase
        assert_eq!(block[period], 0.0);
    }
}
