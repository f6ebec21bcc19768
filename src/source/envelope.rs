//! ADSR envelope with a block based generator and click-free restrike and tunedown ramps.

use std::time::Duration;

use crate::{source::BlockSource, utils::buffer::fill_linear_ramp, Error};

// -------------------------------------------------------------------------------------------------

/// Current processing stage of an [`AdsrEnvelope`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AdsrStage {
    /// Before the first strike (zero volume).
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
    /// Fast fade-out ramp after release finished or when a voice gets displaced.
    Tunedown,
    /// Envelope ran to completion (zero volume until re-struck).
    Done,
}

// -------------------------------------------------------------------------------------------------

/// ADSR envelope parameters that define the envelope shape for an [`AdsrEnvelope`].
///
/// Parameters are immutable per strike: reassigning them between strikes is allowed and takes
/// effect at the next block boundary.
#[derive(Debug, Clone)]
pub struct AdsrParameters {
    attack_time: Duration,
    decay_time: Duration,
    sustain_level: f64,
    release_time: Duration,
    hold: bool,
}

impl AdsrParameters {
    /// Create new ADSR parameters with attack, decay and release time durations, a sustain
    /// level in range `[0.0, 1.0]` and the hold flag.
    ///
    /// When `hold` is set, the envelope stays in the sustain stage after decay until released.
    /// Without it the release stage directly follows decay.
    pub fn new(
        attack_time: Duration,
        decay_time: Duration,
        sustain_level: f64,
        release_time: Duration,
        hold: bool,
    ) -> Result<Self, Error> {
        let mut parameters = Self {
            attack_time,
            decay_time,
            sustain_level: 0.0,
            release_time,
            hold,
        };
        parameters.set_sustain_level(sustain_level)?;
        Ok(parameters)
    }

    /// Get attack time duration.
    pub fn attack_time(&self) -> Duration {
        self.attack_time
    }
    /// Set the attack time duration. Attack can be zero to completely skip the attack stage.
    pub fn set_attack_time(&mut self, time: Duration) {
        self.attack_time = time;
    }

    /// Get decay time duration.
    pub fn decay_time(&self) -> Duration {
        self.decay_time
    }
    /// Set the decay time duration.
    pub fn set_decay_time(&mut self, time: Duration) {
        self.decay_time = time;
    }

    /// Get the sustain level.
    pub fn sustain_level(&self) -> f64 {
        self.sustain_level
    }
    /// Set the sustain level in range `[0.0, 1.0]`.
    pub fn set_sustain_level(&mut self, level: f64) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&level) {
            return Err(Error::ParameterError(format!(
                "Invalid sustain level: {level}. Must be in range [0.0, 1.0]"
            )));
        }
        self.sustain_level = level;
        Ok(())
    }

    /// Get release time duration.
    pub fn release_time(&self) -> Duration {
        self.release_time
    }
    /// Set the release time duration.
    pub fn set_release_time(&mut self, time: Duration) {
        self.release_time = time;
    }

    /// Get the hold flag.
    pub fn hold(&self) -> bool {
        self.hold
    }
    /// Set the hold flag.
    pub fn set_hold(&mut self, hold: bool) {
        self.hold = hold;
    }
}

impl Default for AdsrParameters {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(50),
            Duration::from_millis(100),
            0.9,
            Duration::from_millis(250),
            true,
        )
        .expect("Default ADSR parameters should be valid")
    }
}

// -------------------------------------------------------------------------------------------------

/// Classic ADSR envelope generator, producing amplitude blocks in range `[0.0, 1.0]`.
///
/// All stage segments are linear ramps: attack from 0 to 1, decay from 1 to the sustain
/// level, release from the sustain level to 0. The sustain stage re-interpolates from the
/// last emitted amplitude towards the current sustain level within one block, so live
/// parameter changes never cause discontinuities. The tunedown stage fades whatever
/// amplitude is left to zero with a fixed 7 ms slope.
///
/// Striking the envelope while it is running emits a short ramp from the current amplitude
/// down to zero before the attack restarts, which keeps restrikes click-free.
///
/// Segment ramps are cached and only recomputed when the parameters are reassigned.
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    sample_rate: u32,
    parameters: AdsrParameters,
    stage: AdsrStage,
    idx: usize,
    struck: bool,
    released: bool,
    amp: f64,
    attack_cache: Vec<f64>,
    decay_cache: Vec<f64>,
    release_cache: Vec<f64>,
}

impl AdsrEnvelope {
    /// Complete tunedown within 7 ms.
    const TUNEDOWN_SECONDS: f64 = 0.007;

    /// Create a new idle envelope with default parameters for the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            parameters: AdsrParameters::default(),
            stage: AdsrStage::Idle,
            idx: 0,
            struck: false,
            released: false,
            amp: 0.0,
            attack_cache: Vec::new(),
            decay_cache: Vec::new(),
            release_cache: Vec::new(),
        }
    }

    /// Get the currently assigned parameters.
    pub fn parameters(&self) -> &AdsrParameters {
        &self.parameters
    }
    /// Assign new parameters. Cached segment ramps are invalidated and get recomputed with
    /// the new shape from the next processed block on.
    pub fn set_parameters(&mut self, parameters: AdsrParameters) {
        self.parameters = parameters;
        self.attack_cache.clear();
        self.decay_cache.clear();
        self.release_cache.clear();
    }

    /// The envelope's current stage.
    #[inline]
    pub fn stage(&self) -> AdsrStage {
        self.stage
    }

    /// The last emitted amplitude.
    #[inline]
    pub fn last_amplitude(&self) -> f64 {
        self.amp
    }

    /// Returns true once the envelope ran to completion.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.stage == AdsrStage::Done
    }

    /// Start a new attack with the next processed block. When the envelope is already
    /// running, the next block first ramps the current amplitude down to zero.
    pub fn strike(&mut self) {
        self.struck = true;
    }

    /// Move a held envelope into its release stage.
    pub fn release(&mut self) {
        self.released = true;
    }

    /// Skip ahead to the tunedown stage, fading the current amplitude to zero within 7 ms.
    /// Used to silence a displaced voice before it gets reassigned.
    pub fn tunedown(&mut self) {
        self.stage = AdsrStage::Tunedown;
        self.idx = 0;
    }

    /// Immediately reset the envelope to its idle state.
    pub fn reset(&mut self) {
        self.stage = AdsrStage::Idle;
        self.idx = 0;
    }

    /// Produce one block of amplitude samples, advancing through the envelope stages.
    /// A single block may cross multiple stage boundaries.
    pub fn process(&mut self, output: &mut [f64]) {
        let block_len = output.len();
        if block_len == 0 {
            return;
        }

        let n_attack = self.segment_samples(self.parameters.attack_time);
        let n_decay = self.segment_samples(self.parameters.decay_time);
        let n_release = self.segment_samples(self.parameters.release_time);
        let sustain = self.parameters.sustain_level;

        let mut pos = 0;
        let mut amp = self.amp;

        // The stages are processed in playback order: when a segment completes within the
        // block, the next stage continues filling the block's remainder.

        if self.stage == AdsrStage::Attack {
            pos = Self::fill_segment(
                &mut self.attack_cache,
                0.0,
                1.0,
                n_attack,
                &mut self.idx,
                output,
                pos,
                &mut amp,
            );
            if self.idx == n_attack {
                self.stage = AdsrStage::Decay;
                self.idx = 0;
            }
        }

        if self.stage == AdsrStage::Decay {
            pos = Self::fill_segment(
                &mut self.decay_cache,
                1.0,
                sustain,
                n_decay,
                &mut self.idx,
                output,
                pos,
                &mut amp,
            );
            if self.idx == n_decay {
                self.stage = if self.parameters.hold {
                    AdsrStage::Sustain
                } else {
                    AdsrStage::Release
                };
                self.idx = 0;
            }
        }

        if self.stage == AdsrStage::Sustain {
            // interpolate from the last amplitude towards the current sustain level, so
            // live sustain changes do not create cracks
            let remainder = &mut output[pos..];
            if !remainder.is_empty() {
                fill_linear_ramp(remainder, amp, sustain);
                amp = output[block_len - 1];
            }
            pos = block_len;
            if self.released {
                self.stage = AdsrStage::Release;
                self.idx = 0;
            }
        }

        if self.stage == AdsrStage::Release {
            pos = Self::fill_segment(
                &mut self.release_cache,
                sustain,
                0.0,
                n_release,
                &mut self.idx,
                output,
                pos,
                &mut amp,
            );
            if self.idx == n_release {
                self.stage = AdsrStage::Tunedown;
                self.idx = 0;
            }
        }

        if self.stage == AdsrStage::Tunedown {
            let loss_per_sample = 1.0 / (Self::TUNEDOWN_SECONDS * self.sample_rate as f64);
            let space = block_len - pos;
            let tunedown_samples = ((amp / loss_per_sample).ceil() as usize).min(space);
            let target = (amp - loss_per_sample * tunedown_samples as f64).max(0.0);
            if tunedown_samples > 0 {
                fill_linear_ramp(&mut output[pos..pos + tunedown_samples], amp, target);
                amp = output[pos + tunedown_samples - 1];
                pos += tunedown_samples;
            }
            if target == 0.0 {
                self.stage = AdsrStage::Done;
            }
        }

        if matches!(self.stage, AdsrStage::Idle | AdsrStage::Done) {
            output[pos..].fill(0.0);
        }

        // A strike while the envelope is running replaces the block with a short fade-out
        // ramp from the block's first sample, then restarts the attack with the next block.
        if self.struck {
            if !matches!(self.stage, AdsrStage::Idle | AdsrStage::Done) {
                let ramp_len = ((Self::TUNEDOWN_SECONDS * self.sample_rate as f64).ceil()
                    as usize)
                    .min(block_len);
                let start = output[0];
                fill_linear_ramp(&mut output[..ramp_len], start, 0.0);
                output[ramp_len..].fill(0.0);
            }
            self.stage = AdsrStage::Attack;
            self.idx = 0;
            self.released = false;
            self.struck = false;
        }

        self.amp = output[block_len - 1];
    }

    /// Number of samples of a segment with the given time duration.
    fn segment_samples(&self, time: Duration) -> usize {
        (self.sample_rate as f64 * time.as_secs_f64()).ceil() as usize
    }

    /// Copy up to the block remainder from a cached linear segment ramp into the output,
    /// extending the cache on demand. Advances the segment index and returns the new
    /// block write position.
    #[allow(clippy::too_many_arguments)]
    fn fill_segment(
        cache: &mut Vec<f64>,
        from: f64,
        to: f64,
        segment_len: usize,
        idx: &mut usize,
        output: &mut [f64],
        pos: usize,
        amp: &mut f64,
    ) -> usize {
        let end = (*idx + (output.len() - pos)).min(segment_len);
        if end <= *idx {
            // no space left in the block, or the segment got shortened by a parameter
            // change below the current index - clamp, so the stage can complete
            *idx = end;
            return pos;
        }
        if cache.len() < end {
            for k in cache.len()..end {
                cache.push(Self::segment_value(from, to, segment_len, k));
            }
        }
        let fragment = &cache[*idx..end];
        let new_pos = pos + fragment.len();
        output[pos..new_pos].copy_from_slice(fragment);
        if new_pos > pos {
            *amp = output[new_pos - 1];
        }
        *idx = end;
        new_pos
    }

    /// Value of a linear segment ramp at sample `k`. The ramp includes both endpoints:
    /// the last sample of a segment is exactly `to`.
    fn segment_value(from: f64, to: f64, segment_len: usize, k: usize) -> f64 {
        debug_assert!(k < segment_len);
        if segment_len > 1 {
            from + (to - from) * k as f64 / (segment_len - 1) as f64
        } else {
            from
        }
    }
}

impl BlockSource for AdsrEnvelope {
    fn write(&mut self, output: &mut [f64]) {
        self.process(output);
    }

    fn is_exhausted(&self) -> bool {
        self.is_finished()
    }
}

// -------------------------------------------------------------------------------------------------
