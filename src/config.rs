use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Signal and voice pool configuration of a [`Synth`](crate::Synth).
///
/// The sample rate and block size are fixed for the lifetime of the synthesizer: all voices,
/// envelopes and oscillators are built from these specs and the audio output is expected to
/// run at the same rate. Parameter changes at runtime take effect at block boundaries only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Number of mono samples which are pulled from each voice per block.
    pub block_size: usize,
    /// Number of polyphonic voices in the pool.
    pub voice_count: usize,
}

impl SynthConfig {
    const MAX_VOICE_COUNT: usize = 64;

    /// Create a new config with the given specs.
    pub fn new(sample_rate: u32, block_size: usize, voice_count: usize) -> Result<Self, Error> {
        let config = Self {
            sample_rate,
            block_size,
            voice_count,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that all specs are usable. Invalid configs fail at the call site and never
    /// reach the audio path.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::ParameterError(
                "Sample rate must not be zero".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(Error::ParameterError(
                "Block size must not be zero".to_string(),
            ));
        }
        if self.voice_count == 0 || self.voice_count > Self::MAX_VOICE_COUNT {
            return Err(Error::ParameterError(format!(
                "Voice count must be in range [1, {}]",
                Self::MAX_VOICE_COUNT
            )));
        }
        Ok(())
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 441,
            voice_count: 8,
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SynthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_size, 441);
        assert_eq!(config.voice_count, 8);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(SynthConfig::new(0, 441, 8).is_err());
        assert!(SynthConfig::new(44100, 0, 8).is_err());
        assert!(SynthConfig::new(44100, 441, 0).is_err());
        assert!(SynthConfig::new(44100, 441, 1000).is_err());
    }
}
