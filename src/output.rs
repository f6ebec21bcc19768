#[cfg(feature = "cpal-output")]
pub mod cpal;
#[cfg(feature = "wav-output")]
pub mod wav;

use crate::source::BlockSource;

// -------------------------------------------------------------------------------------------------

/// The default audio output sink type, when a realtime output impl is enabled.
#[cfg(feature = "cpal-output")]
pub type DefaultOutput = cpal::CpalOutput;

// -------------------------------------------------------------------------------------------------

/// An audio output sink which continuously pulls sample blocks from a single main source.
///
/// Sinks consume mono `f64` blocks and convert them to whatever channel layout and sample
/// format their backing stream runs with.
pub trait OutputSink: Send + 'static {
    /// The sink's output channel count.
    fn channel_count(&self) -> usize;
    /// The sink's output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Play the given source as main output source, replacing any previous one.
    fn play(&mut self, source: Box<dyn BlockSource>);
    /// Drop the actual source, replacing it with silence.
    fn stop(&mut self);

    /// Pause playback without dropping the output source.
    fn pause(&mut self);
    /// Resume from paused playback.
    fn resume(&mut self);

    /// Release the audio device or finish the output stream.
    fn close(&mut self);
}
