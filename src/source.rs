pub mod empty;
pub mod envelope;
pub mod mixed;
pub mod operator;
pub mod oscillator;
pub mod voice;

// -------------------------------------------------------------------------------------------------

/// BlockSource types produce mono audio sample blocks in `f64` format and are `Send`able
/// across threads.
///
/// Sources are pull-driven and single-consumer: nothing is computed until a downstream node
/// asks for samples. `write` always fills the entire output slice, padding with silence when
/// a source runs short, so downstream nodes never have to handle partial blocks.
///
/// `write` is called in the realtime audio thread, so it must not block on I/O or locks held
/// across user actions and must complete in bounded time proportional to the block length.
pub trait BlockSource: Send + 'static {
    /// Fill all of `output` with the next samples.
    fn write(&mut self, output: &mut [f64]);
    /// Returns true once the source finished playing. Exhausted sources write silence only
    /// and may be detached from a render graph by their consumer.
    fn is_exhausted(&self) -> bool;
}
