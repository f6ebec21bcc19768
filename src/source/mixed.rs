use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;

use crate::{
    allocator::VoiceAllocator,
    source::BlockSource,
    synth::SynthEvent,
    utils::buffer::{add_buffers, clear_buffer, scale_buffer},
    Error, SynthConfig,
};

// -------------------------------------------------------------------------------------------------

/// A source which pulls one block from every active voice in a shared pool and sums them
/// into a mono output stream.
///
/// The mixer drives the audio side of the synthesizer: it is handed to an output sink and
/// pulled from the realtime audio callback. Each pulled block locks the voice pool once,
/// mixes all voices that are bound to notes, and normalizes the sum by the pool size. Voices
/// whose envelopes ran to completion are unbound from their note right after their last
/// block, and a [`SynthEvent::VoiceFinished`] is emitted for each of them.
///
/// Output requests larger than the configured block size are processed in block sized
/// chunks, so control changes keep taking effect at block boundaries.
///
/// All mix buffers are preallocated: the pull path never allocates.
pub struct VoiceMixer {
    pool: Arc<Mutex<VoiceAllocator>>,
    sample_rate: u32,
    block_size: usize,
    voice_buffer: Vec<f64>,
    active_voices: Vec<usize>,
    finished_voices: Vec<usize>,
    event_send: Option<Sender<SynthEvent>>,
}

impl VoiceMixer {
    /// Create a new mixer over the given voice pool.
    pub fn new(
        pool: Arc<Mutex<VoiceAllocator>>,
        config: &SynthConfig,
        event_send: Option<Sender<SynthEvent>>,
    ) -> Self {
        Self {
            pool,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            voice_buffer: vec![0.0; config.block_size],
            active_voices: Vec::with_capacity(config.voice_count),
            finished_voices: Vec::with_capacity(config.voice_count),
            event_send,
        }
    }

    /// The mixer's output sample rate.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    /// The mixer's internal block size in samples.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Pull exactly one block synchronously. Fails when the passed buffer does not match
    /// the configured block size - the mixer never silently truncates blocks.
    pub fn render_block(&mut self, output: &mut [f64]) -> Result<(), Error> {
        if output.len() != self.block_size {
            return Err(Error::BlockSizeError {
                expected: self.block_size,
                actual: output.len(),
            });
        }
        self.write_block(output);
        Ok(())
    }

    /// Mix a single block of at most `block_size` samples.
    fn write_block(&mut self, output: &mut [f64]) {
        debug_assert!(output.len() <= self.block_size);
        clear_buffer(output);

        // a poisoned pool means a control thread panicked - keep the stream silent then
        let Ok(mut pool) = self.pool.lock() else {
            return;
        };

        // mix all voices which are bound to notes
        self.active_voices.clear();
        self.active_voices.extend_from_slice(pool.order());
        self.finished_voices.clear();
        for &index in &self.active_voices {
            let voice_block = &mut self.voice_buffer[..output.len()];
            let voice = pool.voice_mut(index);
            voice.process(voice_block);
            if voice.is_finished() {
                self.finished_voices.push(index);
            }
            add_buffers(output, voice_block);
        }
        scale_buffer(output, 1.0 / pool.voice_count() as f64);

        // unbind voices whose envelopes ran to completion
        for &index in &self.finished_voices {
            let note = pool.channel_done(index);
            if let Some(event_send) = &self.event_send {
                if event_send
                    .try_send(SynthEvent::VoiceFinished { voice: index, note })
                    .is_err()
                {
                    log::warn!("Failed to send voice finished event for voice {index}");
                }
            }
        }
    }
}

impl BlockSource for VoiceMixer {
    fn write(&mut self, output: &mut [f64]) {
        for chunk in output.chunks_mut(self.block_size) {
            self.write_block(chunk);
        }
    }

    fn is_exhausted(&self) -> bool {
        // the mixer never is exhausted: voices get struck at any time
        false
    }
}

// -------------------------------------------------------------------------------------------------
