use std::{fs::File, io::BufWriter, path::Path, time::Duration};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{
    error::Error,
    output::OutputSink,
    source::{empty::EmptySource, BlockSource},
};

// -------------------------------------------------------------------------------------------------

const BUFFER_SIZE_FRAMES: usize = 1024;

// -------------------------------------------------------------------------------------------------

/// Audio output sink which renders audio into a mono wav file instead of playing it back.
///
/// Unlike realtime outputs, the wav sink is driven manually: after setting a source via
/// `play`, call [`Self::render`] to pull and write a stretch of audio. This keeps offline
/// rendering deterministic - control changes applied between `render` calls land at exact
/// sample positions in the written file.
///
/// Wav file contents are saved as 32bit floats.
pub struct WavOutput {
    writer: Option<WavWriter<BufWriter<File>>>,
    source: Box<dyn BlockSource>,
    buffer: Vec<f64>,
    sample_rate: u32,
    paused: bool,
}

impl WavOutput {
    /// Create a new wav output sink writing to the given file path with the given
    /// sample rate.
    pub fn open<P: AsRef<Path>>(file_path: P, sample_rate: u32) -> Result<Self, Error> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer =
            WavWriter::create(file_path, spec).map_err(|err| Error::OutputDeviceError(Box::new(err)))?;
        Ok(Self {
            writer: Some(writer),
            source: Box::new(EmptySource),
            buffer: vec![0.0; BUFFER_SIZE_FRAMES],
            sample_rate,
            paused: false,
        })
    }

    /// Pull the given duration worth of samples from the playing source and append them to
    /// the wav file.
    pub fn render(&mut self, duration: Duration) -> Result<(), Error> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            Error::ParameterError("Wav output already got finalized".to_string())
        })?;
        let mut frames_left =
            (duration.as_secs_f64() * self.sample_rate as f64).round() as usize;
        while frames_left > 0 {
            let frames = frames_left.min(self.buffer.len());
            let block = &mut self.buffer[..frames];
            if self.paused {
                block.fill(0.0);
            } else {
                self.source.write(block);
            }
            for sample in block.iter() {
                writer
                    .write_sample(*sample as f32)
                    .map_err(|err| Error::OutputDeviceError(Box::new(err)))?;
            }
            frames_left -= frames;
        }
        Ok(())
    }

    /// Finish the wav file. Further render calls will fail.
    pub fn finalize(&mut self) -> Result<(), Error> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|err| Error::OutputDeviceError(Box::new(err)))?;
        }
        Ok(())
    }
}

impl OutputSink for WavOutput {
    fn channel_count(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, source: Box<dyn BlockSource>) {
        self.source = source;
    }

    fn stop(&mut self) {
        self.source = Box::new(EmptySource);
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn close(&mut self) {
        if let Err(err) = self.finalize() {
            log::error!("Failed to finalize wav file: {err}");
        }
    }
}
