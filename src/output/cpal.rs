use std::{
    error,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{sync_channel, Receiver, SyncSender},
        Arc, Mutex,
    },
    thread,
};

#[cfg(feature = "assert-allocs")]
use assert_no_alloc::*;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::{
    error::Error,
    output::OutputSink,
    source::{empty::EmptySource, BlockSource},
};

// -------------------------------------------------------------------------------------------------

fn device_error(err: impl error::Error + Send + Sync + 'static) -> Error {
    Error::OutputDeviceError(Box::new(err))
}

// -------------------------------------------------------------------------------------------------

/// Audio output sink impl using [cpal](https://github.com/RustAudio/cpal).
///
/// The mono source signal is duplicated to all channels of the opened output device and
/// converted to the device's sample format.
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread which receives
/// suspend/resume commands through a small channel and exits - closing the device - once
/// the channel is dropped or closed. Everything else needs no messaging: the audio
/// callback shares a handoff slot for the program source and a playing flag with this
/// handle, and picks both up non-blockingly at the start of each callback run.
pub struct CpalOutput {
    channel_count: usize,
    sample_rate: u32,
    shared: Arc<SharedState>,
    commands: SyncSender<StreamCommand>,
}

impl CpalOutput {
    /// The synth pipeline's native sample rate, preferred when opening devices.
    const NATIVE_SAMPLE_RATE: cpal::SampleRate = cpal::SampleRate(44100);

    /// Open the default output device of the default audio host.
    pub fn open() -> Result<Self, Error> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            Error::OutputDeviceError("No audio output device available".into())
        })?;
        if let Ok(name) = device.name() {
            log::info!("Using audio device: {name}");
        }

        let supported = Self::output_config(&device)?;
        let config = supported.config();
        let sample_format = supported.sample_format();
        log::info!("Opening output stream: {config:?}, {sample_format}");

        let shared = Arc::new(SharedState {
            pending_source: Mutex::new(None),
            playing: AtomicBool::new(false),
        });

        // The stream thread reports back once the stream is built, so open errors
        // surface here instead of dying inside the thread.
        const COMMAND_QUEUE_SIZE: usize = 16;
        let (command_send, command_recv) = sync_channel(COMMAND_QUEUE_SIZE);
        let (opened_send, opened_recv) = sync_channel(1);
        thread::Builder::new()
            .name("polyfm_output".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                let config = config.clone();
                move || {
                    run_stream_thread(
                        device,
                        config,
                        sample_format,
                        shared,
                        command_recv,
                        opened_send,
                    )
                }
            })
            .map_err(device_error)?;
        opened_recv
            .recv()
            .map_err(|_| Error::OutputDeviceError("Output stream thread died".into()))??;

        Ok(Self {
            channel_count: config.channels as usize,
            sample_rate: config.sample_rate.0,
            shared,
            commands: command_send,
        })
    }

    /// Pick a stream config: stereo f32 at the synth's native rate when the device offers
    /// it, else whatever the device defaults to.
    fn output_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig, Error> {
        let preferred = device
            .supported_output_configs()
            .map_err(device_error)?
            .find(|config| {
                config.sample_format() == cpal::SampleFormat::F32
                    && config.channels() == 2
                    && config.min_sample_rate() <= Self::NATIVE_SAMPLE_RATE
                    && config.max_sample_rate() >= Self::NATIVE_SAMPLE_RATE
            });
        match preferred {
            Some(config) => Ok(config.with_sample_rate(Self::NATIVE_SAMPLE_RATE)),
            None => device.default_output_config().map_err(device_error),
        }
    }

    fn send_command(&self, command: StreamCommand) {
        if self.commands.send(command).is_err() {
            log::error!("Output stream thread is gone");
        }
    }
}

impl OutputSink for CpalOutput {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, source: Box<dyn BlockSource>) {
        *self.shared.pending_source.lock().unwrap() = Some(source);
        self.resume();
    }

    fn stop(&mut self) {
        *self.shared.pending_source.lock().unwrap() = Some(Box::new(EmptySource));
    }

    fn pause(&mut self) {
        self.shared.playing.store(false, Ordering::Relaxed);
        self.send_command(StreamCommand::Suspend);
    }

    fn resume(&mut self) {
        self.shared.playing.store(true, Ordering::Relaxed);
        self.send_command(StreamCommand::Resume);
    }

    fn close(&mut self) {
        self.send_command(StreamCommand::Close);
    }
}

// -------------------------------------------------------------------------------------------------

/// State shared between the sink handle and the audio callback.
struct SharedState {
    /// Handoff slot for a new program source. The callback empties it with a
    /// non-blocking try_lock, so the control thread can never stall the stream.
    pending_source: Mutex<Option<Box<dyn BlockSource>>>,
    /// True while the callback should pull the source, false for silence.
    playing: AtomicBool,
}

// -------------------------------------------------------------------------------------------------

/// Commands for the thread owning the cpal stream.
enum StreamCommand {
    Suspend,
    Resume,
    Close,
}

// -------------------------------------------------------------------------------------------------

/// Body of the stream owning thread: build the stream, report the outcome, then apply
/// commands until the handle hangs up. Dropping the stream on exit releases the device.
fn run_stream_thread(
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    shared: Arc<SharedState>,
    commands: Receiver<StreamCommand>,
    opened: SyncSender<Result<(), Error>>,
) {
    let stream = match build_stream(&device, &config, sample_format, shared) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = opened.send(Err(err));
            return;
        }
    };
    let _ = opened.send(Ok(()));

    while let Ok(command) = commands.recv() {
        match command {
            StreamCommand::Suspend => {
                if let Err(err) = stream.pause() {
                    log::error!("Failed to suspend the output stream: {err}");
                }
            }
            StreamCommand::Resume => {
                if let Err(err) = stream.play() {
                    log::error!("Failed to resume the output stream: {err}");
                }
            }
            StreamCommand::Close => break,
        }
    }
}

/// Build the output stream with a render callback matching the device's sample format.
fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    shared: Arc<SharedState>,
) -> Result<cpal::Stream, Error> {
    let mut callback = StreamCallback::new(shared, config.channels as usize);
    macro_rules! stream_for {
        ($sample:ty) => {
            device
                .build_output_stream(
                    config,
                    move |output: &mut [$sample], _: &cpal::OutputCallbackInfo| {
                        callback.render(output);
                    },
                    |err| log::error!("Output stream error: {err}"),
                    None,
                )
                .map_err(device_error)
        };
    }
    match sample_format {
        cpal::SampleFormat::I8 => stream_for!(i8),
        cpal::SampleFormat::I16 => stream_for!(i16),
        cpal::SampleFormat::I32 => stream_for!(i32),
        cpal::SampleFormat::I64 => stream_for!(i64),
        cpal::SampleFormat::U8 => stream_for!(u8),
        cpal::SampleFormat::U16 => stream_for!(u16),
        cpal::SampleFormat::U32 => stream_for!(u32),
        cpal::SampleFormat::U64 => stream_for!(u64),
        cpal::SampleFormat::F32 => stream_for!(f32),
        cpal::SampleFormat::F64 => stream_for!(f64),
        other => Err(Error::OutputDeviceError(
            format!("Unsupported sample format: {other}").into(),
        )),
    }
}

// -------------------------------------------------------------------------------------------------

/// Pulls mono blocks from the active program source and fans them out to the device's
/// interleaved output buffer.
struct StreamCallback {
    shared: Arc<SharedState>,
    source: Box<dyn BlockSource>,
    channel_count: usize,
    mono_buffer: Vec<f64>,
}

impl StreamCallback {
    fn new(shared: Arc<SharedState>, channel_count: usize) -> Self {
        Self {
            shared,
            source: Box::new(EmptySource),
            channel_count,
            mono_buffer: Vec::new(),
        }
    }

    fn render<T>(&mut self, output: &mut [T])
    where
        T: cpal::SizedSample + cpal::FromSample<f64>,
    {
        // pick up a newly handed over program source, without ever blocking the stream
        if let Ok(mut pending) = self.shared.pending_source.try_lock() {
            if let Some(source) = pending.take() {
                self.source = source;
            }
        }

        if !self.shared.playing.load(Ordering::Relaxed) {
            output.fill(T::EQUILIBRIUM);
            return;
        }

        // pull the mono signal (the buffer grows once, on the first callback run)
        let frames = output.len() / self.channel_count;
        self.mono_buffer.resize(frames, 0.0);
        #[cfg(not(feature = "assert-allocs"))]
        self.source.write(&mut self.mono_buffer);
        #[cfg(feature = "assert-allocs")]
        assert_no_alloc(|| self.source.write(&mut self.mono_buffer));

        // duplicate it to all device channels, converted to the device's sample format
        for (frame, sample) in output
            .chunks_exact_mut(self.channel_count)
            .zip(&self.mono_buffer)
        {
            frame.fill(T::from_sample(*sample));
        }
    }
}
