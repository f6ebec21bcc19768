#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod allocator;
mod config;
mod error;
mod output;
mod source;
mod synth;

// public, flat re-exports
pub use error::Error;

pub use config::SynthConfig;

#[cfg(feature = "cpal-output")]
pub use output::{cpal::CpalOutput, DefaultOutput};
#[cfg(feature = "wav-output")]
pub use output::wav::WavOutput;
pub use output::OutputSink;

pub use allocator::VoiceAllocator;

pub use source::{
    empty::EmptySource,
    envelope::{AdsrEnvelope, AdsrParameters, AdsrStage},
    mixed::VoiceMixer,
    operator::Operator,
    oscillator::{Waveform, WavetableOscillator},
    voice::FmVoice,
    BlockSource,
};

pub use synth::{Synth, SynthController, SynthEvent};

// public mods
pub mod controller;
pub mod midi;
pub mod utils;
