use std::{error, fmt};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by polyfm.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// An invalid parameter value was passed to a synthesis or controller function.
    ParameterError(String),
    /// An operator index outside of a voice's operator range was used.
    OperatorIndexError(usize),
    /// A voice index outside of the configured voice pool was used.
    VoiceIndexError(usize),
    /// A sample block of an unexpected length was passed to a block processing function.
    BlockSizeError { expected: usize, actual: usize },
    /// The audio output device or stream failed.
    OutputDeviceError(Box<dyn error::Error + Send + Sync>),
    /// The MIDI input or output device failed.
    MidiDeviceError(String),
    /// A message could not be sent into a channel.
    SendError,
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::OperatorIndexError(index) => {
                write!(f, "Operator index {index} is out of bounds")
            }
            Self::VoiceIndexError(index) => write!(f, "Voice index {index} is out of bounds"),
            Self::BlockSizeError { expected, actual } => {
                write!(
                    f,
                    "Sample block length mismatch: expected {expected} samples, got {actual}"
                )
            }
            Self::OutputDeviceError(err) => err.fmt(f),
            Self::MidiDeviceError(str) => write!(f, "MIDI device error: {str}"),
            Self::SendError => write!(f, "Failed to send message into a channel"),
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Error::SendError
    }
}
