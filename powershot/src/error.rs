use thiserror::Error;

/// Everything that can go wrong while talking to the camera.
#[derive(Debug, Error)]
pub enum Error {
    /// libusb reported a failure (timeout, pipe error, device gone...).
    #[error("usb transfer failed: {0}")]
    Usb(#[from] rusb::Error),

    /// The USB layer moved fewer or more bytes than the protocol requires.
    #[error("transport error: {0}")]
    Transport(String),

    /// The camera answered, but not the way the protocol says it should.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The call is not valid in the current state, e.g. a remote-control
    /// command outside of a remote-control session.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("buffer size mismatch: expected {expected:#x} bytes, got {actual:#x}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("range error: {width} byte(s) at offset {offset:#x} outside a {len:#x} byte buffer")]
    Range {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// Writing downloaded data to the caller's sink failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    /// True for failures of the USB link itself rather than of the protocol
    /// spoken over it.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Usb(_) | Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
