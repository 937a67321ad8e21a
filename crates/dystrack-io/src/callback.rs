//! Host-supplied function as a transmission channel.

use std::error::Error;

use dystrack_core::{ChannelKind, TransmissionAttempt};
use serde_json::{Map, Value};

use crate::error::TransmitError;
use crate::transmit::Transmitter;

pub type CallbackResult = Result<(), Box<dyn Error + Send + Sync>>;

type Callback = Box<dyn FnMut(&TransmissionAttempt, &Map<String, Value>) -> CallbackResult + Send>;

/// Calls `f(attempt, kwargs)` for every send. Any error it returns is a
/// send failure and goes through the scheduler's retry path.
pub struct CallbackTransmitter {
    callback: Callback,
    kwargs: Map<String, Value>,
}

impl CallbackTransmitter {
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(&TransmissionAttempt, &Map<String, Value>) -> CallbackResult + Send + 'static,
    {
        Self {
            callback: Box::new(f),
            kwargs: Map::new(),
        }
    }

    /// Extra keyword arguments handed to the callback on every call.
    #[must_use]
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }
}

impl std::fmt::Debug for CallbackTransmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackTransmitter")
            .field("kwargs", &self.kwargs)
            .finish_non_exhaustive()
    }
}

impl Transmitter for CallbackTransmitter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Callback
    }

    fn send(&mut self, attempt: &TransmissionAttempt) -> Result<(), TransmitError> {
        (self.callback)(attempt, &self.kwargs).map_err(|e| TransmitError::Callback(e.to_string()))
    }
}
