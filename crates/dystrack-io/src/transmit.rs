//! Transmitter trait: one delivery channel to the microscope macro.

use dystrack_core::{ChannelKind, TransmissionAttempt};

use crate::error::TransmitError;

/// Delivers computed coordinates to the microscope side.
///
/// `send` succeeds only if every write it performs succeeds. Retrying is the
/// caller's job; implementations make exactly one attempt per call.
pub trait Transmitter: Send {
    fn kind(&self) -> ChannelKind;

    fn send(&mut self, attempt: &TransmissionAttempt) -> Result<(), TransmitError>;

    /// Degraded command sent after the regular attempts are exhausted:
    /// no new coordinates, action `nothing`, and a diagnostic message.
    fn send_fallback(&mut self) -> Result<(), TransmitError> {
        self.send(&TransmissionAttempt::fallback())
    }

    /// File this channel writes inside the watched tree, if any. The
    /// scheduler never treats a file with this name as a trigger.
    fn output_file_name(&self) -> Option<&str> {
        None
    }
}

impl<T: Transmitter + ?Sized> Transmitter for Box<T> {
    fn kind(&self) -> ChannelKind {
        (**self).kind()
    }

    fn send(&mut self, attempt: &TransmissionAttempt) -> Result<(), TransmitError> {
        (**self).send(attempt)
    }

    fn send_fallback(&mut self) -> Result<(), TransmitError> {
        (**self).send_fallback()
    }

    fn output_file_name(&self) -> Option<&str> {
        (**self).output_file_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dystrack_core::{ActionToken, StagePosition};

    struct Recorder(Vec<TransmissionAttempt>);

    impl Transmitter for Recorder {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Command
        }

        fn send(&mut self, attempt: &TransmissionAttempt) -> Result<(), TransmitError> {
            self.0.push(attempt.clone());
            Ok(())
        }
    }

    #[test]
    fn default_fallback_sends_nothing_command() {
        let mut rec = Recorder(Vec::new());
        rec.send_fallback().expect("ok");
        assert_eq!(rec.0.len(), 1);
        assert_eq!(rec.0[0].action, ActionToken::Nothing);
        assert!(rec.0[0].position.is_unchanged());
    }

    #[test]
    fn boxed_transmitter_delegates() {
        let mut boxed: Box<dyn Transmitter> = Box::new(Recorder(Vec::new()));
        assert_eq!(boxed.kind(), ChannelKind::Command);
        assert!(boxed.output_file_name().is_none());
        boxed
            .send(&TransmissionAttempt::focus(StagePosition::UNCHANGED, "OK"))
            .expect("ok");
    }
}
