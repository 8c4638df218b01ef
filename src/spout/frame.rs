#![expect(unsafe_code, reason = "per-frame FFI calls through SpoutLibrary vtable pointers")]

//! Per-frame send path.
//!
//! `send_frame` runs once per rendered frame on the host's render thread. It
//! never blocks and never surfaces a failure to the caller: a failed send is
//! counted, and logged only once per diagnostic interval so a receiver that
//! goes away does not flood the log.

use tracing::{error, warn};

use super::{
    error::{SenderError, SenderResult},
    ffi_types::{SendImage, SendTexture, Slot, GL_RGBA, GL_TEXTURE_2D},
    sender::SpoutSender,
};

/// Native GL texture name supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

impl TextureId {
    /// GL reserves 0; it never names a texture.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl From<u32> for TextureId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Counters for the send path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Sends the library accepted
    pub frames_sent: u64,
    /// Sends that returned false, faulted or could not be resolved
    pub frames_failed: u64,
    /// Failure diagnostics actually written to the log
    pub diagnostics_emitted: u64,
}

impl SpoutSender {
    /// Share `texture` with receivers. No-op unless Ready; failures are only logged.
    pub fn send_frame(&mut self, texture: TextureId) {
        if !self.is_ready() || !texture.is_valid() {
            return;
        }
        if let Err(e) = self.try_send_frame(texture) {
            self.report_send_failure(&e);
        }
    }

    /// Share `texture` with receivers.
    ///
    /// Calls `SendTexture(id, GL_TEXTURE_2D, width, height, false, 0)`.
    pub fn try_send_frame(&mut self, texture: TextureId) -> SenderResult<()> {
        let (width, height) = self.frame_size().ok_or(SenderError::NotReady)?;
        if !texture.is_valid() {
            return Err(SenderError::InvalidTexture);
        }
        let result = self.resolved::<SendTexture>().and_then(|send| {
            self.guarded::<SendTexture, _>(|this| unsafe {
                send(this, texture.0, GL_TEXTURE_2D, width, height, false, 0)
            })
        });
        self.complete_send::<SendTexture>(result)
    }

    /// Share a CPU RGBA buffer of `width * height * 4` bytes. Failures are only logged.
    pub fn send_image(&mut self, pixels: &[u8]) {
        if !self.is_ready() {
            return;
        }
        if let Err(e) = self.try_send_image(pixels) {
            self.report_send_failure(&e);
        }
    }

    /// Share a CPU RGBA buffer of `width * height * 4` bytes.
    ///
    /// Calls `SendImage(pixels, width, height, GL_RGBA, false, 0)`.
    pub fn try_send_image(&mut self, pixels: &[u8]) -> SenderResult<()> {
        let (width, height) = self.frame_size().ok_or(SenderError::NotReady)?;
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(SenderError::InvalidImage {
                expected,
                actual: pixels.len(),
            });
        }
        let result = self.resolved::<SendImage>().and_then(|send| {
            self.guarded::<SendImage, _>(|this| unsafe {
                send(this, pixels.as_ptr(), width, height, GL_RGBA, false, 0)
            })
        });
        self.complete_send::<SendImage>(result)
    }

    /// Send counters.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    fn complete_send<S: Slot>(&mut self, result: SenderResult<bool>) -> SenderResult<()> {
        match result {
            Ok(true) => {
                self.stats.frames_sent += 1;
                Ok(())
            }
            Ok(false) => {
                self.stats.frames_failed += 1;
                Err(SenderError::CallReturnedFalse(S::NAME))
            }
            Err(e) => {
                self.stats.frames_failed += 1;
                Err(e)
            }
        }
    }

    fn report_send_failure(&mut self, err: &SenderError) {
        if !self.send_throttle.hit() {
            return;
        }
        self.stats.diagnostics_emitted += 1;
        let failures = self.send_throttle.occurrences();
        match err {
            SenderError::CallReturnedFalse(_) => {
                warn!("Failed to send frame to Spout: {err} ({failures} failures so far)");
            }
            _ => error!("Exception sending frame: {err} ({failures} failures so far)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spout::{
        loader::ModuleResidency,
        sender::LifecycleState,
        testing::{StubCall, StubProvider, StubSpout},
    };

    fn ready_sender(stub: &StubSpout, width: u32, height: u32) -> SpoutSender {
        let mut residency = ModuleResidency::new("SpoutLibrary", StubProvider::with_instance(stub));
        assert!(residency.ensure_loaded());
        let mut sender = SpoutSender::new();
        assert!(sender.initialize(&residency, "TestSender", width, height));
        stub.clear_calls();
        sender
    }

    #[test]
    fn test_texture_id_validity() {
        assert!(!TextureId(0).is_valid());
        assert!(TextureId::from(7).is_valid());
    }

    #[test]
    fn test_full_sender_scenario() {
        let stub = StubSpout::new();
        let mut residency = ModuleResidency::new("SpoutLibrary", StubProvider::with_instance(&stub));
        assert!(residency.ensure_loaded());

        let mut sender = SpoutSender::new();
        assert!(sender.initialize(&residency, "TestSender", 1920, 1080));
        assert_eq!(
            stub.calls(),
            vec![
                StubCall::SetSenderName("TestSender".to_string()),
                StubCall::SetSenderFormat(28),
            ]
        );
        assert!(sender.is_ready());

        stub.clear_calls();
        sender.send_frame(TextureId(42));
        assert_eq!(
            stub.calls(),
            vec![StubCall::SendTexture {
                texture: 42,
                target: 0x0DE1,
                width: 1920,
                height: 1080,
                invert: false,
                host_fbo: 0,
            }]
        );
        assert_eq!(
            sender.stats(),
            FrameStats {
                frames_sent: 1,
                frames_failed: 0,
                diagnostics_emitted: 0,
            }
        );
        assert!(sender.query_foreign_ready());

        stub.clear_calls();
        sender.dispose();
        assert_eq!(stub.calls(), vec![StubCall::ReleaseSender(0)]);
        assert!(!sender.is_ready());
    }

    #[test]
    fn test_send_texture_slot_cached() {
        let stub = StubSpout::new();
        let mut sender = ready_sender(&stub, 64, 64);

        sender.send_frame(TextureId(1));
        let cached = sender.cached_slots();
        // Once cached, the slot is not read from the table again.
        stub.clear_slot(SendTexture::INDEX);
        sender.send_frame(TextureId(1));
        assert_eq!(sender.cached_slots(), cached);
        assert_eq!(sender.stats().frames_sent, 2);
    }

    #[test]
    fn test_send_on_released_sender_makes_no_calls() {
        let stub = StubSpout::new();
        let mut sender = ready_sender(&stub, 64, 64);
        sender.dispose();
        assert_eq!(sender.state(), LifecycleState::Released);
        stub.clear_calls();

        sender.send_frame(TextureId(1));
        sender.send_image(&[0u8; 64 * 64 * 4]);
        assert!(stub.calls().is_empty());
        assert!(matches!(
            sender.try_send_frame(TextureId(1)),
            Err(SenderError::NotReady)
        ));
        assert_eq!(sender.stats(), FrameStats::default());
    }

    #[test]
    fn test_send_on_uninitialized_sender_makes_no_calls() {
        let stub = StubSpout::new();
        let mut sender = SpoutSender::new();
        sender.send_frame(TextureId(1));
        assert!(stub.calls().is_empty());
        assert_eq!(sender.stats(), FrameStats::default());
    }

    #[test]
    fn test_invalid_texture_is_ignored() {
        let stub = StubSpout::new();
        let mut sender = ready_sender(&stub, 64, 64);

        sender.send_frame(TextureId(0));
        assert!(stub.calls().is_empty());
        assert!(matches!(
            sender.try_send_frame(TextureId(0)),
            Err(SenderError::InvalidTexture)
        ));
    }

    #[test]
    fn test_failing_sends_are_throttled() {
        let stub = StubSpout::new();
        stub.set_send_result(false);
        let mut sender = ready_sender(&stub, 64, 64);

        for _ in 0..300 {
            sender.send_frame(TextureId(5));
        }
        let stats = sender.stats();
        assert_eq!(stats.frames_failed, 300);
        assert_eq!(stats.frames_sent, 0);
        assert_eq!(stats.diagnostics_emitted, 1);
        assert_eq!(stub.calls().len(), 300);

        sender.send_frame(TextureId(5));
        assert_eq!(sender.stats().diagnostics_emitted, 2);
    }

    #[test]
    fn test_false_return_is_reported_as_such() {
        let stub = StubSpout::new();
        stub.set_send_result(false);
        let mut sender = ready_sender(&stub, 64, 64);

        assert!(matches!(
            sender.try_send_frame(TextureId(5)),
            Err(SenderError::CallReturnedFalse("SendTexture"))
        ));
    }

    #[test]
    fn test_faulting_send_is_contained() {
        let stub = StubSpout::new();
        stub.fault_slot(SendTexture::INDEX);
        let mut sender = ready_sender(&stub, 64, 64);

        assert!(matches!(
            sender.try_send_frame(TextureId(5)),
            Err(SenderError::CallFaulted("SendTexture"))
        ));
        sender.send_frame(TextureId(5));
        assert!(sender.is_ready());
        assert_eq!(sender.stats().frames_failed, 2);
        assert_eq!(sender.stats().diagnostics_emitted, 1);
    }

    #[test]
    fn test_missing_send_slot_is_contained() {
        let stub = StubSpout::new();
        stub.clear_slot(SendTexture::INDEX);
        let mut sender = ready_sender(&stub, 64, 64);

        for _ in 0..10 {
            sender.send_frame(TextureId(5));
        }
        assert!(stub.calls().is_empty());
        assert_eq!(sender.stats().frames_failed, 10);
        assert_eq!(sender.stats().diagnostics_emitted, 1);
    }

    #[test]
    fn test_custom_diagnostic_interval() {
        let stub = StubSpout::new();
        stub.set_send_result(false);
        let mut residency = ModuleResidency::new("SpoutLibrary", StubProvider::with_instance(&stub));
        assert!(residency.ensure_loaded());
        let mut sender = SpoutSender::with_diagnostic_interval(10);
        assert!(sender.initialize(&residency, "TestSender", 64, 64));

        for _ in 0..25 {
            sender.send_frame(TextureId(5));
        }
        assert_eq!(sender.stats().diagnostics_emitted, 3);
    }

    #[test]
    fn test_send_image() {
        let stub = StubSpout::new();
        let mut sender = ready_sender(&stub, 4, 2);

        sender.send_image(&[0xFF; 4 * 2 * 4]);
        assert_eq!(
            stub.calls(),
            vec![StubCall::SendImage {
                len: 32,
                width: 4,
                height: 2,
                format: GL_RGBA,
                invert: false,
                host_fbo: 0,
            }]
        );
        assert_eq!(sender.stats().frames_sent, 1);
    }

    #[test]
    fn test_send_image_rejects_wrong_size() {
        let stub = StubSpout::new();
        let mut sender = ready_sender(&stub, 4, 2);

        assert!(matches!(
            sender.try_send_image(&[0u8; 10]),
            Err(SenderError::InvalidImage {
                expected: 32,
                actual: 10
            })
        ));
        assert!(stub.calls().is_empty());
    }
}
