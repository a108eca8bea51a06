//! Capability negotiation against the SFU router.

use std::sync::OnceLock;

use tracing::{debug, info};

use crate::error::VoiceError;
use crate::protocol::{MediaKind, RtpCapabilities, RtpCodecCapability};

/// The local capability set, narrowed to what the router supports.
///
/// Loaded at most once per process and shared read-only across every
/// session as `Arc<Device>`.
#[derive(Debug)]
pub struct Device {
    native: RtpCapabilities,
    loaded: OnceLock<RtpCapabilities>,
}

impl Device {
    pub fn new(native: RtpCapabilities) -> Self {
        Self {
            native,
            loaded: OnceLock::new(),
        }
    }

    /// Intersect the router's codecs with the native ones.
    ///
    /// A second call after a successful load is a no-op. Fails with
    /// `IncompatibleCapabilities` when no codec is shared.
    pub fn load(&self, router: &RtpCapabilities) -> Result<(), VoiceError> {
        if self.loaded.get().is_some() {
            debug!("device already loaded");
            return Ok(());
        }

        let codecs: Vec<RtpCodecCapability> = router
            .codecs
            .iter()
            .filter(|remote| self.native.codecs.iter().any(|local| codec_matches(local, remote)))
            .cloned()
            .collect();

        if codecs.is_empty() {
            return Err(VoiceError::IncompatibleCapabilities(
                "router offers no codec this device supports".into(),
            ));
        }

        let negotiated = RtpCapabilities {
            codecs,
            header_extensions: router.header_extensions.clone(),
        };
        info!(codecs = negotiated.codecs.len(), "device loaded");
        // A concurrent loader may have won; either result is equivalent.
        let _ = self.loaded.set(negotiated);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// The negotiated capabilities, sent with transport and consume requests.
    pub fn rtp_capabilities(&self) -> Result<&RtpCapabilities, VoiceError> {
        self.loaded.get().ok_or(VoiceError::NotReady("device not loaded"))
    }

    pub fn can_produce(&self, kind: MediaKind) -> bool {
        self.loaded
            .get()
            .is_some_and(|caps| caps.codecs.iter().any(|c| c.kind == kind))
    }
}

fn codec_matches(local: &RtpCodecCapability, remote: &RtpCodecCapability) -> bool {
    local.kind == remote.kind
        && local.mime_type.eq_ignore_ascii_case(&remote.mime_type)
        && local.clock_rate == remote.clock_rate
        && local.channels.unwrap_or(1) == remote.channels.unwrap_or(1)
}
