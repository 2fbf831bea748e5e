//! Push capability detection.
//!
//! Install state can change between calls (the user adds the app to the home
//! screen), so snapshots are never cached.

use crate::app::error::PushError;
use crate::domain::capability::{CapabilitySnapshot, Environment};

const IOS_MARKERS: [&str; 3] = ["iPad", "iPhone", "iPod"];
const ANDROID_APP_REFERRER: &str = "android-app://";

pub struct CapabilityProbe;

impl CapabilityProbe {
    pub fn probe(env: &Environment) -> CapabilitySnapshot {
        let is_ios = IOS_MARKERS
            .iter()
            .any(|marker| env.user_agent.contains(marker));

        let launched_from_android_app = env
            .referrer
            .as_deref()
            .is_some_and(|referrer| referrer.starts_with(ANDROID_APP_REFERRER));

        CapabilitySnapshot {
            notification_api_present: env.notification_api,
            background_agent_supported: env.background_agent_api,
            push_supported: env.push_manager,
            is_ios,
            is_standalone_install: env.display_mode_standalone
                || env.navigator_standalone
                || launched_from_android_app,
            is_secure_transport: env.secure_context,
        }
    }

    /// Probe and fail with platform-specific guidance when push is unusable.
    pub fn require_supported(env: &Environment) -> Result<CapabilitySnapshot, PushError> {
        let snapshot = Self::probe(env);
        match snapshot.guidance() {
            None => Ok(snapshot),
            Some(guidance) => Err(PushError::CapabilityUnsupported { guidance }),
        }
    }
}
