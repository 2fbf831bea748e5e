use std::fmt;

use serde::{Deserialize, Serialize};

/// What the client runtime reports about itself when a session starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    pub user_agent: String,
    #[serde(default)]
    pub notification_api: bool,
    #[serde(default)]
    pub background_agent_api: bool,
    #[serde(default)]
    pub push_manager: bool,
    #[serde(default)]
    pub secure_context: bool,
    #[serde(default)]
    pub display_mode_standalone: bool,
    #[serde(default)]
    pub navigator_standalone: bool,
    #[serde(default)]
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub notification_api_present: bool,
    pub background_agent_supported: bool,
    pub push_supported: bool,
    pub is_ios: bool,
    pub is_standalone_install: bool,
    pub is_secure_transport: bool,
}

impl CapabilitySnapshot {
    /// iOS only delivers pushes to apps launched from the home screen.
    pub fn ios_effective_support(&self) -> bool {
        if self.is_ios {
            self.is_standalone_install
        } else {
            true
        }
    }

    pub fn overall_supported(&self) -> bool {
        self.notification_api_present
            && self.background_agent_supported
            && self.push_supported
            && self.is_secure_transport
            && self.ios_effective_support()
    }

    /// What the user should be told when push is unavailable, if anything.
    pub fn guidance(&self) -> Option<Guidance> {
        if self.overall_supported() {
            return None;
        }
        if !self.ios_effective_support() {
            Some(Guidance::InstallToHomeScreen)
        } else if !self.is_secure_transport {
            Some(Guidance::InsecureTransport)
        } else {
            Some(Guidance::UnsupportedBrowser)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guidance {
    InstallToHomeScreen,
    InsecureTransport,
    UnsupportedBrowser,
}

impl Guidance {
    pub fn message(&self) -> &'static str {
        match self {
            Self::InstallToHomeScreen => {
                "add the app to your home screen, then open it from there to enable notifications"
            }
            Self::InsecureTransport => "notifications require a secure (https) connection",
            Self::UnsupportedBrowser => "this browser does not support push notifications",
        }
    }
}

impl fmt::Display for Guidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
