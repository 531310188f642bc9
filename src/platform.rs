// Platform detection: native container or browser-style fallback

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Environment variable naming the host platform (`native` or `web`)
pub const PLATFORM_ENV: &str = "STUDYSTORE_PLATFORM";

/// Execution context of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Native container with OS-level bridges
    Native,
    /// Browser fallback, page-local storage only
    Web,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Web => "web",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "native" | "android" | "ios" | "mobile" => Some(Self::Native),
            "web" | "browser" => Some(Self::Web),
            _ => None,
        }
    }

    pub fn is_native(self) -> bool {
        self == Self::Native
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw inputs the probe looks at
#[derive(Debug, Clone, Default)]
pub struct Signals {
    /// Value of [`PLATFORM_ENV`], if set
    pub declared: Option<String>,
    /// Target OS the binary was built for
    pub target_os: &'static str,
}

impl Signals {
    pub fn from_env() -> Self {
        Self {
            declared: std::env::var(PLATFORM_ENV).ok(),
            target_os: std::env::consts::OS,
        }
    }
}

/// Resolve the platform from signals
///
/// An explicit, recognized declaration wins. Otherwise mobile targets are
/// native and everything else is the browser fallback. Never fails.
pub fn detect(signals: &Signals) -> Platform {
    if let Some(platform) = signals.declared.as_deref().and_then(Platform::parse) {
        return platform;
    }
    match signals.target_os {
        "android" | "ios" => Platform::Native,
        _ => Platform::Web,
    }
}

static DETECTED: OnceLock<Platform> = OnceLock::new();

/// Platform of the current process, probed on first use
pub fn current() -> Platform {
    *DETECTED.get_or_init(|| {
        let platform = detect(&Signals::from_env());
        tracing::debug!(platform = %platform, "Platform detected");
        platform
    })
}

/// Whether the current process runs inside the native container
pub fn is_native_container() -> bool {
    current().is_native()
}
