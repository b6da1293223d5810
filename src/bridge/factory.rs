//! Bridge factory with platform detection

use crate::bridge::{ExecutionBridge, NativeBridge, WslBridge};
use crate::config::schema::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Detected host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::Unix => "Unix",
        }
    }
}

/// Configured bridge selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeKind {
    /// WSL on Windows, native everywhere else
    #[default]
    Auto,
    Native,
    Wsl,
}

impl BridgeKind {
    /// Resolve `Auto` for the given platform
    pub fn resolve(self, platform: Platform) -> BridgeKind {
        match (self, platform) {
            (BridgeKind::Auto, Platform::Windows) => BridgeKind::Wsl,
            (BridgeKind::Auto, Platform::Unix) => BridgeKind::Native,
            (kind, _) => kind,
        }
    }
}

impl fmt::Display for BridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeKind::Auto => write!(f, "auto"),
            BridgeKind::Native => write!(f, "native"),
            BridgeKind::Wsl => write!(f, "wsl"),
        }
    }
}

impl FromStr for BridgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(BridgeKind::Auto),
            "native" => Ok(BridgeKind::Native),
            "wsl" => Ok(BridgeKind::Wsl),
            other => Err(format!(
                "Unknown bridge kind '{}'. Valid kinds: auto, native, wsl",
                other
            )),
        }
    }
}

/// Create the execution bridge selected by configuration
pub fn create_bridge(config: &BridgeConfig) -> Box<dyn ExecutionBridge> {
    match config.kind.resolve(Platform::detect()) {
        BridgeKind::Wsl => Box::new(WslBridge::new(
            config.wsl_distro.clone(),
            &config.mount_prefix,
        )),
        BridgeKind::Native | BridgeKind::Auto => Box::new(NativeBridge::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_resolves_per_platform() {
        assert_eq!(BridgeKind::Auto.resolve(Platform::Windows), BridgeKind::Wsl);
        assert_eq!(BridgeKind::Auto.resolve(Platform::Unix), BridgeKind::Native);
        assert_eq!(BridgeKind::Wsl.resolve(Platform::Unix), BridgeKind::Wsl);
    }

    #[test]
    fn bridge_kind_parse() {
        assert_eq!("WSL".parse::<BridgeKind>().unwrap(), BridgeKind::Wsl);
        assert!("docker".parse::<BridgeKind>().is_err());
    }

    #[test]
    fn create_bridge_honours_explicit_kind() {
        let config = BridgeConfig {
            kind: BridgeKind::Wsl,
            ..BridgeConfig::default()
        };
        assert_eq!(create_bridge(&config).name(), "wsl");

        let config = BridgeConfig {
            kind: BridgeKind::Native,
            ..BridgeConfig::default()
        };
        assert_eq!(create_bridge(&config).name(), "native");
    }

    #[cfg(unix)]
    #[test]
    fn auto_is_native_on_unix() {
        assert_eq!(create_bridge(&BridgeConfig::default()).name(), "native");
    }
}
