//! System proxy application for Windows, macOS, and Linux desktops.
//!
//! The connection applies the active profile to the OS proxy settings when
//! the user opted in. Apply failures are reported to the caller, which logs
//! and keeps going; a broken desktop integration must not wedge the tunnel.

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;

use crate::core::pac::PacWriter;
use crate::core::profile::TunnelProfile;

/// Desired system proxy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemProxyMode {
    /// Restore direct connections.
    Off,
    /// Point the system at the local listener ports.
    Proxy,
    /// Point the system at the generated PAC script.
    Pac,
}

impl fmt::Display for SystemProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemProxyMode::Off => write!(f, "off"),
            SystemProxyMode::Proxy => write!(f, "proxy"),
            SystemProxyMode::Pac => write!(f, "pac"),
        }
    }
}

/// Applies proxy settings to the desktop environment.
///
/// Injected into the connection so tests can record apply calls without
/// touching real OS settings.
pub trait SystemProxySetter: Send + Sync + 'static {
    fn apply(&self, profile: &TunnelProfile, mode: SystemProxyMode) -> Result<()>;
}

/// Platform-backed setter used outside of tests.
pub struct DesktopProxySetter {
    base_dir: PathBuf,
}

impl DesktopProxySetter {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn pac_url(&self) -> String {
        let path = PacWriter::new(self.base_dir.clone()).pac_path();
        format!("file://{}", path.display())
    }
}

impl SystemProxySetter for DesktopProxySetter {
    fn apply(&self, profile: &TunnelProfile, mode: SystemProxyMode) -> Result<()> {
        tracing::info!(target = "sysproxy", mode = %mode, "applying system proxy");
        platform::apply(profile, mode, &self.pac_url())
    }
}

#[cfg(target_os = "windows")]
mod platform {
    use anyhow::{Context, Result};
    use winreg::enums::HKEY_CURRENT_USER;
    use winreg::RegKey;

    use super::SystemProxyMode;
    use crate::core::profile::TunnelProfile;

    const INTERNET_SETTINGS: &str =
        "Software\\Microsoft\\Windows\\CurrentVersion\\Internet Settings";

    pub fn apply(profile: &TunnelProfile, mode: SystemProxyMode, pac_url: &str) -> Result<()> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let (key, _) = hkcu
            .create_subkey(INTERNET_SETTINGS)
            .context("open Internet Settings key")?;
        match mode {
            SystemProxyMode::Off => {
                key.set_value("ProxyEnable", &0u32)?;
                let _ = key.delete_value("AutoConfigURL");
            }
            SystemProxyMode::Proxy => {
                // WinINET has no dedicated SOCKS field in the plain server
                // syntax; the HTTP bridge is preferred when available.
                let server = if profile.dual_mode {
                    format!("{}:{}", profile.local_address, profile.local_http_port)
                } else {
                    format!("socks={}:{}", profile.local_address, profile.local_port)
                };
                key.set_value("ProxyServer", &server)?;
                key.set_value("ProxyEnable", &1u32)?;
                let _ = key.delete_value("AutoConfigURL");
            }
            SystemProxyMode::Pac => {
                key.set_value("AutoConfigURL", &pac_url.to_string())?;
                key.set_value("ProxyEnable", &0u32)?;
            }
        }
        Ok(())
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use std::process::Command;

    use anyhow::{bail, Result};

    use super::SystemProxyMode;
    use crate::core::profile::TunnelProfile;

    // TODO: detect the active service via `networksetup -listallnetworkservices`
    // instead of assuming Wi-Fi.
    const INTERFACE: &str = "Wi-Fi";

    pub fn apply(profile: &TunnelProfile, mode: SystemProxyMode, pac_url: &str) -> Result<()> {
        let port = profile.local_port.to_string();
        let http_port = profile.local_http_port.to_string();
        match mode {
            SystemProxyMode::Off => {
                run(&["-setsocksfirewallproxystate", INTERFACE, "off"])?;
                run(&["-setwebproxystate", INTERFACE, "off"])?;
                run(&["-setsecurewebproxystate", INTERFACE, "off"])?;
                run(&["-setautoproxystate", INTERFACE, "off"])?;
            }
            SystemProxyMode::Proxy => {
                run(&["-setsocksfirewallproxy", INTERFACE, &profile.local_address, &port])?;
                if profile.dual_mode {
                    run(&["-setwebproxy", INTERFACE, &profile.local_address, &http_port])?;
                    run(&["-setsecurewebproxy", INTERFACE, &profile.local_address, &http_port])?;
                }
                run(&["-setautoproxystate", INTERFACE, "off"])?;
            }
            SystemProxyMode::Pac => {
                run(&["-setautoproxyurl", INTERFACE, pac_url])?;
                run(&["-setautoproxystate", INTERFACE, "on"])?;
            }
        }
        Ok(())
    }

    fn run(args: &[&str]) -> Result<()> {
        let status = Command::new("networksetup").args(args).status()?;
        if !status.success() {
            bail!("networksetup {} exited with {status}", args.join(" "));
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::process::Command;

    use anyhow::{bail, Result};

    use super::SystemProxyMode;
    use crate::core::profile::TunnelProfile;

    pub fn apply(profile: &TunnelProfile, mode: SystemProxyMode, pac_url: &str) -> Result<()> {
        match mode {
            SystemProxyMode::Off => {
                run(&["set", "org.gnome.system.proxy", "mode", "none"])?;
            }
            SystemProxyMode::Proxy => {
                let port = profile.local_port.to_string();
                run(&["set", "org.gnome.system.proxy.socks", "host", &profile.local_address])?;
                run(&["set", "org.gnome.system.proxy.socks", "port", &port])?;
                if profile.dual_mode {
                    let http_port = profile.local_http_port.to_string();
                    run(&["set", "org.gnome.system.proxy.http", "host", &profile.local_address])?;
                    run(&["set", "org.gnome.system.proxy.http", "port", &http_port])?;
                    run(&["set", "org.gnome.system.proxy.https", "host", &profile.local_address])?;
                    run(&["set", "org.gnome.system.proxy.https", "port", &http_port])?;
                }
                run(&["set", "org.gnome.system.proxy", "mode", "manual"])?;
            }
            SystemProxyMode::Pac => {
                run(&["set", "org.gnome.system.proxy", "autoconfig-url", pac_url])?;
                run(&["set", "org.gnome.system.proxy", "mode", "auto"])?;
            }
        }
        Ok(())
    }

    fn run(args: &[&str]) -> Result<()> {
        let status = Command::new("gsettings").args(args).status()?;
        if !status.success() {
            bail!("gsettings {} exited with {status}", args.join(" "));
        }
        Ok(())
    }
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
mod platform {
    use anyhow::Result;

    use super::SystemProxyMode;
    use crate::core::profile::TunnelProfile;

    pub fn apply(_profile: &TunnelProfile, mode: SystemProxyMode, _pac_url: &str) -> Result<()> {
        tracing::debug!(target = "sysproxy", mode = %mode, "system proxy not supported on this platform");
        Ok(())
    }
}
