//! PAC script generation for browser auto-configuration.
//!
//! The generated script routes everything through the local proxy ports of
//! the active profile. A user-provided template can override the default
//! script; the `__PROXY__` placeholder is replaced with the directive list.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::profile::TunnelProfile;

const DEFAULT_TEMPLATE: &str = "function FindProxyForURL(url, host) {\n    return \"__PROXY__\";\n}\n";

pub struct PacWriter {
    base_dir: PathBuf,
}

impl PacWriter {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Location of the generated PAC file.
    pub fn pac_path(&self) -> PathBuf {
        self.base_dir.join("pac").join("proxy.pac")
    }

    /// Optional user template consulted before the built-in script.
    pub fn template_path(&self) -> PathBuf {
        self.base_dir.join("pac").join("template.pac")
    }

    /// Renders the PAC script for the profile and writes it to disk.
    pub fn regenerate(&self, profile: &TunnelProfile) -> Result<PathBuf> {
        let template = std::fs::read_to_string(self.template_path())
            .unwrap_or_else(|_| DEFAULT_TEMPLATE.to_string());
        let script = template.replace("__PROXY__", &proxy_rule(profile));
        let path = self.pac_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create pac dir: {}", parent.display()))?;
        }
        std::fs::write(&path, script)
            .with_context(|| format!("write pac file: {}", path.display()))?;
        tracing::info!(target = "config", path = %path.display(), "pac file regenerated");
        Ok(path)
    }
}

/// Directive list: SOCKS first, HTTP fallback in dual mode, then DIRECT.
fn proxy_rule(profile: &TunnelProfile) -> String {
    let mut rule = format!(
        "SOCKS5 {addr}:{port}; SOCKS {addr}:{port}",
        addr = profile.local_address,
        port = profile.local_port
    );
    if profile.dual_mode {
        rule.push_str(&format!(
            "; PROXY {}:{}",
            profile.local_address, profile.local_http_port
        ));
    }
    rule.push_str("; DIRECT");
    rule
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> TunnelProfile {
        TunnelProfile {
            name: "pac".into(),
            server_address: "example.com".into(),
            password: "secret".into(),
            local_port: 1080,
            local_http_port: 1081,
            ..TunnelProfile::default()
        }
    }

    #[test]
    fn test_regenerate_writes_socks_rule() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = PacWriter::new(dir.path().to_path_buf());
        let path = writer.regenerate(&profile()).unwrap();
        let script = std::fs::read_to_string(path).unwrap();
        assert!(script.contains("FindProxyForURL"));
        assert!(script.contains("SOCKS5 127.0.0.1:1080; SOCKS 127.0.0.1:1080; DIRECT"));
        assert!(!script.contains("PROXY 127.0.0.1:1081"));
    }

    #[test]
    fn test_dual_mode_adds_http_fallback() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = PacWriter::new(dir.path().to_path_buf());
        let mut p = profile();
        p.dual_mode = true;
        let path = writer.regenerate(&p).unwrap();
        let script = std::fs::read_to_string(path).unwrap();
        assert!(script.contains("SOCKS5 127.0.0.1:1080; SOCKS 127.0.0.1:1080; PROXY 127.0.0.1:1081; DIRECT"));
    }

    #[test]
    fn test_template_override_is_used() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = PacWriter::new(dir.path().to_path_buf());
        std::fs::create_dir_all(dir.path().join("pac")).unwrap();
        std::fs::write(
            writer.template_path(),
            "function FindProxyForURL(url, host) {\n    if (host == \"localhost\") return \"DIRECT\";\n    return \"__PROXY__\";\n}\n",
        )
        .unwrap();
        let path = writer.regenerate(&profile()).unwrap();
        let script = std::fs::read_to_string(path).unwrap();
        assert!(script.contains("host == \"localhost\""));
        assert!(script.contains("SOCKS5 127.0.0.1:1080"));
    }
}
