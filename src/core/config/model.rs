use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyCfg {
    /// Serve PAC-based OS proxy configuration instead of direct listeners.
    #[serde(default)] pub pac_mode_enabled: bool,
    /// Apply and clear OS proxy settings around the connection lifecycle.
    #[serde(default)] pub auto_set_system_proxy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingCfg {
    #[serde(default = "default_log_level")] pub log_level: String,
}

/// User preferences persisted as `settings.json` in the base directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub proxy: ProxyCfg,
    pub logging: LoggingCfg,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for ProxyCfg {
    fn default() -> Self {
        Self { pac_mode_enabled: false, auto_set_system_proxy: false }
    }
}

impl Default for LoggingCfg {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self { proxy: ProxyCfg::default(), logging: LoggingCfg::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_camel_case_keys() {
        let settings = AppSettings::default();
        let s = serde_json::to_string(&settings).unwrap();
        assert!(s.contains("\"pacModeEnabled\""));
        assert!(s.contains("\"autoSetSystemProxy\""));
        assert!(s.contains("\"logLevel\""));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
          "proxy": { "autoSetSystemProxy": true },
          "logging": {}
        }"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert!(settings.proxy.auto_set_system_proxy);
        assert!(!settings.proxy.pac_mode_enabled);
        assert_eq!(settings.logging.log_level, "info");
    }
}
