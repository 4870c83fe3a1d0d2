use anyhow::{Context, Result};
use dirs_next as dirs;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use super::model::AppSettings;

fn join_settings_path(base: &Path) -> PathBuf {
    let mut p = base.to_path_buf();
    p.push("settings.json");
    p
}

/// Platform default base directory, for callers that do not inject one.
/// Windows: %APPDATA%\proxyline, macOS: ~/Library/Application Support/proxyline,
/// Linux: ~/.config/proxyline.
pub fn default_base_dir() -> PathBuf {
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("proxyline");
        dir
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

/// Reads `settings.json` under `base_dir`, writing defaults first when the
/// file does not exist yet.
pub fn load_or_init_at(base_dir: &Path) -> Result<AppSettings> {
    load_or_init_at_path(&join_settings_path(base_dir))
}

pub fn save_at(settings: &AppSettings, base_dir: &Path) -> Result<()> {
    save_at_path(settings, &join_settings_path(base_dir))
}

fn load_or_init_at_path(path: &Path) -> Result<AppSettings> {
    if path.exists() {
        let data = fs::read(path).with_context(|| format!("read settings: {}", path.display()))?;
        let settings: AppSettings =
            serde_json::from_slice(&data).context("parse settings json")?;
        Ok(settings)
    } else {
        let settings = AppSettings::default();
        save_at_path(&settings, path)?;
        Ok(settings)
    }
}

fn save_at_path(settings: &AppSettings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let json = serde_json::to_string_pretty(settings).context("serialize settings")?;
    let mut f =
        fs::File::create(path).with_context(|| format!("create settings: {}", path.display()))?;
    f.write_all(json.as_bytes()).context("write settings")?;
    tracing::info!(target = "config", path = %path.display(), "settings saved");
    Ok(())
}
