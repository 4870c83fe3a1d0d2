//! Settings loader and worker config store behavior on a real directory.

use proxyline::core::config::loader;
use proxyline::core::config::store::{ConfigStore, ForwardConfig, TunnelConfig};
use proxyline::core::pac::PacWriter;
use proxyline::tests_support::fixtures::local_profile;

#[test]
fn test_load_or_init_creates_settings_file_and_reloads() {
    let dir = tempfile::TempDir::new().unwrap();
    let settings = loader::load_or_init_at(dir.path()).unwrap();
    assert!(!settings.proxy.pac_mode_enabled);
    assert!(!settings.proxy.auto_set_system_proxy);
    assert_eq!(settings.logging.log_level, "info");
    assert!(dir.path().join("settings.json").exists());

    let mut changed = settings;
    changed.proxy.auto_set_system_proxy = true;
    loader::save_at(&changed, dir.path()).unwrap();
    let back = loader::load_or_init_at(dir.path()).unwrap();
    assert!(back.proxy.auto_set_system_proxy);
}

#[test]
fn test_corrupt_settings_file_surfaces_error() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("settings.json"), "{ not json").unwrap();
    assert!(loader::load_or_init_at(dir.path()).is_err());
}

#[test]
fn test_store_round_trips_worker_configs() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path());
    let profile = local_profile(21080, 21081);

    let tunnel_path = store.write_tunnel_config(&profile).unwrap();
    let forward_path = store.write_forward_config(&profile).unwrap();

    let tunnel: TunnelConfig =
        serde_json::from_str(&std::fs::read_to_string(tunnel_path).unwrap()).unwrap();
    assert_eq!(tunnel, TunnelConfig::from_profile(&profile));

    let forward: ForwardConfig =
        serde_json::from_str(&std::fs::read_to_string(forward_path).unwrap()).unwrap();
    assert_eq!(forward.listen_port, 21081);
    assert_eq!(forward.upstream_port, 21080);
}

#[test]
fn test_pac_writer_shares_store_base_dir() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path());
    let writer = PacWriter::new(store.base_dir().to_path_buf());
    let path = writer.regenerate(&local_profile(31080, 31081)).unwrap();
    assert!(path.starts_with(store.base_dir()));
    assert!(std::fs::read_to_string(path)
        .unwrap()
        .contains("SOCKS5 127.0.0.1:31080"));
}
