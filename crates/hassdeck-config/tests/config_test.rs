#![allow(clippy::unwrap_used)]

use std::path::Path;

use figment::Jail;
use hassdeck_config::{
    Config, ConfigError, Profile, load_config_from, profile_to_connection_config, resolve_token,
    save_config_to,
};
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

const FILE: &str = r#"
default_profile = "home"

[defaults]
verify_certificate = false
reconnect_interval_secs = 3

[profiles.home]
host = "homeassistant.local"
port = 8123
token = "from-file"

[profiles.cabin]
host = "10.0.0.7"
use_tls = false
token_env = "CABIN_TOKEN"
"#;

#[test]
fn missing_file_yields_defaults() {
    Jail::expect_with(|_| {
        let config = load_config_from(Path::new("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        Ok(())
    });
}

#[test]
fn file_layers_over_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", FILE)?;
        let config = load_config_from(Path::new("config.toml")).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("home"));
        assert!(config.defaults.use_tls);
        assert!(!config.defaults.verify_certificate);
        assert_eq!(config.defaults.output, "table");

        let (name, home) = config.profile(None).unwrap();
        assert_eq!(name, "home");
        let conn = profile_to_connection_config(home, name, &config.defaults).unwrap();
        assert_eq!(conn.host, "homeassistant.local");
        assert!(!conn.verify_certificate);
        assert_eq!(conn.reconnect_interval.as_secs(), 3);
        Ok(())
    });
}

#[test]
fn env_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", FILE)?;
        jail.set_env("HASSDECK_DEFAULT_PROFILE", "cabin");
        jail.set_env("HASSDECK_PROFILES__HOME__PORT", "9000");
        let config = load_config_from(Path::new("config.toml")).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("cabin"));
        assert_eq!(config.profiles["home"].port, Some(9000));
        Ok(())
    });
}

#[test]
fn token_env_takes_precedence() {
    Jail::expect_with(|jail| {
        jail.set_env("CABIN_TOKEN_TEST", "from-env");
        let profile = Profile {
            host: "10.0.0.7".into(),
            token: Some("from-file".into()),
            token_env: Some("CABIN_TOKEN_TEST".into()),
            ..Profile::default()
        };
        let token = resolve_token(&profile, "cabin-test").unwrap();
        assert_eq!(token.expose_secret(), "from-env");
        Ok(())
    });
}

#[test]
fn unresolvable_token_is_an_error() {
    let profile = Profile {
        host: "10.0.0.7".into(),
        token_env: Some("HASSDECK_TEST_UNSET_TOKEN_VAR".into()),
        ..Profile::default()
    };
    assert!(matches!(
        resolve_token(&profile, "hassdeck-test-no-such-profile"),
        Err(ConfigError::NoToken { .. })
    ));
}

#[test]
fn save_then_load_keeps_profiles() {
    Jail::expect_with(|_| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                host: "hub.lan".into(),
                port: Some(8123),
                token_env: Some("HUB_TOKEN".into()),
                ..Profile::default()
            },
        );
        save_config_to(&path, &config).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[profiles.default]"));
        assert!(!written.contains("token ="));

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profiles, config.profiles);
        Ok(())
    });
}
