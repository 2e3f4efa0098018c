//! Flag-aware connection settings.
//!
//! Layers `GlobalOpts` on top of the selected profile from
//! `hassdeck-config`. This is the single place CLI flags cross into
//! `hassdeck_core::ConnectionConfig`.

use hassdeck_config::{Config, Profile, config_path, load_config_or_default, profile_to_connection_config};
use hassdeck_core::ConnectionConfig;
use secrecy::SecretString;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Apply flag overrides to a profile.
fn with_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if global.port.is_some() {
        profile.port = global.port;
    }
    if global.no_tls {
        profile.use_tls = Some(false);
    }
    if global.insecure {
        profile.verify_certificate = Some(false);
    }
    if let Some(ref token) = global.token {
        profile.token = Some(token.clone());
        profile.token_env = None;
    }
    profile
}

/// Build the manager's settings from config file, profile, and flags.
///
/// Returns the profile name alongside for error reporting.
pub fn build_connection_config(
    global: &GlobalOpts,
) -> Result<(String, ConnectionConfig), CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly named profile must exist
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound { name: profile_name });
        }
        // No profile -- flags and env alone have to do
        None if global.host.is_none() => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
        None => Profile::default(),
    };

    let profile = with_overrides(profile, global);
    let mut connection = profile_to_connection_config(&profile, &profile_name, &cfg.defaults)?;
    // A flag beats a keyring entry for the same profile.
    if let Some(ref token) = global.token {
        connection.token = SecretString::from(token.clone());
    }
    Ok((profile_name, connection))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["hassdeck"];
        argv.extend_from_slice(args);
        argv.push("domains");
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn flags_override_profile() {
        let base = Profile {
            host: "hub.lan".into(),
            port: Some(8123),
            token: Some("file".into()),
            ..Profile::default()
        };
        let merged = with_overrides(
            base,
            &global(&["--host", "10.0.0.2", "--port", "443", "--no-tls", "-k", "--token", "flag"]),
        );
        assert_eq!(merged.host, "10.0.0.2");
        assert_eq!(merged.port, Some(443));
        assert_eq!(merged.use_tls, Some(false));
        assert_eq!(merged.verify_certificate, Some(false));
        assert_eq!(merged.token.as_deref(), Some("flag"));
    }

    #[test]
    fn absent_flags_keep_profile() {
        let base = Profile {
            host: "hub.lan".into(),
            use_tls: Some(true),
            ..Profile::default()
        };
        let merged = with_overrides(base.clone(), &global(&[]));
        assert_eq!(merged, base);
    }

    #[test]
    fn profile_name_precedence() {
        let mut cfg = Config::default();
        assert_eq!(active_profile_name(&global(&[]), &cfg), "default");
        cfg.default_profile = Some("cabin".into());
        assert_eq!(active_profile_name(&global(&[]), &cfg), "cabin");
        assert_eq!(active_profile_name(&global(&["-p", "lab"]), &cfg), "lab");
    }
}
