//! Config subcommand handlers.

use hassdeck_config::{self as config, Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

/// Copy of the config safe to print.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
    }
    cfg
}

/// Profile built from `--host`, `--port`, `--no-tls`, `--insecure`.
fn profile_from_flags(global: &GlobalOpts) -> Result<Profile, CliError> {
    let host = global
        .host
        .clone()
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| CliError::Validation {
            field: "host".into(),
            reason: "pass the hub address with --host".into(),
        })?;
    Ok(Profile {
        host,
        port: global.port,
        use_tls: global.no_tls.then_some(false),
        verify_certificate: global.insecure.then_some(false),
        ..Profile::default()
    })
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config()?);
            let out = match global.output {
                OutputFormat::Json => output::render_json(&cfg, false),
                OutputFormat::JsonCompact => output::render_json(&cfg, true),
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Config {
                        message: e.to_string(),
                    })?
                }
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init {
            token_env,
            keyring,
            force,
        } => {
            let mut cfg = config::load_config_or_default();
            let name = global.profile.clone().unwrap_or_else(|| "default".into());
            if cfg.profiles.contains_key(&name) && !force {
                return Err(CliError::Validation {
                    field: "profile".into(),
                    reason: format!("'{name}' already exists (use --force to overwrite)"),
                });
            }

            let mut profile = profile_from_flags(global)?;
            match (token_env, global.token.as_deref()) {
                (Some(var), _) => profile.token_env = Some(var),
                (None, Some(token)) if keyring => {
                    config::store_token(&name, token)?;
                    if !global.quiet {
                        eprintln!("Token stored in system keyring");
                    }
                }
                (None, Some(token)) => profile.token = Some(token.to_owned()),
                (None, None) => {
                    return Err(CliError::NoToken { profile: name });
                }
            }

            cfg.profiles.insert(name.clone(), profile);
            let default_exists = cfg
                .default_profile
                .as_ref()
                .is_some_and(|d| cfg.profiles.contains_key(d));
            if !default_exists {
                cfg.default_profile = Some(name.clone());
            }
            config::save_config(&cfg)?;

            if !global.quiet {
                eprintln!(
                    "Profile '{name}' written to {}",
                    config::config_path().display()
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_hides_plaintext_tokens() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "home".into(),
            Profile {
                host: "hub.lan".into(),
                token: Some("super-secret".into()),
                ..Profile::default()
            },
        );
        cfg.profiles.insert(
            "cabin".into(),
            Profile {
                host: "10.0.0.7".into(),
                token_env: Some("CABIN_TOKEN".into()),
                ..Profile::default()
            },
        );

        let shown = redacted(&cfg);
        assert_eq!(shown.profiles["home"].token.as_deref(), Some(REDACTED));
        assert_eq!(shown.profiles["cabin"].token, None);
        assert_eq!(shown.profiles["cabin"].token_env.as_deref(), Some("CABIN_TOKEN"));
    }
}
