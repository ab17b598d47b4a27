//! Command-line interface handling for the realm server.
//!
//! This module provides command-line argument parsing using the `clap`
//! crate. Every flag overrides the matching configuration file setting.

use clap::{Arg, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "realm.toml";

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    fn command() -> Command {
        Command::new("Realm Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("World simulation server hosting one shard per map")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value(DEFAULT_CONFIG_PATH),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }

    /// Parses the process arguments.
    ///
    /// Exits the process with a usage message on invalid input, as clap does.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list (the first item is the binary name).
    ///
    /// # Returns
    ///
    /// The parsed arguments, or clap's error describing the invalid input.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        Ok(Self::from_matches(&matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let args = CliArgs::try_parse_from(["realm"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("realm.toml"));
        assert_eq!(args.log_level, None);
        assert!(!args.json_logs);
    }

    #[test]
    fn every_flag_is_picked_up() {
        let args = CliArgs::try_parse_from([
            "realm",
            "--config",
            "/etc/realm/prod.toml",
            "-l",
            "debug",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(args.config_path, PathBuf::from("/etc/realm/prod.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(CliArgs::try_parse_from(["realm", "--plugins", "dir"]).is_err());
    }
}
