mod carriers;
mod classify;
mod ship;
mod track;

use std::path::Path;
use std::sync::Arc;

use parcelport_core::{AdapterRegistry, CoreConfig, ReqwestHttpClient};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// JSON document for stdout plus the process exit code.
#[derive(Debug)]
pub struct CommandOutcome {
    pub data: Value,
    pub exit_code: u8,
}

impl CommandOutcome {
    pub fn ok(data: Value) -> Self {
        Self { data, exit_code: 0 }
    }

    pub fn with_exit_code(mut self, exit_code: u8) -> Self {
        self.exit_code = exit_code;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutcome, CliError> {
    match &cli.command {
        Command::Classify(args) => classify::run(args),
        Command::Carriers => {
            let config = load_config(cli.config.as_deref())?;
            let registry = build_registry(&config)?;
            carriers::run(&registry)
        }
        Command::Track(args) => {
            let config = load_config(cli.config.as_deref())?;
            let registry = build_registry(&config)?;
            track::run(args, &config, &registry).await
        }
        Command::Ship(args) => {
            let config = load_config(cli.config.as_deref())?;
            let registry = build_registry(&config)?;
            ship::run(args, &config, &registry, cli.pretty).await
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<CoreConfig, CliError> {
    let config = match path {
        Some(path) => CoreConfig::from_path(path)?,
        None => CoreConfig::from_env()?,
    };
    Ok(config)
}

fn build_registry(config: &CoreConfig) -> Result<AdapterRegistry, CliError> {
    let http = ReqwestHttpClient::new(&config.http.user_agent)?
        .with_default_timeout_ms(config.http.timeout_ms);
    Ok(AdapterRegistry::from_config(config, Arc::new(http)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn loads_config_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"carriers":[{{"id":"gw","base_url":"https://gw.test","capabilities":["TRACK"]}}]}}"#
        )
        .expect("write config");

        let config = load_config(Some(file.path())).expect("config loads");
        assert_eq!(config.carriers.len(), 1);
        assert_eq!(config.carriers[0].id, "gw");
    }

    #[test]
    fn invalid_config_maps_to_usage_exit_code() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"carriers":[{{"id":"gw","base_url":"gw.test","capabilities":[]}}]}}"#
        )
        .expect("write config");

        let error = load_config(Some(file.path())).expect_err("relative url rejected");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn missing_config_file_is_an_io_failure() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = load_config(Some(&dir.path().join("absent.json"))).expect_err("missing file");
        assert_eq!(error.exit_code(), 10);
    }
}
