use crate::{
    Error,
    Result,
    session::SessionConfig,
};
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_MATCHMAKER_CHAIN_ID: &str =
    "45c6ea1ec5975879c206f4fe7e427a11f21cf75a9e281623bcb43ba1865c8b2c";

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Stone-paper-scissors client for a Linera node service", long_about = None)]
pub struct Args {
    /// Node service serving the local chain.
    #[arg(long, env = "LINERA_NODE_URL", default_value = "http://localhost:8081")]
    pub node_url: String,

    #[arg(long, env = "LINERA_APPLICATION_ID", default_value = "")]
    pub application_id: String,

    #[arg(long, env = "LINERA_MATCHMAKER_CHAIN_ID", default_value = DEFAULT_MATCHMAKER_CHAIN_ID)]
    pub matchmaker_chain_id: String,

    #[arg(long, env = "LINERA_FAUCET_URL", default_value = "http://localhost:8080")]
    pub faucet_url: String,

    /// Defaults to the node service's default chain.
    #[arg(long)]
    pub chain_id: Option<String>,

    #[arg(long, default_value = "~/.sps-client")]
    pub data_dir: String,

    /// Display name; the stored one (or `Player-<chain>`) otherwise.
    #[arg(long)]
    pub name: Option<String>,

    /// Log directory; `<data-dir>/logs` when unset.
    #[arg(long)]
    pub log_dir: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub node_url: String,
    pub session: SessionConfig,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub player_name: Option<String>,
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
}

impl TryFrom<Args> for AppConfig {
    type Error = Error;

    fn try_from(args: Args) -> Result<Self> {
        let application_id = args.application_id.trim().to_string();
        if application_id.is_empty() {
            return Err(Error::Config(
                "application id is missing; pass --application-id or set LINERA_APPLICATION_ID"
                    .into(),
            ));
        }
        let node_url = args.node_url.trim().trim_end_matches('/').to_string();
        if node_url.is_empty() {
            return Err(Error::Config("node url is empty".into()));
        }
        let data_dir = expand_path(&args.data_dir);
        let log_dir = args
            .log_dir
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| data_dir.join("logs"));
        Ok(Self {
            node_url,
            session: SessionConfig {
                application_id,
                matchmaker_chain_id: args.matchmaker_chain_id.trim().to_string(),
                faucet_url: args.faucet_url.trim().to_string(),
                chain_id: args
                    .chain_id
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
            },
            data_dir,
            log_dir,
            player_name: args.name.filter(|n| !n.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn app_config__requires_application_id() {
        // given
        let args = Args::try_parse_from(["sps-client", "--application-id", " "]).unwrap();

        // when
        let config = AppConfig::try_from(args);

        // then
        assert!(matches!(config, Err(Error::Config(_))));
    }

    #[test]
    fn app_config__expands_paths_and_fills_defaults() {
        // given
        let args = Args::try_parse_from([
            "sps-client",
            "--application-id",
            "app",
            "--node-url",
            "http://node:8081/",
            "--data-dir",
            "/tmp/sps",
            "--chain-id",
            "",
        ])
        .unwrap();

        // when
        let config = AppConfig::try_from(args).unwrap();

        // then
        assert_eq!(config.node_url, "http://node:8081");
        assert_eq!(config.session.application_id, "app");
        assert_eq!(config.session.chain_id, None);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/sps/logs"));
    }

    #[test]
    fn expand_path__resolves_home() {
        let expanded = expand_path("~/x");

        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("x"));
    }
}
