use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Debug, Parser)]
#[command(name = "quark-sort")]
#[command(about = "Sorts files into category folders by asking a language model about their names", long_about = None)]
pub struct Cli {
    /// Configuration file; a template is written when it does not exist
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// API key, overriding the one in the configuration file
    #[arg(long, global = true, env = "QUARK_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify, file, review and clean up interactively (default)
    Classify,
    /// Serve the JSON API for the browser workflow
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Defaults to the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Roll back the most recent filing run that was never confirmed
    Recover,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_interactive_classify() {
        let cli = Cli::try_parse_from(["quark-sort"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config.ini"));
    }

    #[test]
    fn serve_takes_host_and_port() {
        let cli =
            Cli::try_parse_from(["quark-sort", "serve", "--port", "8080", "-c", "other.ini"]).unwrap();
        match cli.command {
            Some(Commands::Serve { host, port }) => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, Some(8080));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.config, PathBuf::from("other.ini"));
    }
}
