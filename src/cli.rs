use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Collects news articles into SQLite and writes a daily digest.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(short, long, env = "NEWS_BOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the scheduler until interrupted (default)
    Run,
    /// Run a single collection pass and exit
    Once,
    /// Generate today's daily summary now
    Summary,
    /// Print database counts and the upcoming schedule
    Status,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_run() {
        let cli = Cli::parse_from(["news-bot"]);
        assert_eq!(cli.command(), Command::Run);
        assert!(cli.config.is_none());
    }

    #[test]
    fn parses_subcommand_and_config() {
        let cli = Cli::parse_from(["news-bot", "--config", "/tmp/bot.toml", "once"]);
        assert_eq!(cli.command(), Command::Once);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bot.toml")));

        let cli = Cli::parse_from(["news-bot", "-c", "bot.toml", "status"]);
        assert_eq!(cli.command(), Command::Status);
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["news-bot", "install-service"]).is_err());
    }
}
