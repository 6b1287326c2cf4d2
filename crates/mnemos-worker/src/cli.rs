//! CLI argument definitions using clap derive macros.

use clap::Parser;
use std::path::PathBuf;

/// Mnemos background worker
///
/// Indexes new memories and periodically regroups them into topics.
#[derive(Parser, Debug)]
#[command(name = "mnemos-worker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.mnemos/config.toml)
    #[arg(long, env = "MNEMOS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path, overrides the config file
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Run a single tick and exit
    #[arg(long)]
    pub once: bool,

    /// Seconds between ticks, overrides the config file
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from(["mnemos-worker", "--database", "/tmp/m.db", "--once", "--interval-secs", "5"]);
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/m.db")));
        assert!(cli.once);
        assert_eq!(cli.interval_secs, Some(5));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["mnemos-worker"]);
        assert!(!cli.once);
        assert!(cli.database.is_none());
        assert!(cli.interval_secs.is_none());
    }
}
