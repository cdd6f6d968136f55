//! Daemon command-line surface (SPEC_FULL.md §6 "CLI"). The flag set is
//! grounded in the distilled `utils/args_parser.py`; `clap` replaces its
//! hand-rolled `sys.argv` walk with a declarative parser, `-h`/`--help`
//! included for free.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "taskmaster", version, about = "Job-control supervisor daemon")]
pub struct Args {
    /// Path to the configuration file.
    #[arg(
        short = 'f',
        short_alias = 'c',
        long = "config",
        visible_alias = "file",
        default_value = "./config_examples/valid.yml"
    )]
    pub config: PathBuf,

    /// Minimum level of log line to emit.
    #[arg(short = 'l', long = "loglevel", value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            // tracing has no WARNING/CRITICAL level; both map to the closest
            // level it does have.
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_to_the_sample_config() {
        let args = Args::try_parse_from(["taskmasterd"]).unwrap();
        assert_eq!(args.config, PathBuf::from("./config_examples/valid.yml"));
        assert_eq!(args.loglevel, LogLevel::Info);
    }

    #[test]
    fn accepts_the_config_aliases() {
        for flag in ["-f", "-c", "--config", "--file"] {
            let args = Args::try_parse_from(["taskmasterd", flag, "custom.yml"]).unwrap();
            assert_eq!(args.config, PathBuf::from("custom.yml"));
        }
    }

    #[test]
    fn rejects_an_unknown_loglevel() {
        assert!(Args::try_parse_from(["taskmasterd", "-l", "VERBOSE"]).is_err());
    }

    #[test]
    fn rejects_an_unknown_flag() {
        assert!(Args::try_parse_from(["taskmasterd", "--bogus"]).is_err());
    }
}
