//! Command-line arguments

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use uca_core::UcaConfig;
use uca_orchestrator::SchedulerOptions;

#[derive(Parser, Debug)]
#[command(name = "uca")]
#[command(author, version, about = "Update installed coding-agent CLIs")]
pub struct Cli {
    /// Run updates in parallel (default)
    #[arg(short, long)]
    pub parallel: bool,

    /// Run one update at a time; wins over --parallel
    #[arg(long)]
    pub serial: bool,

    /// Run one update at a time unless --concurrency says otherwise
    #[arg(long)]
    pub safe: bool,

    /// Per-command timeout, e.g. 30s, 15m, 1h (0 disables)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Maximum number of concurrent update commands
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Print update logs of updated agents too
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the summary only, without the live dashboard
    #[arg(short, long)]
    pub quiet: bool,

    /// Show what would be updated without running anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Explain how each agent was resolved
    #[arg(long)]
    pub explain: bool,

    /// Only update these agents (comma separated)
    #[arg(long, value_name = "LIST", default_value = "")]
    pub only: String,

    /// Skip these agents (comma separated)
    #[arg(long, value_name = "LIST", default_value = "")]
    pub skip: String,

    /// Configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Scheduler options, with flags taking precedence over the config file
    pub fn scheduler_options(&self, config: &UcaConfig) -> SchedulerOptions {
        let timeout = match self.timeout {
            Some(timeout) if timeout.is_zero() => None,
            Some(timeout) => Some(timeout),
            None => config.timeout(),
        };
        let concurrency = self
            .concurrency
            .or((config.concurrency > 0).then_some(config.concurrency))
            .filter(|limit| *limit > 0);

        SchedulerOptions {
            serial: self.serial,
            safe: self.safe,
            concurrency,
            timeout,
        }
    }
}

/// Parse durations like `30s`, `15m`, `1h`, `500ms`; a bare number is seconds
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, suffix) = s.split_at(split);
    if digits.is_empty() {
        return Err(format!("invalid duration '{}': missing number", s));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}': number out of range", s))?;

    let scale = match suffix.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" | "sec" | "secs" => 1,
        "m" | "min" | "mins" => 60,
        "h" | "hr" | "hrs" => 3600,
        other => return Err(format!("invalid duration '{}': unknown suffix '{}'", s, other)),
    };
    value
        .checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("invalid duration '{}': number out of range", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from([
            "uca", "--serial", "-n", "--timeout", "2m", "--only", "amp,codex", "--explain",
        ])
        .unwrap();
        assert!(cli.serial);
        assert!(cli.dry_run);
        assert!(cli.explain);
        assert_eq!(cli.timeout, Some(Duration::from_secs(120)));
        assert_eq!(cli.only, "amp,codex");
        assert_eq!(cli.skip, "");
    }

    #[test]
    fn test_serial_wins_over_parallel() {
        let cli = Cli::try_parse_from(["uca", "-p", "--serial"]).unwrap();
        assert!(cli.parallel);
        assert!(cli.scheduler_options(&UcaConfig::default()).serial);

        let cli = Cli::try_parse_from(["uca", "-p"]).unwrap();
        assert!(!cli.scheduler_options(&UcaConfig::default()).serial);
    }

    #[test]
    fn test_flags_override_config() {
        let config = UcaConfig {
            timeout_secs: 60,
            concurrency: 3,
            ..UcaConfig::default()
        };

        let cli = Cli::try_parse_from(["uca"]).unwrap();
        let options = cli.scheduler_options(&config);
        assert_eq!(options.timeout, Some(Duration::from_secs(60)));
        assert_eq!(options.concurrency, Some(3));

        let cli = Cli::try_parse_from(["uca", "--timeout", "0", "--concurrency", "8"]).unwrap();
        let options = cli.scheduler_options(&config);
        assert_eq!(options.timeout, None);
        assert_eq!(options.concurrency, Some(8));
    }

    #[test]
    fn test_unlimited_concurrency_by_default() {
        let cli = Cli::try_parse_from(["uca", "--safe"]).unwrap();
        let options = cli.scheduler_options(&UcaConfig::default());
        assert!(options.safe);
        assert_eq!(options.concurrency, None);
        assert_eq!(options.timeout, Some(Duration::from_secs(900)));
    }
}
