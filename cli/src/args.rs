use clap::Parser;
use std::path::PathBuf;

macro_rules! version_string {
    () => {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nCommit: ",
            env!("GIT_COMMIT_HASH"),
            " (",
            env!("GIT_BRANCH"),
            ")\nBuilt: ",
            env!("BUILD_DATE")
        )
    };
}

/// park-watch - print live parking-system updates
#[derive(Parser, Debug)]
#[command(name = "park-watch")]
#[command(author = "Parking System Team")]
#[command(version = version_string!())]
#[command(about = "Watch live parking-system topics over STOMP", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long = "config", env = "PARKLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Broker endpoint (e.g., http://localhost:8080); overrides the config file
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// Broker login
    #[arg(long = "login")]
    pub login: Option<String>,

    /// Broker passcode
    #[arg(long = "passcode", requires = "login")]
    pub passcode: Option<String>,

    /// Topic to watch (repeatable)
    #[arg(short = 't', long = "topic")]
    pub topics: Vec<String>,

    /// Watch the dashboard and alert topics of a lot (repeatable)
    #[arg(short = 'l', long = "lot")]
    pub lots: Vec<i64>,

    /// Also watch the slot status topic of every --lot
    #[arg(long = "slots", requires = "lots")]
    pub slots: bool,

    /// Watch vehicle entry and exit events
    #[arg(long = "sessions")]
    pub sessions: bool,

    /// Watch reservation updates
    #[arg(long = "reservations")]
    pub reservations: bool,

    /// Print every message as one JSON line
    #[arg(long = "json")]
    pub json: bool,

    /// Exit after this many messages
    #[arg(short = 'n', long = "count")]
    pub count: Option<u64>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_flags() {
        let cli = Cli::try_parse_from([
            "park-watch",
            "-u",
            "http://localhost:8080",
            "-l",
            "1",
            "--lot",
            "2",
            "--slots",
            "-t",
            "/topic/reservation",
            "--json",
            "-n",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(cli.lots, vec![1, 2]);
        assert!(cli.slots);
        assert_eq!(cli.topics, vec!["/topic/reservation".to_string()]);
        assert!(cli.json);
        assert_eq!(cli.count, Some(5));
    }

    #[test]
    fn test_passcode_requires_login() {
        assert!(Cli::try_parse_from(["park-watch", "--passcode", "x"]).is_err());
        assert!(Cli::try_parse_from(["park-watch", "--slots"]).is_err());
    }
}
