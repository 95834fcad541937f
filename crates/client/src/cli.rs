use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::config::{alt_platforms_for, host_platform, ClientConfig, LogFlags};

#[derive(Debug, Args)]
pub struct Config {
    #[arg(
        long,
        long_help = "Directory holding the state file, projects/ and slots/",
        env = "VC_DATA_DIRECTORY",
        default_value_os_t = PathBuf::from("/var/lib/volunteer-client"),
    )]
    pub data_directory: PathBuf,

    #[arg(
        long,
        long_help = "Primary platform name. Detected from the build when unset.",
        env = "VC_PLATFORM"
    )]
    pub platform: Option<String>,

    #[arg(
        long,
        long_help = "Alternate platforms whose binaries run on this host",
        value_delimiter = ',',
        env = "VC_ALT_PLATFORMS"
    )]
    pub alt_platforms: Vec<String>,

    #[arg(
        long,
        long_help = "GUI RPC listen address",
        env = "VC_GUI_RPC_LISTEN_ADDR",
        default_value = "127.0.0.1:31416"
    )]
    pub gui_rpc_listen_addr: SocketAddr,

    #[arg(
        long,
        long_help = "Seconds between checks for unsaved state",
        env = "VC_SAVE_INTERVAL",
        default_value_t = 10
    )]
    pub save_interval: u64,

    #[arg(
        long,
        long_help = "How often a state file rename is attempted before the save fails",
        env = "VC_RENAME_ATTEMPTS",
        default_value_t = 5
    )]
    pub rename_attempts: u32,

    #[arg(
        long,
        long_help = "Delay between rename attempts (in milliseconds)",
        env = "VC_RENAME_RETRY_DELAY_MS",
        default_value_t = 200
    )]
    pub rename_retry_delay_ms: u64,

    #[arg(
        long,
        long_help = "Log state file load and save progress",
        env = "VC_STATE_DEBUG",
        default_value_t = false
    )]
    pub state_debug: bool,

    #[arg(
        long,
        long_help = "Log every tag the parsers don't recognize",
        env = "VC_UNPARSED_XML",
        default_value_t = false
    )]
    pub unparsed_xml: bool,
}

impl Config {
    pub fn client_config(&self) -> ClientConfig {
        let primary_platform = self.platform.clone().unwrap_or_else(host_platform);
        let alt_platforms = if self.alt_platforms.is_empty() {
            alt_platforms_for(&primary_platform)
        } else {
            self.alt_platforms.clone()
        };

        ClientConfig {
            data_directory: self.data_directory.clone(),
            primary_platform,
            alt_platforms,
            log_flags: LogFlags {
                state_debug: self.state_debug,
                unparsed_xml: self.unparsed_xml,
            },
            rename_attempts: self.rename_attempts,
            rename_retry_delay: Duration::from_millis(self.rename_retry_delay_ms),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the client.
    Run {
        #[command(flatten)]
        config: Config,
    },

    /// Attach to a project and exit.
    Attach {
        #[command(flatten)]
        config: Config,

        #[arg(long, long_help = "Project master URL")]
        url: String,

        #[arg(long, long_help = "Account key", env = "VC_AUTHENTICATOR")]
        authenticator: String,
    },

    /// Detach from a project and exit.
    Detach {
        #[command(flatten)]
        config: Config,

        #[arg(long, long_help = "Project master URL")]
        url: String,
    },

    /// Merge a saved scheduler reply into the state and exit.
    MergeReply {
        #[command(flatten)]
        config: Config,

        #[arg(long, long_help = "Project master URL the reply came from")]
        url: String,

        #[arg(long, long_help = "File containing the scheduler reply")]
        reply: PathBuf,
    },
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Volunteer computing client")]
pub struct Cli {
    #[command(subcommand)]
    pub subcommand: Command,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "volunteer-client",
            "run",
            "--data-directory",
            "/tmp/vc",
            "--platform",
            "x86_64-pc-linux-gnu",
            "--alt-platforms",
            "i686-pc-linux-gnu,x86_64-unknown-linux",
            "--state-debug",
        ])
        .unwrap();

        let Command::Run { config } = cli.subcommand else {
            panic!("expected run");
        };
        let client = config.client_config();
        assert_eq!(client.data_directory, PathBuf::from("/tmp/vc"));
        assert_eq!(client.primary_platform, "x86_64-pc-linux-gnu");
        assert_eq!(client.alt_platforms.len(), 2);
        assert!(client.log_flags.state_debug);
        assert!(!client.log_flags.unparsed_xml);
        assert_eq!(client.rename_retry_delay, Duration::from_millis(200));
    }
}
