use clap::Parser;
use clap::Subcommand;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(version, about = "Inspect volunteer client state", long_about = None)]
pub struct ArgConfiguration {
    #[command(subcommand)]
    command: ConfCommands,
}

#[derive(Subcommand, Debug)]
enum ConfCommands {
    /// Parse one state file and list the records that would be discarded.
    #[command(arg_required_else_help = true)]
    Validate {
        /// Path to the state file.
        #[clap(short, long, value_name = "STATE FILE")]
        file: PathBuf,
        /// Platform to resolve app versions against. Defaults to this host.
        #[clap(short, long, value_name = "PLATFORM")]
        platform: Option<String>,
    },

    /// Summarize the state stored in a data directory.
    Summary {
        /// Client data directory.
        #[clap(
            short,
            long,
            default_value = "/var/lib/volunteer-client",
            value_name = "DATA DIR"
        )]
        data_directory: PathBuf,
        /// Print the summary as JSON.
        #[clap(long)]
        json: bool,
    },

    /// Fetch the state of a running client over GUI RPC.
    GetState {
        /// Address of the client's GUI RPC server.
        #[clap(
            short,
            long,
            default_value = volunteer_cli::GUI_RPC_DEFAULT_ADDR,
            value_name = "ADDR"
        )]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = ArgConfiguration::parse();

    match args.command {
        ConfCommands::Validate { file, platform } => {
            match volunteer_cli::validate_command(&file, platform.as_deref()) {
                Ok((state, report)) => {
                    println!(
                        "{} projects, {} results loaded",
                        state.projects().len(),
                        state.results().len()
                    );
                    for d in &report.discarded {
                        println!(
                            "discarded {} {} ({}): {}",
                            d.kind,
                            d.name,
                            d.project.as_deref().unwrap_or("no project"),
                            d.reason
                        );
                    }
                }
                Err(err) => println!("An error occurs during state file validation: {err}"),
            }
        }
        ConfCommands::Summary {
            data_directory,
            json,
        } => {
            let summary = volunteer_cli::summary_command(&data_directory);
            if json {
                match serde_json::to_string_pretty(&summary) {
                    Ok(out) => println!("{out}"),
                    Err(err) => println!("An error occurs during summary serialization: {err}"),
                }
            } else {
                print!("{}", volunteer_cli::format_summary(&summary));
            }
        }
        ConfCommands::GetState { addr } => match volunteer_cli::get_state_command(addr).await {
            Ok(reply) => print!("{reply}"),
            Err(err) => println!("An error while fetching client state: {err}"),
        },
    }
}
