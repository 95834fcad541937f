use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::Result;
use tokio::sync::Mutex;
use tracing_subscriber::{filter::LevelFilter, fmt::format::FmtSpan, EnvFilter};

use volunteer_client::cli::{Cli, Command, Config};
use volunteer_client::state::now;
use volunteer_client::{gui_rpc, ClientError, ClientState, SchedulerReply};

fn start_logger(default_level: LevelFilter) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        _ => EnvFilter::default().add_directive(default_level.into()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    start_logger(LevelFilter::INFO);

    let cli = Cli::parse();
    match cli.subcommand {
        Command::Run { config } => run(Arc::new(config)).await,
        Command::Attach {
            config,
            url,
            authenticator,
        } => {
            let mut state = load_state(&config);
            state.attach_project(&url, &authenticator)?;
            save(&mut state)
        }
        Command::Detach { config, url } => {
            let mut state = load_state(&config);
            let Some(id) = state.project_by_url(&url).map(|e| e.id) else {
                return Err(eyre::eyre!("not attached to {url}"));
            };
            state.detach_project(id)?;
            save(&mut state)
        }
        Command::MergeReply { config, url, reply } => {
            let mut state = load_state(&config);
            let contents = std::fs::read_to_string(&reply)?;
            let reply = SchedulerReply::parse_str(&contents)?;
            let report = state.handle_scheduler_reply(&url, reply, now())?;
            tracing::info!(
                "{} new results, {} acknowledged, {} discarded",
                report.new_results.len(),
                report.acked_results,
                report.discarded.len()
            );
            save(&mut state)
        }
    }
}

fn load_state(config: &Config) -> ClientState {
    let mut state = ClientState::new(config.client_config());
    let report = state.load();
    if !report.discarded.is_empty() {
        tracing::warn!(
            "{} records of the state file were discarded",
            report.discarded.len()
        );
    }
    state
}

fn save(state: &mut ClientState) -> Result<()> {
    if let Err(err) = state.save_if_needed() {
        report_save_failure(&err);
        return Err(err.into());
    }
    Ok(())
}

fn report_save_failure(err: &ClientError) {
    tracing::error!(
        "can't write the state file ({}, code {}); check that the data directory is writable and isn't locked by antivirus or backup software",
        err,
        err.code()
    );
}

async fn run(config: Arc<Config>) -> Result<()> {
    let state = load_state(&config);
    let state = Arc::new(Mutex::new(state));

    let (_, gui_rpc_jh) = gui_rpc::serve(config.gui_rpc_listen_addr, state.clone()).await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(config.save_interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                periodic_save(&state).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    gui_rpc_jh.abort();
    let mut state = state.lock().await;
    tokio::task::block_in_place(|| save(&mut state))
}

/// Saves when dirty. Rename retries sleep, so the write runs outside the
/// async worker.
async fn periodic_save(state: &Mutex<ClientState>) -> bool {
    let mut state = state.lock().await;
    match tokio::task::block_in_place(|| state.save_if_needed()) {
        Ok(saved) => saved,
        Err(err) => {
            report_save_failure(&err);
            false
        }
    }
}
