use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use volunteer_client::gui_rpc::END_OF_MESSAGE;
use volunteer_client::state::is_valid_state_file;
use volunteer_client::{ClientConfig, ClientState, LoadReport, StateSummary};

pub const GUI_RPC_DEFAULT_ADDR: &str = "127.0.0.1:31416";

type BoxResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Parses a single state file without touching its neighbours and returns
/// the loaded state along with what was dropped.
pub fn validate_command(file: &Path, platform: Option<&str>) -> BoxResult<(ClientState, LoadReport)> {
    let contents = std::fs::read_to_string(file)
        .map_err(|err| format!("can't read {}: {err}", file.display()))?;
    if !is_valid_state_file(&contents) {
        return Err(format!("{} isn't a complete state file", file.display()).into());
    }

    let data_dir = file.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let mut config = ClientConfig::new(data_dir);
    if let Some(platform) = platform {
        config = config.with_platform(platform, &[]);
    }

    let mut state = ClientState::new(config);
    let mut report = state.load_from_str(&contents)?;
    report.source = Some(file.to_path_buf());
    Ok((state, report))
}

/// Loads the newest usable generation from a data directory, the same way
/// the client does on startup.
pub fn summary_command(data_dir: &Path) -> StateSummary {
    let mut state = ClientState::new(ClientConfig::new(data_dir));
    state.load();
    state.summary()
}

/// Asks a running client for its state over GUI RPC.
pub async fn get_state_command(addr: SocketAddr) -> BoxResult<String> {
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();

    writer
        .write_all(b"<boinc_gui_rpc_request>\n<get_state/>\n</boinc_gui_rpc_request>\n")
        .await?;
    writer.write_all(&[END_OF_MESSAGE]).await?;
    writer.flush().await?;

    let mut reply = Vec::new();
    BufReader::new(reader)
        .read_until(END_OF_MESSAGE, &mut reply)
        .await?;
    if reply.last() != Some(&END_OF_MESSAGE) {
        return Err("connection closed before the reply ended".into());
    }
    reply.pop();
    Ok(String::from_utf8(reply)?)
}

pub fn format_summary(summary: &StateSummary) -> String {
    let mut out = format!("platform: {}\n", summary.platform_name);
    for p in &summary.projects {
        out.push_str(&format!(
            "{} ({}) share:{} apps:{} versions:{} workunits:{} results:{} files:{}{}\n",
            p.master_url,
            p.project_name,
            p.resource_share,
            p.apps,
            p.app_versions,
            p.workunits,
            p.results,
            p.file_infos,
            if p.anonymous_platform { " [anonymous]" } else { "" }
        ));
    }
    for r in &summary.results {
        out.push_str(&format!("\t{} {:?} received:{}\n", r.name, r.phase, r.received_time));
    }
    out.push_str(&format!(
        "active tasks:{} pending transfers:{}{}\n",
        summary.active_tasks,
        summary.pending_transfers,
        if summary.dirty { " (unsaved changes)" } else { "" }
    ));
    out
}
