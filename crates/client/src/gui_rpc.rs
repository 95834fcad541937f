//! Read-only text protocol for local GUIs.
//!
//! A request is `<boinc_gui_rpc_request>...</boinc_gui_rpc_request>`
//! followed by a `\x03` byte; replies are framed the same way.

use eyre::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::state::ClientState;
use crate::types::WriteMode;
use crate::xml::{Token, XmlReader};

pub const GUI_RPC_PORT: u16 = 31416;
pub const END_OF_MESSAGE: u8 = 0x03;

#[derive(Debug, PartialEq, Eq)]
enum Request {
    GetState,
    Unknown,
    Malformed,
}

fn parse_request(text: &str) -> Request {
    let mut r = XmlReader::new(text);
    match r.next() {
        Ok(Some(tok)) if tok.matches_start("boinc_gui_rpc_request") => {}
        _ => return Request::Malformed,
    }
    loop {
        match r.next() {
            Ok(Some(Token::Close {
                tag: "boinc_gui_rpc_request",
            }))
            | Ok(None) => return Request::Unknown,
            Ok(Some(tok)) if tok.matches_start("get_state") => return Request::GetState,
            Ok(Some(Token::Text(_))) => continue,
            Ok(Some(_)) => return Request::Unknown,
            Err(_) => return Request::Malformed,
        }
    }
}

/// Answers one request, without the trailing end-of-message byte.
pub fn handle_request(state: &ClientState, request: &str) -> String {
    let body = match parse_request(request) {
        Request::GetState => state.write_state(WriteMode::GuiRpc),
        Request::Unknown => "<error>unrecognized op</error>\n".to_string(),
        Request::Malformed => "<error>missing request</error>\n".to_string(),
    };
    format!("<boinc_gui_rpc_reply>\n{body}</boinc_gui_rpc_reply>\n")
}

/// Accepts GUI connections on `bind_addr`, one task per connection.
pub async fn serve(
    bind_addr: SocketAddr,
    state: Arc<Mutex<ClientState>>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(bind_addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("GUI RPC listening on {}", local_addr);

    let jh = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tokio::spawn({
                        let state = state.clone();
                        async move {
                            if let Err(err) = handle_connection(stream, state).await {
                                tracing::warn!("GUI RPC connection from {} failed: {}", peer, err);
                            }
                        }
                    });
                }
                Err(err) => tracing::error!("GUI RPC accept failed: {err}"),
            }
        }
    });

    Ok((local_addr, jh))
}

async fn handle_connection(stream: TcpStream, state: Arc<Mutex<ClientState>>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(END_OF_MESSAGE, &mut buf).await? == 0 {
            return Ok(());
        }
        if buf.last() == Some(&END_OF_MESSAGE) {
            buf.pop();
        }

        let request = String::from_utf8_lossy(&buf);
        let reply = {
            let state = state.lock().await;
            handle_request(&state, &request)
        };
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(&[END_OF_MESSAGE]).await?;
        writer.flush().await?;
    }
}
