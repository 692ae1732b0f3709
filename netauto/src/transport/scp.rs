//! SCP sink-mode upload over an SSH exec channel.

use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg};
use tokio::io::BufReader;

use super::config::SshConfig;
use super::ssh::{SshHandler, SshTransport, disconnect};
use crate::error::{CommandError, ConnectionError, Result};

const COPY_BUFFER: usize = 64 * 1024;

/// Upload `local` to `remote_path` through an established session.
///
/// The file is streamed from disk, never held in memory as a whole.
pub(crate) async fn upload(
    handle: &Handle<SshHandler>,
    local: &Path,
    remote_path: &str,
    timeout: Duration,
) -> Result<()> {
    let file = tokio::fs::File::open(local).await?;
    let len = file.metadata().await?.len();
    let name = remote_file_name(remote_path);

    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(ConnectionError::Ssh)?;
    channel
        .exec(true, format!("scp -t {remote_path}"))
        .await
        .map_err(ConnectionError::Ssh)?;
    wait_ack(&mut channel, timeout).await?;

    let header = sink_header(name, len);
    channel
        .data(header.as_bytes())
        .await
        .map_err(ConnectionError::Ssh)?;
    wait_ack(&mut channel, timeout).await?;

    channel
        .data(BufReader::with_capacity(COPY_BUFFER, file))
        .await
        .map_err(ConnectionError::Ssh)?;
    channel
        .data(&[0u8][..])
        .await
        .map_err(ConnectionError::Ssh)?;
    wait_ack(&mut channel, timeout).await?;

    if let Err(e) = channel.eof().await {
        debug!("scp eof: {}", e);
    }
    if let Err(e) = channel.close().await {
        debug!("scp close: {}", e);
    }
    info!("copied {} bytes to {}", len, remote_path);
    Ok(())
}

/// Upload over a short-lived session of its own.
pub(crate) async fn upload_standalone(config: &SshConfig, local: &Path, remote_path: &str) -> Result<()> {
    let handle = SshTransport::connect_session(config).await?;
    let result = upload(&handle, local, remote_path, config.timeout).await;
    disconnect(&handle).await;
    result
}

async fn wait_ack(channel: &mut Channel<Msg>, timeout: Duration) -> Result<()> {
    loop {
        let msg = tokio::time::timeout(timeout, channel.wait())
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))?;
        match msg {
            Some(ChannelMsg::Data { data }) => return check_ack(&data),
            Some(ChannelMsg::ExitStatus { exit_status }) if exit_status != 0 => {
                return Err(CommandError::Failed {
                    command: "scp".to_string(),
                    message: format!("remote scp exited with status {exit_status}"),
                }
                .into());
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                return Err(ConnectionError::Disconnected.into());
            }
            Some(_) => continue,
        }
    }
}

/// Interpret an SCP acknowledgement: `\0` is success, `\x01`/`\x02` carry an error.
fn check_ack(data: &[u8]) -> Result<()> {
    match data.first() {
        Some(0) => Ok(()),
        _ => Err(CommandError::Failed {
            command: "scp".to_string(),
            message: String::from_utf8_lossy(data.get(1..).unwrap_or_default())
                .trim()
                .to_string(),
        }
        .into()),
    }
}

fn sink_header(name: &str, len: u64) -> String {
    format!("C0644 {len} {name}\n")
}

/// Last path component of a device path such as `flash:dir/image.bin`.
fn remote_file_name(remote_path: &str) -> &str {
    remote_path
        .rsplit(|c| c == '/' || c == ':')
        .find(|part| !part.is_empty())
        .unwrap_or(remote_path)
}
