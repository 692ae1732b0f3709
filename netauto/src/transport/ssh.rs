//! SSH transport implementation using russh.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use super::{Transport, TransportKind, response_text, scp};
use crate::channel::{CliSession, CliStream, InteractiveEvent, SessionOptions};
use crate::error::{ConnectionError, Result};
use crate::platform::PlatformDefinition;

/// CLI session over an SSH shell channel.
pub struct SshTransport {
    config: SshConfig,
    definition: PlatformDefinition,
    options: SessionOptions,
    handle: Option<Handle<SshHandler>>,
    cli: Option<CliSession<SshStream>>,
}

impl SshTransport {
    pub fn new(config: SshConfig, definition: PlatformDefinition, options: SessionOptions) -> Self {
        Self {
            config,
            definition,
            options,
            handle: None,
            cli: None,
        }
    }

    /// Connect and authenticate, without opening a channel.
    pub(crate) async fn connect_session(config: &SshConfig) -> Result<Handle<SshHandler>> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(config.timeout),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<ConnectionError>>> = Arc::new(Mutex::new(None));
        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(config.timeout))?
        .map_err(|e| {
            // Prefer the detailed host-key error over russh's generic one.
            let stored = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            stored.unwrap_or(ConnectionError::Ssh(e))
        })?;

        authenticate(&mut session, config).await?;
        debug!("ssh session established to {}:{}", config.host, config.port);
        Ok(session)
    }

    async fn open_shell(handle: &Handle<SshHandler>, config: &SshConfig) -> Result<Channel<Msg>> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(ConnectionError::Ssh)?;
        channel
            .request_pty(
                true,
                "xterm",
                config.terminal_width,
                config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(ConnectionError::Ssh)?;
        channel
            .request_shell(true)
            .await
            .map_err(ConnectionError::Ssh)?;
        Ok(channel)
    }

    fn cli(&mut self) -> Result<&mut CliSession<SshStream>> {
        self.cli.as_mut().ok_or_else(|| ConnectionError::NotConnected.into())
    }
}

async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
    let success = match &config.auth {
        AuthMethod::Password(password) => session
            .authenticate_password(&config.username, password.expose_secret())
            .await
            .map_err(ConnectionError::Ssh)?
            .success(),
        AuthMethod::PrivateKey { path, passphrase } => {
            let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                .map_err(|e| ConnectionError::Key(e.to_string()))?;
            let hash_alg = session
                .best_supported_rsa_hash()
                .await
                .map_err(ConnectionError::Ssh)?
                .flatten();
            session
                .authenticate_publickey(
                    &config.username,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map_err(ConnectionError::Ssh)?
                .success()
        }
    };

    if !success {
        return Err(ConnectionError::AuthenticationFailed {
            user: config.username.clone(),
        }
        .into());
    }
    Ok(())
}

/// Disconnect a session, ignoring a peer that already went away.
pub(crate) async fn disconnect(handle: &Handle<SshHandler>) {
    if let Err(e) = handle
        .disconnect(russh::Disconnect::ByApplication, "", "en")
        .await
    {
        debug!("ssh disconnect: {}", e);
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open(&mut self) -> Result<()> {
        if self.cli.is_some() {
            return Ok(());
        }
        let handle = Self::connect_session(&self.config).await?;
        let channel = match Self::open_shell(&handle, &self.config).await {
            Ok(channel) => channel,
            Err(e) => {
                disconnect(&handle).await;
                return Err(e);
            }
        };

        let mut cli = CliSession::new(
            SshStream { channel },
            self.definition.clone(),
            self.options.clone(),
        )?;
        if let Err(e) = cli.open().await {
            disconnect(&handle).await;
            return Err(e);
        }

        self.handle = Some(handle);
        self.cli = Some(cli);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let cli = self.cli.take();
        let handle = self.handle.take();
        let mut result = Ok(());
        if let Some(mut cli) = cli {
            result = cli.close().await;
        }
        if let Some(handle) = handle {
            disconnect(&handle).await;
        }
        result
    }

    async fn send_command(&mut self, command: &str, timeout: Option<Duration>) -> Result<String> {
        let response = self.cli()?.send_command(command, timeout).await?;
        response_text(response)
    }

    async fn send_config(&mut self, lines: &[String]) -> Result<String> {
        let responses = self.cli()?.send_config(lines).await?;
        Ok(responses
            .into_iter()
            .map(|r| r.result)
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn send_interactive(&mut self, events: &[InteractiveEvent]) -> Result<String> {
        let result = self.cli()?.send_interactive(events).await?;
        Ok(result.full_output())
    }

    async fn upload_file(&mut self, local: &Path, remote_path: &str) -> Result<()> {
        let handle = self
            .handle
            .as_ref()
            .ok_or(ConnectionError::NotConnected)?;
        scp::upload(handle, local, remote_path, self.config.timeout).await
    }

    fn is_open(&self) -> bool {
        self.cli.is_some()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }
}

/// Shell channel as a [`CliStream`].
struct SshStream {
    channel: Channel<Msg>,
}

#[async_trait]
impl CliStream for SshStream {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.channel.data(data).await.map_err(ConnectionError::Ssh)?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::ExtendedData { data, .. }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(_) => continue,
            }
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Err(e) = self.channel.eof().await {
            debug!("ssh channel eof: {}", e);
        }
        self.channel.close().await.map_err(ConnectionError::Ssh)?;
        Ok(())
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Detailed host-key error surfaced by `connect_session`.
    host_key_error: Arc<Mutex<Option<ConnectionError>>>,
}

impl SshHandler {
    /// `Ok(true)` if known, `Ok(false)` if unknown, error if the key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, ConnectionError> {
        let result = match &self.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, pubkey),
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(ConnectionError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(ConnectionError::KnownHosts(e.to_string())),
        }
    }

    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), ConnectionError> {
        let result = match &self.known_hosts_path {
            Some(path) => {
                russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
            }
            None => russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey),
        };
        result.map_err(|e| ConnectionError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: ConnectionError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let accepted = match self.host_key_verification {
            HostKeyVerification::Disabled => true,
            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    true
                }
                Err(e) => self.reject(e),
            },
            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => self.reject(ConnectionError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Err(e) => self.reject(e),
            },
        };
        Ok(accepted)
    }
}
