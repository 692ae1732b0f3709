//! Telnet transport for legacy Cisco IOS access.
//!
//! Option negotiation is minimal: the server may echo and suppress
//! go-ahead, everything else is refused.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{Transport, TransportKind, response_text};
use crate::channel::{CliSession, CliStream, InteractiveEvent, SessionOptions};
use crate::error::{ConnectionError, Result};
use crate::platform::PlatformDefinition;

pub const DEFAULT_PORT: u16 = 23;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;
const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;

/// CLI session over a Telnet connection.
pub struct TelnetTransport {
    host: String,
    port: u16,
    definition: PlatformDefinition,
    options: SessionOptions,
    cli: Option<CliSession<TelnetStream>>,
}

impl TelnetTransport {
    pub fn new(host: String, port: u16, definition: PlatformDefinition, options: SessionOptions) -> Self {
        Self {
            host,
            port,
            // Telnet has no transport-level authentication.
            definition: definition.with_in_band_login(),
            options,
            cli: None,
        }
    }

    fn cli(&mut self) -> Result<&mut CliSession<TelnetStream>> {
        self.cli.as_mut().ok_or_else(|| ConnectionError::NotConnected.into())
    }
}

#[async_trait]
impl Transport for TelnetTransport {
    async fn open(&mut self) -> Result<()> {
        if self.cli.is_some() {
            return Ok(());
        }
        let timeout = self.options.timeout;
        let stream = tokio::time::timeout(timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))?
            .map_err(|source| ConnectionError::ConnectionFailed {
                host: self.host.clone(),
                port: self.port,
                source,
            })?;
        debug!("telnet connected to {}:{}", self.host, self.port);

        let mut cli = CliSession::new(
            TelnetStream::new(stream),
            self.definition.clone(),
            self.options.clone(),
        )?;
        cli.open().await?;
        self.cli = Some(cli);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        match self.cli.take() {
            Some(mut cli) => cli.close().await,
            None => Ok(()),
        }
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
        Ok(self.cli()?.send_interactive(events).await?.full_output())
    }

    fn is_open(&self) -> bool {
        self.cli.is_some()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Telnet
    }
}

/// Telnet byte stream with option negotiation stripped out.
struct TelnetStream {
    stream: TcpStream,
    decoder: TelnetDecoder,
}

impl TelnetStream {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            decoder: TelnetDecoder::default(),
        }
    }
}

#[async_trait]
impl CliStream for TelnetStream {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut escaped = Vec::with_capacity(data.len());
        for &b in data {
            if b == IAC {
                escaped.push(IAC);
            }
            escaped.push(b);
        }
        self.stream.write_all(&escaped).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; 4096];
        loop {
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            let (data, replies) = self.decoder.decode(&buf[..n]);
            if !replies.is_empty() {
                trace!("telnet negotiation reply {:?}", replies);
                self.stream.write_all(&replies).await?;
            }
            if !data.is_empty() {
                return Ok(Some(data));
            }
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Incremental Telnet decoder; sequences may span reads.
#[derive(Debug, Default)]
struct TelnetDecoder {
    state: DecodeState,
}

impl TelnetDecoder {
    /// Split input into payload bytes and negotiation replies.
    fn decode(&mut self, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::with_capacity(input.len());
        let mut replies = Vec::new();

        for &b in input {
            self.state = match (self.state, b) {
                (DecodeState::Data, IAC) => DecodeState::Iac,
                (DecodeState::Data, b) => {
                    data.push(b);
                    DecodeState::Data
                }
                (DecodeState::Iac, IAC) => {
                    data.push(IAC);
                    DecodeState::Data
                }
                (DecodeState::Iac, cmd @ (WILL | WONT | DO | DONT)) => DecodeState::Negotiate(cmd),
                (DecodeState::Iac, SB) => DecodeState::Subnegotiation,
                (DecodeState::Iac, _) => DecodeState::Data,
                (DecodeState::Negotiate(cmd), option) => {
                    if let Some(answer) = negotiation_reply(cmd, option) {
                        replies.extend_from_slice(&[IAC, answer, option]);
                    }
                    DecodeState::Data
                }
                (DecodeState::Subnegotiation, IAC) => DecodeState::SubnegotiationIac,
                (DecodeState::Subnegotiation, _) => DecodeState::Subnegotiation,
                (DecodeState::SubnegotiationIac, SE) => DecodeState::Data,
                (DecodeState::SubnegotiationIac, _) => DecodeState::Subnegotiation,
            };
        }
        (data, replies)
    }
}

fn negotiation_reply(command: u8, option: u8) -> Option<u8> {
    match command {
        WILL if option == OPT_ECHO || option == OPT_SGA => Some(DO),
        WILL => Some(DONT),
        DO => Some(WONT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_refuses_options_and_keeps_data() {
        let mut decoder = TelnetDecoder::default();
        let input = [IAC, DO, 24, b'U', b's', IAC, WILL, OPT_ECHO, b'e', b'r', b':'];
        let (data, replies) = decoder.decode(&input);
        assert_eq!(data, b"User:");
        assert_eq!(replies, vec![IAC, WONT, 24, IAC, DO, OPT_ECHO]);
    }

    #[test]
    fn test_decoder_handles_split_sequences_and_escapes() {
        let mut decoder = TelnetDecoder::default();
        let (data, replies) = decoder.decode(&[b'a', IAC]);
        assert_eq!(data, b"a");
        assert!(replies.is_empty());

        let (data, _) = decoder.decode(&[IAC, b'b']);
        assert_eq!(data, vec![IAC, b'b']);
    }

    #[test]
    fn test_decoder_skips_subnegotiation() {
        let mut decoder = TelnetDecoder::default();
        let (data, replies) = decoder.decode(&[IAC, SB, 24, 1, IAC, SE, b'#']);
        assert_eq!(data, b"#");
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_login_and_command_over_loopback() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            socket.write_all(b"\r\nUsername: ").await.unwrap();
            socket.read(&mut buf).await.unwrap();
            socket.write_all(b"Password: ").await.unwrap();
            socket.read(&mut buf).await.unwrap();
            socket.write_all(b"\r\nrtr1#").await.unwrap();
            for reply in [
                "terminal length 0\r\nrtr1#",
                "terminal width 511\r\nrtr1#",
                "show clock\r\n*10:00:00 UTC\r\nrtr1#",
            ] {
                socket.read(&mut buf).await.unwrap();
                socket.write_all(reply.as_bytes()).await.unwrap();
            }
        });

        let definition = crate::platform::vendors::cisco_ios::definition().unwrap();
        let mut transport = TelnetTransport::new(
            "127.0.0.1".into(),
            port,
            definition,
            crate::channel::test_session_options(),
        );
        transport.open().await.unwrap();
        let output = transport.send_command("show clock", None).await.unwrap();
        assert_eq!(output, "*10:00:00 UTC");
        transport.close().await.unwrap();
        server.await.unwrap();
    }
}
