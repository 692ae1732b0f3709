//! Prompt-driven CLI session over any byte stream.
//!
//! SSH shells and Telnet connections both end up here: the stream delivers
//! raw bytes, the session finds prompts, tracks privilege levels and turns
//! command output into [`Response`]s.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use super::interactive::{InteractiveEvent, InteractiveResult, InteractiveStep};
use super::privilege::PrivilegeManager;
use super::response::Response;
use crate::error::{CommandError, ConnectionError, Result};
use crate::platform::PlatformDefinition;

/// Bidirectional byte stream carrying a CLI session.
#[async_trait]
pub trait CliStream: Send {
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Next chunk of output, `None` once the peer closed the stream.
    async fn read(&mut self) -> Result<Option<Vec<u8>>>;

    async fn shutdown(&mut self) -> Result<()>;
}

/// Credentials and pacing for a CLI session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub username: String,
    pub password: SecretString,

    /// Escalation secret; the password is used when absent.
    pub secret: Option<SecretString>,

    pub timeout: Duration,

    /// When set, output is read until the device stays quiet for
    /// `delay_factor * 500ms` instead of waiting for the prompt.
    pub delay_factor: Option<u32>,
}

const QUIET_UNIT: Duration = Duration::from_millis(500);

/// An interactive CLI session on top of a [`CliStream`].
pub struct CliSession<S> {
    stream: S,
    definition: PlatformDefinition,
    privileges: PrivilegeManager,
    prompt_pattern: Regex,
    buffer: PatternBuffer,
    options: SessionOptions,
}

impl<S: CliStream> CliSession<S> {
    pub fn new(stream: S, definition: PlatformDefinition, options: SessionOptions) -> Result<Self> {
        let combined = definition
            .privilege_levels
            .values()
            .map(|level| format!("(?:{})", level.pattern.as_str()))
            .collect::<Vec<_>>()
            .join("|");
        let prompt_pattern = Regex::new(&combined).map_err(CommandError::InvalidPattern)?;
        let privileges = PrivilegeManager::new(definition.privilege_levels.clone());

        Ok(Self {
            stream,
            definition,
            privileges,
            prompt_pattern,
            buffer: PatternBuffer::default(),
            options,
        })
    }

    pub fn definition(&self) -> &PlatformDefinition {
        &self.definition
    }

    /// Current privilege level name.
    pub fn current_privilege(&self) -> Option<&str> {
        self.privileges.current()
    }

    /// Bring the session to its default privilege level.
    ///
    /// Handles an in-band `User:`/`Password:` exchange when the platform
    /// asks for one, waits for the first prompt, escalates and runs the
    /// platform's on-open commands.
    pub async fn open(&mut self) -> Result<()> {
        if self.definition.in_band_login {
            self.login().await?;
        }

        let (_, prompt) = self.read_until_prompt(self.options.timeout).await?;
        let level = self.privileges.observe_prompt(&prompt);
        debug!("{}: initial prompt {:?} ({:?})", self.definition.name, prompt, level);

        let default = self.definition.default_privilege.clone();
        if !default.is_empty() && level.as_deref() != Some(default.as_str()) {
            self.acquire_privilege(&default).await?;
        }

        for command in self.definition.on_open_commands.clone() {
            self.send_command(&command, None).await?;
        }
        Ok(())
    }

    /// Answer username and password prompts issued by the shell itself.
    pub async fn login(&mut self) -> Result<()> {
        let user_prompt = Regex::new(r"(?mi)(user(name)?|login)\s*:\s*$")
            .map_err(CommandError::InvalidPattern)?;
        let password_prompt =
            Regex::new(r"(?mi)password\s*:\s*$").map_err(CommandError::InvalidPattern)?;

        let timeout = self.options.timeout;
        self.read_until(&user_prompt, timeout).await?;
        let username = self.options.username.clone();
        self.write_line(&username).await?;
        self.read_until(&password_prompt, timeout).await?;
        let password = self.options.password.clone();
        self.write_line(password.expose_secret()).await?;
        trace!("{}: in-band credentials sent", self.definition.name);
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.stream.write(format!("{line}\n").as_bytes()).await
    }

    /// Read until `pattern` matches the tail of the output.
    pub async fn read_until(&mut self, pattern: &Regex, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.buffer.tail_contains(pattern) {
                return Ok(self.buffer.take());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CommandError::PatternTimeout(timeout).into());
            }
            match tokio::time::timeout(remaining, self.stream.read()).await {
                Err(_) => return Err(CommandError::PatternTimeout(timeout).into()),
                Ok(chunk) => match chunk? {
                    Some(data) => {
                        trace!("read {} bytes", data.len());
                        self.buffer.extend(&data);
                    }
                    None => return Err(ConnectionError::Disconnected.into()),
                },
            }
        }
    }

    /// Read until the device has been quiet for `quiet`, or `timeout` passes.
    async fn read_timing(&mut self, quiet: Duration, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match tokio::time::timeout(quiet, self.stream.read()).await {
                Err(_) if !self.buffer.is_empty() => break,
                Err(_) => continue,
                Ok(chunk) => match chunk? {
                    Some(data) => self.buffer.extend(&data),
                    None if self.buffer.is_empty() => {
                        return Err(ConnectionError::Disconnected.into());
                    }
                    None => break,
                },
            }
        }
        Ok(self.buffer.take())
    }

    /// Read until a prompt, returning the output before it and the prompt.
    async fn read_until_prompt(&mut self, timeout: Duration) -> Result<(String, String)> {
        let pattern = self.prompt_pattern.clone();
        let data = self.read_until(&pattern, timeout).await?;
        Ok(self.split_prompt(&data))
    }

    fn split_prompt(&self, data: &[u8]) -> (String, String) {
        match self.prompt_pattern.find_iter(data).last() {
            Some(m) => (
                String::from_utf8_lossy(&data[..m.start()]).into_owned(),
                String::from_utf8_lossy(m.as_bytes()).trim().to_string(),
            ),
            None => (String::from_utf8_lossy(data).into_owned(), String::new()),
        }
    }

    /// Send one command and collect its output.
    pub async fn send_command(&mut self, command: &str, timeout: Option<Duration>) -> Result<Response> {
        let timeout = timeout.unwrap_or(self.options.timeout);
        let start = Instant::now();
        debug!("{}: sending {:?}", self.definition.name, command);
        self.write_line(command).await?;

        let (body, prompt) = match self.options.delay_factor {
            Some(factor) => {
                let data = self.read_timing(QUIET_UNIT * factor.max(1), timeout).await?;
                self.split_prompt(&data)
            }
            None => self.read_until_prompt(timeout).await?,
        };
        let raw_result = format!("{body}{prompt}");

        if !prompt.is_empty() {
            self.privileges.observe_prompt(&prompt);
        }

        let result = normalize_output(&body, command);
        let failure_message = self.definition.detect_failure(&result).map(str::to_string);

        Ok(Response {
            command: command.to_string(),
            result,
            raw_result,
            prompt,
            elapsed: start.elapsed(),
            failure_message,
        })
    }

    /// Move the session to privilege level `target`.
    pub async fn acquire_privilege(&mut self, target: &str) -> Result<()> {
        let current = self.privileges.current().unwrap_or_default().to_string();
        if current == target {
            return Ok(());
        }

        let path = self.privileges.find_path(&current, target)?;
        for hop in path.windows(2) {
            let (from, to) = (&hop[0], &hop[1]);
            let transition = self.privileges.get_transition(from, to).ok_or_else(|| {
                CommandError::NoPrivilegePath {
                    from: from.clone(),
                    to: to.clone(),
                }
            })?;

            debug!("{}: {} -> {} via {:?}", self.definition.name, from, to, transition.command);
            self.write_line(&transition.command).await?;

            if let Some(auth_prompt) = &transition.auth_prompt {
                let either = Regex::new(&format!(
                    "(?:{})|(?:{})",
                    auth_prompt.as_str(),
                    self.prompt_pattern.as_str()
                ))
                .map_err(CommandError::InvalidPattern)?;
                let data = self.read_until(&either, self.options.timeout).await?;
                if auth_prompt.is_match(&data) {
                    let secret = self
                        .options
                        .secret
                        .clone()
                        .unwrap_or_else(|| self.options.password.clone());
                    self.write_line(secret.expose_secret()).await?;
                } else {
                    let (_, prompt) = self.split_prompt(&data);
                    self.check_reached(&prompt, to)?;
                    continue;
                }
            }

            let (_, prompt) = self.read_until_prompt(self.options.timeout).await?;
            self.check_reached(&prompt, to)?;
        }
        Ok(())
    }

    fn check_reached(&mut self, prompt: &str, target: &str) -> Result<()> {
        match self.privileges.observe_prompt(prompt) {
            Some(level) if level == target => Ok(()),
            _ => Err(CommandError::PrivilegeAcquisitionFailed {
                target: target.to_string(),
            }
            .into()),
        }
    }

    /// Apply configuration lines from the configuration level.
    ///
    /// Returns to the default level afterwards, even when a line failed.
    pub async fn send_config(&mut self, lines: &[String]) -> Result<Vec<Response>> {
        let config_level = self.definition.configuration_privilege.clone();
        self.acquire_privilege(&config_level).await?;

        let mut responses = Vec::with_capacity(lines.len());
        let mut failure = None;
        for line in lines {
            let response = self.send_command(line, None).await?;
            let failed = !response.is_success();
            responses.push(response);
            if failed {
                failure = responses.last().cloned();
                break;
            }
        }

        let default = self.definition.default_privilege.clone();
        self.acquire_privilege(&default).await?;

        match failure {
            Some(response) => Err(CommandError::Failed {
                command: response.command,
                message: response.result,
            }
            .into()),
            None => Ok(responses),
        }
    }

    /// Run an interactive sequence.
    pub async fn send_interactive(&mut self, events: &[InteractiveEvent]) -> Result<InteractiveResult> {
        let mut result = InteractiveResult::default();
        for event in events {
            debug!("{}: interactive {:?}", self.definition.name, event.loggable_input());
            self.write_line(&event.input).await?;

            let pattern = event.pattern.clone().unwrap_or_else(|| self.prompt_pattern.clone());
            let timeout = event.timeout.unwrap_or(self.options.timeout);
            let data = self.read_until(&pattern, timeout).await?;
            let output = String::from_utf8_lossy(&data).into_owned();

            if event.pattern.is_none() {
                let (_, prompt) = self.split_prompt(&data);
                self.privileges.observe_prompt(&prompt);
            }

            result.steps.push(InteractiveStep {
                input: event.loggable_input().to_string(),
                output,
            });
        }
        Ok(result)
    }

    /// Run on-close commands and shut the stream down.
    pub async fn close(&mut self) -> Result<()> {
        for command in self.definition.on_close_commands.clone() {
            self.write_line(&command).await?;
        }
        self.stream.shutdown().await
    }
}

/// Strip the echoed command and carriage returns from raw output.
fn normalize_output(body: &str, command: &str) -> String {
    let body = body.replace("\r\n", "\n").replace('\r', "");
    let mut lines = body.lines().peekable();

    let echo = command.trim();
    if !echo.is_empty() && lines.peek().is_some_and(|first| first.trim_end().ends_with(echo)) {
        lines.next();
    }

    lines.collect::<Vec<_>>().join("\n").trim_end().to_string()
}
