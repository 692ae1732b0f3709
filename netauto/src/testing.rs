//! Scripted transports for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::InteractiveEvent;
use crate::config::DeviceSpec;
use crate::error::{ConnectionError, Result};
use crate::transport::{Connector, Transport, TransportKind};

type Handler = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Open,
    Close,
    Command(String),
    Config(Vec<String>),
    Interactive(String),
    Upload { local: String, remote: String },
}

/// Calls seen by every transport sharing this log.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Command(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn configs(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Config(lines) => Some(lines),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn interactive(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Interactive(input) => Some(input),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn opens(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Open).count()
    }

    /// Every input sent to the device in order, whatever the call.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .flat_map(|c| match c {
                Call::Command(cmd) | Call::Interactive(cmd) => vec![cmd],
                Call::Config(lines) => lines,
                _ => vec![],
            })
            .collect()
    }
}

/// Transport answering every input through one handler.
pub(crate) struct MockTransport {
    handler: Handler,
    log: CallLog,
    open: bool,
    kind: TransportKind,
    open_failures: Arc<AtomicUsize>,
}

impl MockTransport {
    pub(crate) fn new<F>(handler: F) -> (Self, CallLog)
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        let log = CallLog::default();
        let transport = Self {
            handler: Arc::new(handler),
            log: log.clone(),
            open: true,
            kind: TransportKind::Ssh,
            open_failures: Arc::default(),
        };
        (transport, log)
    }

    pub(crate) fn with_kind(mut self, kind: TransportKind) -> Self {
        self.kind = kind;
        self
    }

    fn answer(&self, input: &str) -> Result<String> {
        (self.handler)(input)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<()> {
        self.log.push(Call::Open);
        let failures = self.open_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.open_failures.store(failures - 1, Ordering::SeqCst);
            return Err(ConnectionError::Timeout(Duration::from_secs(1)).into());
        }
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.push(Call::Close);
        self.open = false;
        Ok(())
    }

    async fn send_command(&mut self, command: &str, _timeout: Option<Duration>) -> Result<String> {
        self.log.push(Call::Command(command.to_string()));
        self.answer(command)
    }

    async fn send_config(&mut self, lines: &[String]) -> Result<String> {
        self.log.push(Call::Config(lines.to_vec()));
        let mut output = String::new();
        for line in lines {
            output.push_str(&self.answer(line)?);
        }
        Ok(output)
    }

    async fn send_interactive(&mut self, events: &[InteractiveEvent]) -> Result<String> {
        let mut output = String::new();
        for event in events {
            self.log.push(Call::Interactive(event.input.clone()));
            output.push_str(&self.answer(&event.input)?);
        }
        Ok(output)
    }

    async fn upload_file(&mut self, local: &Path, remote_path: &str) -> Result<()> {
        self.log.push(Call::Upload {
            local: local.display().to_string(),
            remote: remote_path.to_string(),
        });
        self.answer(&format!("upload {remote_path}")).map(|_| ())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }
}

/// Connector handing out mock transports that share one handler and log.
pub(crate) struct MockConnector {
    handler: Handler,
    log: CallLog,
    kind: TransportKind,
    open_failures: Arc<AtomicUsize>,
}

impl MockConnector {
    pub(crate) fn new<F>(handler: F) -> (Self, CallLog)
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        let log = CallLog::default();
        let connector = Self {
            handler: Arc::new(handler),
            log: log.clone(),
            kind: TransportKind::Ssh,
            open_failures: Arc::default(),
        };
        (connector, log)
    }

    pub(crate) fn with_kind(mut self, kind: TransportKind) -> Self {
        self.kind = kind;
        self
    }

    /// Make the next `count` opens fail as if the device were down.
    pub(crate) fn fail_opens(&self, count: usize) {
        self.open_failures.store(count, Ordering::SeqCst);
    }

    /// Share the failing-open counter with a handler, so a scripted reload
    /// can take the device down.
    pub(crate) fn with_open_failures(mut self, failures: Arc<AtomicUsize>) -> Self {
        self.open_failures = failures;
        self
    }
}

impl Connector for MockConnector {
    fn connect(&self, _spec: &DeviceSpec) -> Result<Box<dyn Transport>> {
        Ok(Box::new(MockTransport {
            handler: self.handler.clone(),
            log: self.log.clone(),
            open: false,
            kind: self.kind,
            open_failures: self.open_failures.clone(),
        }))
    }
}
