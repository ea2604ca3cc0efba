//! Execution coordinator.
//!
//! Turns one source fragment into one complete kernel interaction:
//!
//! ```text
//! Submitted ──first message──▶ Accumulating ──idle + reply──▶ Terminal(status)
//!     │                             │
//!     └────────── deadline ─────────┴──────────────────────▶ Terminal(status)
//! ```
//!
//! Output text is appended in arrival order. The terminal status is decided
//! by [`Classifier`], in priority order: compile error, runtime error,
//! timeout, success.

use std::time::Duration;

use kernelbridge_config::{BridgeConfig, ClassificationConfig};
use kernelbridge_wire::content::{
    ErrorContent, ExecuteReply, ExecuteRequest, ExecuteResult, ExecutionState, ReplyStatus,
    StatusContent, StreamContent, StreamName,
};
use kernelbridge_wire::{Message, MsgKind, RequestId};
use regex::Regex;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::channel::{ChannelKind, Incoming, KernelChannel, RequestChannel};
use crate::{ClientError, ClientResult};

/// What kind of runtime fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The fault carries the assertion signature.
    Assertion,
    Other,
}

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    CompileError,
    RuntimeError(FaultKind),
    Timeout,
}

/// Where an execution is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Submitted,
    Accumulating,
    Terminal(ExecutionStatus),
}

/// Accumulated outcome of one request.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub request: RequestId,
    pub stdout: String,
    /// Stderr stream text followed by any reported error and traceback.
    pub stderr: String,
    pub status: ExecutionStatus,
    pub execution_count: Option<u64>,
    pub elapsed: Duration,
    /// The timeout the execution ran under.
    pub timeout: Duration,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Returns stdout on success and the classified error otherwise.
    pub fn into_output(self) -> ClientResult<String> {
        match self.status {
            ExecutionStatus::Success => Ok(self.stdout),
            ExecutionStatus::CompileError => Err(ClientError::Compile(self.stderr.trim().to_string())),
            ExecutionStatus::RuntimeError(kind) => Err(ClientError::Runtime {
                kind,
                message: self.stderr.trim().to_string(),
            }),
            ExecutionStatus::Timeout => Err(ClientError::ExecutionTimeout(self.timeout)),
        }
    }
}

/// Removes one trailing newline (`\n` or `\r\n`) and nothing else.
pub fn strip_trailing_newline(text: &str) -> &str {
    match text.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => text,
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classifies diagnostics with the configured patterns.
#[derive(Debug, Clone)]
pub struct Classifier {
    compile_error: Regex,
    runtime_fault: Regex,
    assertion_signature: String,
}

impl Classifier {
    pub fn new(config: &ClassificationConfig) -> ClientResult<Self> {
        Ok(Self {
            compile_error: Regex::new(&config.compile_error)?,
            runtime_fault: Regex::new(&config.runtime_fault)?,
            assertion_signature: config.assertion_signature.clone(),
        })
    }

    /// Marker that identifies an assertion fault.
    pub fn assertion_signature(&self) -> &str {
        &self.assertion_signature
    }

    /// Decides the terminal status.
    ///
    /// `kernel_failed` is set when the kernel itself reported an error, either
    /// through an `error` broadcast or a non-ok reply. Compile diagnostics only
    /// count when it is set; a fragment that merely prints `error:` to stderr
    /// and returns ok still succeeds.
    pub fn classify(&self, diagnostics: &str, kernel_failed: bool, timed_out: bool) -> ExecutionStatus {
        if kernel_failed && self.compile_error.is_match(diagnostics) {
            ExecutionStatus::CompileError
        } else if kernel_failed || self.runtime_fault.is_match(diagnostics) {
            let kind = if diagnostics.contains(&self.assertion_signature) {
                FaultKind::Assertion
            } else {
                FaultKind::Other
            };
            ExecutionStatus::RuntimeError(kind)
        } else if timed_out {
            ExecutionStatus::Timeout
        } else {
            ExecutionStatus::Success
        }
    }
}

// ============================================================================
// Accumulation
// ============================================================================

struct Accumulator {
    phase: Phase,
    stdout: String,
    stderr: String,
    errors: String,
    reply: Option<ExecuteReply>,
    idle: bool,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            phase: Phase::Submitted,
            stdout: String::new(),
            stderr: String::new(),
            errors: String::new(),
            reply: None,
            idle: false,
        }
    }

    fn is_complete(&self) -> bool {
        self.idle && self.reply.is_some()
    }

    fn absorb(&mut self, incoming: &Incoming) {
        if self.phase == Phase::Submitted {
            self.phase = Phase::Accumulating;
        }
        let message = &incoming.message;

        match (incoming.channel, message.kind()) {
            (ChannelKind::Shell, MsgKind::ExecuteReply) => {
                self.reply = decode::<ExecuteReply>(message);
            }
            (ChannelKind::IoPub, MsgKind::Stream) => {
                if let Some(stream) = decode::<StreamContent>(message) {
                    match stream.name {
                        StreamName::Stdout => self.stdout.push_str(&stream.text),
                        StreamName::Stderr => self.stderr.push_str(&stream.text),
                    }
                }
            }
            (ChannelKind::IoPub, MsgKind::ExecuteResult | MsgKind::DisplayData) => {
                if let Some(text) = decode::<ExecuteResult>(message)
                    .as_ref()
                    .and_then(ExecuteResult::plain_text)
                {
                    self.stdout.push_str(text);
                }
            }
            (ChannelKind::IoPub, MsgKind::Error) => {
                if let Some(error) = decode::<ErrorContent>(message) {
                    self.errors.push_str(&error.render());
                }
            }
            (ChannelKind::IoPub, MsgKind::Status) => {
                if decode::<StatusContent>(message)
                    .is_some_and(|s| s.execution_state == ExecutionState::Idle)
                {
                    self.idle = true;
                }
            }
            (channel, kind) => tracing::trace!(?channel, %kind, "ignored during execute"),
        }
    }

    fn kernel_failed(&self) -> bool {
        !self.errors.is_empty()
            || self
                .reply
                .as_ref()
                .is_some_and(|r| r.status != ReplyStatus::Ok)
    }

    /// Stderr plus error text; the reply's error only counts when no `error`
    /// broadcast carried it already.
    fn diagnostics(&self) -> String {
        let mut text = self.stderr.clone();
        if !self.errors.is_empty() {
            text.push_str(&self.errors);
        } else if let Some(reply) = self.reply.as_ref().filter(|r| r.status == ReplyStatus::Error) {
            let error = ErrorContent {
                ename: reply.ename.clone().unwrap_or_default(),
                evalue: reply.evalue.clone().unwrap_or_default(),
                traceback: reply.traceback.clone(),
            };
            text.push_str(&error.render());
        }
        text
    }
}

fn decode<T: DeserializeOwned>(message: &Message) -> Option<T> {
    match message.content_as() {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed message content");
            None
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Runs fragments on one kernel, one at a time.
///
/// `execute` takes `&mut self`, so a second fragment cannot be submitted
/// before the first reached a terminal status.
pub struct Coordinator {
    channel: KernelChannel,
    classifier: Classifier,
    timeout: Duration,
}

impl Coordinator {
    pub fn new(channel: KernelChannel, classifier: Classifier, timeout: Duration) -> Self {
        Self {
            channel,
            classifier,
            timeout,
        }
    }

    /// Builds a coordinator from the execution and classification settings.
    pub fn from_config(channel: KernelChannel, config: &BridgeConfig) -> ClientResult<Self> {
        let classifier = Classifier::new(&config.classification)?;
        Ok(Self::new(channel, classifier, config.execution.timeout()))
    }

    pub fn channel(&self) -> &KernelChannel {
        &self.channel
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Timeout used by [`execute_to_text`](Self::execute_to_text).
    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn into_channel(self) -> KernelChannel {
        self.channel
    }

    /// Submits `code` and accumulates its output until it terminates.
    ///
    /// A timeout abandons the wait only. The kernel keeps running the
    /// fragment and later output for it is discarded.
    pub async fn execute(&mut self, code: &str, timeout: Duration) -> ClientResult<ExecutionResult> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut pending = self
            .channel
            .send(RequestChannel::Shell, &ExecuteRequest::new(code))?;
        let request = pending.id().clone();
        tracing::debug!(request = %request, bytes = code.len(), "execute submitted");

        let mut acc = Accumulator::new();
        let timed_out = loop {
            if acc.is_complete() {
                break false;
            }
            match pending.receive_until(deadline).await {
                Ok(incoming) => acc.absorb(&incoming),
                Err(ClientError::ChannelTimeout) => break true,
                Err(e) => return Err(e),
            }
        };
        drop(pending);

        let diagnostics = acc.diagnostics();
        let status = self
            .classifier
            .classify(&diagnostics, acc.kernel_failed(), timed_out);
        acc.phase = Phase::Terminal(status);

        if timed_out {
            tracing::warn!(
                request = %request,
                timeout_ms = timeout.as_millis(),
                "execution timed out, kernel may still be running the fragment"
            );
        }
        tracing::debug!(request = %request, phase = ?acc.phase, "execute finished");

        Ok(ExecutionResult {
            request,
            stdout: acc.stdout,
            stderr: diagnostics,
            status,
            execution_count: acc.reply.and_then(|r| r.execution_count),
            elapsed: started.elapsed(),
            timeout,
        })
    }

    /// Runs `code` under the default timeout and returns its stdout with one
    /// trailing newline removed.
    pub async fn execute_to_text(&mut self, code: &str) -> ClientResult<String> {
        let timeout = self.timeout;
        let output = self.execute(code, timeout).await?.into_output()?;
        Ok(strip_trailing_newline(&output).to_string())
    }
}
