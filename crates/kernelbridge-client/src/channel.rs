//! Message channel.
//!
//! A single I/O task owns the shell, control and iopub sockets. Requests are
//! queued to it without waiting, and everything it receives is routed by
//! `parent_header.msg_id` to the inbox of the request that caused it.
//!
//! ```text
//!   KernelChannel::send ──Submit──▶ ┌─────────┐ ──▶ shell / control (DEALER)
//!                                   │ I/O task│
//!   PendingRequest::receive ◀─inbox─└─────────┘ ◀── shell / control / iopub (SUB)
//! ```
//!
//! Per-request order is the order the socket delivered messages in. Messages
//! whose parent is not a live request are dropped.

use std::collections::HashMap;
use std::time::Duration;

use kernelbridge_supervisor::ConnectionInfo;
use kernelbridge_wire::content::{Content, KernelInfoReply, KernelInfoRequest, ShutdownRequest};
use kernelbridge_wire::{Header, Message, MsgKind, RequestCounter, RequestId, Signer, WireError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage, ZmqResult};

use crate::{ClientError, ClientResult};

/// Per-attempt timeout of the readiness check.
const READY_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Socket a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Shell,
    Control,
    IoPub,
}

/// Socket a request can be sent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestChannel {
    Shell,
    Control,
}

/// A message routed to a request's inbox.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub channel: ChannelKind,
    pub message: Message,
}

enum Command {
    Submit {
        channel: RequestChannel,
        message: Message,
        inbox: mpsc::UnboundedSender<Incoming>,
    },
    Forget(RequestId),
    Close,
}

/// Connection to one kernel's sockets.
pub struct KernelChannel {
    commands: mpsc::UnboundedSender<Command>,
    counter: RequestCounter,
    task: Option<JoinHandle<()>>,
}

impl KernelChannel {
    /// Connects to the kernel described by `info` and starts the I/O task.
    pub async fn connect(info: &ConnectionInfo) -> ClientResult<Self> {
        if !info.key.is_empty() && info.signature_scheme != "hmac-sha256" {
            return Err(WireError::InvalidKey(format!(
                "unsupported signature scheme '{}'",
                info.signature_scheme
            ))
            .into());
        }

        let mut shell = DealerSocket::new();
        shell.connect(&info.shell_endpoint()).await?;
        let mut control = DealerSocket::new();
        control.connect(&info.control_endpoint()).await?;
        let mut iopub = SubSocket::new();
        iopub.connect(&info.iopub_endpoint()).await?;
        iopub.subscribe("").await?;

        tracing::debug!(
            shell = %info.shell_endpoint(),
            iopub = %info.iopub_endpoint(),
            control = %info.control_endpoint(),
            "channel connected"
        );

        let (commands, rx) = mpsc::unbounded_channel();
        let io = IoTask {
            signer: Signer::new(info.key.as_bytes()),
            routes: HashMap::new(),
            commands: rx,
            shell,
            control,
            iopub,
        };

        Ok(Self {
            commands,
            counter: RequestCounter::new(),
            task: Some(tokio::spawn(io.run())),
        })
    }

    /// Session id stamped on outgoing headers.
    pub fn session(&self) -> &str {
        self.counter.session()
    }

    /// Number of requests sent so far.
    pub fn issued(&self) -> u64 {
        self.counter.issued()
    }

    /// True once the I/O task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Queues a request and returns immediately.
    ///
    /// The request's inbox is registered before the request is written, so
    /// nothing the kernel sends for it can be missed.
    pub fn send<C: Content>(&self, channel: RequestChannel, content: &C) -> ClientResult<PendingRequest> {
        let id = self.counter.next_id();
        let header = Header::new(C::MSG_TYPE, &id, self.counter.session());
        let message = Message::new(header, content)?;
        let (inbox, rx) = mpsc::unbounded_channel();

        self.commands
            .send(Command::Submit {
                channel,
                message,
                inbox,
            })
            .map_err(|_| ClientError::ChannelClosed)?;
        tracing::trace!(request = %id, msg_type = C::MSG_TYPE, "request queued");

        Ok(PendingRequest {
            id,
            inbox: rx,
            commands: self.commands.clone(),
        })
    }

    /// Sends one `kernel_info_request` and waits for it to complete.
    ///
    /// Completion needs the shell reply and at least one iopub message for the
    /// request, which proves the iopub subscription is live.
    pub async fn kernel_info(&self, timeout: Duration) -> ClientResult<KernelInfoReply> {
        let mut pending = self.send(RequestChannel::Shell, &KernelInfoRequest::default())?;
        let deadline = Instant::now() + timeout;
        let mut reply = None;
        let mut saw_iopub = false;

        loop {
            if saw_iopub {
                if let Some(reply) = reply.take() {
                    return Ok(reply);
                }
            }
            let incoming = pending.receive_until(deadline).await?;
            match (incoming.channel, incoming.message.kind()) {
                (ChannelKind::IoPub, _) => saw_iopub = true,
                (ChannelKind::Shell, MsgKind::KernelInfoReply) => {
                    reply = Some(incoming.message.content_as()?);
                }
                (channel, kind) => tracing::trace!(?channel, %kind, "ignored during kernel_info"),
            }
        }
    }

    /// Probes with [`kernel_info`](Self::kernel_info) until one succeeds.
    pub async fn wait_for_ready(&self, timeout: Duration) -> ClientResult<KernelInfoReply> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::ChannelTimeout);
            }
            match self.kernel_info(remaining.min(READY_PROBE_INTERVAL)).await {
                Err(ClientError::ChannelTimeout) => {
                    tracing::trace!("kernel_info unanswered, retrying");
                }
                other => return other,
            }
        }
    }

    /// Queues a `shutdown_request` on the control channel.
    pub fn request_shutdown(&self, restart: bool) -> ClientResult<PendingRequest> {
        self.send(RequestChannel::Control, &ShutdownRequest { restart })
    }

    /// Requests shutdown and waits for the `shutdown_reply`.
    pub async fn shutdown(&self, timeout: Duration) -> ClientResult<()> {
        let mut pending = self.request_shutdown(false)?;
        let deadline = Instant::now() + timeout;
        loop {
            let incoming = pending.receive_until(deadline).await?;
            if incoming.channel == ChannelKind::Control
                && incoming.message.kind() == MsgKind::ShutdownReply
            {
                return Ok(());
            }
        }
    }

    /// Stops the I/O task and closes the sockets.
    pub async fn close(mut self) {
        // A send error means the task already ended.
        let _ = self.commands.send(Command::Close);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "channel task ended abnormally");
            }
        }
    }
}

impl Drop for KernelChannel {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Close);
        }
    }
}

/// An in-flight request and its inbox.
///
/// Dropping it unregisters the inbox; later messages for the request are
/// discarded by the I/O task.
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    inbox: mpsc::UnboundedReceiver<Incoming>,
    commands: mpsc::UnboundedSender<Command>,
}

impl PendingRequest {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Waits up to `timeout` for the next message of this request.
    pub async fn receive(&mut self, timeout: Duration) -> ClientResult<Incoming> {
        self.receive_until(Instant::now() + timeout).await
    }

    /// Waits until `deadline` for the next message of this request.
    pub async fn receive_until(&mut self, deadline: Instant) -> ClientResult<Incoming> {
        match tokio::time::timeout_at(deadline, self.inbox.recv()).await {
            Ok(Some(incoming)) => Ok(incoming),
            Ok(None) => Err(ClientError::ChannelClosed),
            Err(_) => Err(ClientError::ChannelTimeout),
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Forget(self.id.clone()));
    }
}

struct IoTask {
    signer: Signer,
    routes: HashMap<RequestId, mpsc::UnboundedSender<Incoming>>,
    commands: mpsc::UnboundedReceiver<Command>,
    shell: DealerSocket,
    control: DealerSocket,
    iopub: SubSocket,
}

impl IoTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Submit { channel, message, inbox }) => {
                        self.submit(channel, &message, inbox).await;
                    }
                    Some(Command::Forget(id)) => {
                        self.routes.remove(&id);
                    }
                    Some(Command::Close) | None => break,
                },
                incoming = self.shell.recv() => {
                    if !self.dispatch(ChannelKind::Shell, incoming) {
                        break;
                    }
                }
                incoming = self.control.recv() => {
                    if !self.dispatch(ChannelKind::Control, incoming) {
                        break;
                    }
                }
                incoming = self.iopub.recv() => {
                    if !self.dispatch(ChannelKind::IoPub, incoming) {
                        break;
                    }
                }
            }
        }

        tracing::debug!(pending = self.routes.len(), "channel closing");
        self.routes.clear();
        self.shell.close().await;
        self.control.close().await;
        self.iopub.close().await;
    }

    async fn submit(
        &mut self,
        channel: RequestChannel,
        message: &Message,
        inbox: mpsc::UnboundedSender<Incoming>,
    ) {
        let id = message.header.request_id();
        let frames = match message.to_frames(&self.signer) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(request = %id, error = %e, "failed to encode request");
                return;
            }
        };
        let Some(outgoing) = into_zmq(frames) else {
            return;
        };

        self.routes.insert(id.clone(), inbox);
        let sent = match channel {
            RequestChannel::Shell => self.shell.send(outgoing).await,
            RequestChannel::Control => self.control.send(outgoing).await,
        };
        if let Err(e) = sent {
            tracing::warn!(request = %id, ?channel, error = %e, "failed to send request");
            self.routes.remove(&id);
        }
    }

    /// Routes one received message. Returns false if the socket failed.
    fn dispatch(&mut self, channel: ChannelKind, incoming: ZmqResult<ZmqMessage>) -> bool {
        let incoming = match incoming {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!(?channel, error = %e, "socket receive failed");
                return false;
            }
        };

        let message = match Message::from_frames(incoming.into_vec(), &self.signer) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(?channel, error = %e, "dropping undecodable message");
                return true;
            }
        };

        let Some(parent) = message.parent_id() else {
            tracing::trace!(?channel, kind = %message.kind(), "dropping untagged message");
            return true;
        };

        match self.routes.get(&parent) {
            Some(inbox) => {
                if inbox.send(Incoming { channel, message }).is_err() {
                    self.routes.remove(&parent);
                }
            }
            None => {
                tracing::trace!(?channel, request = %parent, kind = %message.kind(), "dropping message for unknown request");
            }
        }
        true
    }
}

fn into_zmq(frames: Vec<bytes::Bytes>) -> Option<ZmqMessage> {
    let mut frames = frames.into_iter();
    let mut message = ZmqMessage::from(frames.next()?);
    for frame in frames {
        message.push_back(frame);
    }
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernelbridge_test_harness::{FakeKernel, Reply};
    use kernelbridge_wire::content::ExecuteRequest;

    async fn ready_channel(kernel: &FakeKernel) -> KernelChannel {
        let channel = KernelChannel::connect(&kernel.connection_info()).await.unwrap();
        channel.wait_for_ready(Duration::from_secs(10)).await.unwrap();
        channel
    }

    #[tokio::test]
    async fn test_wait_for_ready() {
        let kernel = FakeKernel::start(|_: &str| Reply::ok()).await.unwrap();
        let channel = KernelChannel::connect(&kernel.connection_info()).await.unwrap();

        let info = channel.wait_for_ready(Duration::from_secs(10)).await.unwrap();
        assert_eq!(info.implementation, "kernelbridge-fake");
        assert_eq!(info.language_info.name, "C++");
        assert!(channel.issued() >= 1);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_request_ids_are_unique_and_monotonic() {
        let kernel = FakeKernel::start(|_: &str| Reply::ok()).await.unwrap();
        let channel = ready_channel(&kernel).await;

        let before = channel.issued();
        let a = channel.send(RequestChannel::Shell, &ExecuteRequest::new("1;")).unwrap();
        let b = channel.send(RequestChannel::Shell, &ExecuteRequest::new("2;")).unwrap();

        assert_ne!(a.id(), b.id());
        assert!(a.id().as_str().starts_with(channel.session()));
        assert_eq!(channel.issued(), before + 2);
    }

    #[tokio::test]
    async fn test_messages_routed_in_emission_order() {
        let kernel = FakeKernel::start(|_: &str| Reply::ok().stdout("1").stdout("2").stdout("3"))
            .await
            .unwrap();
        let channel = ready_channel(&kernel).await;

        let mut pending = channel
            .send(RequestChannel::Shell, &ExecuteRequest::new("go"))
            .unwrap();
        let mut iopub_kinds = Vec::new();
        let mut got_reply = false;
        while !(got_reply && iopub_kinds.last() == Some(&MsgKind::Status) && iopub_kinds.len() > 1) {
            let incoming = pending.receive(Duration::from_secs(5)).await.unwrap();
            assert_eq!(incoming.message.parent_id().as_ref(), Some(pending.id()));
            match incoming.channel {
                ChannelKind::Shell => got_reply = true,
                ChannelKind::IoPub => iopub_kinds.push(incoming.message.kind()),
                ChannelKind::Control => panic!("unexpected control message"),
            }
        }

        assert_eq!(
            iopub_kinds,
            vec![
                MsgKind::Status,
                MsgKind::Stream,
                MsgKind::Stream,
                MsgKind::Stream,
                MsgKind::Status
            ]
        );
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let kernel = FakeKernel::start(|_: &str| Reply::ok()).await.unwrap();
        let channel = ready_channel(&kernel).await;

        let mut pending = channel
            .send(RequestChannel::Shell, &KernelInfoRequest::default())
            .unwrap();
        // busy, reply, idle
        for _ in 0..3 {
            pending.receive(Duration::from_secs(5)).await.unwrap();
        }
        let err = pending.receive(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, ClientError::ChannelTimeout));
    }

    #[tokio::test]
    async fn test_close_fails_pending_requests() {
        let kernel = FakeKernel::start(|_: &str| Reply::ok().delay(Duration::from_secs(5)))
            .await
            .unwrap();
        let channel = ready_channel(&kernel).await;

        let mut pending = channel
            .send(RequestChannel::Shell, &ExecuteRequest::new("slow"))
            .unwrap();
        channel.close().await;

        let err = loop {
            match pending.receive(Duration::from_secs(5)).await {
                Ok(_) => {}
                Err(e) => break e,
            }
        };
        assert!(matches!(err, ClientError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_shutdown_round_trip() {
        let kernel = FakeKernel::start(|_: &str| Reply::ok()).await.unwrap();
        let channel = ready_channel(&kernel).await;

        channel.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(kernel.shutdown_requested());
    }

    #[tokio::test]
    async fn test_rejects_unknown_signature_scheme() {
        let kernel = FakeKernel::start(|_: &str| Reply::ok()).await.unwrap();
        let mut info = kernel.connection_info();
        info.signature_scheme = "hmac-md5".to_string();

        let result = KernelChannel::connect(&info).await;
        assert!(matches!(result, Err(ClientError::Wire(WireError::InvalidKey(_)))));
    }
}
