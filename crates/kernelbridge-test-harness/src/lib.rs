//! # kernelbridge-test-harness
//!
//! A scripted stand-in for a Jupyter kernel, bound on real ZeroMQ sockets so
//! the bridge can be exercised end to end without a C++ toolchain.
//!
//! ```ignore
//! let kernel = FakeKernel::start(|code: &str| Reply::ok().stdout(code)).await?;
//! let session = Session::attach(&kernel.connection_info(), &config, &[]).await?;
//! ```
//!
//! Per request the fake kernel publishes `busy`, the scripted output, the
//! shell reply and finally `idle`, in that order. Requests are handled one at
//! a time; a [`Reply::delay`] keeps the kernel busy and queues later requests
//! behind it the way a real interpreter does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use kernelbridge_supervisor::ConnectionInfo;
use kernelbridge_wire::content::{
    Content, ErrorContent, ExecuteReply, ExecuteRequest, ExecuteResult, KernelInfoReply,
    LanguageInfo, ShutdownReply, ShutdownRequest, StatusContent, StreamContent,
};
use kernelbridge_wire::{Header, Message, MsgKind, PROTOCOL_VERSION, RequestCounter, Signer};
use tokio::task::JoinHandle;
use zeromq::{
    Endpoint, PubSocket, RouterSocket, Socket, SocketRecv, SocketSend, ZmqError, ZmqMessage,
};

pub mod toy;

pub use toy::ToyCpp;

/// Harness errors.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("transport error: {0}")]
    Transport(#[from] ZmqError),

    #[error("unexpected bound endpoint {0}")]
    Endpoint(String),
}

/// Scripted outcome of one `execute_request`.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    stdout: Vec<String>,
    stderr: Vec<String>,
    result: Option<String>,
    error: Option<ErrorContent>,
    delay: Duration,
}

impl Reply {
    /// A successful execution with no output.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Appends a `stream` chunk on stdout.
    pub fn stdout(mut self, text: impl Into<String>) -> Self {
        self.stdout.push(text.into());
        self
    }

    /// Appends a `stream` chunk on stderr.
    pub fn stderr(mut self, text: impl Into<String>) -> Self {
        self.stderr.push(text.into());
        self
    }

    /// Publishes an `execute_result` with this `text/plain` value.
    pub fn result(mut self, text: impl Into<String>) -> Self {
        self.result = Some(text.into());
        self
    }

    /// Fails the execution with an `error` broadcast and an error reply.
    pub fn error(mut self, ename: impl Into<String>, evalue: impl Into<String>) -> Self {
        self.error = Some(ErrorContent {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback: Vec::new(),
        });
        self
    }

    /// Stays busy for `delay` before publishing anything.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = Box<dyn FnMut(&str) -> Reply + Send>;

/// A running fake kernel. Stops when dropped.
pub struct FakeKernel {
    info: ConnectionInfo,
    executed: Arc<Mutex<Vec<String>>>,
    shutdown_requested: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl FakeKernel {
    /// Binds the kernel sockets on ephemeral ports and starts serving.
    pub async fn start<F>(handler: F) -> Result<Self, HarnessError>
    where
        F: FnMut(&str) -> Reply + Send + 'static,
    {
        let info = ConnectionInfo {
            ip: "127.0.0.1".to_string(),
            transport: "tcp".to_string(),
            shell_port: 0,
            iopub_port: 0,
            stdin_port: 0,
            control_port: 0,
            hb_port: 0,
            key: uuid::Uuid::new_v4().to_string(),
            signature_scheme: "hmac-sha256".to_string(),
            kernel_name: "fake".to_string(),
        };
        Self::serve(info, handler).await
    }

    /// Serves on the ports named in `info`; a port of 0 picks a free one.
    ///
    /// The returned [`connection_info`](Self::connection_info) carries the
    /// ports actually bound.
    pub async fn serve<F>(mut info: ConnectionInfo, handler: F) -> Result<Self, HarnessError>
    where
        F: FnMut(&str) -> Reply + Send + 'static,
    {
        let mut shell = RouterSocket::new();
        info.shell_port = bind(&mut shell, &info.ip, info.shell_port).await?;
        let mut control = RouterSocket::new();
        info.control_port = bind(&mut control, &info.ip, info.control_port).await?;
        let mut iopub = PubSocket::new();
        info.iopub_port = bind(&mut iopub, &info.ip, info.iopub_port).await?;

        let executed = Arc::new(Mutex::new(Vec::new()));
        let shutdown_requested = Arc::new(AtomicBool::new(false));

        let state = KernelState {
            signer: Signer::new(info.key.as_bytes()),
            counter: RequestCounter::new(),
            execution_count: 0,
            handler: Mutex::new(Box::new(handler)),
            executed: Arc::clone(&executed),
            shutdown_requested: Arc::clone(&shutdown_requested),
        };
        let task = tokio::spawn(state.run(shell, control, iopub));

        Ok(Self {
            info,
            executed,
            shutdown_requested,
            task,
        })
    }

    /// Waits until the kernel stops serving.
    pub async fn finished(&mut self) {
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "fake kernel task failed");
            }
        }
    }

    /// Connection info a client can attach with.
    pub fn connection_info(&self) -> ConnectionInfo {
        self.info.clone()
    }

    /// Code of every `execute_request` received so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a `shutdown_request` arrived on the control channel.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// False once the kernel stopped serving, e.g. after a shutdown request.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for FakeKernel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn bind<S: Socket>(socket: &mut S, ip: &str, port: u16) -> Result<u16, HarnessError> {
    match socket.bind(&format!("tcp://{ip}:{port}")).await? {
        Endpoint::Tcp(_, port) => Ok(port),
        other => Err(HarnessError::Endpoint(format!("{other:?}"))),
    }
}

struct KernelState {
    signer: Signer,
    counter: RequestCounter,
    execution_count: u64,
    handler: Mutex<Handler>,
    executed: Arc<Mutex<Vec<String>>>,
    shutdown_requested: Arc<AtomicBool>,
}

impl KernelState {
    async fn run(mut self, mut shell: RouterSocket, mut control: RouterSocket, mut iopub: PubSocket) {
        loop {
            tokio::select! {
                incoming = shell.recv() => {
                    let Ok(incoming) = incoming else { break };
                    if let Some(request) = self.decode(incoming) {
                        self.on_shell(&request, &mut shell, &mut iopub).await;
                    }
                }
                incoming = control.recv() => {
                    let Ok(incoming) = incoming else { break };
                    if let Some(request) = self.decode(incoming) {
                        if self.on_control(&request, &mut control, &mut iopub).await {
                            break;
                        }
                    }
                }
            }
        }

        shell.close().await;
        control.close().await;
        iopub.close().await;
    }

    fn decode(&self, incoming: ZmqMessage) -> Option<Message> {
        match Message::from_frames(incoming.into_vec(), &self.signer) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(error = %e, "fake kernel rejected message");
                None
            }
        }
    }

    async fn on_shell(&mut self, request: &Message, shell: &mut RouterSocket, iopub: &mut PubSocket) {
        match request.kind() {
            MsgKind::KernelInfoRequest => {
                self.publish(iopub, request, &StatusContent::busy()).await;
                let info = KernelInfoReply {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    implementation: "kernelbridge-fake".to_string(),
                    implementation_version: env!("CARGO_PKG_VERSION").to_string(),
                    language_info: LanguageInfo {
                        name: "C++".to_string(),
                        version: "20".to_string(),
                        file_extension: ".cpp".to_string(),
                    },
                    banner: "fake kernel".to_string(),
                };
                self.send(shell, request, &info).await;
                self.publish(iopub, request, &StatusContent::idle()).await;
            }
            MsgKind::ExecuteRequest => self.on_execute(request, shell, iopub).await,
            other => tracing::debug!(kind = %other, "fake kernel ignoring shell message"),
        }
    }

    async fn on_execute(&mut self, request: &Message, shell: &mut RouterSocket, iopub: &mut PubSocket) {
        let Ok(execute) = request.content_as::<ExecuteRequest>() else {
            return;
        };
        self.execution_count += 1;
        let count = self.execution_count;
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(execute.code.clone());

        self.publish(iopub, request, &StatusContent::busy()).await;

        let reply = {
            let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
            handler(&execute.code)
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        for text in &reply.stdout {
            self.publish(iopub, request, &StreamContent::stdout(text.as_str())).await;
        }
        for text in &reply.stderr {
            self.publish(iopub, request, &StreamContent::stderr(text.as_str())).await;
        }
        if let Some(text) = &reply.result {
            self.publish(iopub, request, &ExecuteResult::text(count, text.as_str())).await;
        }

        match &reply.error {
            Some(error) => {
                self.publish(iopub, request, error).await;
                self.send(shell, request, &ExecuteReply::error(count, error)).await;
            }
            None => self.send(shell, request, &ExecuteReply::ok(count)).await,
        }

        self.publish(iopub, request, &StatusContent::idle()).await;
    }

    /// Returns true when the kernel should stop serving.
    async fn on_control(&mut self, request: &Message, control: &mut RouterSocket, iopub: &mut PubSocket) -> bool {
        if request.kind() != MsgKind::ShutdownRequest {
            return false;
        }
        let restart = request
            .content_as::<ShutdownRequest>()
            .map(|r| r.restart)
            .unwrap_or(false);

        self.publish(iopub, request, &StatusContent::busy()).await;
        self.send(control, request, &ShutdownReply { restart }).await;
        self.shutdown_requested.store(true, Ordering::SeqCst);
        true
    }

    fn header(&self, msg_type: &str) -> Header {
        Header::new(msg_type, &self.counter.next_id(), self.counter.session())
    }

    async fn send<S: SocketSend, C: Content>(&self, socket: &mut S, parent: &Message, content: &C) {
        let Ok(message) = Message::reply(self.header(C::MSG_TYPE), parent, content) else {
            return;
        };
        self.transmit(socket, &message).await;
    }

    async fn publish<C: Content>(&self, iopub: &mut PubSocket, parent: &Message, content: &C) {
        let Ok(mut message) = Message::reply(self.header(C::MSG_TYPE), parent, content) else {
            return;
        };
        message.identities = vec![Bytes::from(format!(
            "kernel.{}.{}",
            self.counter.session(),
            C::MSG_TYPE
        ))];
        self.transmit(iopub, &message).await;
    }

    async fn transmit<S: SocketSend>(&self, socket: &mut S, message: &Message) {
        let frames = match message.to_frames(&self.signer) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "fake kernel failed to encode message");
                return;
            }
        };
        let mut frames = frames.into_iter();
        let Some(first) = frames.next() else { return };
        let mut outgoing = ZmqMessage::from(first);
        for frame in frames {
            outgoing.push_back(frame);
        }
        if let Err(e) = socket.send(outgoing).await {
            tracing::warn!(error = %e, "fake kernel failed to send");
        }
    }
}
