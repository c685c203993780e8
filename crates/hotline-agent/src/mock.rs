use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hotline_core::{Endpoint, TargetHandle};
use hotline_proto::{
    decode_body, decode_frame, encode_body, read_frame, write_frame, Action, AgentCommand,
    AgentRequest, AgentResponse, ClassEntry,
};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A tiny in-process agent used for unit/integration testing.
///
/// It speaks the real wire protocol over a loopback socket so the whole
/// client stack can be exercised without a JVM.
pub struct MockAgentServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<State>,
}

#[derive(Clone, Debug, Default)]
pub struct MockAgentConfig {
    /// Classes reported by `list_classes`.
    pub classes: Vec<ClassEntry>,
    /// Bytecode served by `fetch_bytes`, keyed by class name.
    pub bytecode: HashMap<String, Vec<u8>>,
    /// Reply delays keyed by action. Other requests are still answered while a
    /// delayed reply is pending.
    pub delayed_replies: Vec<DelayedReply>,
    /// When set, every upload is answered with `status: error` and this
    /// message.
    pub reject_uploads: Option<String>,
    /// When set, `fetch_bytes` replies name this class instead of the
    /// requested one.
    pub fetch_echo_override: Option<String>,
    /// Actions answered with a frame that is not valid JSON.
    pub malformed_replies: Vec<Action>,
    /// The first request of each of these actions is recorded, then its
    /// connection is closed without a reply.
    pub dropped_requests: Vec<Action>,
}

impl MockAgentConfig {
    /// Config serving `names` with [`fake_bytecode`] for each.
    pub fn with_classes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self::default();
        for name in names {
            let name = name.into();
            config.bytecode.insert(name.clone(), fake_bytecode(&name));
            config.classes.push(ClassEntry::named(name));
        }
        config
    }
}

#[derive(Clone, Debug)]
pub struct DelayedReply {
    pub action: Action,
    pub delay: Duration,
}

/// Deterministic stand-in for a class file: the magic number followed by the
/// class name.
pub fn fake_bytecode(class: &str) -> Vec<u8> {
    let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE];
    bytes.extend_from_slice(class.as_bytes());
    bytes
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockUpload {
    pub action: Action,
    pub name: String,
    pub bytes: Vec<u8>,
}

struct State {
    config: MockAgentConfig,
    delayed_replies: HashMap<Action, Duration>,
    requests: tokio::sync::Mutex<Vec<AgentRequest>>,
    uploads: tokio::sync::Mutex<Vec<MockUpload>>,
    already_dropped: tokio::sync::Mutex<HashSet<Action>>,
    connections: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl State {
    fn new(config: MockAgentConfig) -> Self {
        let delayed_replies = config
            .delayed_replies
            .iter()
            .map(|entry| (entry.action, entry.delay))
            .collect();
        Self {
            config,
            delayed_replies,
            requests: tokio::sync::Mutex::new(Vec::new()),
            uploads: tokio::sync::Mutex::new(Vec::new()),
            already_dropped: tokio::sync::Mutex::new(HashSet::new()),
            connections: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn begin_request(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn end_request(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn reply_delay(&self, action: Action) -> Option<Duration> {
        self.delayed_replies
            .get(&action)
            .copied()
            .filter(|d| !d.is_zero())
    }
}

impl MockAgentServer {
    pub async fn spawn() -> std::io::Result<Self> {
        Self::spawn_with_config(MockAgentConfig::default()).await
    }

    pub async fn spawn_with_classes<I, S>(names: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::spawn_with_config(MockAgentConfig::with_classes(names)).await
    }

    pub async fn spawn_with_config(config: MockAgentConfig) -> std::io::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let state = Arc::new(State::new(config));
        let task_shutdown = shutdown.clone();
        let task_state = state.clone();

        tokio::spawn(async move {
            let _ = run(listener, task_state, task_shutdown).await;
        });

        Ok(Self {
            addr,
            shutdown,
            state,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::from(self.addr)
    }

    /// A remote target handle pointing at this server.
    pub fn target(&self) -> TargetHandle {
        TargetHandle::remote(self.addr.ip().to_string(), self.addr.port())
    }

    /// True once the server processed HALT (or was dropped).
    pub fn is_halted(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn requests(&self) -> Vec<AgentRequest> {
        self.state.requests.lock().await.clone()
    }

    pub async fn request_count(&self, action: Action) -> usize {
        self.state
            .requests
            .lock()
            .await
            .iter()
            .filter(|req| req.command.action() == action)
            .count()
    }

    pub async fn uploads(&self) -> Vec<MockUpload> {
        self.state.uploads.lock().await.clone()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Largest number of requests that were being handled at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for MockAgentServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(
    listener: TcpListener,
    state: Arc<State>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accept = listener.accept() => {
                let (socket, _) = accept?;
                state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(socket, state.clone(), shutdown.clone()));
            }
        }
    }
}

async fn serve_connection(
    socket: tokio::net::TcpStream,
    state: Arc<State>,
    shutdown: CancellationToken,
) {
    let (mut reader, writer) = socket.into_split();
    let writer = Arc::new(tokio::sync::Mutex::new(writer));

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = read_frame(&mut reader) => res,
        };
        let Ok(Some(payload)) = frame else {
            break;
        };
        let Ok(request) = decode_frame::<AgentRequest>(&payload) else {
            break;
        };
        if handle_request(&writer, &state, request, shutdown.clone())
            .await
            .is_err()
        {
            break;
        }
    }

    let _ = writer.lock().await.shutdown().await;
}

enum Reply {
    Response(AgentResponse),
    Malformed,
}

async fn handle_request(
    writer: &Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    state: &Arc<State>,
    request: AgentRequest,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    state.begin_request();
    state.requests.lock().await.push(request.clone());

    let id = request.id;
    let action = request.command.action();
    let config = &state.config;

    if config.dropped_requests.contains(&action) && state.already_dropped.lock().await.insert(action)
    {
        state.end_request();
        return Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            format!("dropping connection on {action}"),
        ));
    }

    let response = match &request.command {
        AgentCommand::ListClasses => AgentResponse {
            classes: Some(config.classes.clone()),
            ..AgentResponse::ok(id, action)
        },
        AgentCommand::FetchBytes { class } => match config.bytecode.get(class) {
            Some(bytes) => AgentResponse {
                class: Some(
                    config
                        .fetch_echo_override
                        .clone()
                        .unwrap_or_else(|| class.clone()),
                ),
                body: Some(encode_body(bytes)),
                ..AgentResponse::ok(id, action)
            },
            None => AgentResponse::error(id, action, format!("class not found: {class}")),
        },
        AgentCommand::InitClass { class } => {
            if config.classes.iter().any(|entry| &entry.name == class) {
                AgentResponse::ok(id, action)
            } else {
                AgentResponse::error(id, action, format!("class not found: {class}"))
            }
        }
        AgentCommand::UploadClass { name, body } | AgentCommand::UploadArchive { name, body } => {
            match (&config.reject_uploads, decode_body(body)) {
                (Some(message), _) => AgentResponse::error(id, action, message.clone()),
                (None, Err(err)) => AgentResponse::error(id, action, err.to_string()),
                (None, Ok(bytes)) => {
                    state.uploads.lock().await.push(MockUpload {
                        action,
                        name: name.clone(),
                        bytes,
                    });
                    AgentResponse {
                        message: Some(format!("redefined {name}")),
                        ..AgentResponse::ok(id, action)
                    }
                }
            }
        }
        AgentCommand::Halt => AgentResponse::ok(id, action),
    };

    let reply = if config.malformed_replies.contains(&action) {
        Reply::Malformed
    } else {
        Reply::Response(response)
    };
    let close_after = action == Action::Halt;

    // Bookkeeping happens before the reply leaves so a client that already
    // saw the reply can never observe this request as still in flight.
    match state.reply_delay(action) {
        Some(delay) => {
            let writer = writer.clone();
            let state = state.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => state.end_request(),
                    _ = tokio::time::sleep(delay) => {
                        state.end_request();
                        if close_after {
                            shutdown.cancel();
                        }
                        let _ = write_reply(&writer, reply).await;
                    }
                }
            });
            Ok(())
        }
        None => {
            state.end_request();
            if close_after {
                shutdown.cancel();
            }
            write_reply(writer, reply).await
        }
    }
}

async fn write_reply(
    writer: &tokio::sync::Mutex<OwnedWriteHalf>,
    reply: Reply,
) -> std::io::Result<()> {
    let mut guard = writer.lock().await;
    match reply {
        Reply::Response(response) => write_frame(&mut *guard, &response)
            .await
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string())),
        Reply::Malformed => {
            let payload = b"{not json";
            guard
                .write_all(&(payload.len() as u32).to_be_bytes())
                .await?;
            guard.write_all(payload).await?;
            guard.flush().await
        }
    }
}
