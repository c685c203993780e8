use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hotline_core::{ClassIdentifier, Endpoint, TargetHandle};
use hotline_proto::{decode_body, Action, AgentCommand, AgentRequest, AgentResponse, ClassEntry};

use crate::connection::{AgentConnection, RequestFailure};
use crate::error::{ChannelError, Result};
use crate::status::{FetchedClass, StatusStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub connect_timeout: Duration,
    /// Timeout used by the convenience helpers; [`AgentChannel::send`] always
    /// takes an explicit one.
    pub request_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Typed result of one agent request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    Classes(Arc<[ClassEntry]>),
    Bytes(FetchedClass),
    Ack { message: Option<String> },
    Halted,
}

type Slot = Arc<tokio::sync::Mutex<Option<AgentConnection>>>;

#[derive(Debug)]
struct ChannelInner {
    status: Arc<StatusStore>,
    config: ChannelConfig,
    next_id: AtomicU64,
    slots: parking_lot::Mutex<HashMap<TargetHandle, Slot>>,
}

/// Request/response transport to the agents of every attached target.
///
/// At most one request per target is in flight: each target has an async
/// slot lock that is held for the whole round-trip, so concurrent callers for
/// the same target queue here. Distinct targets never contend.
///
/// The channel is the only writer of the [`StatusStore`].
#[derive(Debug, Clone)]
pub struct AgentChannel {
    inner: Arc<ChannelInner>,
}

impl AgentChannel {
    pub fn new(status: Arc<StatusStore>, config: ChannelConfig) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                status,
                config,
                next_id: AtomicU64::new(1),
                slots: parking_lot::Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn status(&self) -> &Arc<StatusStore> {
        &self.inner.status
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Start a session with the agent of `target` listening at `endpoint`.
    ///
    /// Any connection left over from a previous session is closed.
    pub async fn attach(&self, target: &TargetHandle, endpoint: Endpoint) -> Result<()> {
        if target.is_fs() {
            return Err(ChannelError::Detached(target.clone()));
        }
        let slot = self.slot(target);
        let mut conn = slot.lock().await;
        if let Some(old) = conn.take() {
            old.shutdown();
        }
        tracing::info!(target: "hotline.agent", %target, %endpoint, "attached");
        self.inner.status.attach(target, endpoint);
        Ok(())
    }

    /// Send one command and wait up to `timeout` for its reply.
    ///
    /// HALT fails only for filesystem targets. Otherwise the connection is
    /// closed and the target marked detached, even when the agent did not
    /// answer or the target was never attached.
    pub async fn send(
        &self,
        target: &TargetHandle,
        command: AgentCommand,
        timeout: Duration,
    ) -> Result<AgentReply> {
        if target.is_fs() {
            return Err(ChannelError::Detached(target.clone()));
        }

        let slot = self.slot(target);
        let mut conn = slot.lock().await;
        let endpoint = self.inner.status.endpoint(target);

        if matches!(command, AgentCommand::Halt) {
            match endpoint {
                Some(endpoint) => self.halt_locked(target, &endpoint, &mut conn, timeout).await,
                None => {
                    tracing::debug!(target: "hotline.agent", %target, "halt on a target with no agent");
                    if let Some(old) = conn.take() {
                        old.shutdown();
                    }
                    self.inner.status.mark_detached(target, true);
                }
            }
            return Ok(AgentReply::Halted);
        }
        let endpoint = endpoint.ok_or_else(|| ChannelError::Detached(target.clone()))?;

        let request = AgentRequest {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            host: endpoint.host.clone(),
            port: endpoint.port,
            command,
        };
        tracing::debug!(
            target: "hotline.agent",
            %target,
            id = request.id,
            command = ?request.command,
            "sending agent request"
        );

        let reused = conn.as_ref().is_some_and(|c| !c.is_closed());
        let mut result = self
            .request_on(&mut conn, &endpoint, &request, timeout)
            .await;
        let resend = reused
            && matches!(&result, Err(failure) if may_resend(failure, &request.command));
        if resend {
            // Agents may close idle connections. Only a frame that never left,
            // or a read the agent can answer twice, goes out again.
            tracing::debug!(target: "hotline.agent", %target, "connection went stale; reconnecting");
            if let Some(old) = conn.take() {
                old.shutdown();
            }
            result = self
                .request_on(&mut conn, &endpoint, &request, timeout)
                .await;
        }
        let result = result.map_err(ChannelError::from);

        match result {
            Ok(response) => self.apply(target, &request.command, response),
            Err(err) => {
                if matches!(err, ChannelError::ConnectionClosed | ChannelError::Io(_)) {
                    if let Some(old) = conn.take() {
                        old.shutdown();
                    }
                    self.inner.status.mark_detached(target, false);
                }
                tracing::debug!(target: "hotline.agent", %target, id = request.id, error = %err, "agent request failed");
                Err(err)
            }
        }
    }

    pub async fn list_classes(&self, target: &TargetHandle) -> Result<Arc<[ClassEntry]>> {
        match self
            .send(target, AgentCommand::ListClasses, self.inner.config.request_timeout)
            .await?
        {
            AgentReply::Classes(classes) => Ok(classes),
            other => Err(unexpected_reply(Action::ListClasses, &other)),
        }
    }

    pub async fn fetch_bytes(
        &self,
        target: &TargetHandle,
        class: &ClassIdentifier,
    ) -> Result<FetchedClass> {
        let command = AgentCommand::FetchBytes {
            class: class.as_str().to_string(),
        };
        match self
            .send(target, command, self.inner.config.request_timeout)
            .await?
        {
            AgentReply::Bytes(fetched) => Ok(fetched),
            other => Err(unexpected_reply(Action::FetchBytes, &other)),
        }
    }

    pub async fn init_class(&self, target: &TargetHandle, class: &ClassIdentifier) -> Result<()> {
        let command = AgentCommand::InitClass {
            class: class.as_str().to_string(),
        };
        self.send(target, command, self.inner.config.request_timeout)
            .await
            .map(|_| ())
    }

    pub async fn halt(&self, target: &TargetHandle) {
        // Only a filesystem target makes `send` refuse HALT.
        if let Err(err) = self
            .send(target, AgentCommand::Halt, self.inner.config.request_timeout)
            .await
        {
            tracing::debug!(target: "hotline.agent", %target, error = %err, "halt skipped");
        }
    }

    fn slot(&self, target: &TargetHandle) -> Slot {
        self.inner
            .slots
            .lock()
            .entry(target.clone())
            .or_default()
            .clone()
    }

    async fn request_on(
        &self,
        conn: &mut Option<AgentConnection>,
        endpoint: &Endpoint,
        request: &AgentRequest,
        timeout: Duration,
    ) -> Result<AgentResponse, RequestFailure> {
        let connection = match conn.as_ref() {
            Some(existing) if !existing.is_closed() => existing.clone(),
            _ => {
                let fresh = AgentConnection::connect(
                    endpoint,
                    self.inner.config.connect_timeout,
                    request.command.action(),
                )
                .await
                .map_err(RequestFailure::unsent)?;
                *conn = Some(fresh.clone());
                fresh
            }
        };
        connection.request(request, timeout).await
    }

    async fn halt_locked(
        &self,
        target: &TargetHandle,
        endpoint: &Endpoint,
        conn: &mut Option<AgentConnection>,
        timeout: Duration,
    ) {
        let request = AgentRequest {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            host: endpoint.host.clone(),
            port: endpoint.port,
            command: AgentCommand::Halt,
        };
        match self.request_on(conn, endpoint, &request, timeout).await {
            Ok(response) if response.is_ok() => {
                tracing::info!(target: "hotline.agent", %target, "agent closing socket and exiting");
            }
            Ok(response) => {
                tracing::warn!(
                    target: "hotline.agent",
                    %target,
                    message = response.message.as_deref().unwrap_or(""),
                    "agent refused halt"
                );
            }
            Err(failure) => {
                tracing::warn!(target: "hotline.agent", %target, error = %failure.error, "error when sending halt to agent");
            }
        }

        if let Some(old) = conn.take() {
            old.shutdown();
        }
        self.inner.status.mark_detached(target, true);
    }

    /// Check that `response` answers `command`, then fold it into the status
    /// store and turn it into a typed reply.
    fn apply(
        &self,
        target: &TargetHandle,
        command: &AgentCommand,
        response: AgentResponse,
    ) -> Result<AgentReply> {
        let action = command.action();
        if response.action != action {
            return Err(ChannelError::ProtocolMismatch(format!(
                "expected a reply to {action}, got {}",
                response.action
            )));
        }
        if !response.is_ok() {
            return Err(ChannelError::Agent {
                action,
                message: response
                    .message
                    .unwrap_or_else(|| format!("agent rejected {action}")),
            });
        }

        let status = &self.inner.status;
        match command {
            AgentCommand::ListClasses => {
                let classes: Arc<[ClassEntry]> = Arc::from(response.classes.ok_or_else(|| {
                    ChannelError::ProtocolMismatch("list_classes reply without classes".into())
                })?);
                status.record_class_list(target, classes.clone());
                Ok(AgentReply::Classes(classes))
            }
            AgentCommand::FetchBytes { class } => {
                if response.class.as_deref() != Some(class.as_str()) {
                    return Err(ChannelError::ProtocolMismatch(format!(
                        "requested bytes of {class}, reply is for {}",
                        response.class.as_deref().unwrap_or("<none>")
                    )));
                }
                let body = response.body.ok_or_else(|| {
                    ChannelError::ProtocolMismatch(format!("fetch_bytes reply for {class} has no body"))
                })?;
                let bytes = decode_body(&body)?;
                if bytes.is_empty() {
                    return Err(ChannelError::Agent {
                        action,
                        message: format!("agent returned no bytecode for {class}"),
                    });
                }
                let fetched = FetchedClass {
                    name: ClassIdentifier::new(class.clone()),
                    bytes: Arc::from(bytes),
                };
                status.record_fetch(target, fetched.clone());
                Ok(AgentReply::Bytes(fetched))
            }
            AgentCommand::UploadClass { .. } | AgentCommand::UploadArchive { .. } => {
                status.record_ack(target);
                status.invalidate_classes(target);
                Ok(AgentReply::Ack {
                    message: response.message,
                })
            }
            AgentCommand::InitClass { .. } => {
                status.record_ack(target);
                Ok(AgentReply::Ack {
                    message: response.message,
                })
            }
            AgentCommand::Halt => Ok(AgentReply::Halted),
        }
    }
}

fn unexpected_reply(action: Action, reply: &AgentReply) -> ChannelError {
    ChannelError::ProtocolMismatch(format!("unexpected reply to {action}: {reply:?}"))
}

/// Whether a request that failed on a reused connection can go out again.
///
/// Uploads and class initialization have side effects in the target, so they
/// are resent only when their frame never reached the socket.
fn may_resend(failure: &RequestFailure, command: &AgentCommand) -> bool {
    let lost_connection = matches!(
        failure.error,
        ChannelError::ConnectionClosed | ChannelError::Io(_)
    );
    let repeatable = matches!(
        command,
        AgentCommand::ListClasses | AgentCommand::FetchBytes { .. }
    );
    lost_connection && (!failure.sent || repeatable)
}
