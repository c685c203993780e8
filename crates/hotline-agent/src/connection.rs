use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hotline_core::Endpoint;
use hotline_proto::{
    decode_frame, read_frame, write_frame, Action, AgentRequest, AgentResponse, RequestId,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{ChannelError, Result};

type Pending = HashMap<RequestId, oneshot::Sender<Result<AgentResponse>>>;

/// A failed request, and whether its frame was handed to the socket.
#[derive(Debug)]
pub(crate) struct RequestFailure {
    pub(crate) error: ChannelError,
    pub(crate) sent: bool,
}

impl RequestFailure {
    pub(crate) fn unsent(error: ChannelError) -> Self {
        Self { error, sent: false }
    }

    fn sent(error: ChannelError) -> Self {
        Self { error, sent: true }
    }
}

impl From<RequestFailure> for ChannelError {
    fn from(failure: RequestFailure) -> Self {
        failure.error
    }
}

#[derive(Debug)]
struct Inner {
    endpoint: Endpoint,
    writer: Mutex<OwnedWriteHalf>,
    pending: Mutex<Pending>,
    shutdown: CancellationToken,
}

/// One TCP connection to an agent, multiplexed by request id.
///
/// A background task reads every reply and completes the one-shot sender
/// registered for its id. Callers never look at shared state to find out
/// whether their reply arrived.
#[derive(Debug, Clone)]
pub(crate) struct AgentConnection {
    inner: Arc<Inner>,
}

impl AgentConnection {
    /// `action` is the command that needs the connection; it is only used to
    /// label a connect timeout.
    pub(crate) async fn connect(
        endpoint: &Endpoint,
        connect_timeout: Duration,
        action: Action,
    ) -> Result<Self> {
        let stream = match tokio::time::timeout(
            connect_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(ChannelError::ConnectionRefused {
                    endpoint: endpoint.clone(),
                })
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_elapsed) => {
                return Err(ChannelError::Timeout {
                    action,
                    after: connect_timeout,
                })
            }
        };
        let _ = stream.set_nodelay(true);

        let (reader, writer) = stream.into_split();
        let inner = Arc::new(Inner {
            endpoint: endpoint.clone(),
            writer: Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(read_loop(reader, inner.clone()));
        tracing::debug!(target: "hotline.agent", %endpoint, "connected to agent");

        Ok(Self { inner })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub(crate) fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Send `request` and wait for the reply carrying the same id.
    pub(crate) async fn request(
        &self,
        request: &AgentRequest,
        timeout: Duration,
    ) -> Result<AgentResponse, RequestFailure> {
        if self.is_closed() {
            return Err(RequestFailure::unsent(ChannelError::ConnectionClosed));
        }
        let id = request.id;
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(id, tx);
        }

        let written = {
            let mut writer = self.inner.writer.lock().await;
            write_frame(&mut *writer, request).await
        };
        if let Err(err) = written {
            self.remove_pending(id).await;
            return Err(RequestFailure::unsent(err.into()));
        }

        // A reply that already arrived wins over a concurrent shutdown.
        let outcome = tokio::select! {
            biased;
            res = tokio::time::timeout(timeout, rx) => match res {
                Ok(Ok(reply)) => reply,
                Ok(Err(_closed)) => Err(ChannelError::ConnectionClosed),
                Err(_elapsed) => {
                    self.remove_pending(id).await;
                    Err(ChannelError::Timeout {
                        action: request.command.action(),
                        after: timeout,
                    })
                }
            },
            _ = self.inner.shutdown.cancelled() => {
                self.remove_pending(id).await;
                Err(ChannelError::ConnectionClosed)
            }
        };
        outcome.map_err(RequestFailure::sent)
    }

    async fn remove_pending(&self, id: RequestId) {
        let mut pending = self.inner.pending.lock().await;
        pending.remove(&id);
    }
}

async fn read_loop(mut reader: OwnedReadHalf, inner: Arc<Inner>) {
    loop {
        let frame = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            res = read_frame(&mut reader) => res,
        };

        let payload = match frame {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::debug!(target: "hotline.agent", endpoint = %inner.endpoint, "agent closed the connection");
                break;
            }
            Err(err) => {
                tracing::warn!(target: "hotline.agent", endpoint = %inner.endpoint, error = %err, "failed to read agent frame");
                break;
            }
        };

        let response: AgentResponse = match decode_frame(&payload) {
            Ok(response) => response,
            Err(err) => {
                // The frame boundary is intact but nothing in it tells us which
                // request it answers; fail everyone waiting rather than guess.
                tracing::warn!(target: "hotline.agent", endpoint = %inner.endpoint, error = %err, "undecodable agent reply");
                let pending = std::mem::take(&mut *inner.pending.lock().await);
                for (_id, tx) in pending {
                    let _ = tx.send(Err(ChannelError::ProtocolMismatch(format!(
                        "undecodable reply: {err}"
                    ))));
                }
                continue;
            }
        };

        let tx = {
            let mut pending = inner.pending.lock().await;
            pending.remove(&response.id)
        };
        match tx {
            Some(tx) => {
                let _ = tx.send(Ok(response));
            }
            None => {
                tracing::warn!(
                    target: "hotline.agent",
                    endpoint = %inner.endpoint,
                    id = response.id,
                    action = %response.action,
                    "dropping reply with no outstanding request"
                );
            }
        }
    }

    inner.shutdown.cancel();

    let pending = std::mem::take(&mut *inner.pending.lock().await);
    for (_id, tx) in pending {
        let _ = tx.send(Err(ChannelError::ConnectionClosed));
    }
}
