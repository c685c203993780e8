use std::fmt;

use serde::{Deserialize, Serialize};

/// How a target process is reached.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetKind {
    /// A process on this machine, identified by pid. The agent endpoint is
    /// learned at attach time.
    Local { pid: u32 },
    /// A process reached over the network; the agent listens on `host:port`.
    Remote { host: String, port: u16 },
    /// No live process: only the filesystem side (saving) is available.
    Fs,
}

/// Identity of the target process for the lifetime of one session.
///
/// Handles are immutable and cheap to clone; they are used as map keys by the
/// status store and the agent channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetHandle {
    kind: TargetKind,
}

impl TargetHandle {
    pub fn local(pid: u32) -> Self {
        Self {
            kind: TargetKind::Local { pid },
        }
    }

    pub fn remote(host: impl Into<String>, port: u16) -> Self {
        Self {
            kind: TargetKind::Remote {
                host: host.into(),
                port,
            },
        }
    }

    pub fn fs() -> Self {
        Self {
            kind: TargetKind::Fs,
        }
    }

    pub fn kind(&self) -> &TargetKind {
        &self.kind
    }

    pub fn is_fs(&self) -> bool {
        matches!(self.kind, TargetKind::Fs)
    }

    /// The agent endpoint implied by the handle itself (remote targets only).
    pub fn endpoint_hint(&self) -> Option<Endpoint> {
        match &self.kind {
            TargetKind::Remote { host, port } => Some(Endpoint::new(host.clone(), *port)),
            TargetKind::Local { .. } | TargetKind::Fs => None,
        }
    }
}

impl fmt::Display for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TargetKind::Local { pid } => write!(f, "pid {pid}"),
            TargetKind::Remote { host, port } => write!(f, "{host}:{port}"),
            TargetKind::Fs => f.write_str("filesystem"),
        }
    }
}

/// Host and port the in-process agent listens on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn localhost(port: u16) -> Self {
        Self::new("localhost", port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}
