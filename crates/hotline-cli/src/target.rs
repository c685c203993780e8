use anyhow::{bail, Result};
use clap::Args;
use hotline_config::AgentConfig;
use hotline_core::{Endpoint, TargetHandle};

/// Which JVM to talk to.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Process id of a local JVM whose agent listens on `--port`
    #[arg(long, conflicts_with = "host")]
    pub pid: Option<u32>,
    /// Agent host (defaults to `agent.host` from the config)
    #[arg(long)]
    pub host: Option<String>,
    /// Agent port
    #[arg(long)]
    pub port: Option<u16>,
    /// No running target: compile against the JDK alone and save to disk
    #[arg(long, conflicts_with_all = ["pid", "host", "port"])]
    pub fs: bool,
}

impl TargetArgs {
    /// The target handle plus the endpoint to attach to, if the handle does
    /// not imply one.
    pub fn resolve(&self, agent: &AgentConfig) -> Result<(TargetHandle, Option<Endpoint>)> {
        if self.fs {
            return Ok((TargetHandle::fs(), None));
        }
        let host = self.host.clone().unwrap_or_else(|| agent.host.clone());
        match (self.pid, self.port) {
            (Some(pid), Some(port)) => {
                Ok((TargetHandle::local(pid), Some(Endpoint::new(host, port))))
            }
            (Some(pid), None) => bail!("target pid {pid} needs --port for its agent"),
            (None, Some(port)) => Ok((TargetHandle::remote(host, port), None)),
            (None, None) => bail!("no target given; pass --port (with --pid or --host) or --fs"),
        }
    }
}
