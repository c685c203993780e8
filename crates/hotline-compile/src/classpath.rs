use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hotline_agent::{AgentChannel, ChannelError};
use hotline_core::{ClassIdentifier, TargetHandle};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClasspathError {
    #[error("class {0} is not available from the target")]
    NotFound(ClassIdentifier),
    #[error("failed to fetch {class} from the target: {source}")]
    Transport {
        class: ClassIdentifier,
        #[source]
        source: ChannelError,
    },
}

/// Source of dependency bytecode for a compilation.
pub trait ClassesProvider: Send + Sync {
    /// Every class the provider can resolve, in a stable order.
    fn class_names(&self) -> Vec<ClassIdentifier>;

    fn resolve<'a>(
        &'a self,
        class: &'a ClassIdentifier,
    ) -> impl Future<Output = Result<Arc<[u8]>, ClasspathError>> + Send + 'a;
}

/// Classes of a live target, fetched through the agent channel.
///
/// Bytes already in the status store are served without a round-trip;
/// everything else costs one FETCH_BYTES request, after which it is cached.
#[derive(Debug, Clone)]
pub struct RuntimeClasspath {
    channel: AgentChannel,
    target: TargetHandle,
}

impl RuntimeClasspath {
    pub fn new(channel: AgentChannel, target: TargetHandle) -> Self {
        Self { channel, target }
    }

    pub fn target(&self) -> &TargetHandle {
        &self.target
    }
}

impl ClassesProvider for RuntimeClasspath {
    fn class_names(&self) -> Vec<ClassIdentifier> {
        self.channel.status().loaded_class_names(&self.target)
    }

    fn resolve<'a>(
        &'a self,
        class: &'a ClassIdentifier,
    ) -> impl Future<Output = Result<Arc<[u8]>, ClasspathError>> + Send + 'a {
        async move {
            if let Some(bytes) = self.channel.status().cached_bytes(&self.target, class) {
                tracing::trace!(target: "hotline.compile", %class, "classpath cache hit");
                return Ok(bytes);
            }
            match self.channel.fetch_bytes(&self.target, class).await {
                Ok(fetched) => Ok(fetched.bytes),
                Err(ChannelError::Agent { message, .. }) => {
                    tracing::debug!(target: "hotline.compile", %class, %message, "agent could not provide class");
                    Err(ClasspathError::NotFound(class.clone()))
                }
                Err(source) => Err(ClasspathError::Transport {
                    class: class.clone(),
                    source,
                }),
            }
        }
    }
}

/// Fixed set of classes held in memory. Counts resolutions so callers can
/// check how often the classpath was consulted.
#[derive(Debug, Default)]
pub struct InMemoryClasspath {
    classes: HashMap<ClassIdentifier, Arc<[u8]>>,
    resolutions: AtomicUsize,
}

impl InMemoryClasspath {
    pub fn new<I, C, B>(classes: I) -> Self
    where
        I: IntoIterator<Item = (C, B)>,
        C: Into<ClassIdentifier>,
        B: Into<Vec<u8>>,
    {
        Self {
            classes: classes
                .into_iter()
                .map(|(class, bytes)| (class.into(), Arc::from(bytes.into())))
                .collect(),
            resolutions: AtomicUsize::new(0),
        }
    }

    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }
}

impl ClassesProvider for InMemoryClasspath {
    fn class_names(&self) -> Vec<ClassIdentifier> {
        let mut names: Vec<_> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }

    fn resolve<'a>(
        &'a self,
        class: &'a ClassIdentifier,
    ) -> impl Future<Output = Result<Arc<[u8]>, ClasspathError>> + Send + 'a {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let found = self.classes.get(class).cloned();
        async move { found.ok_or_else(|| ClasspathError::NotFound(class.clone())) }
    }
}
