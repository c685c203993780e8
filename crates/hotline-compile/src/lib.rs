//! Compile source buffers against the classes a live target has loaded.
//!
//! The classpath is not read from disk: a [`ClassesProvider`] hands out the
//! target's current bytecode on demand, usually through the agent channel
//! ([`RuntimeClasspath`]). [`CompilationPipeline`] runs a
//! [`CompilerBackend`] on a worker task and streams its diagnostics to a
//! [`CompileObserver`].

mod classpath;
mod javac;
mod observer;
mod pipeline;
mod source;

pub use classpath::{ClassesProvider, ClasspathError, InMemoryClasspath, RuntimeClasspath};
pub use javac::{dependency_candidates, JavacBackend, JavacConfig};
pub use observer::{CompileObserver, DiagnosticSink, NoopObserver};
pub use pipeline::{spawn_compile, CompilationPipeline, CompileError, CompileOutcome, CompilerBackend};
pub use source::{class_from_source, load_java_source};
