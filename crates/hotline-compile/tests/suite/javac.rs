use std::sync::Arc;

use hotline_compile::{
    CompilationPipeline, CompileError, InMemoryClasspath, JavacBackend, JavacConfig, NoopObserver,
};
use hotline_core::SourceUnit;

#[tokio::test]
async fn missing_javac_is_an_internal_error_after_materializing_dependencies() {
    let scratch = tempfile::tempdir().unwrap();
    let backend = JavacBackend::new(JavacConfig {
        javac: scratch
            .path()
            .join("no-such-javac")
            .to_string_lossy()
            .into_owned(),
        scratch_root: Some(scratch.path().to_path_buf()),
        ..JavacConfig::default()
    });
    let provider = Arc::new(InMemoryClasspath::new([
        ("lib.Util", b"util".to_vec()),
        ("lib.Unused", b"unused".to_vec()),
    ]));
    let pipeline = CompilationPipeline::new(backend);

    let outcome = pipeline
        .compile(
            provider.clone(),
            vec![SourceUnit::new("app.Main", "package app;\nimport lib.Util;\nclass Main {}\n")],
            &NoopObserver,
        )
        .await;

    match outcome.error() {
        Some(CompileError::Internal(message)) => {
            assert!(message.contains("failed to spawn"), "{message}")
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(provider.resolutions(), 1);
    // Scratch directories are removed once the compile is over.
    let leftovers: Vec<_> = std::fs::read_dir(scratch.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}
