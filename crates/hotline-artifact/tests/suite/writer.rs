use std::path::PathBuf;

use hotline_artifact::{
    write_artifacts, write_sources, NamingStrategy, SaveOutcome, WriteError, CLASS_SUFFIX,
};
use hotline_core::{BytecodeArtifact, SourceUnit};

fn three_artifacts() -> Vec<BytecodeArtifact> {
    vec![
        BytecodeArtifact::new("p.A", b"A".to_vec()),
        BytecodeArtifact::new("q.B", b"B".to_vec()),
        BytecodeArtifact::new("r.C", b"C".to_vec()),
    ]
}

#[test]
fn custom_naming_refuses_several_artifacts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("single.class");

    let err = write_artifacts(&target, NamingStrategy::Custom, CLASS_SUFFIX, &three_artifacts())
        .unwrap_err();
    assert!(matches!(err, WriteError::AmbiguousTarget { count: 3 }));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn custom_naming_writes_one_artifact_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("Renamed.bin");

    let report = write_artifacts(
        &target,
        NamingStrategy::Custom,
        CLASS_SUFFIX,
        &[BytecodeArtifact::new("p.A", b"bytes".to_vec())],
    )
    .unwrap();
    assert_eq!(report.outcome(), SaveOutcome::AllSaved);
    assert_eq!(std::fs::read(&target).unwrap(), b"bytes");
}

#[test]
fn one_unwritable_path_is_a_partial_save() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where `q/` must become a directory.
    std::fs::write(dir.path().join("q"), b"in the way").unwrap();

    let report = write_artifacts(
        dir.path(),
        NamingStrategy::SrcSubdirs,
        CLASS_SUFFIX,
        &three_artifacts(),
    )
    .unwrap();

    assert_eq!(report.saved, 2);
    assert_eq!(report.total, 3);
    assert_eq!(report.outcome(), SaveOutcome::PartiallySaved);
    assert_eq!(report.last_path, Some(dir.path().join("r/C.class")));

    let failed: Vec<_> = report.failures().map(|r| r.class.as_str()).collect();
    assert_eq!(failed, ["q.B"]);
    assert_eq!(std::fs::read(dir.path().join("p/A.class")).unwrap(), b"A");
    assert_eq!(std::fs::read(dir.path().join("r/C.class")).unwrap(), b"C");
    assert!(report
        .status_line()
        .starts_with("Saved only 2 from total of 3 classes to "));
}

#[test]
fn fully_qualified_naming_writes_flat_files() {
    let dir = tempfile::tempdir().unwrap();
    let report = write_artifacts(
        dir.path(),
        NamingStrategy::FullyQualified,
        CLASS_SUFFIX,
        &three_artifacts(),
    )
    .unwrap();
    assert_eq!(report.outcome(), SaveOutcome::AllSaved);

    let mut names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, ["p.A.class", "q.B.class", "r.C.class"]);
}

#[test]
fn empty_batch_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let report =
        write_artifacts(dir.path(), NamingStrategy::SrcSubdirs, CLASS_SUFFIX, &[]).unwrap();
    assert_eq!(report.total, 0);
    assert_eq!(report.outcome(), SaveOutcome::NoneSaved);
    assert!(report.last_path.is_none());
}

#[test]
fn sources_use_java_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let units = vec![SourceUnit::new("com.acme.Main", "package com.acme; class Main {}")];

    let report = write_sources(dir.path(), NamingStrategy::SrcSubdirs, &units).unwrap();
    let expected: PathBuf = dir.path().join("com/acme/Main.java");
    assert_eq!(report.last_path.as_deref(), Some(expected.as_path()));
    assert_eq!(
        std::fs::read_to_string(expected).unwrap(),
        "package com.acme; class Main {}"
    );
}
