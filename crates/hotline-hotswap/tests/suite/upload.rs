use hotline_agent::mock::{MockAgentConfig, MockAgentServer};
use hotline_artifact::read_entries;
use hotline_core::{BytecodeArtifact, ClassIdentifier, TargetHandle};
use hotline_hotswap::{SessionEvent, UploadError};
use hotline_proto::Action;

use super::fake::{drain, session};

#[tokio::test]
async fn single_class_goes_out_as_a_class_file() {
    let server = MockAgentServer::spawn().await.unwrap();
    let (session, mut events) = session(server.target());
    session.attach(Some(server.endpoint())).await.unwrap();

    let ack = session
        .upload(false, vec![BytecodeArtifact::new("com.acme.A", b"v2".to_vec())])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ack.name, "app/com.acme.A.class");
    assert!(!ack.archived);
    assert_eq!(ack.classes, [ClassIdentifier::new("com.acme.A")]);
    assert_eq!(ack.message.as_deref(), Some("redefined app/com.acme.A.class"));

    let uploads = server.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].action, Action::UploadClass);
    assert_eq!(uploads[0].bytes, b"v2");

    assert_eq!(drain(&mut events), [SessionEvent::UploadFinished(Ok(ack))]);
}

#[tokio::test]
async fn several_classes_go_out_as_one_archive() {
    let server = MockAgentServer::spawn().await.unwrap();
    let (session, _events) = session(server.target());
    session.attach(None).await.unwrap();

    let artifacts = vec![
        BytecodeArtifact::new("com.acme.A", b"a".to_vec()),
        BytecodeArtifact::new("com.acme.A$Inner", b"inner".to_vec()),
        BytecodeArtifact::new("com.acme.B", b"b".to_vec()),
    ];
    let ack = session.upload(true, artifacts).await.unwrap().unwrap();
    assert!(ack.archived);
    assert_eq!(ack.name, "boot/hotline-0-classes.jar");
    assert_eq!(ack.classes.len(), 3);

    assert_eq!(server.request_count(Action::UploadArchive).await, 1);
    assert_eq!(server.request_count(Action::UploadClass).await, 0);

    let uploads = server.uploads().await;
    assert_eq!(uploads.len(), 1);
    let entries = read_entries(&uploads[0].bytes).unwrap();
    let names: Vec<_> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        ["com/acme/A.class", "com/acme/A$Inner.class", "com/acme/B.class"]
    );
    assert_eq!(entries[1].1, b"inner");
}

#[tokio::test]
async fn archive_names_are_numbered_per_session() {
    let server = MockAgentServer::spawn().await.unwrap();
    let (session, _events) = session(server.target());
    session.attach(None).await.unwrap();

    let batch = || {
        vec![
            BytecodeArtifact::new("p.A", b"a".to_vec()),
            BytecodeArtifact::new("p.B", b"b".to_vec()),
        ]
    };
    let first = session.upload(false, batch()).await.unwrap().unwrap();
    let second = session.upload(false, batch()).await.unwrap().unwrap();
    assert_eq!(first.name, "app/hotline-0-classes.jar");
    assert_eq!(second.name, "app/hotline-1-classes.jar");
}

#[tokio::test]
async fn rejected_redefinition_carries_the_agent_message() {
    let server = MockAgentServer::spawn_with_config(MockAgentConfig {
        reject_uploads: Some("class redefinition failed: attempted to add a method".into()),
        ..MockAgentConfig::default()
    })
    .await
    .unwrap();
    let (session, mut events) = session(server.target());
    session.attach(None).await.unwrap();

    let err = session
        .upload(false, vec![BytecodeArtifact::new("p.A", b"a".to_vec())])
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(
        err,
        UploadError::RedefinitionRejected {
            message: "class redefinition failed: attempted to add a method".into()
        }
    );
    assert!(server.uploads().await.is_empty());
    assert_eq!(drain(&mut events), [SessionEvent::UploadFinished(Err(err))]);
}

#[tokio::test]
async fn empty_batch_never_reaches_the_agent() {
    let server = MockAgentServer::spawn().await.unwrap();
    let (session, _events) = session(server.target());
    session.attach(None).await.unwrap();

    let err = session.upload(false, Vec::new()).await.unwrap().unwrap_err();
    assert_eq!(err, UploadError::EmptyBatch);
    assert!(server.requests().await.is_empty());
}

#[tokio::test]
async fn filesystem_target_cannot_upload() {
    let (session, _events) = session(TargetHandle::fs());
    session.attach(None).await.unwrap();

    let err = session
        .upload(false, vec![BytecodeArtifact::new("p.A", b"a".to_vec())])
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, UploadError::Detached(TargetHandle::fs()));
}
