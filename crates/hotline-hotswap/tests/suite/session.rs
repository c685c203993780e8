use hotline_agent::mock::MockAgentServer;
use hotline_agent::ChannelError;
use hotline_artifact::{NamingStrategy, WriteError};
use hotline_core::{ClassIdentifier, SourceUnit, TargetHandle};
use hotline_hotswap::{HotSwapStatus, SaveSettings, SessionError, SessionEvent};
use hotline_proto::Action;

use super::fake::{drain, session, session_with, VisibleClassesBackend};

fn unit(class: &str, text: &str) -> SourceUnit {
    SourceUnit::new(class, text)
}

#[tokio::test]
async fn compile_and_upload_redefines_every_compiled_class() {
    let server = MockAgentServer::spawn().await.unwrap();
    let (session, mut events) = session(server.target());
    session.attach(None).await.unwrap();

    let report = session
        .compile_and_upload(
            vec![unit("p.A", "class A {}"), unit("p.B", "class B {}")],
            false,
        )
        .await
        .unwrap();
    assert!(report.is_success(), "{report:?}");
    let names: Vec<_> = report.classes.iter().map(|c| c.class_name.as_str()).collect();
    assert_eq!(names, ["p.A", "p.B"]);
    assert!(report
        .classes
        .iter()
        .all(|c| c.status == HotSwapStatus::Success));
    assert_eq!(server.request_count(Action::UploadArchive).await, 1);

    let events = drain(&mut events);
    assert_eq!(
        events[..3],
        [
            SessionEvent::Diagnostic("compiled p.A".into()),
            SessionEvent::Diagnostic("compiled p.B".into()),
            SessionEvent::CompileFinished { success: true },
        ]
    );
    assert!(matches!(events[3], SessionEvent::UploadFinished(Ok(_))));
    assert_eq!(events.len(), 4);
}

#[tokio::test]
async fn compile_errors_stop_before_upload() {
    let server = MockAgentServer::spawn().await.unwrap();
    let (session, mut events) = session(server.target());
    session.attach(None).await.unwrap();

    let report = session
        .compile_and_upload(vec![unit("p.A", "syntax error")], false)
        .await
        .unwrap();
    assert_eq!(report.status, HotSwapStatus::CompileError);
    assert!(report.message.unwrap().contains("p.A: error: syntax error"));
    assert_eq!(report.classes[0].class_name, "p.A");
    assert_eq!(server.request_count(Action::UploadArchive).await, 0);
    assert_eq!(server.request_count(Action::UploadClass).await, 0);

    assert_eq!(
        drain(&mut events),
        [
            SessionEvent::Diagnostic("p.A: error: syntax error".into()),
            SessionEvent::CompileFinished { success: false },
        ]
    );
}

#[tokio::test]
async fn unreachable_agent_reports_unavailable() {
    let (session, _events) = session(TargetHandle::local(4242));

    let report = session
        .compile_and_upload(vec![unit("p.A", "class A {}")], true)
        .await
        .unwrap();
    assert_eq!(report.status, HotSwapStatus::AgentUnavailable);
}

#[tokio::test]
async fn filesystem_session_compiles_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let (session, mut events) = session(TargetHandle::fs());
    let session = session.with_save_settings(SaveSettings {
        strategy: NamingStrategy::SrcSubdirs,
        ..SaveSettings::default()
    });

    let report = session
        .compile_and_save(
            vec![unit("com.acme.A", "class A {}")],
            dir.path().to_path_buf(),
        )
        .await
        .unwrap()
        .unwrap();
    let expected = dir.path().join("com/acme/A.class");
    assert_eq!(report.saved, 1);
    assert_eq!(report.last_path.as_deref(), Some(expected.as_path()));
    assert_eq!(std::fs::read(&expected).unwrap(), b"class A {}");

    let events = drain(&mut events);
    assert_eq!(
        events.last(),
        Some(&SessionEvent::SaveFinished {
            saved: 1,
            total: 1,
            last_path: Some(expected),
        })
    );
}

#[tokio::test]
async fn custom_naming_refuses_several_classes() {
    let dir = tempfile::tempdir().unwrap();
    let (session, mut events) = session(TargetHandle::fs());
    let session = session.with_save_settings(SaveSettings {
        strategy: NamingStrategy::Custom,
        ..SaveSettings::default()
    });

    let err = session
        .compile_and_save(
            vec![unit("p.A", "a"), unit("p.B", "b")],
            dir.path().join("out.class"),
        )
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Write(WriteError::AmbiguousTarget { count: 2 })
    ));
    assert!(!dir.path().join("out.class").exists());
    assert_eq!(
        drain(&mut events).last(),
        Some(&SessionEvent::SaveFinished {
            saved: 0,
            total: 2,
            last_path: None,
        })
    );
}

#[tokio::test]
async fn failed_compile_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (session, mut events) = session(TargetHandle::fs());

    let err = session
        .compile_and_save(vec![unit("p.A", "syntax error")], dir.path().to_path_buf())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, SessionError::Compile(_)));
    assert!(!drain(&mut events)
        .iter()
        .any(|event| matches!(event, SessionEvent::SaveFinished { .. })));
}

#[tokio::test]
async fn sources_are_saved_with_java_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _events) = session(TargetHandle::fs());

    let report = session
        .save_sources(vec![unit("p.A", "class A {}")], dir.path().to_path_buf())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        report.status_line(),
        format!(
            "Saved all 1 classes to {}",
            dir.path().join("p.A.java").display()
        )
    );
}

#[tokio::test]
async fn agent_operations_run_through_the_session() {
    let server = MockAgentServer::spawn_with_classes(["p.A", "p.B"]).await.unwrap();
    let (session, _events) = session(server.target());
    session.attach(None).await.unwrap();

    let classes = session.list_classes().await.unwrap().unwrap();
    assert_eq!(classes.len(), 2);

    let fetched = session
        .fetch_bytes(ClassIdentifier::new("p.B"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.name, ClassIdentifier::new("p.B"));

    session
        .init_class(ClassIdentifier::new("p.A"))
        .await
        .unwrap()
        .unwrap();
    let err = session
        .init_class(ClassIdentifier::new("p.Missing"))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ChannelError::Agent { .. }));
}

#[tokio::test]
async fn halt_detaches_the_session() {
    let server = MockAgentServer::spawn().await.unwrap();
    let (session, _events) = session(server.target());
    session.attach(None).await.unwrap();

    session.halt().await.unwrap();
    assert!(server.is_halted());
    assert!(session.channel().status().is_detached(session.target()));

    let err = session.list_classes().await.unwrap().unwrap_err();
    assert!(matches!(err, ChannelError::Detached(_)));
}

#[tokio::test]
async fn filesystem_session_has_no_agent() {
    let (session, _events) = session(TargetHandle::fs());
    session.attach(None).await.unwrap();

    let err = session.list_classes().await.unwrap().unwrap_err();
    assert_eq!(err, ChannelError::Detached(TargetHandle::fs()));
}

#[tokio::test]
async fn first_compile_after_attach_sees_loaded_classes() {
    let server = MockAgentServer::spawn_with_classes(["lib.Util"]).await.unwrap();
    let (session, _events) = session_with(server.target(), VisibleClassesBackend);
    session.attach(None).await.unwrap();

    let outcome = session.compile(vec![unit("p.A", "class A {}")]).await.unwrap();
    assert_eq!(outcome.log(), ["visible=1"]);
    assert_eq!(server.request_count(Action::ListClasses).await, 1);

    let outcome = session.compile(vec![unit("p.A", "class A {}")]).await.unwrap();
    assert_eq!(outcome.log(), ["visible=1"]);
    assert_eq!(server.request_count(Action::ListClasses).await, 1);
}

#[tokio::test]
async fn filesystem_compile_lists_nothing() {
    let (session, _events) = session_with(TargetHandle::fs(), VisibleClassesBackend);
    let outcome = session.compile(vec![unit("p.A", "class A {}")]).await.unwrap();
    assert_eq!(outcome.log(), ["visible=0"]);
}
