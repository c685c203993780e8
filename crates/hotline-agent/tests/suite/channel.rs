use std::sync::Arc;
use std::time::Duration;

use hotline_agent::mock::{fake_bytecode, DelayedReply, MockAgentConfig, MockAgentServer};
use hotline_agent::{AgentChannel, AgentReply, ChannelConfig, ChannelError, StatusStore};
use hotline_core::{ClassIdentifier, Endpoint, TargetHandle};
use hotline_proto::{encode_body, Action, AgentCommand};

async fn attached(server: &MockAgentServer) -> (AgentChannel, TargetHandle) {
    let channel = AgentChannel::new(Arc::new(StatusStore::new()), ChannelConfig::default());
    let target = server.target();
    channel.attach(&target, server.endpoint()).await.unwrap();
    (channel, target)
}

#[tokio::test]
async fn list_and_fetch_update_status() {
    let server = MockAgentServer::spawn_with_classes(["com.acme.A", "com.acme.B"])
        .await
        .unwrap();
    let (channel, target) = attached(&server).await;

    let classes = channel.list_classes(&target).await.unwrap();
    let names: Vec<_> = classes.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["com.acme.A", "com.acme.B"]);

    let class = ClassIdentifier::new("com.acme.B");
    let fetched = channel.fetch_bytes(&target, &class).await.unwrap();
    assert_eq!(fetched.name, class);
    assert_eq!(&*fetched.bytes, fake_bytecode("com.acme.B").as_slice());

    let status = channel.status();
    assert_eq!(status.loaded_class_names(&target).len(), 2);
    assert_eq!(status.last_fetched(&target), Some(fetched));
    assert!(status.cached_bytes(&target, &class).is_some());
    assert!(!status.is_detached(&target));
    assert_eq!(status.generation(&target), 2);

    let requests = server.requests().await;
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.port == server.addr().port()));
}

#[tokio::test]
async fn agent_error_leaves_status_untouched() {
    let server = MockAgentServer::spawn_with_classes(["com.acme.A"]).await.unwrap();
    let (channel, target) = attached(&server).await;

    let err = channel
        .fetch_bytes(&target, &ClassIdentifier::new("com.acme.Missing"))
        .await
        .unwrap_err();
    match err {
        ChannelError::Agent { action, message } => {
            assert_eq!(action, Action::FetchBytes);
            assert!(message.contains("com.acme.Missing"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(channel.status().last_fetched(&target).is_none());
    assert_eq!(channel.status().generation(&target), 0);
}

#[tokio::test]
async fn slow_reply_times_out_and_late_reply_is_ignored() {
    let mut config = MockAgentConfig::with_classes(["com.acme.A"]);
    config.delayed_replies.push(DelayedReply {
        action: Action::FetchBytes,
        delay: Duration::from_millis(300),
    });
    let server = MockAgentServer::spawn_with_config(config).await.unwrap();
    let (channel, target) = attached(&server).await;

    let command = AgentCommand::FetchBytes {
        class: "com.acme.A".into(),
    };
    let err = channel
        .send(&target, command, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ChannelError::Timeout { action: Action::FetchBytes, .. }),
        "{err:?}"
    );
    assert!(err.is_transport());

    // The session is still usable.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let classes = channel.list_classes(&target).await.unwrap();
    assert_eq!(classes.len(), 1);
    assert!(channel.status().last_fetched(&target).is_none());
}

#[tokio::test]
async fn refused_connection_is_reported() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let channel = AgentChannel::new(Arc::new(StatusStore::new()), ChannelConfig::default());
    let target = TargetHandle::remote("127.0.0.1", addr.port());
    channel.attach(&target, Endpoint::from(addr)).await.unwrap();

    let err = channel.list_classes(&target).await.unwrap_err();
    assert!(matches!(err, ChannelError::ConnectionRefused { .. }), "{err:?}");
}

#[tokio::test]
async fn reply_for_another_class_is_a_protocol_mismatch() {
    let mut config = MockAgentConfig::with_classes(["com.acme.A"]);
    config.fetch_echo_override = Some("com.acme.Other".into());
    let server = MockAgentServer::spawn_with_config(config).await.unwrap();
    let (channel, target) = attached(&server).await;

    let err = channel
        .fetch_bytes(&target, &ClassIdentifier::new("com.acme.A"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::ProtocolMismatch(_)), "{err:?}");
    assert!(channel.status().last_fetched(&target).is_none());
}

#[tokio::test]
async fn undecodable_reply_is_a_protocol_mismatch() {
    let mut config = MockAgentConfig::with_classes(["com.acme.A"]);
    config.malformed_replies.push(Action::ListClasses);
    let server = MockAgentServer::spawn_with_config(config).await.unwrap();
    let (channel, target) = attached(&server).await;

    let err = channel.list_classes(&target).await.unwrap_err();
    assert!(matches!(err, ChannelError::ProtocolMismatch(_)), "{err:?}");
}

#[tokio::test]
async fn unattached_and_filesystem_targets_are_detached() {
    let channel = AgentChannel::new(Arc::new(StatusStore::new()), ChannelConfig::default());

    let fs = TargetHandle::fs();
    assert!(matches!(
        channel.list_classes(&fs).await,
        Err(ChannelError::Detached(_))
    ));
    assert!(matches!(
        channel.attach(&fs, Endpoint::localhost(1)).await,
        Err(ChannelError::Detached(_))
    ));

    let never_attached = TargetHandle::local(4242);
    assert!(matches!(
        channel.list_classes(&never_attached).await,
        Err(ChannelError::Detached(_))
    ));
}

#[tokio::test]
async fn upload_invalidates_cached_bytecode() {
    let server = MockAgentServer::spawn_with_classes(["com.acme.A"]).await.unwrap();
    let (channel, target) = attached(&server).await;
    let class = ClassIdentifier::new("com.acme.A");

    channel.fetch_bytes(&target, &class).await.unwrap();
    assert!(channel.status().cached_bytes(&target, &class).is_some());

    let reply = channel
        .send(
            &target,
            AgentCommand::UploadClass {
                name: "app/com.acme.A.class".into(),
                body: encode_body(b"new bytes"),
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert!(matches!(reply, AgentReply::Ack { .. }));
    assert!(channel.status().cached_bytes(&target, &class).is_none());

    let uploads = server.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].name, "app/com.acme.A.class");
    assert_eq!(uploads[0].bytes, b"new bytes");
}

#[tokio::test]
async fn rejected_upload_carries_agent_message() {
    let mut config = MockAgentConfig::with_classes(["com.acme.A"]);
    config.reject_uploads = Some("schema change not implemented".into());
    let server = MockAgentServer::spawn_with_config(config).await.unwrap();
    let (channel, target) = attached(&server).await;

    let err = channel
        .send(
            &target,
            AgentCommand::UploadClass {
                name: "app/com.acme.A.class".into(),
                body: encode_body(b"x"),
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ChannelError::Agent {
            action: Action::UploadClass,
            message: "schema change not implemented".into(),
        }
    );
    assert!(!err.is_transport());
}

#[tokio::test]
async fn init_class_is_acknowledged() {
    let server = MockAgentServer::spawn_with_classes(["com.acme.A"]).await.unwrap();
    let (channel, target) = attached(&server).await;

    channel
        .init_class(&target, &ClassIdentifier::new("com.acme.A"))
        .await
        .unwrap();
    assert_eq!(server.request_count(Action::InitClass).await, 1);
    assert!(channel
        .init_class(&target, &ClassIdentifier::new("com.acme.Nope"))
        .await
        .is_err());
}

#[tokio::test]
async fn upload_lost_after_sending_is_not_repeated() {
    let mut config = MockAgentConfig::with_classes(["com.acme.A"]);
    config.dropped_requests = vec![Action::UploadClass];
    let server = MockAgentServer::spawn_with_config(config).await.unwrap();
    let (channel, target) = attached(&server).await;
    channel.list_classes(&target).await.unwrap();

    let command = AgentCommand::UploadClass {
        name: "com.acme.A".into(),
        body: encode_body(b"new bytes"),
    };
    let err = channel
        .send(&target, command, Duration::from_secs(5))
        .await
        .unwrap_err();

    assert_eq!(err, ChannelError::ConnectionClosed);
    assert_eq!(server.request_count(Action::UploadClass).await, 1);
    assert!(server.uploads().await.is_empty());
    assert!(channel.status().is_detached(&target));
}

#[tokio::test]
async fn fetch_lost_on_a_stale_connection_is_resent() {
    let mut config = MockAgentConfig::with_classes(["com.acme.A"]);
    config.dropped_requests = vec![Action::FetchBytes];
    let server = MockAgentServer::spawn_with_config(config).await.unwrap();
    let (channel, target) = attached(&server).await;
    channel.list_classes(&target).await.unwrap();

    let class = ClassIdentifier::new("com.acme.A");
    let fetched = channel.fetch_bytes(&target, &class).await.unwrap();

    assert_eq!(&*fetched.bytes, fake_bytecode("com.acme.A").as_slice());
    assert_eq!(server.request_count(Action::FetchBytes).await, 2);
    assert_eq!(server.connections(), 2);
    assert!(!channel.status().is_detached(&target));
}
