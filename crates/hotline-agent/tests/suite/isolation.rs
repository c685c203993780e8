use std::sync::Arc;
use std::time::Duration;

use hotline_agent::mock::{fake_bytecode, DelayedReply, MockAgentConfig, MockAgentServer};
use hotline_agent::{AgentChannel, ChannelConfig, StatusStore};
use hotline_core::ClassIdentifier;
use hotline_proto::Action;

#[tokio::test]
async fn concurrent_targets_do_not_share_replies() {
    let server_a = MockAgentServer::spawn_with_classes(["a.One", "a.Two"]).await.unwrap();
    let server_b = MockAgentServer::spawn_with_classes(["b.One"]).await.unwrap();
    let channel = AgentChannel::new(Arc::new(StatusStore::new()), ChannelConfig::default());
    let (a, b) = (server_a.target(), server_b.target());
    channel.attach(&a, server_a.endpoint()).await.unwrap();
    channel.attach(&b, server_b.endpoint()).await.unwrap();

    let (a_two, b_one) = (ClassIdentifier::new("a.Two"), ClassIdentifier::new("b.One"));
    let (list_a, list_b, fetch_a, fetch_b) = tokio::join!(
        channel.list_classes(&a),
        channel.list_classes(&b),
        channel.fetch_bytes(&a, &a_two),
        channel.fetch_bytes(&b, &b_one),
    );
    assert_eq!(list_a.unwrap().len(), 2);
    assert_eq!(list_b.unwrap().len(), 1);
    assert_eq!(&*fetch_a.unwrap().bytes, fake_bytecode("a.Two").as_slice());
    assert_eq!(&*fetch_b.unwrap().bytes, fake_bytecode("b.One").as_slice());

    let status = channel.status();
    assert_eq!(status.last_fetched(&a).unwrap().name.as_str(), "a.Two");
    assert_eq!(status.last_fetched(&b).unwrap().name.as_str(), "b.One");
    assert!(status
        .cached_bytes(&b, &ClassIdentifier::new("a.Two"))
        .is_none());
}

#[tokio::test]
async fn requests_to_one_target_are_serialized() {
    let mut config = MockAgentConfig::with_classes(["p.A", "p.B"]);
    config.delayed_replies.push(DelayedReply {
        action: Action::FetchBytes,
        delay: Duration::from_millis(50),
    });
    let server = MockAgentServer::spawn_with_config(config).await.unwrap();
    let channel = AgentChannel::new(Arc::new(StatusStore::new()), ChannelConfig::default());
    let target = server.target();
    channel.attach(&target, server.endpoint()).await.unwrap();

    let (p_a, p_b) = (ClassIdentifier::new("p.A"), ClassIdentifier::new("p.B"));
    let (a, b) = tokio::join!(
        channel.fetch_bytes(&target, &p_a),
        channel.fetch_bytes(&target, &p_b),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(server.max_in_flight(), 1);
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn fetched_name_always_matches_fetched_bytes() {
    let names: Vec<String> = (0..8).map(|i| format!("p.C{i}")).collect();
    let server = MockAgentServer::spawn_with_classes(names.clone()).await.unwrap();
    let channel = AgentChannel::new(Arc::new(StatusStore::new()), ChannelConfig::default());
    let target = server.target();
    channel.attach(&target, server.endpoint()).await.unwrap();

    let mut tasks = Vec::new();
    for name in &names {
        let channel = channel.clone();
        let target = target.clone();
        let class = ClassIdentifier::new(name.clone());
        tasks.push(tokio::spawn(async move {
            channel.fetch_bytes(&target, &class).await.unwrap();
            let last = channel.status().last_fetched(&target).unwrap();
            assert_eq!(&*last.bytes, fake_bytecode(last.name.as_str()).as_slice());
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    for name in &names {
        let cached = channel
            .status()
            .cached_bytes(&target, &ClassIdentifier::new(name.clone()))
            .unwrap();
        assert_eq!(&*cached, fake_bytecode(name).as_slice());
    }
}
