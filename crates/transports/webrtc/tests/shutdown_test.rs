//! Process shutdown tests

mod harness;

use harness::{channel, context, init_test_tracing, wait_for, Failures, MockEngine, OFFER_SDP};
use peerlink_webrtc::{
    OfferRequest, OneShotOffer, Role, SessionState, ShutdownCoordinator, SignalingAdapter,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_shutdown_closes_every_session() {
    init_test_tracing();
    let engine = MockEngine::new();
    let ctx = context(&engine);
    let adapter = SignalingAdapter::new(ctx.clone());
    let coordinator = ShutdownCoordinator::new(Arc::clone(&ctx.registry));

    let mut clients = Vec::new();
    let mut tasks = Vec::new();
    for _ in 0..3 {
        let (mut client, end) = channel();
        let adapter = adapter.clone();
        tasks.push(tokio::spawn(async move {
            adapter.run(Role::Answerer, end.inbound, end.outbound).await
        }));
        client.send(json!({ "type": "offer", "sdp": OFFER_SDP }));
        assert_eq!(client.recv().await["type"], "answer");
        clients.push(client);
    }
    assert_eq!(ctx.registry.len(), 3);

    assert_eq!(coordinator.shutdown().await, 3);
    assert!(ctx.registry.is_empty());

    // Adapters return without waiting for the clients to hang up
    for task in tasks {
        let state = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("adapter ignored shutdown")
            .unwrap()
            .unwrap();
        assert_eq!(state, SessionState::Closed);
    }
    for peer in engine.peers() {
        assert_eq!(peer.close_count(), 1);
    }
}

#[tokio::test]
async fn test_shutdown_with_no_sessions() {
    init_test_tracing();
    let engine = MockEngine::new();
    let ctx = context(&engine);
    let coordinator = ShutdownCoordinator::new(Arc::clone(&ctx.registry));

    assert_eq!(coordinator.shutdown().await, 0);
    assert_eq!(coordinator.shutdown().await, 0);
}

#[tokio::test]
async fn test_shutdown_reaches_detached_sessions() {
    init_test_tracing();
    let engine = MockEngine::new();
    let ctx = context(&engine);
    let coordinator = ShutdownCoordinator::new(Arc::clone(&ctx.registry));

    OneShotOffer::new(ctx.clone())
        .answer(OfferRequest {
            sdp: OFFER_SDP.to_string(),
            sdp_type: "offer".to_string(),
            video_transform: None,
        })
        .await
        .unwrap();
    assert_eq!(ctx.registry.len(), 1);

    assert_eq!(coordinator.shutdown().await, 1);
    assert!(ctx.registry.is_empty());
    let peer = engine.last_peer();
    wait_for("engine connection closed", || peer.close_count() == 1).await;
}

#[tokio::test]
async fn test_shutdown_during_ice_gathering() {
    init_test_tracing();
    let engine = MockEngine::failing(Failures {
        stall_gathering: true,
        ..Default::default()
    });
    let ctx = context(&engine);
    let coordinator = ShutdownCoordinator::new(Arc::clone(&ctx.registry));

    let task = tokio::spawn({
        let oneshot = OneShotOffer::new(ctx.clone());
        async move {
            oneshot
                .answer(OfferRequest {
                    sdp: OFFER_SDP.to_string(),
                    sdp_type: "offer".to_string(),
                    video_transform: None,
                })
                .await
        }
    });
    wait_for("session registered", || ctx.registry.len() == 1).await;

    let closed = tokio::time::timeout(Duration::from_secs(5), coordinator.shutdown())
        .await
        .expect("shutdown waited on ICE gathering");
    assert_eq!(closed, 1);
    assert!(ctx.registry.is_empty());

    let answered = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("answer outlived shutdown")
        .unwrap();
    assert!(answered.is_err());
    assert_eq!(engine.last_peer().close_count(), 1);
}

#[tokio::test]
async fn test_shutdown_skips_sessions_already_gone() {
    init_test_tracing();
    let engine = MockEngine::new();
    let ctx = context(&engine);
    let adapter = SignalingAdapter::new(ctx.clone());
    let coordinator = ShutdownCoordinator::new(Arc::clone(&ctx.registry));

    let (mut client, end) = channel();
    let task = tokio::spawn({
        let adapter = adapter.clone();
        async move { adapter.run(Role::Answerer, end.inbound, end.outbound).await }
    });
    client.send(json!({ "type": "offer", "sdp": OFFER_SDP }));
    client.recv().await;
    client.close();
    task.await.unwrap().unwrap();

    assert_eq!(coordinator.shutdown().await, 0);
    assert_eq!(engine.last_peer().close_count(), 1);
}
