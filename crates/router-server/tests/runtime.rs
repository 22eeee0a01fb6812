// crates/router-server/tests/runtime.rs
//
// In-process scenarios against a fresh `Router`: no sockets, real tokio
// workers, messages injected through `dispatch` exactly as the connection
// layer would.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use router_core::{
    BroadcastType, ChannelDataUpdateMessage, ChannelId, ChannelState, ChannelType, ConnectionId,
    ControlMessage, CreateChannelMessage, ErrorCode, FieldValue, Record, RemoveChannelMessage,
    SubToChannelMessage, SubscriptionOptionsPatch, UnsubFromChannelMessage,
};
use router_protocol::{decode_reply_body, encode_body, msg_type_of, MessagePack};
use router_server::config::{ChannelSettings, ChannelTypeSettings};
use router_server::dispatch::{dispatch, InboxPolicy};
use router_server::registry::{ConnectionHandle, Router};
use router_server::types::{ConnectionType, OutboundRx};

fn test_settings(inbox_capacity: usize) -> ChannelSettings {
    ChannelSettings::from_entries([(
        ChannelType::Test,
        ChannelTypeSettings {
            tick_interval_ms: 10,
            default_fan_out_interval_ms: 20,
            inbox_capacity,
        },
    )])
}

fn peer(router: &Arc<Router>, conn_type: ConnectionType) -> (Arc<ConnectionHandle>, OutboundRx) {
    let (out_tx, out_rx) = tokio::sync::mpsc::unbounded_channel();
    (router.add_connection(conn_type, out_tx), out_rx)
}

async fn send(
    router: &Arc<Router>,
    conn: &Arc<ConnectionHandle>,
    channel_id: ChannelId,
    stub_id: u32,
    msg: ControlMessage,
) {
    let mut payload = Vec::new();
    encode_body(&msg, &mut payload).expect("encodable body");
    let mut pack = MessagePack::plain(channel_id, msg_type_of(&msg), payload);
    pack.stub_id = stub_id;
    dispatch(router, conn, pack, InboxPolicy::Block)
        .await
        .expect("dispatch with Block policy cannot fail");
}

/// Wait for the reply correlated to `stub_id`, skipping unrelated frames.
async fn expect_reply(rx: &mut OutboundRx, stub_id: u32) -> ControlMessage {
    loop {
        let pack = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a reply")
            .expect("outbound channel closed");
        if pack.stub_id == stub_id {
            return decode_reply_body(pack.msg_type, &pack.payload).expect("decodable reply");
        }
    }
}

async fn claim_global(router: &Arc<Router>, conn: &Arc<ConnectionHandle>, rx: &mut OutboundRx) {
    send(
        router,
        conn,
        ChannelId::GLOBAL,
        1,
        ControlMessage::SubToChannel(SubToChannelMessage::default()),
    )
    .await;
    expect_reply(rx, 1).await;
}

async fn create_test_channel(
    router: &Arc<Router>,
    conn: &Arc<ConnectionHandle>,
    rx: &mut OutboundRx,
    stub_id: u32,
    data: Option<Record>,
) -> ChannelId {
    send(
        router,
        conn,
        ChannelId::GLOBAL,
        stub_id,
        ControlMessage::CreateChannel(CreateChannelMessage {
            channel_type: ChannelType::Test,
            metadata: "arena".into(),
            sub_options: None,
            data,
            enable_client_broadcast: false,
        }),
    )
    .await;
    match expect_reply(rx, stub_id).await {
        ControlMessage::CreateChannelResult(result) => result.channel_id,
        other => panic!("unexpected create reply: {other:?}"),
    }
}

fn user_space_pack(channel_id: ChannelId, broadcast: BroadcastType, payload: Vec<u8>) -> MessagePack {
    MessagePack {
        channel_id,
        broadcast,
        stub_id: 0,
        msg_type: 200,
        payload,
    }
}

#[tokio::test]
async fn authority_and_global_transfer() {
    let router = Router::new(test_settings(1024));
    let (c0, mut rx0) = peer(&router, ConnectionType::Server);
    let (c1, mut rx1) = peer(&router, ConnectionType::Server);

    // First server peer to subscribe claims the GLOBAL channel.
    claim_global(&router, &c0, &mut rx0).await;
    assert_eq!(router.global_owner(), c0.id());

    let channel_id = create_test_channel(&router, &c0, &mut rx0, 2, None).await;

    // A non-owner's remove is refused.
    send(
        &router,
        &c1,
        ChannelId::GLOBAL,
        3,
        ControlMessage::RemoveChannel(RemoveChannelMessage { channel_id }),
    )
    .await;
    match expect_reply(&mut rx1, 3).await {
        ControlMessage::ServerError(err) => assert_eq!(err.code, ErrorCode::Unauthorized),
        other => panic!("expected an Unauthorized error, got {other:?}"),
    }
    assert!(router.get_channel(channel_id).is_some());

    // Transfer global ownership: c0 steps down, c1 claims.
    send(
        &router,
        &c0,
        ChannelId::GLOBAL,
        4,
        ControlMessage::UnsubFromChannel(UnsubFromChannelMessage::default()),
    )
    .await;
    expect_reply(&mut rx0, 4).await;
    assert_eq!(router.global_owner(), ConnectionId::NONE);

    send(
        &router,
        &c1,
        ChannelId::GLOBAL,
        5,
        ControlMessage::SubToChannel(SubToChannelMessage::default()),
    )
    .await;
    expect_reply(&mut rx1, 5).await;
    assert_eq!(router.global_owner(), c1.id());

    // The same request now succeeds.
    send(
        &router,
        &c1,
        ChannelId::GLOBAL,
        6,
        ControlMessage::RemoveChannel(RemoveChannelMessage { channel_id }),
    )
    .await;
    match expect_reply(&mut rx1, 6).await {
        ControlMessage::RemoveChannelResult(result) => assert_eq!(result.channel_id, channel_id),
        other => panic!("expected a remove result, got {other:?}"),
    }
    assert!(router.get_channel(channel_id).is_none());
}

#[tokio::test]
async fn removed_channel_goes_silent() {
    let router = Router::new(test_settings(1024));
    let (c0, mut rx0) = peer(&router, ConnectionType::Server);
    let (c2, mut rx2) = peer(&router, ConnectionType::Client);

    claim_global(&router, &c0, &mut rx0).await;
    let channel_id = create_test_channel(&router, &c0, &mut rx0, 2, None).await;

    send(
        &router,
        &c2,
        channel_id,
        7,
        ControlMessage::SubToChannel(SubToChannelMessage::default()),
    )
    .await;
    expect_reply(&mut rx2, 7).await;

    // Broadcasts reach the subscriber while the channel lives.
    dispatch(
        &router,
        &c0,
        user_space_pack(channel_id, BroadcastType::All, vec![1]),
        InboxPolicy::Block,
    )
    .await
    .unwrap();
    let pack = timeout(Duration::from_secs(2), rx2.recv())
        .await
        .expect("subscriber should receive the broadcast")
        .unwrap();
    assert_eq!(pack.msg_type, 200);

    router.remove_channel(channel_id).unwrap();

    // Messages for the dead id are answered with an error when a stub is
    // given, and are never delivered.
    let mut pack = user_space_pack(channel_id, BroadcastType::All, vec![2]);
    pack.stub_id = 8;
    dispatch(&router, &c0, pack, InboxPolicy::Block).await.unwrap();
    match expect_reply(&mut rx0, 8).await {
        ControlMessage::ServerError(err) => assert_eq!(err.code, ErrorCode::ChannelNotFound),
        other => panic!("expected ChannelNotFound, got {other:?}"),
    }
    assert!(
        timeout(Duration::from_millis(100), rx2.recv()).await.is_err(),
        "no delivery may happen after removal"
    );
}

#[tokio::test]
async fn inbox_backpressure() {
    let router = Router::new(test_settings(8));
    let (c0, mut rx0) = peer(&router, ConnectionType::Server);
    let (c2, mut rx2) = peer(&router, ConnectionType::Client);

    claim_global(&router, &c0, &mut rx0).await;
    let channel_id = create_test_channel(&router, &c0, &mut rx0, 2, None).await;
    let handle = router.get_channel(channel_id).unwrap();

    send(
        &router,
        &c2,
        channel_id,
        3,
        ControlMessage::SubToChannel(SubToChannelMessage::default()),
    )
    .await;
    expect_reply(&mut rx2, 3).await;

    // Flood without yielding: the depth-8 inbox must push back.
    let mut accepted = 0u32;
    let mut saw_full = false;
    for i in 0..64u32 {
        let pack = user_space_pack(channel_id, BroadcastType::All, vec![i as u8]);
        match dispatch(&router, &c0, pack, InboxPolicy::Fail).await {
            Ok(()) => accepted += 1,
            Err(err) => {
                assert!(matches!(err, router_core::ServerError::InboxFull(_)));
                saw_full = true;
                break;
            }
        }
    }
    assert!(saw_full, "a bounded inbox must refuse the flood eventually");
    assert!(accepted <= 16, "far fewer than 64 fit into a depth-8 inbox");

    // With the blocking policy every message lands, drained tick by tick.
    let ticks_before = handle.tick_count();
    let flood = {
        let router = router.clone();
        let c0 = c0.clone();
        tokio::spawn(async move {
            for i in 0..64u32 {
                let pack = user_space_pack(channel_id, BroadcastType::All, vec![i as u8]);
                dispatch(&router, &c0, pack, InboxPolicy::Block).await.unwrap();
            }
        })
    };

    let mut received = 0u32;
    while received < 64 + accepted {
        let pack = timeout(Duration::from_secs(5), rx2.recv())
            .await
            .expect("flood must drain")
            .unwrap();
        assert_eq!(pack.msg_type, 200);
        received += 1;
    }
    flood.await.unwrap();
    assert!(
        handle.tick_count() > ticks_before,
        "tick counter must keep increasing while draining"
    );
}

#[tokio::test]
async fn graceful_drop_prunes_subscriber_and_owner() {
    let router = Router::new(test_settings(1024));
    let (c0, mut rx0) = peer(&router, ConnectionType::Server);
    let (c2, mut rx2) = peer(&router, ConnectionType::Client);

    claim_global(&router, &c0, &mut rx0).await;
    let channel_id = create_test_channel(&router, &c0, &mut rx0, 2, None).await;
    let handle = router.get_channel(channel_id).unwrap();

    send(
        &router,
        &c2,
        channel_id,
        3,
        ControlMessage::SubToChannel(SubToChannelMessage {
            conn_id: ConnectionId::NONE,
            sub_options: SubscriptionOptionsPatch::fan_out_ms(10),
        }),
    )
    .await;
    expect_reply(&mut rx2, 3).await;

    // The subscriber's connection goes away; the next tick prunes it and
    // tells the owner.
    router.remove_connection(c2.id());
    loop {
        let pack = timeout(Duration::from_secs(2), rx0.recv())
            .await
            .expect("owner must be notified of the pruned subscriber")
            .unwrap();
        // The owner also hears about the subscribe itself; wait for the
        // unsubscribe notification specifically.
        if let Ok(ControlMessage::UnsubFromChannelResult(msg)) =
            decode_reply_body(pack.msg_type, &pack.payload)
        {
            assert_eq!(msg.conn_id, c2.id());
            break;
        }
    }

    // Now the owner itself drops; the channel ends up ownerless.
    router.remove_connection(c0.id());
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if handle.owner() == ConnectionId::NONE {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "owner must be cleared once its connection is gone"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn channel_ids_are_injective() {
    let router = Router::new(test_settings(1024));
    let (c0, mut rx0) = peer(&router, ConnectionType::Server);
    claim_global(&router, &c0, &mut rx0).await;

    let mut ids = vec![ChannelId::GLOBAL];
    for stub in 10..20 {
        ids.push(create_test_channel(&router, &c0, &mut rx0, stub, None).await);
    }
    let mut sorted = ids.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len(), "allocated ids must never repeat");
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "allocation is monotonic");
    assert_eq!(router.channel_count(), ids.len());
}

#[tokio::test]
async fn clients_cannot_create_channels() {
    let router = Router::new(test_settings(1024));
    let (c2, mut rx2) = peer(&router, ConnectionType::Client);

    send(
        &router,
        &c2,
        ChannelId::GLOBAL,
        9,
        ControlMessage::CreateChannel(CreateChannelMessage {
            channel_type: ChannelType::Test,
            metadata: String::new(),
            sub_options: None,
            data: None,
            enable_client_broadcast: false,
        }),
    )
    .await;
    match expect_reply(&mut rx2, 9).await {
        ControlMessage::ServerError(err) => assert_eq!(err.code, ErrorCode::Unauthorized),
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    assert_eq!(router.channel_count(), 1);
}

#[tokio::test]
async fn handover_gates_updates_until_global_owner_reclaims() {
    let router = Router::new(test_settings(1024));
    let (c0, mut rx0) = peer(&router, ConnectionType::Server);
    let (c1, mut rx1) = peer(&router, ConnectionType::Server);
    let (c2, mut rx2) = peer(&router, ConnectionType::Client);

    claim_global(&router, &c0, &mut rx0).await;
    let channel_id = create_test_channel(
        &router,
        &c1,
        &mut rx1,
        2,
        Some(
            Record::new()
                .with("text", FieldValue::str("a"))
                .with("num", FieldValue::Int(1)),
        ),
    )
    .await;
    let handle = router.get_channel(channel_id).unwrap();
    assert_eq!(handle.state(), ChannelState::Open);

    send(
        &router,
        &c2,
        channel_id,
        3,
        ControlMessage::SubToChannel(SubToChannelMessage {
            conn_id: ConnectionId::NONE,
            sub_options: SubscriptionOptionsPatch {
                can_update_data: Some(true),
                data_field_masks: None,
                fan_out_interval_ms: Some(10),
            },
        }),
    )
    .await;
    expect_reply(&mut rx2, 3).await;

    // The owner drops while the channel holds data: ownership is in
    // transition, not up for grabs.
    router.remove_connection(c1.id());
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while handle.state() != ChannelState::Handover || handle.owner() != ConnectionId::NONE {
        assert!(
            tokio::time::Instant::now() < deadline,
            "channel must enter Handover once its owner is gone"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // During Handover, `can_update_data` alone is not enough.
    send(
        &router,
        &c2,
        channel_id,
        4,
        ControlMessage::ChannelDataUpdate(ChannelDataUpdateMessage {
            data: Record::new().with("text", FieldValue::str("blocked")),
        }),
    )
    .await;
    match expect_reply(&mut rx2, 4).await {
        ControlMessage::ServerError(err) => assert_eq!(err.code, ErrorCode::Unauthorized),
        other => panic!("expected Unauthorized during Handover, got {other:?}"),
    }

    // The GLOBAL owner reclaims the channel by subscribing itself.
    send(
        &router,
        &c0,
        channel_id,
        5,
        ControlMessage::SubToChannel(SubToChannelMessage::default()),
    )
    .await;
    expect_reply(&mut rx0, 5).await;
    assert_eq!(handle.state(), ChannelState::Open);
    assert_eq!(handle.owner(), c0.id());

    // With ownership settled the subscriber's updates flow again.
    send(
        &router,
        &c2,
        channel_id,
        6,
        ControlMessage::ChannelDataUpdate(ChannelDataUpdateMessage {
            data: Record::new().with("text", FieldValue::str("after")),
        }),
    )
    .await;
    loop {
        let pack = timeout(Duration::from_secs(2), rx2.recv())
            .await
            .expect("the accepted update must fan back out")
            .unwrap();
        if let Ok(ControlMessage::ChannelDataUpdate(update)) =
            decode_reply_body(pack.msg_type, &pack.payload)
        {
            if update.data.get("text").and_then(|v| v.as_str()) == Some("after") {
                break;
            }
        }
    }
}

#[tokio::test]
async fn global_channel_recovers_from_owner_loss_with_data() {
    let router = Router::new(test_settings(1024));
    let (c0, mut rx0) = peer(&router, ConnectionType::Server);
    let (c1, mut rx1) = peer(&router, ConnectionType::Server);

    claim_global(&router, &c0, &mut rx0).await;

    // Give the GLOBAL channel data, then wait for the snapshot so the
    // update is known to be applied.
    send(
        &router,
        &c0,
        ChannelId::GLOBAL,
        0,
        ControlMessage::ChannelDataUpdate(ChannelDataUpdateMessage {
            data: Record::new().with("banner", FieldValue::str("up")),
        }),
    )
    .await;
    loop {
        let pack = timeout(Duration::from_secs(2), rx0.recv())
            .await
            .expect("the GLOBAL owner must receive its snapshot")
            .unwrap();
        if let Ok(ControlMessage::ChannelDataUpdate(_)) =
            decode_reply_body(pack.msg_type, &pack.payload)
        {
            break;
        }
    }

    // GLOBAL never waits in Handover: with its owner gone it drops back
    // to Init so a new super-user can step up.
    router.remove_connection(c0.id());
    let global = router.get_channel(ChannelId::GLOBAL).unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while global.owner() != ConnectionId::NONE || global.state() != ChannelState::Init {
        assert!(
            tokio::time::Instant::now() < deadline,
            "GLOBAL must become claimable again after owner loss"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    send(
        &router,
        &c1,
        ChannelId::GLOBAL,
        7,
        ControlMessage::SubToChannel(SubToChannelMessage::default()),
    )
    .await;
    expect_reply(&mut rx1, 7).await;
    assert_eq!(router.global_owner(), c1.id());
}
