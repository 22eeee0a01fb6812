//! Minimal scripted TCP client for the router.
//!
//! Connects to the *server-peer* address, claims the GLOBAL channel,
//! creates a TEST channel, pushes a couple of data updates, and prints
//! every frame it gets back. Useful for poking a locally running
//! `router-server`.
//!
//! Run with:
//!   cargo run -p router-server --example tcp_client -- 127.0.0.1:11288

use std::env;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use router_core::{
    ChannelDataUpdateMessage, ChannelId, ChannelType, ControlMessage, CreateChannelMessage,
    FieldValue, Record, SubToChannelMessage, SubscriptionOptionsPatch,
};
use router_protocol::{decode_pack, decode_reply_body, encode_body, encode_pack, msg_type_of, MessagePack};

async fn send(stream: &mut TcpStream, channel_id: ChannelId, stub_id: u32, msg: &ControlMessage) {
    let mut payload = Vec::new();
    encode_body(msg, &mut payload).expect("encodable message");
    let mut pack = MessagePack::plain(channel_id, msg_type_of(msg), payload);
    pack.stub_id = stub_id;

    let mut frame = Vec::new();
    encode_pack(&pack, &mut frame).expect("encodable envelope");
    stream
        .write_all(&(frame.len() as u32).to_be_bytes())
        .await
        .expect("write length");
    stream.write_all(&frame).await.expect("write frame");
}

async fn recv(stream: &mut TcpStream) -> MessagePack {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.expect("read length");
    let mut frame = vec![0u8; u32::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut frame).await.expect("read frame");
    decode_pack(&frame).expect("decodable envelope")
}

/// Wait for the reply to `stub_id`, printing anything that fans out in
/// the meantime.
async fn recv_reply(stream: &mut TcpStream, stub_id: u32) -> MessagePack {
    loop {
        let pack = recv(stream).await;
        if pack.stub_id == stub_id {
            return pack;
        }
        println!(
            "(meanwhile) msg_type={} on channel {}: {:?}",
            pack.msg_type,
            pack.channel_id,
            decode_reply_body(pack.msg_type, &pack.payload)
        );
    }
}

#[tokio::main]
async fn main() {
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:11288".to_string());
    let mut stream = TcpStream::connect(&addr).await.expect("connect");
    println!("connected to {addr}");

    // Claim the GLOBAL channel by subscribing to it first.
    send(
        &mut stream,
        ChannelId::GLOBAL,
        1,
        &ControlMessage::SubToChannel(SubToChannelMessage::default()),
    )
    .await;
    let reply = recv_reply(&mut stream, 1).await;
    println!("sub reply: {:?}", decode_reply_body(reply.msg_type, &reply.payload));

    // Create a TEST channel with an initial payload.
    send(
        &mut stream,
        ChannelId::GLOBAL,
        2,
        &ControlMessage::CreateChannel(CreateChannelMessage {
            channel_type: ChannelType::Test,
            metadata: "demo".into(),
            sub_options: Some(SubscriptionOptionsPatch::fan_out_ms(50)),
            data: Some(
                Record::new()
                    .with("text", FieldValue::str("hello"))
                    .with("num", FieldValue::Int(1)),
            ),
            enable_client_broadcast: false,
        }),
    )
    .await;
    let reply = recv_reply(&mut stream, 2).await;
    let body = decode_reply_body(reply.msg_type, &reply.payload);
    println!("create reply: {body:?}");
    let ControlMessage::CreateChannelResult(created) = body.expect("create reply decodes") else {
        panic!("unexpected create reply");
    };

    // Push a few updates, then print whatever fans back out until the
    // channel goes quiet.
    for (i, text) in ["world", "again", "done"].iter().enumerate() {
        send(
            &mut stream,
            created.channel_id,
            0,
            &ControlMessage::ChannelDataUpdate(ChannelDataUpdateMessage {
                data: Record::new()
                    .with("text", FieldValue::str(*text))
                    .with("num", FieldValue::Int(i as i64 + 2)),
            }),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    while let Ok(pack) = tokio::time::timeout(Duration::from_millis(500), recv(&mut stream)).await {
        println!(
            "got msg_type={} on channel {}: {:?}",
            pack.msg_type,
            pack.channel_id,
            decode_reply_body(pack.msg_type, &pack.payload)
        );
    }
}
