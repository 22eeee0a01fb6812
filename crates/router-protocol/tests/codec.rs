// crates/router-protocol/tests/codec.rs

use std::collections::BTreeMap;

use router_core::{
    BroadcastType, ChannelId, ChannelType, ConnectionId, ControlMessage, CreateChannelMessage,
    ErrorCode, FieldValue, ListChannelMessage, MapKey, Record, ServerErrorMessage,
    SubToChannelMessage, SubscriptionOptionsPatch, UserSpaceMessage,
};
use router_protocol::{
    decode_body, decode_pack, decode_record, encode_body, encode_pack, encode_record,
    msg_type_of, MessagePack, ProtocolError, WireMsgType, PROTOCOL_VERSION,
};

fn sample_record() -> Record {
    Record::new()
        .with("text", FieldValue::str("abc"))
        .with("num", FieldValue::Int(-42))
        .with("ratio", FieldValue::Float(0.5))
        .with("flag", FieldValue::Bool(true))
        .with("raw", FieldValue::Bytes(vec![0, 1, 2]))
        .with(
            "list",
            FieldValue::List(vec![FieldValue::str("x"), FieldValue::Null]),
        )
        .with(
            "kv",
            FieldValue::Map(BTreeMap::from([
                (MapKey::Int(7), FieldValue::str("seven")),
                (
                    MapKey::Str("nested".into()),
                    FieldValue::Msg(Record::new().with("p1", FieldValue::Int(1))),
                ),
            ])),
        )
}

#[test]
fn envelope_round_trip() {
    let pack = MessagePack {
        channel_id: ChannelId(3),
        broadcast: BroadcastType::AllButSender,
        stub_id: 99,
        msg_type: WireMsgType::SubToChannel as u32,
        payload: vec![1, 2, 3],
    };
    let mut buf = Vec::new();
    encode_pack(&pack, &mut buf).unwrap();
    assert_eq!(decode_pack(&buf).unwrap(), pack);
}

#[test]
fn envelope_rejects_bad_version() {
    let mut buf = Vec::new();
    encode_pack(
        &MessagePack::plain(ChannelId(0), WireMsgType::ListChannel as u32, Vec::new()),
        &mut buf,
    )
    .unwrap();
    buf[0] = PROTOCOL_VERSION + 1;
    assert_eq!(
        decode_pack(&buf),
        Err(ProtocolError::VersionMismatch(PROTOCOL_VERSION + 1))
    );
}

#[test]
fn envelope_rejects_truncation_and_bad_broadcast() {
    let mut buf = Vec::new();
    encode_pack(
        &MessagePack::plain(ChannelId(0), WireMsgType::ListChannel as u32, Vec::new()),
        &mut buf,
    )
    .unwrap();
    assert_eq!(decode_pack(&buf[..7]), Err(ProtocolError::Truncated));

    buf[1] = 200; // not a broadcast mode
    assert_eq!(
        decode_pack(&buf),
        Err(ProtocolError::InvalidField("broadcast"))
    );
}

#[test]
fn record_round_trip() {
    let record = sample_record();
    let mut buf = Vec::new();
    encode_record(&record, &mut buf).unwrap();
    assert_eq!(decode_record(&buf).unwrap(), record);
}

#[test]
fn record_decode_rejects_garbage() {
    // Field count says one field but the buffer ends.
    assert_eq!(decode_record(&[0, 1]), Err(ProtocolError::Truncated));

    // Unknown value tag.
    let buf = [0u8, 1, 1, b'x', 250];
    assert_eq!(
        decode_record(&buf),
        Err(ProtocolError::InvalidField("value tag"))
    );
}

#[test]
fn record_decode_bounds_nesting() {
    // A chain of "m" -> Msg(...) deeper than the codec allows.
    let mut buf: Vec<u8> = Vec::new();
    for _ in 0..40 {
        buf.extend_from_slice(&[0, 1]); // one field
        buf.extend_from_slice(&[1, b'm']); // name "m"
        buf.push(8); // TAG_MSG
    }
    buf.extend_from_slice(&[0, 0]); // innermost: empty record
    assert_eq!(decode_record(&buf), Err(ProtocolError::TooDeep));
}

#[test]
fn body_round_trips() {
    let messages = [
        ControlMessage::ListChannel(ListChannelMessage {
            type_filter: Some(ChannelType::SubWorld),
            metadata_prefix: "lobby".into(),
        }),
        ControlMessage::CreateChannel(CreateChannelMessage {
            channel_type: ChannelType::Test,
            metadata: "arena-1".into(),
            sub_options: Some(SubscriptionOptionsPatch {
                can_update_data: Some(true),
                data_field_masks: Some(vec!["text".into(), "kv.p1".into()]),
                fan_out_interval_ms: Some(50),
            }),
            data: Some(sample_record()),
            enable_client_broadcast: true,
        }),
        ControlMessage::SubToChannel(SubToChannelMessage {
            conn_id: ConnectionId(0),
            sub_options: SubscriptionOptionsPatch::fan_out_ms(100),
        }),
        ControlMessage::ServerError(ServerErrorMessage {
            code: ErrorCode::Unauthorized,
            message: "no authority".into(),
        }),
    ];
    for msg in messages {
        let mut buf = Vec::new();
        encode_body(&msg, &mut buf).unwrap();
        assert_eq!(decode_body(msg_type_of(&msg), &buf).unwrap(), msg);
    }
}

#[test]
fn user_space_bodies_pass_through() {
    let msg = ControlMessage::UserSpace(UserSpaceMessage {
        msg_type: 123,
        payload: vec![9, 9, 9],
    });
    let mut buf = Vec::new();
    encode_body(&msg, &mut buf).unwrap();
    assert_eq!(buf, vec![9, 9, 9]);
    assert_eq!(decode_body(123, &buf).unwrap(), msg);
}

#[test]
fn unknown_control_type_is_rejected() {
    assert_eq!(
        decode_body(42, &[]),
        Err(ProtocolError::UnknownMessageType(42))
    );
}

#[test]
fn oversized_metadata_is_rejected() {
    let msg = ControlMessage::ListChannel(ListChannelMessage {
        type_filter: None,
        metadata_prefix: "x".repeat(300),
    });
    let mut buf = Vec::new();
    assert_eq!(
        encode_body(&msg, &mut buf),
        Err(ProtocolError::LimitExceeded("metadata prefix"))
    );
}
