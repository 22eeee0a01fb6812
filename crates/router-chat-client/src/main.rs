// crates/router-chat-client/src/main.rs

mod commands;
mod network;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

use router_core::{
    ChannelDataUpdateMessage, ChannelId, ControlMessage, CreateChannelMessage, ErrorCode,
    FieldValue, ListChannelMessage, Record, SubToChannelMessage, SubscriptionOptionsPatch,
    UnsubFromChannelMessage,
};
use router_protocol::{decode_reply_body, encode_body, msg_type_of, MessagePack};

use crate::commands::{parse, Command, HELP};
use crate::network::RouterConnection;

#[derive(Parser)]
#[command(name = "router-chat-client")]
#[command(about = "Console chat client for the channel router")]
struct Cli {
    /// Router client-listener address
    #[arg(short, long, default_value = "127.0.0.1:12108")]
    server: String,

    /// Display name prepended to chat lines
    #[arg(short, long, default_value = "anon")]
    name: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt::init();
    }

    // Channels between the console loop and the network task.
    let (tx_to_network, rx_from_app) = mpsc::unbounded_channel::<MessagePack>();
    let (tx_to_app, mut rx_from_network) = mpsc::unbounded_channel::<MessagePack>();

    let mut connection = RouterConnection::new(&cli.server, tx_to_app);
    connection.connect().await?;

    let network_handle = tokio::spawn(async move { connection.run(rx_from_app).await });

    println!("connected to {} as {:?}; type /help for commands", cli.server, cli.name);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut next_stub: u32 = 1;

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match parse(&line) {
                    Ok(command) => command,
                    Err(msg) => {
                        println!("{msg}");
                        continue;
                    }
                };
                if command == Command::Quit {
                    break;
                }
                if command == Command::Help {
                    println!("{HELP}");
                    continue;
                }
                let stub_id = next_stub;
                next_stub += 1;
                let (channel_id, msg) = build_request(&cli.name, command);
                let mut payload = Vec::new();
                encode_body(&msg, &mut payload)?;
                let mut pack = MessagePack::plain(channel_id, msg_type_of(&msg), payload);
                pack.stub_id = stub_id;
                if tx_to_network.send(pack).is_err() {
                    break;
                }
            }

            pack = rx_from_network.recv() => {
                let Some(pack) = pack else {
                    println!("connection lost");
                    break;
                };
                print_incoming(&pack);
            }
        }
    }

    info!("shutting down");
    network_handle.abort();
    Ok(())
}

/// Map a console command to the request it puts on the wire.
fn build_request(name: &str, command: Command) -> (ChannelId, ControlMessage) {
    match command {
        Command::List => (
            ChannelId::GLOBAL,
            ControlMessage::ListChannel(ListChannelMessage::default()),
        ),
        Command::Create {
            channel_type,
            metadata,
        } => (
            ChannelId::GLOBAL,
            ControlMessage::CreateChannel(CreateChannelMessage {
                channel_type,
                metadata,
                sub_options: None,
                data: None,
                enable_client_broadcast: true,
            }),
        ),
        Command::Sub {
            channel_id,
            fan_out_ms,
        } => (
            channel_id,
            ControlMessage::SubToChannel(SubToChannelMessage {
                conn_id: router_core::ConnectionId::NONE,
                sub_options: SubscriptionOptionsPatch {
                    can_update_data: Some(true),
                    data_field_masks: None,
                    fan_out_interval_ms: fan_out_ms,
                },
            }),
        ),
        Command::Unsub { channel_id } => (
            channel_id,
            ControlMessage::UnsubFromChannel(UnsubFromChannelMessage::default()),
        ),
        Command::Say { channel_id, text } => (
            channel_id,
            ControlMessage::ChannelDataUpdate(ChannelDataUpdateMessage {
                data: Record::new().with(
                    "events",
                    FieldValue::List(vec![FieldValue::str(format!("{name}: {text}"))]),
                ),
            }),
        ),
        // Handled before reaching here.
        Command::Quit | Command::Help => (
            ChannelId::GLOBAL,
            ControlMessage::ListChannel(ListChannelMessage::default()),
        ),
    }
}

/// Render one server frame for the console.
fn print_incoming(pack: &MessagePack) {
    match decode_reply_body(pack.msg_type, &pack.payload) {
        Ok(ControlMessage::ListChannelResult(result)) => {
            println!("channels:");
            for entry in result.channels {
                println!(
                    "  #{} {} {:?}",
                    entry.channel_id, entry.channel_type, entry.metadata
                );
            }
        }
        Ok(ControlMessage::CreateChannelResult(result)) => {
            println!("created channel #{}", result.channel_id);
        }
        Ok(ControlMessage::SubToChannelResult(result)) => {
            println!("subscribed (conn {})", result.conn_id);
        }
        Ok(ControlMessage::UnsubFromChannelResult(result)) => {
            println!("unsubscribed (conn {})", result.conn_id);
        }
        Ok(ControlMessage::RemoveChannelResult(result)) => {
            println!("channel #{} removed", result.channel_id);
        }
        Ok(ControlMessage::ChannelDataUpdate(update)) => {
            print_update(pack.channel_id, &update.data);
        }
        Ok(ControlMessage::ServerError(err)) => {
            println!("server error {:?}: {}", err.code, err.message);
            if err.code == ErrorCode::Unauthorized {
                println!("(try subscribing with update rights first)");
            }
        }
        Ok(other) => println!("<- {other:?}"),
        Err(err) => println!("undecodable frame (msg_type {}): {err}", pack.msg_type),
    }
}

/// Chat-oriented rendering: show new `events` lines, fall back to the raw
/// record for anything else.
fn print_update(channel_id: ChannelId, data: &Record) {
    if let Some(FieldValue::List(events)) = data.get("events") {
        for event in events {
            if let Some(line) = event.as_str() {
                println!("[#{channel_id}] {line}");
            }
        }
        return;
    }
    println!("[#{channel_id}] update: {data:?}");
}
