// crates/router-chat-client/src/commands.rs

use router_core::{ChannelId, ChannelType};

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `/list` — show live channels.
    List,
    /// `/create <type> [metadata]` — create a channel of the given type.
    Create {
        channel_type: ChannelType,
        metadata: String,
    },
    /// `/sub <channel> [fan_out_ms]` — subscribe to a channel.
    Sub {
        channel_id: ChannelId,
        fan_out_ms: Option<u32>,
    },
    /// `/unsub <channel>` — leave a channel.
    Unsub { channel_id: ChannelId },
    /// `/say <channel> <text>` — append a chat line to the channel data.
    Say {
        channel_id: ChannelId,
        text: String,
    },
    /// `/quit` — exit.
    Quit,
    /// `/help` — print the command list.
    Help,
}

/// Parse one console line; `Err` carries a message for the user.
pub fn parse(line: &str) -> Result<Command, String> {
    let mut parts = line.trim().split_whitespace();
    let head = parts.next().ok_or("empty input; try /help")?;

    match head {
        "/list" => Ok(Command::List),
        "/create" => {
            let type_name = parts.next().ok_or("usage: /create <type> [metadata]")?;
            let channel_type = ChannelType::from_name(&type_name.to_uppercase())
                .ok_or_else(|| format!("unknown channel type {type_name:?}"))?;
            Ok(Command::Create {
                channel_type,
                metadata: parts.collect::<Vec<_>>().join(" "),
            })
        }
        "/sub" => {
            let channel_id = parse_channel_id(parts.next())?;
            let fan_out_ms = match parts.next() {
                Some(raw) => Some(
                    raw.parse::<u32>()
                        .map_err(|_| format!("bad fan-out interval {raw:?}"))?,
                ),
                None => None,
            };
            Ok(Command::Sub {
                channel_id,
                fan_out_ms,
            })
        }
        "/unsub" => Ok(Command::Unsub {
            channel_id: parse_channel_id(parts.next())?,
        }),
        "/say" => {
            let channel_id = parse_channel_id(parts.next())?;
            let text = parts.collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return Err("usage: /say <channel> <text>".into());
            }
            Ok(Command::Say { channel_id, text })
        }
        "/quit" | "/q" => Ok(Command::Quit),
        "/help" => Ok(Command::Help),
        other => Err(format!("unknown command {other:?}; try /help")),
    }
}

fn parse_channel_id(raw: Option<&str>) -> Result<ChannelId, String> {
    let raw = raw.ok_or("missing channel id")?;
    raw.parse::<u32>()
        .map(ChannelId)
        .map_err(|_| format!("bad channel id {raw:?}"))
}

pub const HELP: &str = "\
commands:
  /list                    list channels
  /create <type> [meta]    create a channel (subworld | test)
  /sub <id> [fan_out_ms]   subscribe to a channel
  /unsub <id>              leave a channel
  /say <id> <text>         send a chat line into a channel
  /quit                    exit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_chat_surface() {
        assert_eq!(parse("/list"), Ok(Command::List));
        assert_eq!(
            parse("/create test my room"),
            Ok(Command::Create {
                channel_type: ChannelType::Test,
                metadata: "my room".into(),
            })
        );
        assert_eq!(
            parse("/sub 3 50"),
            Ok(Command::Sub {
                channel_id: ChannelId(3),
                fan_out_ms: Some(50),
            })
        );
        assert_eq!(
            parse("/say 3 hello there"),
            Ok(Command::Say {
                channel_id: ChannelId(3),
                text: "hello there".into(),
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("/create spaceship").is_err());
        assert!(parse("/sub nope").is_err());
        assert!(parse("/frobnicate").is_err());
    }
}
