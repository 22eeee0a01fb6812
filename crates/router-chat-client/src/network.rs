// crates/router-chat-client/src/network.rs

use anyhow::Result;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

use router_protocol::{decode_pack, encode_pack, MessagePack};

/// One TCP session against the router's client listener.
pub struct RouterConnection {
    server_addr: String,
    stream: Option<TcpStream>,
    tx: UnboundedSender<MessagePack>,
}

impl RouterConnection {
    pub fn new(server_addr: &str, tx: UnboundedSender<MessagePack>) -> Self {
        Self {
            server_addr: server_addr.to_string(),
            stream: None,
            tx,
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to {}...", self.server_addr);
        let stream = TcpStream::connect(&self.server_addr).await?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        info!("Connected");
        Ok(())
    }

    /// Pump outgoing packs onto the wire and incoming frames to the app
    /// until either side drops.
    pub async fn run(mut self, mut rx: UnboundedReceiver<MessagePack>) -> Result<()> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| anyhow::anyhow!("not connected"))?;
        let (mut read_half, mut write_half) = stream.into_split();

        let writer = tokio::spawn(async move {
            while let Some(pack) = rx.recv().await {
                let mut frame = Vec::with_capacity(128);
                if let Err(e) = encode_pack(&pack, &mut frame) {
                    error!("failed to encode: {e}");
                    continue;
                }
                debug!("sending msg_type={} to channel {}", pack.msg_type, pack.channel_id);
                if write_half
                    .write_all(&(frame.len() as u32).to_be_bytes())
                    .await
                    .is_err()
                    || write_half.write_all(&frame).await.is_err()
                    || write_half.flush().await.is_err()
                {
                    break;
                }
            }
        });

        let mut read_buffer = BytesMut::with_capacity(65536);
        loop {
            match read_pack(&mut read_half, &mut read_buffer).await {
                Ok(Some(pack)) => {
                    if self.tx.send(pack).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("server closed the connection");
                    break;
                }
                Err(e) => {
                    error!("read error: {e}");
                    break;
                }
            }
        }

        writer.abort();
        Ok(())
    }
}

async fn read_pack(
    stream: &mut OwnedReadHalf,
    read_buffer: &mut BytesMut,
) -> Result<Option<MessagePack>> {
    // Read length prefix.
    while read_buffer.len() < 4 {
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        read_buffer.extend_from_slice(&buf[..n]);
    }
    let len =
        u32::from_be_bytes([read_buffer[0], read_buffer[1], read_buffer[2], read_buffer[3]]) as usize;

    // Read frame body.
    while read_buffer.len() < 4 + len {
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        read_buffer.extend_from_slice(&buf[..n]);
    }

    let frame = read_buffer.split_to(4 + len);
    Ok(Some(decode_pack(&frame[4..])?))
}
