use std::time::Duration;

use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use shared::{Message as Frame, MessageType};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{tungstenite, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::*;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(10);

pub enum StreamMessage {
    /// A (re)connection succeeded. `session` tags everything read on it.
    Connected { session: u64 },
    Work { session: u64, work: Frame },
}

pub enum StreamCommand {
    /// Sent only if `session` is still the live connection, so a result
    /// computed before a reconnect never reaches the new session.
    Send { session: u64, frame: Frame },
}

pub fn new_subscribe(
    url: String,
    max_retry: u32,
    mut notify_shutdown: broadcast::Receiver<()>,
) -> (mpsc::Sender<StreamCommand>, mpsc::Receiver<StreamMessage>, JoinHandle<()>) {
    let (reader_tx, reader_rx) = mpsc::channel(100);
    let (writer_tx, mut writer_rx) = mpsc::channel(100);
    let handle = tokio::spawn(async move {
        let mut attempts = 0;
        let mut session = 0;
        'main: loop {
            let stream = match tokio_tungstenite::connect_async(&url).await {
                Ok((stream, _)) => stream,
                Err(err) => {
                    attempts += 1;
                    error!("fail to connect to server: {err:#}");
                    if attempts >= max_retry {
                        error!("giving up after {attempts} attempts");
                        break;
                    }
                    info!("retry...({attempts}/{max_retry})");
                    tokio::select! {
                        _ = notify_shutdown.recv() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                    continue;
                }
            };

            attempts = 0;
            session += 1;
            info!("ws connect to the server, session {session}");
            if reader_tx.send(StreamMessage::Connected { session }).await.is_err() {
                break;
            }

            let (mut write, mut read) = stream.split();
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

            loop {
                if let Err(err) = tokio::select! {
                    _ = notify_shutdown.recv() => {
                        write.send(Message::Close(None)).await.ok();
                        break 'main
                    },
                    _ = heartbeat.tick() => {
                        write.send(Message::Ping(vec![])).await.map_err(anyhow::Error::from)
                    },
                    res = writer_rx.recv() => {
                        stream_write(res, session, &mut write).await
                    },
                    res = read.next() => {
                        stream_read(res, session, &reader_tx).await
                    },
                } {
                    if writer_rx.is_closed() || reader_tx.is_closed() {
                        error!("unrecoverable error: {err:?}");
                        break 'main;
                    } else {
                        error!("{err:?}");
                        break;
                    }
                }
            }
            warn!("server disconnected, retries in {} seconds", RECONNECT_DELAY.as_secs());
            tokio::select! {
                _ = notify_shutdown.recv() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
        debug!("[stream] async thread shutdown");
    });

    (writer_tx, reader_rx, handle)
}

type StreamWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// receive the command and sent to server
async fn stream_write(
    data: Option<StreamCommand>,
    current: u64,
    ws_tx: &mut StreamWriter,
) -> anyhow::Result<()> {
    match data {
        None => anyhow::bail!("command channel closed"),
        Some(StreamCommand::Send { session, frame }) => {
            if session != current {
                warn!("dropping {frame} from stale session {session}");
                return Ok(());
            }
            let bytes = frame.encode()?;
            let text = String::from_utf8(bytes.to_vec())?;
            ws_tx
                .send(Message::Text(text.into()))
                .await
                .map_err(|err| anyhow::anyhow!("ws disconnection: {err:?}"))
        }
    }
}

/// read data from stream and use the channel send to stream process
async fn stream_read(
    data: Option<Result<Message, tungstenite::Error>>,
    session: u64,
    tx: &mpsc::Sender<StreamMessage>,
) -> anyhow::Result<()> {
    let frame = match data {
        None => anyhow::bail!("ws disconnection"),
        Some(Err(err)) => anyhow::bail!(err.to_string()),
        Some(Ok(Message::Text(text))) => Frame::decode(text.as_bytes()),
        Some(Ok(Message::Binary(bin))) => Frame::decode(&bin),
        Some(Ok(Message::Close(reason))) => anyhow::bail!("server closed the session: {reason:?}"),
        Some(Ok(_)) => return Ok(()),
    };
    match frame {
        Ok(work) if work.kind == MessageType::Request => {
            if tx.send(StreamMessage::Work { session, work }).await.is_err() {
                anyhow::bail!("message channel closed")
            }
        }
        Ok(other) => warn!("unexpected message from server: {other}"),
        Err(err) => warn!("dropped frame: {err}"),
    }
    Ok(())
}
