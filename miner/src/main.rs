use anyhow::Context;
use cfg_if::cfg_if;
use clap::Parser;
use shared::Message;
use tokio::{signal, sync::broadcast};
use tracing::*;
use url::Url;

use crate::stream::{StreamCommand, StreamMessage};

mod search;
mod stream;

cfg_if! {
    if #[cfg(feature = "build-version")] {
        include!(concat!(env!("OUT_DIR"), "/version.rs"));
    } else {
        pub const VERSION: &str = "unknown";
    }
}

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    #[arg(long, value_name = "SERVER_HOST", help = "Coordinator host, e.g. 127.0.0.1:8080")]
    host: String,

    #[arg(
        long,
        value_name = "CORES_COUNT",
        help = "The number of CPU cores to allocate to searching",
        global = true
    )]
    cores: Option<usize>,

    #[arg(long, value_name = "RECONNECT", help = "The number of reconnect times", global = true)]
    reconnect: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shared::log::init_log("miner=info", None)?;

    let args = Args::parse();
    let max_retry = args.reconnect.unwrap_or(10);
    let cores = args.cores.unwrap_or_else(num_cpus::get).max(1);
    let url = Url::parse(&format!("ws://{}/ws/{}", args.host, VERSION))
        .with_context(|| format!("invalid host {}", args.host))?;

    info!("Miner Starting... Threads: {cores}, server: {url}");

    let (notify_shutdown, _) = broadcast::channel(1);
    let (tx, mut rx, stream_task) =
        stream::new_subscribe(url.to_string(), max_retry, notify_shutdown.subscribe());

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutting down");
                notify_shutdown.send(()).ok();
                break;
            }
            msg = rx.recv() => match msg {
                None => {
                    error!("connection to the server is gone");
                    break;
                }
                Some(StreamMessage::Connected { session }) => {
                    let cmd = StreamCommand::Send { session, frame: Message::join() };
                    if tx.send(cmd).await.is_err() {
                        break;
                    }
                }
                Some(StreamMessage::Work { session, work }) => {
                    info!("work: `{}` {}..{}", work.data, work.lower, work.upper);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let found = tokio::task::spawn_blocking(move || {
                            search::parallel_search(&work.data, work.lower..work.upper, cores)
                        })
                        .await;
                        let frame = match found {
                            Ok(Some((hash, nonce))) => Message::result(hash, nonce),
                            Ok(None) => Message::result(u64::MAX, u64::MAX),
                            Err(err) => {
                                error!("search task failed: {err}");
                                return;
                            }
                        };
                        debug!("result {frame}");
                        tx.send(StreamCommand::Send { session, frame }).await.ok();
                    });
                }
            }
        }
    }

    // let the stream send its close frame before the runtime goes away
    drop(rx);
    if let Err(err) = stream_task.await {
        error!("stream task failed: {err}");
    }
    Ok(())
}
