use anyhow::Context;
use cfg_if::cfg_if;
use clap::Parser;
use colored::Colorize;
use futures_util::{SinkExt, StreamExt};
use shared::{Message, MessageType};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::*;
use url::Url;

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

    #[arg(value_name = "MESSAGE", help = "The message to hash")]
    message: String,

    #[arg(long, default_value_t = 0, help = "First nonce of the search range")]
    lower: u64,

    #[arg(long, help = "End of the search range (exclusive)")]
    upper: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shared::log::init_log("client=info", None)?;

    let args = Args::parse();
    if args.lower > args.upper {
        anyhow::bail!("lower ({}) must not exceed upper ({})", args.lower, args.upper);
    }
    let url = Url::parse(&format!("ws://{}/ws/{}", args.host, VERSION))
        .with_context(|| format!("invalid host {}", args.host))?;

    let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .with_context(|| format!("fail to connect to {url}"))?;
    let (mut write, mut read) = stream.split();

    let request = Message::request(args.message, args.lower, args.upper);
    info!("send {request}");
    let frame = String::from_utf8(request.encode()?.to_vec())?;
    write.send(WsMessage::Text(frame.into())).await?;

    while let Some(msg) = read.next().await {
        let frame = match msg {
            Ok(WsMessage::Text(text)) => Message::decode(text.as_bytes()),
            Ok(WsMessage::Binary(bin)) => Message::decode(&bin),
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                error!("{err}");
                break;
            }
        };
        match frame {
            Ok(answer) if answer.kind == MessageType::Result => {
                println!("{} {} {}", "Result".bold().green(), answer.hash, answer.nonce);
                write.send(WsMessage::Close(None)).await.ok();
                return Ok(());
            }
            Ok(other) => warn!("unexpected message: {other}"),
            Err(err) => warn!("dropped frame: {err}"),
        }
    }

    println!("{}", "Disconnected".bold().red());
    Ok(())
}
