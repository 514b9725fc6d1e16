use std::path::PathBuf;

use actix::{Actor, Addr};
use actix_web::{web, web::Path, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use anyhow::Context;
use cfg_if::cfg_if;
use clap::Parser;
use tracing::*;

use crate::{
    config::{load_config_file, ConfigFile, ServerConfig},
    manager::ManagerActor,
    session::SessionActor,
};

mod config;
mod manager;
mod scheduler;
mod session;

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
    #[arg(long, help = "Config the server listen port")]
    port: Option<u16>,

    #[arg(long, value_name = "NONCES", help = "Maximum number of nonces in one work unit")]
    chunk_size: Option<u64>,

    #[arg(long, value_name = "FILE", help = "JSON config file, command line values take precedence")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Write the log to this file instead of stderr")]
    log_file: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let file = match &args.config {
        Some(path) => load_config_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ConfigFile::default(),
    };
    let overrides =
        ConfigFile { port: args.port, chunk_size: args.chunk_size, log_file: args.log_file };
    let config = ServerConfig::resolve(file, overrides)?;

    shared::log::init_log("server=info", config.log_file.as_deref())?;

    info!("VERSION:{}", VERSION);

    let manager = ManagerActor::new(config.chunk_size).start();

    info!("listening on 0.0.0.0:{}", config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(manager.clone()))
            .route("/ws/{version}", web::get().to(session_endpoint))
    })
    .workers(4)
    .bind(("0.0.0.0", config.port))
    .with_context(|| format!("cannot bind port {}", config.port))?
    .run()
    .await?;

    Ok(())
}

async fn session_endpoint(
    req: HttpRequest,
    stream: web::Payload,
    path: Path<String>,
    manager: web::Data<Addr<ManagerActor>>,
) -> Result<HttpResponse, Error> {
    let version = path.into_inner();
    if version.ne(VERSION) {
        warn!("peer version {version} refused");
        Ok(HttpResponse::Forbidden().body("version mismatch"))
    } else {
        ws::start(SessionActor::new(manager.get_ref().clone()), &req, stream)
    }
}
