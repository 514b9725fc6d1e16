use std::{env, fs::OpenOptions, path::Path, sync::Mutex};

use anyhow::Context;
use tracing_subscriber::{
    fmt::{format, time::ChronoLocal},
    EnvFilter,
};

/// Installs the global subscriber. With `log_file` set, events are appended to
/// that file instead of stderr.
pub fn init_log(directive: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let format = format::format()
        .with_level(true)
        .with_target(false)
        .with_timer(ChronoLocal::new("[%m-%d %H:%M:%S%.3f]".to_string()))
        .compact();

    let env_filter = build_filter(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), directive)?;

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).event_format(format);

    match log_file {
        None => builder.try_init(),
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
    }
    .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))
}

/// A valid `RUST_LOG` wins outright. Otherwise `info` plus the crate's own
/// `directive` applies.
fn build_filter(from_env: Option<&str>, directive: &str) -> anyhow::Result<EnvFilter> {
    if let Some(Ok(filter)) = from_env.map(EnvFilter::try_new) {
        return Ok(filter);
    }
    EnvFilter::try_new(format!("info,{directive}")).context("invalid log directive")
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn env_raises_verbosity() {
        let filter = build_filter(Some("server=debug"), "server=info").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn defaults_without_env() {
        let filter = build_filter(None, "server=info").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn unparsable_env_falls_back() {
        let filter = build_filter(Some("server=loud"), "server=info").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn bad_directive_is_an_error() {
        assert!(build_filter(None, "server=loud").is_err());
    }
}
