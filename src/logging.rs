use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset. `TraceLayer` emits request spans at debug.
const DEFAULT_DIRECTIVES: &str = "info,tower_http=debug";

pub fn init() -> anyhow::Result<()> {
    let raw = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(raw.as_deref(), DEFAULT_DIRECTIVES)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn build_filter(raw: Option<&str>, default_directives: &str) -> anyhow::Result<EnvFilter> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid {}={directives:?}", EnvFilter::DEFAULT_ENV)),
        None => EnvFilter::try_new(default_directives).context("build default log filter"),
    }
}
