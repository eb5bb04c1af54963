use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, or by `default_directive`
/// when `RUST_LOG` is unset. Returns `false` if a global subscriber was
/// already installed.
pub fn init(default_directive: &str) -> anyhow::Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)?,
    };
    Ok(tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init().is_ok())
}
