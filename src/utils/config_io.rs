use anyhow::Context;
use config::Config;
use serde::Deserialize;
use std::path::PathBuf;

/// Read and deserialize a config file; the format is taken from its extension.
pub fn load_cfg<T: for<'a> Deserialize<'a>>(path: impl AsRef<str>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let cfg = Config::builder()
        .add_source(config::File::from(PathBuf::from(path)))
        .build()
        .with_context(|| format!("failed to read config from {path}"))?;

    cfg.try_deserialize()
        .with_context(|| format!("failed to deserialize config from {path}"))
}
