//! Layered configuration for the passage stores.
//!
//! Sources, later ones winning: `<dir>/config.toml`, `<dir>/config.<env>.toml`
//! (env taken from `RUST_ENV`), then `APP_*` variables with `__` as the
//! nesting separator. Typed sections (`chunking`, `vector`, `retrieval`) are
//! pulled out with [`Config::section`].

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

const DEFAULT_INDEX_DIR: &str = "passagedb-index";

pub struct Config {
    figment: Figment,
    base: PathBuf,
}

impl Config {
    /// Layered config rooted at the working directory.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&std::env::current_dir()?)
    }

    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let profile = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let overlay = match profile.as_str() {
            "dev" | "development" => Some("dev"),
            "prod" | "production" => Some("prod"),
            "test" | "testing" => Some("test"),
            other => {
                tracing::warn!(profile = other, "unrecognised RUST_ENV, skipping profile overlay");
                None
            }
        };

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        if let Some(overlay) = overlay {
            figment = figment.merge(Toml::file(dir.join(format!("config.{overlay}.toml"))));
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        tracing::debug!(dir = %dir.display(), profile = %profile, "loaded configuration");
        Ok(Self { figment, base: dir.to_path_buf() })
    }

    pub fn from_figment(figment: Figment, base: impl Into<PathBuf>) -> Self {
        Self { figment, base: base.into() }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<T> {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("config key '{key}': {e}"))
    }

    /// Like [`Config::get`], but a missing key yields `T::default()`.
    pub fn section<T: DeserializeOwned + Default>(&self, key: &str) -> anyhow::Result<T> {
        if self.figment.find_value(key).is_err() {
            return Ok(T::default());
        }
        self.get(key)
    }

    /// `index_dir`, expanded and resolved against the directory the config
    /// was loaded from.
    pub fn index_dir(&self) -> anyhow::Result<PathBuf> {
        let raw = if self.figment.find_value("index_dir").is_ok() {
            self.get::<String>("index_dir")?
        } else {
            DEFAULT_INDEX_DIR.to_string()
        };
        Ok(resolve_with_base(&self.base, raw))
    }
}

/// Expands `~` and `$VAR`/`${VAR}`. Unknown variables are left as written.
pub fn expand_path(input: impl AsRef<str>) -> PathBuf {
    let raw = input.as_ref();
    let with_vars = shellexpand::env(raw).unwrap_or(Cow::Borrowed(raw));
    PathBuf::from(shellexpand::tilde(&with_vars).into_owned())
}

pub fn resolve_with_base(base: &Path, path: impl AsRef<str>) -> PathBuf {
    let path = expand_path(path);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
