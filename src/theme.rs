// AutoFlow — Persisted colour theme preference

use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{}'", other)),
        }
    }
}

pub struct ThemeStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl ThemeStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    /// The saved theme, or light when nothing valid is stored.
    pub async fn load(&self) -> Theme {
        match self.kv.get(&self.key).await {
            Ok(Some(value)) => value.parse().unwrap_or_else(|e| {
                tracing::warn!(key = %self.key, "Ignoring stored theme: {}", e);
                Theme::default()
            }),
            Ok(None) => Theme::default(),
            Err(e) => {
                tracing::warn!(key = %self.key, "Failed to read theme: {}", e);
                Theme::default()
            }
        }
    }

    pub async fn save(&self, theme: Theme) {
        if let Err(e) = self.kv.set(&self.key, theme.as_str()).await {
            tracing::error!(key = %self.key, "Failed to save theme: {}", e);
        }
    }

    /// Flip the saved theme and return the new one.
    pub async fn toggle(&self) -> Theme {
        let next = self.load().await.toggled();
        self.save(next).await;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const KEY: &str = "autoflow-theme";

    #[tokio::test]
    async fn test_defaults_to_light() {
        let store = ThemeStore::new(Arc::new(MemoryStore::new()), KEY);
        assert_eq!(store.load().await, Theme::Light);
    }

    #[tokio::test]
    async fn test_toggle_persists() {
        let kv = MemoryStore::new();
        let store = ThemeStore::new(Arc::new(kv.clone()), KEY);

        assert_eq!(store.toggle().await, Theme::Dark);
        assert_eq!(kv.get(KEY).await.unwrap().as_deref(), Some("dark"));
        assert_eq!(store.toggle().await, Theme::Light);
    }

    #[tokio::test]
    async fn test_garbage_reads_as_light() {
        let kv = MemoryStore::new();
        kv.set(KEY, "purple").await.unwrap();

        let store = ThemeStore::new(Arc::new(kv), KEY);
        assert_eq!(store.load().await, Theme::Light);
    }
}
