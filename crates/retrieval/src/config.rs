use ashguard_knowledge::{ArtifactPaths, BuildConfig, SourceList};
use ashguard_vector_store::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When the knowledge base is loaded or built relative to `RetrievalService::start`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStrategy {
    /// `start` waits for initialization
    Eager,
    /// Nothing happens until the first `retrieve`
    Lazy,
    /// `start` spawns initialization and returns
    #[default]
    Background,
}

impl InitStrategy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "eager" => Some(Self::Eager),
            "lazy" | "on_demand" | "on-demand" => Some(Self::Lazy),
            "background" => Some(Self::Background),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub sources: Vec<String>,
    pub init_strategy: InitStrategy,
    pub default_k: usize,
    pub build: BuildConfig,
    pub embedding: EmbeddingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sources: SourceList::builtin()
                .map(|list| list.urls)
                .unwrap_or_default(),
            init_strategy: InitStrategy::default(),
            default_k: 3,
            build: BuildConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl ServiceConfig {
    #[must_use]
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.data_dir)
    }
}
