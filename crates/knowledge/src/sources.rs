use crate::{KnowledgeError, Result};
use serde::Deserialize;
use std::path::Path;

const BUILTIN_SOURCES: &str = include_str!("../../../config/sources.toml");

/// Source URLs to fetch, read from a `urls = [...]` TOML file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceList {
    pub urls: Vec<String>,
}

impl SourceList {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let list: Self = toml::from_str(raw)
            .map_err(|e| KnowledgeError::Other(format!("Invalid source list: {e}")))?;
        Ok(list.normalized())
    }

    /// The wildfire-health reference set shipped with the workspace
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_SOURCES)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&raw)
    }

    fn normalized(self) -> Self {
        let urls = self
            .urls
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        Self { urls }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sources_parse() {
        let list = SourceList::builtin().unwrap();
        assert!(list.urls.len() >= 40);
        assert!(list.urls.iter().all(|url| url.starts_with("https://")));
    }

    #[test]
    fn test_blank_entries_are_dropped() {
        let list = SourceList::from_toml_str(r#"urls = [" https://a.org ", ""]"#).unwrap();
        assert_eq!(list.urls, vec!["https://a.org".to_string()]);
        assert!(SourceList::from_toml_str("urls = 3").is_err());
    }
}
