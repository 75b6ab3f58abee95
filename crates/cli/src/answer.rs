use crate::providers::{LlmProvider, ProviderRequest};
use ashguard_retrieval::{RetrievalError, RetrievalService, RetrievedChunk};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

pub const DISCLAIMER: &str = "Note: I’m not a doctor or substitute for professional advice—contact an expert for definitive answers.";

#[derive(Error, Debug)]
pub enum AskError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("Answer generation failed: {0}")]
    Llm(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
}

/// Prompt sent to the LLM for `question` grounded on `chunks`
#[must_use]
pub fn build_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Using this info: {context}\nAnswer this question naturally: {question}\nInclude citations (e.g., 'Source: [URL]') and end with: '{DISCLAIMER}'"
    )
}

/// Distinct source URLs in retrieval order
#[must_use]
pub fn cited_sources(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|chunk| seen.insert(chunk.url.as_str()))
        .map(|chunk| chunk.url.clone())
        .collect()
}

#[must_use]
pub fn compose_answer(generated: &str, sources: &[String]) -> String {
    let source_lines = sources
        .iter()
        .map(|url| format!("Source: {url}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n\n{source_lines}\n{DISCLAIMER}", generated.trim_end())
}

/// Retrieval plus generation for one question
pub struct AnswerEngine {
    service: RetrievalService,
    llm: Arc<dyn LlmProvider>,
    k: usize,
    max_tokens: usize,
}

impl AnswerEngine {
    pub fn new(
        service: RetrievalService,
        llm: Arc<dyn LlmProvider>,
        k: usize,
        max_tokens: usize,
    ) -> Self {
        Self {
            service,
            llm,
            k,
            max_tokens,
        }
    }

    #[must_use]
    pub const fn service(&self) -> &RetrievalService {
        &self.service
    }

    pub async fn ask(&self, question: &str) -> Result<Answer, AskError> {
        let question = question.trim();
        let chunks = self.service.retrieve(question, self.k).await?;
        let sources = cited_sources(&chunks);
        let prompt = build_prompt(question, &chunks);

        let generated = self
            .llm
            .generate(&ProviderRequest {
                prompt: &prompt,
                max_tokens: self.max_tokens,
            })
            .await
            .map_err(|err| AskError::Llm(format!("{err:#}")))?;

        Ok(Answer {
            answer: compose_answer(&generated, &sources),
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(url: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: format!("{url}#0"),
            text: text.to_string(),
            url: url.to_string(),
            score: 0.5,
        }
    }

    #[test]
    fn test_prompt_layout() {
        let chunks = vec![
            chunk("https://a.org", "Ash can contain asbestos."),
            chunk("https://b.org", "Wear gloves."),
        ];
        let prompt = build_prompt("Is ash dangerous?", &chunks);
        assert!(prompt.starts_with(
            "Using this info: Ash can contain asbestos.\nWear gloves.\nAnswer this question naturally: Is ash dangerous?\n"
        ));
        assert!(prompt.ends_with(&format!("'{DISCLAIMER}'")));
    }

    #[test]
    fn test_sources_are_deduplicated_in_order() {
        let chunks = vec![
            chunk("https://b.org", "one"),
            chunk("https://a.org", "two"),
            chunk("https://b.org", "three"),
        ];
        assert_eq!(
            cited_sources(&chunks),
            vec!["https://b.org".to_string(), "https://a.org".to_string()]
        );
    }

    #[test]
    fn test_compose_answer() {
        let answer = compose_answer("Stay indoors.\n", &["https://a.org".to_string()]);
        assert_eq!(
            answer,
            format!("Stay indoors.\n\nSource: https://a.org\n{DISCLAIMER}")
        );
    }
}
