//! LLM query expansion: paraphrases of the user's query that broaden recall.
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use ragline_core::error::BackendError;
use ragline_core::traits::CompletionService;

/// Leading list markers the model tends to add: `1.`, `2)`, `-`, `*`, `•`.
static LIST_MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\s*(?:\d+\s*[.):]|[-*•])\s*").ok());

const QUOTES: &[char] = &['"', '\'', '`', '“', '”', '‘', '’'];

pub struct QueryExpander {
    llm: Arc<dyn CompletionService>,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self { llm }
    }

    pub fn prompt(query: &str, n: usize) -> String {
        format!(
            "You are helping a search engine find relevant documents.\n\
             Write {n} different rephrasings of the question below. Each rephrasing \
             should use different wording or take a different angle, so that together \
             they match documents the original wording would miss.\n\
             Answer with one rephrasing per line and nothing else.\n\n\
             Question: {query}"
        )
    }

    /// Original query followed by up to `n` distinct paraphrases. Errors when
    /// the completion call fails or exceeds `timeout`.
    pub async fn try_expand(&self, query: &str, n: usize, timeout: Duration) -> Result<Vec<String>, BackendError> {
        if n == 0 {
            return Ok(vec![query.to_string()]);
        }
        let reply = tokio::time::timeout(timeout, self.llm.complete(&Self::prompt(query, n)))
            .await
            .map_err(|_| BackendError::Timeout(timeout))??;
        let mut variants = vec![query.to_string()];
        variants.extend(parse_variants(&reply, query, n));
        debug!(requested = n, produced = variants.len() - 1, "query expanded");
        Ok(variants)
    }

    /// Like `try_expand`, but falls back to the original query alone.
    pub async fn expand(&self, query: &str, n: usize, timeout: Duration) -> Vec<String> {
        match self.try_expand(query, n, timeout).await {
            Ok(variants) => variants,
            Err(e) => {
                warn!(error = %e, "query expansion failed; using the original query only");
                vec![query.to_string()]
            }
        }
    }
}

fn clean_line(line: &str) -> &str {
    let line = line.trim();
    let stripped = match LIST_MARKER.as_ref().and_then(|re| re.find(line)) {
        Some(m) => &line[m.end()..],
        None => line,
    };
    stripped.trim().trim_matches(QUOTES).trim()
}

/// Paraphrases from a completion reply, one per line, without the original
/// and without case-insensitive repeats, at most `n`.
pub fn parse_variants(reply: &str, original: &str, n: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::from([original.trim().to_lowercase()]);
    reply
        .lines()
        .map(clean_line)
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(l.to_lowercase()))
        .take(n)
        .map(str::to_string)
        .collect()
}
