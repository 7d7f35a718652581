mod common;

use std::time::Duration;

use ragline_core::error::BackendError;
use ragline_core::types::{Candidate, CompressionOutcome, Method};
use ragline_hybrid::compress::NO_OUTPUT;
use ragline_hybrid::{ContextCompressor, DocumentExpander, QueryExpander};

use common::{MemoryParents, ScriptedLlm};

const SECOND: Duration = Duration::from_secs(1);

fn candidate(id: &str, parent: Option<&str>) -> Candidate {
    Candidate {
        id: id.into(),
        text: format!("own text of {id}"),
        method: Method::Keyword,
        score: 1.0,
        embedding: None,
        parent_id: parent.map(String::from),
    }
}

#[tokio::test]
async fn expander_puts_the_original_first() {
    let llm = ScriptedLlm::new(|prompt| {
        assert!(prompt.contains("Write 2 different rephrasings"));
        Ok("- lazy loading explained\n- \"on-demand loading\"\n- a third one".into())
    });
    let expander = QueryExpander::new(llm.clone());
    let variants = expander.expand("what is lazy loading", 2, SECOND).await;
    assert_eq!(variants, vec!["what is lazy loading", "lazy loading explained", "on-demand loading"]);

    assert_eq!(expander.expand("q", 0, SECOND).await, vec!["q"]);
    assert_eq!(llm.calls(), 1, "zero variants needs no completion");
}

#[tokio::test]
async fn expander_falls_back_on_error_and_timeout() {
    let failing = QueryExpander::new(ScriptedLlm::new(|_| Err(BackendError::Unavailable("down".into()))));
    assert_eq!(failing.expand("q", 3, SECOND).await, vec!["q"]);

    let slow = QueryExpander::new(ScriptedLlm::slow(Duration::from_millis(300), |_| Ok("a\nb".into())));
    let err = slow.try_expand("q", 2, Duration::from_millis(10)).await.unwrap_err();
    assert_eq!(err, BackendError::Timeout(Duration::from_millis(10)));
}

#[tokio::test]
async fn document_expander_falls_back_to_chunk_text() {
    let expander = DocumentExpander::new(MemoryParents::failing_on(Some("p-B")));
    assert_eq!(expander.expand(&candidate("a", Some("p-A")), SECOND).await, "parent document A in full");
    assert_eq!(expander.expand(&candidate("b", Some("p-B")), SECOND).await, "own text of b");
    assert_eq!(expander.expand(&candidate("c", Some("p-missing")), SECOND).await, "own text of c");
    assert_eq!(expander.expand(&candidate("d", None), SECOND).await, "own text of d");
}

#[tokio::test]
async fn compressor_distinguishes_extracted_irrelevant_and_failed() {
    let compressor = ContextCompressor::new(ScriptedLlm::new(|prompt| {
        if prompt.contains("cats") {
            Ok(format!(" {NO_OUTPUT}\n"))
        } else if prompt.contains("flaky") {
            Err(BackendError::RateLimited("429".into()))
        } else {
            Ok("Lazy loading defers work.".into())
        }
    }));

    let kept = compressor
        .compress("lazy loading", "c1", "Lazy loading defers work. Unrelated sentence.", SECOND)
        .await
        .expect("relevant");
    assert_eq!(kept.source_id, "c1");
    assert_eq!(kept.text, "Lazy loading defers work.");
    assert_eq!(kept.outcome, CompressionOutcome::Extracted);

    assert_eq!(compressor.compress("lazy loading", "c2", "A note about cats.", SECOND).await, None);

    let unchanged = compressor.compress("lazy loading", "c3", "flaky passage", SECOND).await.expect("kept");
    assert_eq!(unchanged.text, "flaky passage");
    assert_eq!(unchanged.outcome, CompressionOutcome::Unchanged);
}
