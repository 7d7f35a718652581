//! ragline-remote
//!
//! HTTP clients for the model services the engine consults: a cross-encoder
//! reranking endpoint and an OpenAI-compatible chat completion endpoint.
//! Each client owns a pooled `reqwest::Client`; clone it to share the pool.
pub mod completion;
pub mod http;
pub mod rerank;

pub use completion::ChatCompletionClient;
pub use rerank::HttpReranker;
