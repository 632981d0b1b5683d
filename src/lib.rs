//! Document-grounded desktop assistant core: page-aware extraction, cited
//! retrieval, rule-based routing and specialist dispatch.

pub mod agents;
pub mod citations;
pub mod config;
pub mod documents;
pub mod error;
pub mod llm_client;
pub mod orchestrator;
