//! riskqa: grounded Q&A over financial risk documents.
//!
//! An HTTP service that answers questions against a locally built vector
//! index of risk documents (Basel; market, credit, liquidity, operational),
//! generating answers with inline citations and refusing to speculate when
//! the retrieved context is weak. The service also exposes the liveness and
//! readiness probes the container orchestrator polls.

pub mod config;
pub mod error;
pub mod http;
pub mod index;
pub mod llm;
pub mod middleware;
pub mod retrieval;
pub mod routes;
pub mod state;
pub mod tools;
