//! # Docsense
//!
//! A documentation knowledge engine for support assistants. Docsense crawls
//! a documentation site, splits it into structurally addressed chunks,
//! labels them against a fixed category taxonomy, and answers free-text
//! questions with ranked passages. A background scheduler re-crawls the
//! site periodically and swaps in the new index atomically, so queries are
//! never blocked or served a half-built index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │ Scraper  │──▶│  Chunk + Categorize  │──▶│   Snapshot    │
//! │ (reqwest)│   │  + Embed + Index     │   │  (ArcSwap)    │
//! └──────────┘   └──────────────────────┘   └──────┬───────┘
//!       ▲                                          │
//!       │ RefreshScheduler                ┌────────┴────────┐
//!       │ (interval / on demand)          ▼                 ▼
//!                                    ┌──────────┐     ┌──────────┐
//!                                    │   CLI    │     │   HTTP   │
//!                                    │   (kb)   │     │  (axum)  │
//!                                    └──────────┘     └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`scraper`] | Breadth-first crawler and HTML extraction |
//! | [`embedding`] | Embedding provider selection (hash, OpenAI) |
//! | [`pipeline`] | Scrape → chunk → categorize → index stages |
//! | [`refresh`] | Refresh scheduler and atomic publication |
//! | [`knowledge`] | Wiring from configuration |
//! | [`stats`] | JSON-lines query log |
//! | [`server`] | HTTP API |

pub mod config;
pub mod embedding;
pub mod knowledge;
pub mod pipeline;
pub mod refresh;
pub mod scraper;
pub mod server;
pub mod stats;

pub use docsense_core as core;
