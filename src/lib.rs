//! # CFA Question Generator
//!
//! Generates CFA-style multiple-choice exam questions grounded in the
//! study material of one of the 10 CFA topic areas.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │ Topic dirs │──▶│ Ingest + │──▶│ Retriever │──▶│  Prompt  │──▶│   LLM    │
//! │ PDF / text │   │  Chunk   │   │ vec/local │   │ Builder  │   │  client  │
//! └────────────┘   └──────────┘   └───────────┘   └──────────┘   └────┬─────┘
//!                                                                     │
//!                    ┌──────────┐   ┌───────────┐   ┌───────────┐     │
//!                    │  SQLite  │◀──│   Batch   │◀──│ Validator │◀────┘
//!                    │  store   │   │ attempts  │   └───────────┘
//!                    └──────────┘   └─────┬─────┘
//!                                         │
//!                               ┌─────────┴────────┐
//!                               ▼                  ▼
//!                          ┌──────────┐      ┌──────────┐
//!                          │   CLI    │      │   HTTP   │
//!                          │  (qgen)  │      │   API    │
//!                          └──────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! qgen init
//! qgen topics
//! qgen generate --topic "Fixed Income" --difficulty intermediate --count 3
//! qgen serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Core domain types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF and text extraction |
//! | [`ingest`] | Topic folders and document loading |
//! | [`chunk`] | Paragraph chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector indexes over chunks |
//! | [`retrieve`] | Context retrieval (vector or local sample) |
//! | [`prompt`] | Prompt construction |
//! | [`generate`] | Completion service client |
//! | [`validate`] | Model output validation |
//! | [`batch`] | Batch orchestration |
//! | [`store`] | Question persistence |
//! | [`pipeline`] | Composition root |
//! | [`commands`] | CLI command implementations |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod batch;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod server;
pub mod store;
pub mod validate;
