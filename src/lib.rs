//! # Prompt Relay
//!
//! Watches editor workspace storage for changes to state databases, pulls
//! newly written prompt history out of them, and relays each prompt once to a
//! remote collector.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  write   ┌────────┐  claim  ┌───────────┐
//! │  notify   │─────────▶│Dispatch│────────▶│  Extract  │
//! │ (recursive│  events  │  loop  │         │ (SQLite)  │
//! └───────────┘          └────────┘         └─────┬─────┘
//!                                                 ▼
//!          ┌────────┐   ┌─────────┐   ┌──────┐   ┌──────┐
//!          │ commit │◀──│ upload  │◀──│ git  │◀──│dedup │
//!          │  hash  │   │ (HTTP)  │   │      │   │check │
//!          └────────┘   └─────────┘   └──────┘   └──────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! prelay init                   # create the state database
//! prelay key set <API_KEY>      # validate and store the API key
//! prelay watch                  # relay prompts until Ctrl-C
//! prelay scan path/to/state.vscdb
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment selection |
//! | [`logging`] | Injected logging capability and subscriber setup |
//! | [`models`] | Record types and content hashing |
//! | [`db`] | State database connection |
//! | [`migrate`] | Schema creation |
//! | [`store`] | API key setting and dedup history |
//! | [`guard`] | Single-flight claims per file |
//! | [`extract`] | Heuristic prompt extraction |
//! | [`git`] | Repository metadata lookup |
//! | [`upload`] | HTTP relay and API key validation |
//! | [`watch`] | Recursive directory watching |
//! | [`ingest`] | Per-pass relay pipeline |
//! | [`session`] | Watch session lifecycle |

pub mod config;
pub mod db;
pub mod extract;
pub mod git;
pub mod guard;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod session;
pub mod store;
pub mod upload;
pub mod watch;
