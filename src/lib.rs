//! # ByteBrief
//!
//! Archive generated tweet threads into a single long-lived Google Doc.
//!
//! An external generation pipeline produces thread text. ByteBrief
//! normalizes it into labeled tweets, authenticates against Google on the
//! user's behalf, finds (or creates) the one canonical archive document, and
//! appends a timestamped entry to its end. Earlier entries are never touched.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌────────────┐   ┌──────────┐
//! │ Pipeline │──▶│ Formatter │──▶│  Resolver  │──▶│  Append  │
//! │ (stages) │   │ Tweet 1.. │   │ id/title/  │   │  Engine  │
//! └──────────┘   └───────────┘   │  create    │   └────┬─────┘
//!                                └─────┬──────┘        │
//!                                      ▼               ▼
//!                 ┌────────────┐  ┌─────────────────────────┐
//!                 │ Credential │─▶│  DocumentStore          │
//!                 │   Store    │  │  Google Docs / memory   │
//!                 └────────────┘  └─────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! bytebrief setup --test-entry          # consent + create the archive doc
//! bytebrief archive --file thread.txt   # append a thread
//! bytebrief run                         # generate with configured stages, then archive
//! bytebrief format --file thread.txt    # preview the normalized thread
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors per component |
//! | [`formatter`] | Thread text normalization |
//! | [`credential`] | Credential caching, refresh, and re-consent |
//! | [`oauth`] | Google OAuth token endpoint and loopback consent |
//! | [`store`] | Document store abstraction and in-memory store |
//! | [`google`] | Google Docs / Drive store |
//! | [`resolver`] | Canonical document resolution |
//! | [`append`] | Append-only writes |
//! | [`pipeline`] | External generation stages |
//! | [`archive`] | End-to-end orchestration |
//! | [`setup`] | First-run setup |

pub mod append;
pub mod archive;
pub mod config;
pub mod credential;
pub mod error;
pub mod formatter;
pub mod google;
pub mod models;
pub mod oauth;
pub mod pipeline;
pub mod resolver;
pub mod setup;
pub mod store;
