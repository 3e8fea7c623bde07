//! Pipeline actors
//!
//! Each actor runs as an independent tokio task. Pollers produce into two
//! shared streams; one flusher per stream drains it into storage.
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌──────────┐   ┌──────────┐         ┌──────────┐
//!   │ Poller 1 │   │ Poller 2 │   ...   │ Poller N │
//!   └────┬─────┘   └────┬─────┘         └────┬─────┘
//!        │ Success / Failure                 │
//!        ├──────────────┴────────────────────┤
//!        ▼                                   ▼
//!  ┌───────────────┐                 ┌───────────────┐
//!  │ result stream │                 │ error stream  │
//!  └───────┬───────┘                 └───────┬───────┘
//!          │ drain every period              │
//!  ┌───────▼───────┐                 ┌───────▼───────┐
//!  │ FlusherActor  │                 │ FlusherActor  │
//!  └───────┬───────┘                 └───────┬───────┘
//!          └────────────┐       ┌────────────┘
//!                    ┌──▼───────▼──┐
//!                    │   Storage   │
//!                    └─────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **PollerActor**: Fetches one target forever on a self-correcting cadence
//! - **FlusherActor**: Drains one stream on a fixed period and persists the batch

pub mod flusher;
pub mod poller;

pub use flusher::{FlushFailurePolicy, FlusherActor};
pub use poller::{PollerActor, next_sleep};
