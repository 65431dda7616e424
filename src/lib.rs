//! Maintenance tools for the static photo gallery site.
//!
//! - `batch` + `convert`: thumbnail generator and image optimizer
//! - `server` + `stats_proxy`: local preview server with the marketplace stats route
//!
//! The three units share nothing at runtime except `config`.

pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod server;
pub mod stats_proxy;
pub mod summary;

pub use config::{BatchCfg, BatchKind, BoundingBox, FolderJob, GalleryCfg, ResizePolicy, ServerCfg, StatsProxyCfg};
pub use convert::ConversionOutcome;
pub use summary::{BatchReport, FolderSummary};
