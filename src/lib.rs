//! Download the county's preliminary appraisal-roll export, unpack it, and
//! turn its appraisal-info extract into a single spreadsheet.
//!
//! The stages are usable on their own ([`fetch::fetch`], [`extract::extract`],
//! [`locate::find_by_suffix`], [`transcode::transcode`]) or chained by
//! [`pipeline::Pipeline`]. All of them block.

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod locate;
pub mod logging;
pub mod pipeline;
pub mod transcode;

pub use config::{RunConfig, Settings};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, RunReport};
