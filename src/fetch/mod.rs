//! Archive Fetcher: idempotent download of the remote export.

pub mod zips;

pub use zips::{default_client, fetch, FetchOutcome};
