pub mod backoff;
pub mod diff;
pub mod engine;
pub mod icon_store;
pub mod obsolete;
pub mod paths;
pub mod snapshot;
pub mod source;
pub mod stats;
