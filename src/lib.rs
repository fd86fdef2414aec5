//! m3u-slim: filter an M3U playlist against category and channel-name rules,
//! then reduce the companion XMLTV guide to the channels and time window the
//! filtered playlist actually needs.
//!
//! The filtering core (`playlist`, `epg`) is pure: fully materialized strings
//! in, fully materialized strings out, with the clock injected explicitly.
//! Retrieval, decompression, configuration, and object-storage upload are
//! collaborators layered around it (`utils`, `config`, `storage`).

pub mod config;
pub mod epg;
pub mod errors;
pub mod models;
pub mod playlist;
pub mod storage;
pub mod utils;
