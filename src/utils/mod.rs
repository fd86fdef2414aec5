//! Utility modules for the m3u-slim application
//!
//! Reusable collaborators around the filtering core: HTTP retrieval with a
//! streaming byte ceiling, magic-byte decompression, XMLTV timestamp parsing,
//! and URL redaction for logs.

pub mod decompression;
pub mod http_client;
pub mod time;
pub mod url;

pub use decompression::{CompressionFormat, DecompressionService};
pub use http_client::StandardHttpClient;
pub use url::UrlUtils;
