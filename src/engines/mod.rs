//! Concrete [`HttpEngine`](crate::engine::HttpEngine) implementations.
//!
//! Each engine sits behind a Cargo feature:
//!
//! | Feature          | Engine             |
//! |------------------|--------------------|
//! | `engine-reqwest` | [`ReqwestEngine`]  |
//!
//! # Example
//!
//! ```rust,ignore
//! use streamable_http_transport::{ReqwestEngine, StreamableHttpTransport, TransportConfig};
//!
//! let engine = ReqwestEngine::new()?;
//! let transport = StreamableHttpTransport::builder(TransportConfig::new("https://example.com"))
//!     .with_engine(engine)
//!     .build()?;
//! ```

#[cfg(feature = "engine-reqwest")]
pub mod reqwest;

#[cfg(feature = "engine-reqwest")]
pub use self::reqwest::ReqwestEngine;
