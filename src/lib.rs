pub mod auth;
pub mod config;
pub mod cost;
pub mod decompress;
pub mod extproc;
pub mod llm;
pub mod proto;
pub mod router;
pub mod selector;
pub mod serdes;
pub mod signal;
pub mod strng;
pub mod telemetry;

pub use std::collections::HashMap;
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};

pub use bytes::Bytes;
pub use tracing::{debug, error, info, trace, warn};

pub use crate::strng::Strng;
