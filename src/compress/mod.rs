//! Lossy bounded compression
//!
//! Stored headers and bodies have a hard byte budget. Rather than dropping
//! anything that does not fit, the longest prefix whose compressed form fits
//! is kept, and the original size travels alongside as a sentinel.

mod lossy;

pub use lossy::{bisect_prefix, brotli_compress, compress_lossy, compress_with_sentinel};
