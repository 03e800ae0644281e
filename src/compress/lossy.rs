use std::io::{self, Write};

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 11;
const BROTLI_LG_WINDOW: u32 = 22;

/// Compresses a complete buffer into a finished brotli stream
pub fn brotli_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut writer = brotli::CompressorWriter::new(
        Vec::new(),
        BROTLI_BUFFER_SIZE,
        BROTLI_QUALITY,
        BROTLI_LG_WINDOW,
    );
    writer.write_all(data)?;
    Ok(writer.into_inner())
}

/// Finds a prefix of `data` whose compressed form fits into `max_length`
///
/// Compressed size is not monotonic in input length, so this does not look
/// for the longest fitting prefix. It bisects over prefix lengths: `safe_len`
/// is the longest prefix confirmed to fit, `unsafe_len` the shortest confirmed
/// not to. The caller must already know that all of `data` does not fit, and
/// the compression of the empty input must fit.
///
/// The returned bytes are exactly `compress(&data[..safe_len])` for the final
/// `safe_len`, so the result is fully determined by the compressor.
pub fn bisect_prefix<F, E>(data: &[u8], max_length: usize, mut compress: F) -> Result<Vec<u8>, E>
where
    F: FnMut(&[u8]) -> Result<Vec<u8>, E>,
{
    let mut safe_len = 0;
    let mut unsafe_len = data.len();
    let mut compressed = compress(&[])?;

    while unsafe_len > safe_len + 1 {
        // unsafe_len - safe_len >= 2 here, so the midpoint is strictly between both
        let candidate_len = (safe_len + unsafe_len) / 2;
        let candidate = compress(&data[..candidate_len])?;
        if candidate.len() <= max_length {
            safe_len = candidate_len;
            compressed = candidate;
        } else {
            unsafe_len = candidate_len;
        }
    }

    Ok(compressed)
}

/// Compresses `data` into at most `max_length` bytes, dropping a suffix if
/// needed
///
/// The output always decompresses to a prefix of `data`. If the whole input
/// fits, nothing is dropped.
pub fn compress_lossy(data: &[u8], max_length: usize) -> io::Result<Vec<u8>> {
    let full = brotli_compress(data)?;
    if full.len() <= max_length {
        return Ok(full);
    }

    let compressed = bisect_prefix(data, max_length, brotli_compress)?;
    tracing::debug!(
        "Compressed {} bytes lossily into {} bytes (budget {})",
        data.len(),
        compressed.len(),
        max_length
    );
    Ok(compressed)
}

/// Compresses received bytes and encodes the observed size as a sentinel
///
/// `data` is what was retained, `observed_size` how many bytes were seen in
/// total. The returned size is `observed_size` when exact and
/// `-observed_size` when the transfer was cut off.
pub fn compress_with_sentinel(
    data: &[u8],
    observed_size: u64,
    truncated: bool,
    max_length: usize,
) -> io::Result<(Vec<u8>, i64)> {
    debug_assert!(observed_size >= data.len() as u64);
    debug_assert!(!truncated || observed_size > 0);

    let size = i64::try_from(observed_size).unwrap_or(i64::MAX);
    let orig_size = if truncated { -size } else { size };
    Ok((compress_lossy(data, max_length)?, orig_size))
}
