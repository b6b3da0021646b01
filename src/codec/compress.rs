//! LZ4 block compression with a prepended size, so the decompressed length
//! travels inside the binary framing itself.

use crate::error::{CombError, Result};

pub fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| CombError::DeserializationFailure(format!("lz4 decompress: {e}")))
}
