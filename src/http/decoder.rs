//! Response content decoding.

use crate::base::neterror::NetError;
use bytes::Bytes;
use http::HeaderMap;
use std::sync::Arc;

/// Decodes one `content-encoding` (e.g. `gzip`, `br`).
pub trait ContentDecoder: Send + Sync + 'static {
    /// The encoding token this decoder handles, lowercase.
    fn encoding(&self) -> &str;

    fn decode(&self, body: Bytes) -> Result<Bytes, NetError>;
}

/// Undo the encodings listed in `content-encoding`, last applied first.
///
/// Encodings without a matching decoder leave the body as is; `identity`
/// is always skipped.
pub fn decode_body(
    headers: &HeaderMap,
    decoders: &[Arc<dyn ContentDecoder>],
    mut body: Bytes,
) -> Result<Bytes, NetError> {
    let Some(value) = headers.get(http::header::CONTENT_ENCODING) else {
        return Ok(body);
    };
    let value = value.to_str().map_err(|_| NetError::ContentDecodingFailed)?;

    for encoding in value.rsplit(',').map(|e| e.trim().to_ascii_lowercase()) {
        if encoding.is_empty() || encoding == "identity" {
            continue;
        }
        match decoders.iter().find(|d| d.encoding().eq_ignore_ascii_case(&encoding)) {
            Some(decoder) => body = decoder.decode(body)?,
            None => {
                tracing::trace!(encoding = %encoding, "no decoder, leaving body encoded");
                break;
            }
        }
    }
    Ok(body)
}
