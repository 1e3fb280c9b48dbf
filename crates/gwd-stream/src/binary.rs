//! Per-chunk binary redaction (spec §4.7 step 5): a chunk that looks like
//! binary data above `binary_threshold` bytes is replaced with a short hex
//! preview marker rather than forwarded raw, so a child that briefly writes
//! non-text output doesn't blow up the wire payload or break framing.

/// Default threshold above which a non-UTF-8 chunk is redacted rather than
/// forwarded as-is. Not set in spec §6's environment table (it only covers
/// cross-process tunables); kept as an internal constant here.
pub const DEFAULT_BINARY_THRESHOLD: usize = 4096;

/// If `payload` is not valid UTF-8 and exceeds `threshold` bytes, replace it
/// with a short textual marker carrying a hex preview of the first few
/// bytes plus the elided length. Otherwise return it unchanged.
pub fn redact_if_binary(payload: Vec<u8>, threshold: usize) -> (Vec<u8>, bool) {
    if payload.len() <= threshold || std::str::from_utf8(&payload).is_ok() {
        return (payload, false);
    }

    let preview_len = payload.len().min(8);
    let hex_preview = payload[..preview_len]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();
    let marker = format!(
        "<binary data: {} bytes elided, preview {hex_preview}>",
        payload.len()
    );
    (marker.into_bytes(), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_binary_chunk_passes_through() {
        let payload = vec![0xff, 0xfe, 0x00];
        let (out, truncated) = redact_if_binary(payload.clone(), 4096);
        assert_eq!(out, payload);
        assert!(!truncated);
    }

    #[test]
    fn valid_utf8_never_redacted_regardless_of_size() {
        let payload = "x".repeat(10_000).into_bytes();
        let (out, truncated) = redact_if_binary(payload.clone(), 100);
        assert_eq!(out, payload);
        assert!(!truncated);
    }

    #[test]
    fn large_binary_chunk_is_redacted_with_hex_preview() {
        let payload = vec![0xffu8; 5000];
        let (out, truncated) = redact_if_binary(payload, 4096);
        assert!(truncated);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("5000 bytes elided"));
        assert!(text.contains("ffffffff"));
    }
}
