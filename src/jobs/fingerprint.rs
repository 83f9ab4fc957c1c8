//! Request fingerprint for best-effort de-duplication.
//!
//! The hash covers the job kind, submitter, target references and the first
//! [`FINGERPRINT_TEXT_CHARS`] characters of the inline text. Requests that
//! differ only past that boundary hash alike; requests that differ inside the
//! hashed fields never do. Keep it that way: switching to an exact-match key
//! changes which submissions get reused.

use sha2::{Digest, Sha256};

use super::model::{JobKind, TargetRefs};

/// Inline text is truncated to this many characters before hashing.
pub const FINGERPRINT_TEXT_CHARS: usize = 4000;

/// Stable hex-encoded SHA-256 over a canonical JSON payload.
///
/// `serde_json::Map` keeps keys sorted, so the encoding is independent of
/// field order.
pub fn request_fingerprint(
    kind: JobKind,
    submitter_id: i64,
    targets: &TargetRefs,
    input_text: Option<&str>,
) -> String {
    let truncated: String = input_text
        .unwrap_or_default()
        .chars()
        .take(FINGERPRINT_TEXT_CHARS)
        .collect();

    let payload = serde_json::json!({
        "job_type": kind.as_str(),
        "submitter_id": submitter_id,
        "post_ref": targets.post_ref,
        "deal_ref": targets.deal_ref,
        "input_text": truncated,
    });

    hex::encode(Sha256::digest(payload.to_string().as_bytes()))
}
