//! Wire-facing structured error: a tagged, uniquely-identified error that
//! crosses the transport as `(id, code, message)` and carries an origin
//! site (`LineOfCode`) for local diagnosis only.
//!
//! Two helpers exist for a reason: [`StructuredError::new`] captures the
//! *caller's* source location (depth one) so that core-synthesized errors
//! (encode/decode/transport failures) point at the call site that raised
//! them, not at a shared helper buried in this module.

use std::fmt;
use std::panic::Location;

use uuid::Uuid;

/// Reserved codes the core itself uses to tag failures it synthesizes.
/// All other codes are user-defined.
pub mod codes {
    pub const ORION_ENCODE: &str = "ORION_ENCODE";
    pub const ORION_TRANSPORT: &str = "ORION_TRANSPORT";
    pub const ORION_DECODE: &str = "ORION_DECODE";
    pub const ORION_PANIC: &str = "ORION_PANIC";
    /// Used by the status endpoint when the health summary is non-empty.
    pub const CRIT: &str = "CRIT";
}

/// File + line of the site that raised a [`StructuredError`].
///
/// Never transmitted to the caller in codec output; it exists purely to
/// help whoever is staring at a log line find the originating code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineOfCode {
    pub file: &'static str,
    pub line: u32,
}

impl LineOfCode {
    pub fn here(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for LineOfCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A tagged error with a stable `code`, a human `message`, a fresh `id`
/// unique per instance, and the `loc` it originated from.
///
/// # Why
/// Every failure that can reach a caller — ours or a handler's — needs to
/// be both machine-triageable (`code`) and traceable back to the exact line
/// that raised it (`loc`), without forcing every collaborator in this crate
/// to agree on one Rust error type. A flat tagged struct crosses the codec
/// boundary cleanly; a `Box<dyn Error>` tree would not.
///
/// # How
/// Construction and mutation are builder-style (`with_message`, `new_at`,
/// `set_line_of_code`) so call sites can attach context inline without an
/// intermediate local. `id` is stamped once at construction via `uuid::new_v4`
/// and never recomputed.
///
/// # Contract
/// - Equality is by `id` only: two `StructuredError`s built from identical
///   code/message are still distinct errors, matching the wire invariant
///   that every error instance is unique even if its text repeats.
/// - `loc` never crosses the wire; only `(id, code, message)` does.
///
/// # Trade-offs
/// Carrying `loc` on every instance costs one `&'static str` + `u32`, which
/// is cheap; the real cost is `#[track_caller]` forcing every constructor
/// that wants an accurate site to avoid an extra indirection layer.
#[derive(Clone, Debug)]
pub struct StructuredError {
    id: Uuid,
    code: String,
    message: String,
    loc: LineOfCode,
}

impl StructuredError {
    /// Build a new error, capturing the caller's file+line as its origin
    /// site. Use [`StructuredError::new_at`] to attach a different site
    /// (e.g. when a helper re-raises on behalf of another call site).
    #[track_caller]
    pub fn new(code: impl Into<String>) -> Self {
        Self::new_at(code, LineOfCode::here(Location::caller()))
    }

    pub fn new_at(code: impl Into<String>, loc: LineOfCode) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            message: String::new(),
            loc,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn set_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = message.into();
        self
    }

    pub fn set_line_of_code(&mut self, loc: LineOfCode) -> &mut Self {
        self.loc = loc;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn loc(&self) -> &LineOfCode {
        &self.loc
    }

    /// Rebuild an error received over the wire: `(id, code, message)` is all
    /// that ever crosses the transport, so `loc` is re-captured at the
    /// deserialization site rather than carried from the origin process.
    #[track_caller]
    pub fn from_wire(id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            message: message.into(),
            loc: LineOfCode::here(Location::caller()),
        }
    }
}

impl PartialEq for StructuredError {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for StructuredError {}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_across_a_bounded_sample() {
        let mut ids = std::collections::HashSet::new();
        for _ in 0..256 {
            let err = StructuredError::new(codes::ORION_DECODE);
            assert!(ids.insert(err.id()), "duplicate StructuredError id");
        }
    }

    #[test]
    fn equality_is_by_id_not_by_fields() {
        let a = StructuredError::new("X").with_message("boom");
        let b = StructuredError::new("X").with_message("boom");
        assert_ne!(a, b);
        let c = a.clone();
        assert_eq!(a, c);
    }

    #[test]
    fn new_captures_caller_site() {
        let err = StructuredError::new(codes::ORION_ENCODE);
        assert!(err.loc().file.ends_with("error.rs"));
    }
}
