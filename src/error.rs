//! Error taxonomy for the client core, per the design's error handling policy.
//!
//! Nothing here is fatal to the process: callers either retry, degrade, or
//! receive a typed count of failures (see [`CoreError::Write`]).

use opcua::types::StatusCode;

/// Errors surfaced across the public API of this crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Endpoint selection or session creation failed. The outer [`crate::client_source`]
    /// loop retries this indefinitely after `reconnect_delay`.
    #[error("failed to connect: {0}")]
    Connect(StatusCode),

    /// A flush or direct write produced a mix of transient and permanent failures.
    /// Transient entries have already been re-enqueued onto the write queue by the
    /// time this is returned.
    #[error("write failed: {transient} transient, {permanent} permanent, {total} total")]
    Write {
        transient: usize,
        permanent: usize,
        total: usize,
    },

    /// Session or subscription disposal failed. Always best-effort: constructed,
    /// logged, and discarded, never propagated to a caller.
    #[error("disposal error: {0}")]
    Disposal(StatusCode),

    /// Configuration failed [`crate::config::ClientCoreConfig::validate`].
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl CoreError {
    /// True for errors a caller might reasonably retry without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Connect(_) | CoreError::Write { .. })
    }
}

/// Classification of a per-node bad status code returned from a batch write or
/// monitored-item creation, per §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Permanent,
}

/// Status codes considered permanent for monitored-item creation (§4.3, §4.4).
/// Never retried by the Health Monitor; items with these statuses are removed
/// by the Subscription Manager instead.
pub const PERMANENT_ITEM_STATUS_CODES: &[StatusCode] = &[
    StatusCode::BadNodeIdUnknown,
    StatusCode::BadAttributeIdInvalid,
    StatusCode::BadIndexRangeInvalid,
];

/// Status codes considered permanent for write operations (§7).
pub const PERMANENT_WRITE_STATUS_CODES: &[StatusCode] = &[
    StatusCode::BadWriteNotSupported,
    StatusCode::BadUserAccessDenied,
    StatusCode::BadNodeIdUnknown,
];

/// Classify a write result as transient or permanent, per §4.7/§7.
pub fn classify_write_status(status: StatusCode) -> FailureClass {
    if status.is_good() {
        return FailureClass::Transient;
    }
    if PERMANENT_WRITE_STATUS_CODES.contains(&status) {
        FailureClass::Permanent
    } else {
        FailureClass::Transient
    }
}

/// True if a monitored-item creation/health failure must not be retried (§4.3).
pub fn is_permanent_item_failure(status: StatusCode) -> bool {
    PERMANENT_ITEM_STATUS_CODES.contains(&status)
}
