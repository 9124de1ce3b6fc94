//! Route handlers

pub mod escalations;
pub mod preferences;
pub mod subjects;
pub mod telemetry;

/// Default page size for list endpoints
pub(crate) const DEFAULT_LIMIT: usize = 50;
/// Largest page a client may request
pub(crate) const MAX_LIMIT: usize = 1000;

pub(crate) fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}
