//! Per-request deadlines.

use crate::clock::Timestamp;
use crate::config::Tunables;
use crate::request::RequestRecord;

/// Stamps `request` with `now` plus the expiry for its class.
///
/// Called once, when the request is queued. Later tunable changes do not
/// touch deadlines already assigned.
pub fn assign_deadline<T>(request: &mut RequestRecord<T>, now: Timestamp, tunables: &Tunables) {
    let expire = tunables.expiry(request.sync, request.direction);
    request.set_deadline(now.saturating_add(expire));
}

/// Returns true once `now` is strictly past the request's deadline.
#[inline]
pub fn is_expired<T>(request: &RequestRecord<T>, now: Timestamp) -> bool {
    now.is_after(request.deadline())
}
