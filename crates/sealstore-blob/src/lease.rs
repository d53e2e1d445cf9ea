//! Scoped lease handle for exclusive, advisory location locks.

use crate::location::Location;

/// Hook relinquishing the lease, fired exactly once.
pub type LeaseReleaseHook = Box<dyn FnOnce() + Send>;

/// An acquired lease on a location.
///
/// The lease is relinquished when the handle is dropped or released
/// explicitly. The handle owns nothing but the lease token and the
/// release hook.
pub struct Lease {
    location: Location,
    token: String,
    release: Option<LeaseReleaseHook>,
}

impl Lease {
    /// Wrap an acquired lease. Backends construct this from `lock`.
    pub fn new(location: Location, token: impl Into<String>, release: LeaseReleaseHook) -> Self {
        Self {
            location,
            token: token.into(),
            release: Some(release),
        }
    }

    /// The leased location.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// The backend-issued lease token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Relinquish the lease now.
    pub fn release(mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("location", &self.location)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
