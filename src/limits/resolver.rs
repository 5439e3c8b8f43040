//! Limit resolution across sources.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::limits::keys::Identity;
use crate::limits::model::{LimitGroup, Limits, LimitWindow};
use crate::limits::source::LimitSource;

/// Resolves the combined limit set for an identity.
///
/// Every registered source is consulted; groups are concatenated per
/// dimension. A dimension counts as configured as soon as any source returns
/// a group for it, even an empty one. When no source configures the request
/// dimension, the built-in default group applies (if enabled). Resolution is
/// computed fresh per request and is idempotent for unchanged configuration.
pub struct LimitResolver {
    sources: Vec<Arc<dyn LimitSource>>,
    default_request: Option<LimitGroup>,
}

impl LimitResolver {
    /// Create a resolver over the given sources.
    ///
    /// `default_request` is the built-in request-scope fallback; `None`
    /// disables the fallback so unconfigured operations run unlimited.
    pub fn new(sources: Vec<Arc<dyn LimitSource>>, default_request: Option<LimitGroup>) -> Self {
        Self {
            sources,
            default_request,
        }
    }

    /// Resolve the combined limits for `identity`.
    pub fn resolve(&self, identity: &Identity) -> Limits {
        let mut request_windows: Vec<LimitWindow> = Vec::new();
        let mut user_windows: Vec<LimitWindow> = Vec::new();
        let mut request_configured = false;
        let mut user_configured = false;

        for source in &self.sources {
            let limits = source.limits(identity);

            if let Some(group) = limits.request {
                request_configured = true;
                request_windows.extend(group.windows);
            }
            if let Some(group) = limits.user {
                user_configured = true;
                user_windows.extend(group.windows);
            }
        }

        if !request_configured {
            if let Some(default) = &self.default_request {
                debug!(
                    operation = %identity.operation,
                    "No request-scope limits configured, applying defaults"
                );
                request_configured = true;
                request_windows.extend(default.windows.iter().copied());
            }
        }

        // User-scope counters are keyed on the caller id, so the dimension
        // cannot apply to an unidentified caller.
        if identity.caller.is_none() && user_configured {
            debug!(
                operation = %identity.operation,
                "Dropping user-scope limits for unidentified caller"
            );
            user_configured = false;
            user_windows.clear();
        }

        Limits {
            request: request_configured.then(|| LimitGroup::new(retain_valid(request_windows))),
            user: user_configured.then(|| LimitGroup::new(retain_valid(user_windows))),
        }
    }
}

fn retain_valid(windows: Vec<LimitWindow>) -> Vec<LimitWindow> {
    windows
        .into_iter()
        .filter(|w| {
            let valid = w.is_valid();
            if !valid {
                warn!(window = %w, "Discarding limit window with non-positive bound or length");
            }
            valid
        })
        .collect()
}
