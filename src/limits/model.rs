//! Limit model value types.

use serde::{Deserialize, Serialize};

/// A limit over a fixed number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitWindow {
    /// Maximum number of requests allowed within the window
    pub limit: u64,

    /// Window length in seconds
    pub seconds: u64,
}

impl LimitWindow {
    /// Create a new limit window.
    pub fn new(limit: u64, seconds: u64) -> Self {
        Self { limit, seconds }
    }

    /// A window is usable only when both the bound and the length are
    /// strictly positive.
    pub fn is_valid(&self) -> bool {
        self.limit > 0 && self.seconds > 0
    }
}

impl std::fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}s", self.limit, self.seconds)
    }
}

/// An ordered collection of limit windows.
///
/// Order is irrelevant to the verdict but kept stable so usage results come
/// back in a deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitGroup {
    #[serde(default)]
    pub windows: Vec<LimitWindow>,
}

impl LimitGroup {
    /// Create a group from a list of windows.
    pub fn new(windows: Vec<LimitWindow>) -> Self {
        Self { windows }
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// The two independent dimensions a request is checked against.
///
/// Either half may be absent, meaning no constraint in that dimension. The
/// optionality is always explicit; resolution functions never use a sentinel
/// value for "not configured".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Limits {
    /// Limits scoped to the invoked operation
    pub request: Option<LimitGroup>,

    /// Limits scoped to the caller, across all operations
    pub user: Option<LimitGroup>,
}

impl Limits {
    /// Total number of windows across both dimensions.
    pub fn window_count(&self) -> usize {
        let request = self.request.as_ref().map_or(0, |g| g.windows.len());
        let user = self.user.as_ref().map_or(0, |g| g.windows.len());
        request + user
    }
}

/// Whether a limit applies per-operation or per-caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Counted against the operation, across all callers
    Request,
    /// Counted against the caller, across all operations
    User,
}

/// Usage of a single evaluated window, as reported by the atomic procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUsage {
    /// The configured bound
    pub limit: u64,

    /// Window length in seconds
    pub seconds: u64,

    /// Counter value after this evaluation's increment
    pub current: u64,

    /// Which dimension the window belongs to
    pub scope: Scope,
}

impl WindowUsage {
    /// Whether this window's bound was respected.
    pub fn within_limit(&self) -> bool {
        self.current <= self.limit
    }
}

/// Overall verdict from the atomic procedure: whether access should be
/// granted, plus the per-window breakdown.
///
/// The `Default` value grants access with no usage detail; it is what the
/// engine returns when the store cannot be reached (fail-open).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResult {
    /// `true` when every evaluated window was within its bound
    pub access: bool,

    /// One entry per evaluated window, in the order the windows were supplied
    #[serde(default)]
    pub results: Vec<WindowUsage>,
}

impl Default for RateLimitResult {
    fn default() -> Self {
        Self {
            access: true,
            results: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_validity() {
        assert!(LimitWindow::new(10, 60).is_valid());
        assert!(!LimitWindow::new(0, 60).is_valid());
        assert!(!LimitWindow::new(10, 0).is_valid());
    }

    #[test]
    fn test_window_count() {
        let limits = Limits {
            request: Some(LimitGroup::new(vec![
                LimitWindow::new(10, 60),
                LimitWindow::new(30, 3600),
            ])),
            user: Some(LimitGroup::new(vec![LimitWindow::new(100, 86400)])),
        };

        assert_eq!(limits.window_count(), 3);
        assert_eq!(Limits::default().window_count(), 0);
    }

    #[test]
    fn test_scope_serialization() {
        assert_eq!(serde_json::to_string(&Scope::Request).unwrap(), "\"request\"");
        assert_eq!(serde_json::to_string(&Scope::User).unwrap(), "\"user\"");
    }

    #[test]
    fn test_default_result_is_fail_open() {
        let result = RateLimitResult::default();

        assert!(result.access);
        assert!(result.results.is_empty());
    }

    #[test]
    fn test_usage_within_limit() {
        let usage = WindowUsage {
            limit: 2,
            seconds: 60,
            current: 2,
            scope: Scope::Request,
        };
        assert!(usage.within_limit());

        let over = WindowUsage { current: 3, ..usage };
        assert!(!over.within_limit());
    }

    #[test]
    fn test_result_deserializes_from_procedure_payload() {
        let raw = r#"{"access":false,"results":[{"limit":2,"seconds":60,"current":3,"scope":"request"}]}"#;
        let result: RateLimitResult = serde_json::from_str(raw).unwrap();

        assert!(!result.access);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].current, 3);
        assert_eq!(result.results[0].scope, Scope::Request);
    }
}
