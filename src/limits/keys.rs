//! Config-key and counter-key generation.
//!
//! Key shapes, in precedence order:
//!
//! - request-scope config: `ss/lmt/<operation>/<caller>`, `ss/lmt/<operation>`,
//!   `ss/lmt/default`
//! - user-scope config: `ss/lmt/usr/<caller>`, `ss/lmt/usr/default`
//! - counters: `ss/cnt/<operation>/<seconds>`, `ss/cnt/usr/<caller>/<seconds>`
//!
//! Prefix and delimiter come from an explicit [`KeyConfig`] handed to the
//! generator at construction time.

use tracing::warn;

use crate::config::KeyConfig;
use crate::error::{Result, TurnstileError};
use crate::feature::RequestContext;
use crate::limits::model::Scope;

/// Token marking a limit configuration key.
const LIMIT_TOKEN: &str = "lmt";
/// Token marking a counter key.
const COUNTER_TOKEN: &str = "cnt";
/// Token marking the user-scope dimension.
const USER_TOKEN: &str = "usr";
/// Terminal segment for the global fallback keys.
const DEFAULT_TOKEN: &str = "default";

/// The identity a rate limit is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Canonical (lowercased) name of the invoked operation
    pub operation: String,

    /// Canonical (lowercased) caller id; absent when the caller could not be
    /// identified, in which case only request-scope keys are eligible
    pub caller: Option<String>,
}

/// Generates configuration and counter keys for a request.
#[derive(Debug, Clone)]
pub struct LimitKeyGenerator {
    config: KeyConfig,
}

impl LimitKeyGenerator {
    /// Create a generator with the given key configuration.
    pub fn new(config: KeyConfig) -> Self {
        Self { config }
    }

    /// Derive the canonical identity for a request.
    ///
    /// The operation id is the case-normalized operation name. The caller id
    /// comes from the authenticated session. When no authenticated session
    /// exists the outcome depends on `require_authentication`: `true` rejects
    /// the request with [`TurnstileError::Unauthenticated`], `false` yields an
    /// identity with no caller, restricting evaluation to request scope.
    pub fn resolve_identity(
        &self,
        request: &RequestContext,
        require_authentication: bool,
    ) -> Result<Identity> {
        let operation = request.operation_name.to_lowercase();

        let caller = request
            .session
            .as_ref()
            .filter(|s| s.authenticated)
            .map(|s| s.user_id.to_lowercase());

        if caller.is_none() && require_authentication {
            warn!(
                operation = %operation,
                "Unauthenticated caller rejected before rate limit evaluation"
            );
            return Err(TurnstileError::Unauthenticated(
                "You must be authenticated to access this service".to_string(),
            ));
        }

        Ok(Identity { operation, caller })
    }

    /// Config keys for the request-scope dimension, in precedence order.
    ///
    /// The (operation, caller) key is only eligible when the caller is known.
    pub fn config_keys_for_request(&self, identity: &Identity) -> Vec<String> {
        let mut keys = Vec::with_capacity(3);

        if let Some(caller) = &identity.caller {
            keys.push(self.generate(&[LIMIT_TOKEN, &identity.operation, caller]));
        }
        keys.push(self.generate(&[LIMIT_TOKEN, &identity.operation]));
        keys.push(self.generate(&[LIMIT_TOKEN, DEFAULT_TOKEN]));

        keys
    }

    /// Config keys for the user-scope dimension, in precedence order.
    ///
    /// Returns `None` when the caller is unidentified: user-scope lookup
    /// requires a known caller.
    pub fn config_keys_for_user(&self, identity: &Identity) -> Option<Vec<String>> {
        let caller = identity.caller.as_ref()?;

        Some(vec![
            self.generate(&[LIMIT_TOKEN, USER_TOKEN, caller]),
            self.generate(&[LIMIT_TOKEN, USER_TOKEN, DEFAULT_TOKEN]),
        ])
    }

    /// Counter key for one (identity, scope, window) triple.
    ///
    /// Request-scope counters are keyed on the operation id and shared by all
    /// callers of that operation; user-scope counters are keyed on the caller
    /// id across all operations.
    pub fn counter_key(&self, identity: &Identity, scope: Scope, seconds: u64) -> String {
        let seconds = seconds.to_string();
        match scope {
            Scope::Request => self.generate(&[COUNTER_TOKEN, &identity.operation, &seconds]),
            Scope::User => {
                // The resolver strips user-scope limits for anonymous callers,
                // so a caller is always present here.
                let caller = identity.caller.as_deref().unwrap_or(DEFAULT_TOKEN);
                self.generate(&[COUNTER_TOKEN, USER_TOKEN, caller, &seconds])
            }
        }
    }

    fn generate(&self, parts: &[&str]) -> String {
        let mut key = String::new();
        if !self.config.prefix.trim().is_empty() {
            key.push_str(&self.config.prefix);
            key.push_str(&self.config.delimiter);
        }
        key.push_str(&parts.join(&self.config.delimiter));
        key
    }
}

impl Default for LimitKeyGenerator {
    fn default() -> Self {
        Self::new(KeyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Session;

    fn identity(operation: &str, caller: Option<&str>) -> Identity {
        Identity {
            operation: operation.to_string(),
            caller: caller.map(str::to_string),
        }
    }

    #[test]
    fn test_request_keys_in_precedence_order() {
        let generator = LimitKeyGenerator::default();
        let keys = generator.config_keys_for_request(&identity("checkout", Some("u-42")));

        assert_eq!(
            keys,
            vec![
                "ss/lmt/checkout/u-42".to_string(),
                "ss/lmt/checkout".to_string(),
                "ss/lmt/default".to_string(),
            ]
        );
    }

    #[test]
    fn test_request_keys_without_caller_skip_combined_key() {
        let generator = LimitKeyGenerator::default();
        let keys = generator.config_keys_for_request(&identity("checkout", None));

        assert_eq!(
            keys,
            vec!["ss/lmt/checkout".to_string(), "ss/lmt/default".to_string()]
        );
    }

    #[test]
    fn test_user_keys_in_precedence_order() {
        let generator = LimitKeyGenerator::default();
        let keys = generator
            .config_keys_for_user(&identity("checkout", Some("u-42")))
            .unwrap();

        assert_eq!(
            keys,
            vec!["ss/lmt/usr/u-42".to_string(), "ss/lmt/usr/default".to_string()]
        );
    }

    #[test]
    fn test_user_keys_require_caller() {
        let generator = LimitKeyGenerator::default();

        assert!(generator.config_keys_for_user(&identity("checkout", None)).is_none());
    }

    #[test]
    fn test_counter_keys() {
        let generator = LimitKeyGenerator::default();
        let id = identity("checkout", Some("u-42"));

        assert_eq!(
            generator.counter_key(&id, Scope::Request, 60),
            "ss/cnt/checkout/60"
        );
        assert_eq!(
            generator.counter_key(&id, Scope::User, 3600),
            "ss/cnt/usr/u-42/3600"
        );
    }

    #[test]
    fn test_empty_prefix_omits_leading_delimiter() {
        let generator = LimitKeyGenerator::new(KeyConfig {
            prefix: String::new(),
            delimiter: ":".to_string(),
        });
        let keys = generator.config_keys_for_request(&identity("opname", Some("userid")));

        assert_eq!(
            keys,
            vec![
                "lmt:opname:userid".to_string(),
                "lmt:opname".to_string(),
                "lmt:default".to_string(),
            ]
        );
    }

    #[test]
    fn test_resolve_identity_normalizes_case() {
        let generator = LimitKeyGenerator::default();
        let request = RequestContext {
            operation_name: "CheckOut".to_string(),
            session: Some(Session {
                user_id: "U-42".to_string(),
                authenticated: true,
            }),
            correlation_id: None,
        };

        let identity = generator.resolve_identity(&request, true).unwrap();

        assert_eq!(identity.operation, "checkout");
        assert_eq!(identity.caller.as_deref(), Some("u-42"));
    }

    #[test]
    fn test_resolve_identity_rejects_unauthenticated() {
        let generator = LimitKeyGenerator::default();
        let request = RequestContext {
            operation_name: "checkout".to_string(),
            session: None,
            correlation_id: None,
        };

        let err = generator.resolve_identity(&request, true).unwrap_err();
        assert!(matches!(err, TurnstileError::Unauthenticated(_)));
    }

    #[test]
    fn test_resolve_identity_allows_anonymous_when_not_required() {
        let generator = LimitKeyGenerator::default();
        let request = RequestContext {
            operation_name: "checkout".to_string(),
            session: Some(Session {
                user_id: "u-42".to_string(),
                authenticated: false,
            }),
            correlation_id: None,
        };

        let identity = generator.resolve_identity(&request, false).unwrap();

        assert_eq!(identity.operation, "checkout");
        assert!(identity.caller.is_none());
    }
}
