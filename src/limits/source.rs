//! Limit sources.
//!
//! A source maps an identity to the limits it knows about. Sources never fail:
//! missing configuration is an expected outcome, reported as `None` in the
//! affected dimension.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::limits::keys::{Identity, LimitKeyGenerator};
use crate::limits::model::{LimitGroup, Limits, LimitWindow, Scope};
use crate::settings::SettingsStore;

/// A provider of limits for an identity.
///
/// Several sources can be registered with the resolver; their groups are
/// concatenated per dimension, so a request may be subject to a declared
/// limit and a configured limit at the same time.
pub trait LimitSource: Send + Sync {
    /// The limits this source configures for `identity`.
    fn limits(&self, identity: &Identity) -> Limits;
}

/// Limits looked up from a layered settings store by key precedence.
///
/// For each dimension the candidate keys are walked in precedence order and
/// the first configured group wins; later keys are not consulted and groups
/// are never merged within one dimension.
pub struct SettingsLimitSource {
    settings: Arc<dyn SettingsStore>,
    keys: LimitKeyGenerator,
}

impl SettingsLimitSource {
    pub fn new(settings: Arc<dyn SettingsStore>, keys: LimitKeyGenerator) -> Self {
        Self { settings, keys }
    }

    fn first_match(&self, candidates: &[String]) -> Option<LimitGroup> {
        for key in candidates {
            if let Some(group) = self.settings.limit_group(key) {
                return Some(group);
            }
        }

        debug!(keys = ?candidates, "No matching config values found");
        None
    }
}

impl LimitSource for SettingsLimitSource {
    fn limits(&self, identity: &Identity) -> Limits {
        let request = self.first_match(&self.keys.config_keys_for_request(identity));
        let user = self
            .keys
            .config_keys_for_user(identity)
            .and_then(|candidates| self.first_match(&candidates));

        Limits { request, user }
    }
}

/// Limits declared in code, per operation.
///
/// This replaces call-site annotations with a registered map: the host
/// declares each operation's limits up front and the source serves them by
/// operation id. Declaring the same operation again appends to the existing
/// group rather than replacing it.
#[derive(Debug, Clone, Default)]
pub struct DeclaredLimits {
    operations: HashMap<String, Limits>,
}

impl DeclaredLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare one limit window for an operation in the given scope.
    pub fn declare(mut self, operation: &str, scope: Scope, window: LimitWindow) -> Self {
        let entry = self
            .operations
            .entry(operation.to_lowercase())
            .or_default();

        let group = match scope {
            Scope::Request => entry.request.get_or_insert_with(LimitGroup::default),
            Scope::User => entry.user.get_or_insert_with(LimitGroup::default),
        };
        group.windows.push(window);

        self
    }

    /// Declare an operation as explicitly unlimited in the request dimension.
    ///
    /// An empty group is still "configured", which suppresses the resolver's
    /// built-in default and short-circuits evaluation to an unconditional
    /// allow when no other source adds windows.
    pub fn declare_unlimited(mut self, operation: &str) -> Self {
        self.operations
            .entry(operation.to_lowercase())
            .or_default()
            .request
            .get_or_insert_with(LimitGroup::default);
        self
    }
}

impl LimitSource for DeclaredLimits {
    fn limits(&self, identity: &Identity) -> Limits {
        self.operations
            .get(&identity.operation)
            .cloned()
            .unwrap_or_default()
    }
}
