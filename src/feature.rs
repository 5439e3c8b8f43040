//! The per-request admission pipeline.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::config::TurnstileConfig;
use crate::engine::{CounterEngine, CounterStore};
use crate::error::Result;
use crate::headers::{decision_for, headers_for, Decision, RateLimitHeader};
use crate::limits::keys::LimitKeyGenerator;
use crate::limits::model::RateLimitResult;
use crate::limits::resolver::LimitResolver;
use crate::limits::source::{LimitSource, SettingsLimitSource};
use crate::settings::SettingsStore;

/// Authenticated-session state attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Stable id of the authenticated user
    pub user_id: String,

    /// Whether the session passed authentication
    pub authenticated: bool,
}

/// The slice of an inbound request the admission layer needs.
///
/// The host framework builds one of these per request at its interception
/// point; everything else about the request is irrelevant here.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Name of the invoked operation, in whatever casing the host uses
    pub operation_name: String,

    /// The caller's session, if one exists
    pub session: Option<Session>,

    /// Correlation id carried by the request, if any
    pub correlation_id: Option<String>,
}

impl RequestContext {
    /// A context for `operation` with an authenticated caller.
    pub fn authenticated(operation: &str, user_id: &str) -> Self {
        Self {
            operation_name: operation.to_string(),
            session: Some(Session {
                user_id: user_id.to_string(),
                authenticated: true,
            }),
            correlation_id: None,
        }
    }

    /// A context for `operation` with no session.
    pub fn anonymous(operation: &str) -> Self {
        Self {
            operation_name: operation.to_string(),
            session: None,
            correlation_id: None,
        }
    }
}

/// The outcome of one admission check.
#[derive(Debug, Clone)]
pub struct Admission {
    /// The raw verdict with per-window usage
    pub result: RateLimitResult,

    /// Response headers describing current usage, one per scope
    pub headers: Vec<RateLimitHeader>,

    /// Rejection override; `None` means the request proceeds
    pub decision: Option<Decision>,
}

impl Admission {
    /// Whether the request should proceed.
    pub fn allowed(&self) -> bool {
        self.result.access
    }
}

/// The admission-control entry point.
///
/// Wires identity resolution, limit resolution, and counter evaluation into
/// one call the host invokes before a request's business logic runs.
pub struct RateLimitFeature {
    config: TurnstileConfig,
    key_generator: LimitKeyGenerator,
    resolver: LimitResolver,
    engine: CounterEngine,
}

impl RateLimitFeature {
    /// Create a feature with the default source set: limits from the settings
    /// store, with the built-in fallback.
    pub fn new(
        config: TurnstileConfig,
        settings: Arc<dyn SettingsStore>,
        store: Arc<dyn CounterStore>,
    ) -> Self {
        let key_generator = LimitKeyGenerator::new(config.keys.clone());
        let sources: Vec<Arc<dyn LimitSource>> = vec![Arc::new(SettingsLimitSource::new(
            settings,
            key_generator.clone(),
        ))];

        Self::with_sources(config, store, sources)
    }

    /// Create a feature with an explicit source list, e.g. to add declared
    /// per-operation limits alongside the settings source.
    pub fn with_sources(
        config: TurnstileConfig,
        store: Arc<dyn CounterStore>,
        sources: Vec<Arc<dyn LimitSource>>,
    ) -> Self {
        let key_generator = LimitKeyGenerator::new(config.keys.clone());
        let resolver = LimitResolver::new(sources, config.defaults.group());
        let engine = CounterEngine::new(
            store,
            key_generator.clone(),
            std::time::Duration::from_millis(config.store.timeout_ms),
        );

        Self {
            config,
            key_generator,
            resolver,
            engine,
        }
    }

    /// Run the admission check for one request.
    ///
    /// Fails only for an unauthenticated caller when authentication is
    /// required; every store-side fault is absorbed into an allow verdict.
    pub async fn process(&self, request: &RequestContext) -> Result<Admission> {
        let identity = self
            .key_generator
            .resolve_identity(request, self.config.require_authentication)?;

        let limits = self.resolver.resolve(&identity);
        if limits.window_count() == 0 {
            debug!(
                operation = %identity.operation,
                "No limits found for request"
            );
            return Ok(self.assemble(RateLimitResult::default()));
        }

        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let result = self
            .engine
            .evaluate(&identity, &limits, Utc::now().timestamp(), &correlation_id)
            .await;

        if !result.access {
            debug!(
                operation = %identity.operation,
                caller = ?identity.caller,
                status_code = self.config.response.status_code,
                "Rate limit exceeded"
            );
        }

        Ok(self.assemble(result))
    }

    fn assemble(&self, result: RateLimitResult) -> Admission {
        let headers = headers_for(&result.results);
        let decision = decision_for(&result, &self.config.response);

        Admission {
            result,
            headers,
            decision,
        }
    }
}
