//! Limit model, key generation, and limit resolution.

pub mod keys;
pub mod model;
pub mod resolver;
pub mod source;

pub use keys::{Identity, LimitKeyGenerator};
pub use model::{LimitGroup, LimitWindow, Limits, RateLimitResult, Scope, WindowUsage};
pub use resolver::LimitResolver;
pub use source::{DeclaredLimits, LimitSource, SettingsLimitSource};
