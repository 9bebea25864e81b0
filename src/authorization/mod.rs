//! Ordered rule policy evaluation
//!
//! An [`Authorization`] holds a default decision and an ordered list of
//! [`Rule`]s. Evaluation walks the rules in declared order and returns the
//! decision of the first rule whose role, pattern(s), origin and (for route
//! rules) method all match the principal and request context; when nothing
//! matches, the default decision applies.
//!
//! # Example
//!
//! ```rust,ignore
//! use authentication::authorization::{Authorization, RequestContext};
//!
//! let policy = Authorization::new(&config.authorization)?;
//! let context = RequestContext::from([
//!     ("route".to_string(), "/reports".to_string()),
//!     ("method".to_string(), "GET".to_string()),
//! ]);
//! if policy.is_authorized(&user, &context) { /* ... */ }
//! ```

pub mod rule;

pub use rule::{ActionRule, Rule, RouteRule, RuleEvaluator, DEFAULT_METHOD};

use std::collections::HashMap;
use std::fmt;

use crate::config::AuthorizationConfig;
use crate::error::Result;
use crate::user::User;

/// Request attributes matched by rules. Recognized keys are
/// [`ACTION_KEY`], [`ROUTE_KEY`] and [`METHOD_KEY`]; an empty map means
/// "no context" and always resolves to the default decision.
pub type RequestContext = HashMap<String, String>;

pub const ACTION_KEY: &str = "action";
pub const ROUTE_KEY: &str = "route";
pub const METHOD_KEY: &str = "method";

/// Outcome of a rule or of the whole policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decision {
    Allow,
    #[default]
    Deny,
}

impl Decision {
    /// Case-insensitive; anything other than "allow" denies
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("allow") {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    pub(crate) fn parse_opt(value: Option<&str>) -> Self {
        value.map(Decision::parse).unwrap_or_default()
    }

    pub fn is_allow(self) -> bool {
        self == Decision::Allow
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("allow"),
            Decision::Deny => f.write_str("deny"),
        }
    }
}

/// Decision plus the index of the rule that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    /// `None` when no rule matched and the default decision applied
    pub rule_index: Option<usize>,
}

/// Immutable policy: default decision plus ordered rules
#[derive(Debug, Clone, Default)]
pub struct Authorization {
    default: Decision,
    rules: Vec<Rule>,
}

impl Authorization {
    /// Build and validate a policy. Every pattern is compiled up front; the
    /// first invalid rule aborts construction with its index.
    pub fn new(config: &AuthorizationConfig) -> Result<Self> {
        let default = Decision::parse_opt(config.default.as_deref());
        let rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| Rule::from_config(index, rule))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Loaded authorization policy: default={}, rules={}", default, rules.len());
        Ok(Self { default, rules })
    }

    pub fn from_rules(default: Decision, rules: Vec<Rule>) -> Self {
        Self { default, rules }
    }

    pub fn default_decision(&self) -> Decision {
        self.default
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Evaluate the policy and report which rule decided
    pub fn explain(&self, user: &User, context: &RequestContext) -> Evaluation {
        for (index, rule) in self.rules.iter().enumerate() {
            if let Some(decision) = rule.evaluate(user, context) {
                tracing::debug!(
                    "Rule {} decided {} for {}/{}",
                    index,
                    decision,
                    user.origin,
                    user.username
                );
                return Evaluation {
                    decision,
                    rule_index: Some(index),
                };
            }
        }

        tracing::debug!(
            "No rule matched {}/{}, applying default {}",
            user.origin,
            user.username,
            self.default
        );
        Evaluation {
            decision: self.default,
            rule_index: None,
        }
    }

    pub fn is_authorized(&self, user: &User, context: &RequestContext) -> bool {
        self.explain(user, context).decision.is_allow()
    }
}
