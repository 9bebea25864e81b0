use regex::Regex;

use super::{Decision, RequestContext, ACTION_KEY, METHOD_KEY, ROUTE_KEY};
use crate::config::RuleConfig;
use crate::error::{AuthError, Result};
use crate::user::User;

/// Method assumed for route rules and requests that do not name one
pub const DEFAULT_METHOD: &str = "GET";

/// Evaluation capability shared by every rule kind.
///
/// Returns `Some(decision)` when the rule fully matches, `None` to fall
/// through to the next rule.
pub trait RuleEvaluator {
    fn evaluate(&self, user: &User, context: &RequestContext) -> Option<Decision>;
}

type RuleConstructor = fn(usize, &RuleConfig) -> Result<Rule>;

/// Known `ruleType` values and their constructors
const RULE_TYPES: &[(&str, RuleConstructor)] = &[
    ("action", ActionRule::from_config),
    ("route", RouteRule::from_config),
];

/// One ordered policy entry
#[derive(Debug, Clone)]
pub enum Rule {
    Action(ActionRule),
    Route(RouteRule),
}

impl Rule {
    /// Build the rule at position `index` of the policy
    pub fn from_config(index: usize, config: &RuleConfig) -> Result<Self> {
        let rule_type = config
            .rule_type
            .as_deref()
            .map(|t| t.trim().to_ascii_lowercase())
            .ok_or_else(|| invalid(index, "ruleType parameter must be specified"))?;

        let (_, constructor) = RULE_TYPES
            .iter()
            .find(|(name, _)| *name == rule_type)
            .ok_or_else(|| invalid(index, format!("unknown ruleType '{}'", rule_type)))?;

        constructor(index, config)
    }

    pub fn authorize(&self) -> Decision {
        match self {
            Rule::Action(rule) => rule.authorize,
            Rule::Route(rule) => rule.authorize,
        }
    }
}

impl RuleEvaluator for Rule {
    fn evaluate(&self, user: &User, context: &RequestContext) -> Option<Decision> {
        match self {
            Rule::Action(rule) => rule.evaluate(user, context),
            Rule::Route(rule) => rule.evaluate(user, context),
        }
    }
}

/// Matches the `action` entry of the request context
#[derive(Debug, Clone)]
pub struct ActionRule {
    pub action: Vec<Regex>,
    pub role: String,
    pub origin: Regex,
    pub authorize: Decision,
}

impl ActionRule {
    fn from_config(index: usize, config: &RuleConfig) -> Result<Rule> {
        let origin = required_origin(index, config)?;
        Ok(Rule::Action(ActionRule {
            action: compile_all(index, "action", &config.action)?,
            role: config.role.clone().unwrap_or_default(),
            origin,
            authorize: Decision::parse_opt(config.authorize.as_deref()),
        }))
    }
}

impl RuleEvaluator for ActionRule {
    fn evaluate(&self, user: &User, context: &RequestContext) -> Option<Decision> {
        if !user.has_role(&self.role) {
            return None;
        }
        if !matches_any(&self.action, context.get(ACTION_KEY)) {
            return None;
        }
        if !self.origin.is_match(&user.origin) {
            return None;
        }
        Some(self.authorize)
    }
}

/// Matches the `route` and `method` entries of the request context
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub route: Vec<Regex>,
    /// Upper-cased HTTP method
    pub method: String,
    pub role: String,
    pub origin: Regex,
    pub authorize: Decision,
}

impl RouteRule {
    fn from_config(index: usize, config: &RuleConfig) -> Result<Rule> {
        let origin = required_origin(index, config)?;
        let method = config
            .method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_METHOD)
            .to_ascii_uppercase();

        Ok(Rule::Route(RouteRule {
            route: compile_all(index, "route", &config.route)?,
            method,
            role: config.role.clone().unwrap_or_default(),
            origin,
            authorize: Decision::parse_opt(config.authorize.as_deref()),
        }))
    }
}

impl RuleEvaluator for RouteRule {
    fn evaluate(&self, user: &User, context: &RequestContext) -> Option<Decision> {
        if !user.has_role(&self.role) {
            return None;
        }
        if !matches_any(&self.route, context.get(ROUTE_KEY)) {
            return None;
        }
        let method = context.get(METHOD_KEY).map(String::as_str).unwrap_or(DEFAULT_METHOD);
        if !method.eq_ignore_ascii_case(&self.method) {
            return None;
        }
        if !self.origin.is_match(&user.origin) {
            return None;
        }
        Some(self.authorize)
    }
}

// Unanchored search: "." matches any non-empty subject.
fn matches_any(patterns: &[Regex], subject: Option<&String>) -> bool {
    match subject {
        Some(subject) => patterns.iter().any(|p| p.is_match(subject)),
        None => false,
    }
}

fn required_origin(index: usize, config: &RuleConfig) -> Result<Regex> {
    let origin = config
        .origin
        .as_deref()
        .ok_or_else(|| invalid(index, "origin parameter must be specified"))?;
    compile(index, "origin", origin)
}

fn compile_all(index: usize, field: &str, patterns: &[String]) -> Result<Vec<Regex>> {
    if patterns.is_empty() {
        return Err(invalid(index, format!("{} parameter must be specified", field)));
    }
    patterns.iter().map(|p| compile(index, field, p)).collect()
}

fn compile(index: usize, field: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| invalid(index, format!("invalid {} pattern `{}`: {}", field, pattern, e)))
}

fn invalid(index: usize, message: impl Into<String>) -> AuthError {
    AuthError::Validation {
        index,
        message: message.into(),
    }
}
