//! Ability queries over a built [`Policy`].
//!
//! - No IO
//! - No panics
//! - Every query answers with a plain `bool`; anything ambiguous is `false`

use serde::Serialize;

use portal_core::{PathKey, normalize};

use crate::{Action, Capabilities, Policy};

/// Exact-match query.
///
/// `path` is normalized and looked up as-is: a rule on `/compras` says nothing
/// about `/compras/cotacao`. This is the only mode to use for Create, Update
/// and Delete.
pub fn can(policy: &Policy, action: Action, path: &str) -> bool {
    let key = normalize(path);
    let allowed = policy.allows(action, &key);
    tracing::trace!(%action, path = %key, allowed, "can");
    allowed
}

/// Prefix-aware query.
///
/// Falls back to the ancestors of the normalized path (shortest first,
/// excluding the path itself and the root) when the exact lookup fails.
/// The lookup is the same for every action; nothing here stops an Update
/// grant on `/compras` from answering for `/compras/cotacao`. Callers use it
/// for Read only and keep mutations on [`can`].
pub fn can_with_inheritance(policy: &Policy, action: Action, path: &str) -> bool {
    let key = normalize(path);
    let allowed = resolve(policy, action, &key).is_some();
    tracing::trace!(%action, path = %key, allowed, "can_with_inheritance");
    allowed
}

fn resolve<'k>(policy: &Policy, action: Action, key: &'k PathKey) -> Option<&'k str> {
    if policy.allows(action, key) {
        return Some(key.as_str());
    }
    key.ancestors().find(|prefix| policy.rule_at(prefix, action))
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Which query a decision was made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Exact,
    WithInheritance,
}

/// What a decision rested on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionBasis {
    /// The path itself carries the rule.
    ExactRule,
    /// An ancestor carries the rule and the query allowed inheritance.
    InheritedFrom { ancestor: PathKey },
    /// No rule matched.
    NoRule,
}

/// Detailed, serialisable explanation of one ability decision.
#[derive(Debug, Clone, Serialize)]
pub struct AbilityExplanation {
    pub action: Action,
    pub path: PathKey,
    pub mode: QueryMode,
    pub granted: bool,
    pub basis: DecisionBasis,
    /// Human-readable reason for the decision.
    pub reason: String,
    /// Merged flags stored at the exact path.
    pub capabilities: Capabilities,
    /// If denied, ancestors that carry the rule but were not consulted
    /// because the query was exact-match.
    pub ancestors_with_rule: Vec<PathKey>,
}

/// Explain why a query answers the way it does.
///
/// Gives the same verdict as [`can`] (for [`QueryMode::Exact`]) or
/// [`can_with_inheritance`] (for [`QueryMode::WithInheritance`]).
pub fn explain(policy: &Policy, action: Action, path: &str, mode: QueryMode) -> AbilityExplanation {
    let key = normalize(path);
    let capabilities = policy.capabilities(key.as_str());

    let basis = if policy.allows(action, &key) {
        DecisionBasis::ExactRule
    } else if mode == QueryMode::WithInheritance {
        match key.ancestors().find(|prefix| policy.rule_at(prefix, action)) {
            Some(ancestor) => DecisionBasis::InheritedFrom {
                ancestor: normalize(ancestor),
            },
            None => DecisionBasis::NoRule,
        }
    } else {
        DecisionBasis::NoRule
    };

    let granted = basis != DecisionBasis::NoRule;

    let ancestors_with_rule: Vec<PathKey> = if granted {
        Vec::new()
    } else {
        key.ancestors()
            .filter(|prefix| policy.rule_at(prefix, action))
            .map(normalize)
            .collect()
    };

    let reason = match &basis {
        DecisionBasis::ExactRule => format!("'{key}' carries a {action} rule"),
        DecisionBasis::InheritedFrom { ancestor } => {
            format!("'{key}' inherits {action} from ancestor '{ancestor}'")
        }
        DecisionBasis::NoRule if !ancestors_with_rule.is_empty() => format!(
            "'{key}' has no {action} rule; ancestors {:?} do, but {action} is checked exact-match here",
            ancestors_with_rule.iter().map(PathKey::as_str).collect::<Vec<_>>()
        ),
        DecisionBasis::NoRule => format!("no {action} rule on '{key}' or any ancestor"),
    };

    AbilityExplanation {
        action,
        path: key,
        mode,
        granted,
        basis,
        reason,
        capabilities,
        ancestors_with_rule,
    }
}
