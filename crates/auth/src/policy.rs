//! Policy model and builder.
//!
//! A [`Policy`] is the immutable, merged view of one principal's grants at one
//! point in time. Rebuilding produces a new value; nothing here mutates a
//! published policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use portal_core::{PathKey, normalize};

use crate::{Action, Grant};

/// The principal's own profile screen.
///
/// The baseline rule (Read + Update here) is the single hard-coded exception
/// to "policy comes entirely from grant data": every principal can always see
/// and edit their own profile, even with an empty grant list.
pub const PROFILE_PATH: &str = "/feed/profile";

/// Merged capability flags for one path.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    pub read: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        read: false,
        create: false,
        update: false,
        delete: false,
    };

    const BASELINE: Capabilities = Capabilities {
        read: true,
        create: false,
        update: true,
        delete: false,
    };

    pub fn from_grant(grant: &Grant) -> Self {
        Self {
            read: grant.can_view,
            create: grant.can_create,
            update: grant.can_edit,
            delete: grant.can_delete,
        }
    }

    /// Flag-wise OR. Commutative, associative and idempotent, so the order
    /// and multiplicity of merged grants never matter.
    pub fn merge(self, other: Capabilities) -> Self {
        Self {
            read: self.read || other.read,
            create: self.create || other.create,
            update: self.update || other.update,
            delete: self.delete || other.delete,
        }
    }

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Read => self.read,
            Action::Create => self.create,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// Actions whose rule is set, in [`Action::ALL`] order.
    pub fn actions(&self) -> Vec<Action> {
        Action::ALL.into_iter().filter(|a| self.allows(*a)).collect()
    }
}

/// Immutable set of true `(Action, PathKey)` rules.
///
/// Stored as one merged [`Capabilities`] per key; keys whose merged flags are
/// all off are not stored at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Policy {
    rules: BTreeMap<PathKey, Capabilities>,
}

impl Policy {
    /// A policy with no rules at all (not even the baseline).
    ///
    /// Used as the placeholder before the first grant list has been read;
    /// every query against it answers `false`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Exact-key rule lookup on an already normalized key.
    pub fn allows(&self, action: Action, key: &PathKey) -> bool {
        self.rule_at(key.as_str(), action)
    }

    /// Merged flags for `path` (normalized first). No ancestor lookup.
    pub fn capabilities(&self, path: &str) -> Capabilities {
        let key = normalize(path);
        self.rules.get(&key).copied().unwrap_or(Capabilities::NONE)
    }

    /// All stored rules, in key order.
    pub fn rules(&self) -> impl Iterator<Item = (&PathKey, Capabilities)> + '_ {
        self.rules.iter().map(|(key, caps)| (key, *caps))
    }

    /// Number of keys carrying at least one rule.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn rule_at(&self, key: &str, action: Action) -> bool {
        self.rules
            .get(key)
            .is_some_and(|caps| caps.allows(action))
    }
}

/// Merge a grant list into a [`Policy`].
///
/// Grants are grouped by normalized path and their flags OR-ed together, then
/// the baseline rule is added. Pure and deterministic: permuting or
/// duplicating the input never changes the result.
pub fn build(grants: &[Grant]) -> Policy {
    let mut rules: BTreeMap<PathKey, Capabilities> = BTreeMap::new();

    for grant in grants {
        let caps = Capabilities::from_grant(grant);
        if caps.is_empty() {
            continue;
        }

        let entry = rules.entry(normalize(&grant.path)).or_default();
        *entry = entry.merge(caps);
    }

    let profile = rules.entry(normalize(PROFILE_PATH)).or_default();
    *profile = profile.merge(Capabilities::BASELINE);

    tracing::debug!(grants = grants.len(), keys = rules.len(), "policy built");

    Policy { rules }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn overlapping_grants() -> Vec<Grant> {
        vec![
            Grant::new("compras", "/compras").with_view(),
            Grant::new("compras", "compras/").with_edit(),
            Grant::new("compras", "/compras/cotacao").with_create(),
            Grant::new("estoque", "/estoque?tab=1").with_view().with_delete(),
            Grant::new("estoque", "//estoque").with_view(),
        ]
    }

    #[test]
    fn overlapping_rows_are_or_merged_per_key() {
        let policy = build(&overlapping_grants());

        assert_eq!(
            policy.capabilities("/compras"),
            Capabilities { read: true, create: false, update: true, delete: false }
        );
        assert_eq!(
            policy.capabilities("/estoque"),
            Capabilities { read: true, create: false, update: false, delete: true }
        );
        assert_eq!(
            policy.capabilities("/compras/cotacao").actions(),
            vec![Action::Create]
        );
    }

    #[test]
    fn baseline_is_present_for_an_empty_grant_list() {
        let policy = build(&[]);
        let profile = normalize(PROFILE_PATH);

        assert_eq!(policy.len(), 1);
        assert!(policy.allows(Action::Read, &profile));
        assert!(policy.allows(Action::Update, &profile));
        assert!(!policy.allows(Action::Create, &profile));
        assert!(!policy.allows(Action::Delete, &profile));
    }

    #[test]
    fn baseline_merges_with_grants_on_the_profile_path() {
        let policy = build(&[Grant::new("feed", "/feed/profile/").with_delete()]);
        assert_eq!(
            policy.capabilities(PROFILE_PATH),
            Capabilities { read: true, create: false, update: true, delete: true }
        );
    }

    #[test]
    fn rows_with_no_flags_add_no_rules() {
        let policy = build(&[Grant::new("sac", "/sac")]);
        assert_eq!(policy, build(&[]));
    }

    #[test]
    fn empty_policy_has_no_rules() {
        let policy = Policy::empty();
        assert!(policy.is_empty());
        assert!(!policy.allows(Action::Read, &normalize(PROFILE_PATH)));
    }

    #[test]
    fn rules_iterate_in_key_order() {
        let policy = build(&overlapping_grants());
        let keys: Vec<&str> = policy.rules().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["/compras", "/compras/cotacao", "/estoque", "/feed/profile"]);
    }

    fn grant_strategy() -> impl Strategy<Value = Grant> {
        (
            prop::sample::select(vec!["/compras", "compras/", "/compras/cotacao", "/estoque", "/sac//", ""]),
            any::<[bool; 4]>(),
        )
            .prop_map(|(path, [view, edit, create, delete])| Grant {
                module: "m".to_string(),
                path: path.to_string(),
                can_view: view,
                can_edit: edit,
                can_create: create,
                can_delete: delete,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any permutation of the same grants builds the same policy.
        #[test]
        fn build_is_order_independent(
            (grants, shuffled) in prop::collection::vec(grant_strategy(), 0..12)
                .prop_flat_map(|g| (Just(g.clone()), Just(g).prop_shuffle()))
        ) {
            prop_assert_eq!(build(&grants), build(&shuffled));
        }

        /// Property: duplicating the grant list changes nothing.
        #[test]
        fn build_is_idempotent_under_duplication(
            grants in prop::collection::vec(grant_strategy(), 0..12)
        ) {
            let doubled: Vec<Grant> = grants.iter().chain(grants.iter()).cloned().collect();
            prop_assert_eq!(build(&doubled), build(&grants));
        }

        /// Property: the baseline survives every grant list.
        #[test]
        fn baseline_always_holds(grants in prop::collection::vec(grant_strategy(), 0..12)) {
            let policy = build(&grants);
            let profile = normalize(PROFILE_PATH);
            prop_assert!(policy.allows(Action::Read, &profile));
            prop_assert!(policy.allows(Action::Update, &profile));
        }
    }
}
