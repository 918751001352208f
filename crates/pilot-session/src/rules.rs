//! Redirect rule compilation.
//!
//! A session with a fork redirects every url its tabs used for the fork's
//! chain to the fork's rpc url. Rule ids hash the url, so the host sees the
//! same id for the same url across recompilations.

use std::collections::{BTreeMap, BTreeSet};

use pilot_core::{RuleId, TabId};
use serde::{Deserialize, Serialize};

use crate::session::Fork;

/// Modulus applied to the url hash; ids land in `[1, RULE_ID_MODULUS]`.
pub const RULE_ID_MODULUS: u32 = 0x7FFF_FFFF;

/// Deterministic rule id for `url`.
///
/// djb2 with xor over UTF-16 code units in 32-bit wrapping arithmetic, read
/// as unsigned, reduced into `[1, 2^31 - 1]`. Hosts key installed rules by
/// this value, so the algorithm must not change.
#[allow(clippy::cast_sign_loss)]
pub fn rule_id(url: &str) -> RuleId {
    let mut hash: i32 = 5381;
    for unit in url.encode_utf16() {
        hash = hash.wrapping_mul(33) ^ i32::from(unit);
    }
    RuleId::new(1 + (hash as u32) % RULE_ID_MODULUS)
}

/// A url rewrite installed in the host.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRule {
    /// Hash of `match_url`.
    pub id: RuleId,
    /// Request url to rewrite.
    pub match_url: String,
    /// Fork rpc url requests are sent to instead.
    pub target_url: String,
    /// Tabs the rule applies to, ascending.
    pub scope_tab_ids: Vec<TabId>,
}

/// Compile the full rule set for a session.
///
/// `endpoints` maps tabs to the urls they used for the fork's chain. Only
/// tabs in `session_tabs` are considered. The result is sorted by id.
pub fn compile(
    fork: Option<&Fork>,
    session_tabs: &BTreeSet<TabId>,
    endpoints: &BTreeMap<TabId, BTreeSet<String>>,
) -> Vec<RedirectRule> {
    let Some(fork) = fork else {
        return Vec::new();
    };

    let mut scopes: BTreeMap<&str, BTreeSet<TabId>> = BTreeMap::new();
    for (tab, urls) in endpoints {
        if !session_tabs.contains(tab) {
            continue;
        }
        for url in urls {
            if url == &fork.rpc_url {
                continue;
            }
            let _ = scopes.entry(url.as_str()).or_default().insert(*tab);
        }
    }

    let mut rules: Vec<RedirectRule> = scopes
        .into_iter()
        .map(|(url, tabs)| RedirectRule {
            id: rule_id(url),
            match_url: url.to_owned(),
            target_url: fork.rpc_url.clone(),
            scope_tab_ids: tabs.into_iter().collect(),
        })
        .collect();
    rules.sort();
    rules
}

/// Rule changes to hand to the host in one call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleDiff {
    /// Rules to install.
    pub add: Vec<RedirectRule>,
    /// Ids to remove before installing `add`.
    pub remove_ids: Vec<RuleId>,
}

impl RuleDiff {
    /// Replace `previous` wholesale with `next`.
    pub fn replace(previous: &[RedirectRule], next: &[RedirectRule]) -> Self {
        Self {
            add: next.to_vec(),
            remove_ids: previous.iter().map(|rule| rule.id).collect(),
        }
    }

    /// Whether the diff does nothing.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove_ids.is_empty()
    }
}
