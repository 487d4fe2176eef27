use sha2::{Digest, Sha256};

use crate::config::{CompiledRule, MatchKind, WeightedBackend};
use crate::*;

/// Header whose value seeds the weighted draw; the proxy assigns one per
/// request, so a retry of the same request resolves to the same backend.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A request that matched no rule, with the explanation returned to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoMatch {
	pub reason: String,
}

pub struct RouteDecision<'a> {
	pub rule_index: usize,
	pub backend: &'a WeightedBackend,
}

/// Pure first-match scan over the compiled rules. Rule order is total, so
/// ties cannot occur.
pub fn route<'a>(
	rules: &'a [CompiledRule],
	headers: &http::HeaderMap,
) -> Result<RouteDecision<'a>, NoMatch> {
	for (rule_index, rule) in rules.iter().enumerate() {
		if !rule_matches(rule, headers) {
			continue;
		}
		let seed = headers
			.get(REQUEST_ID_HEADER)
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default();
		let backend = pick(rule, seed);
		return Ok(RouteDecision { rule_index, backend });
	}
	Err(NoMatch {
		reason: format!(
			"no routing rule matched the request headers ({} rules evaluated)",
			rules.len()
		),
	})
}

/// Matchers on the same header name are OR'd; distinct names are AND'd.
fn rule_matches(rule: &CompiledRule, headers: &http::HeaderMap) -> bool {
	rule.matchers.iter().all(|group| {
		let Some(value) = headers.get(group.name.as_str()).and_then(|v| v.to_str().ok()) else {
			return false;
		};
		group.kinds.iter().any(|kind| kind.matches(value))
	})
}

impl MatchKind {
	pub fn matches(&self, value: &str) -> bool {
		match self {
			MatchKind::Exact(want) => value == want.as_str(),
			MatchKind::Prefix(prefix) => value.starts_with(prefix.as_str()),
			// Compiled anchored; the full value must match.
			MatchKind::Regex(re) => re.is_match(value),
		}
	}
}

/// Stable weighted selection: the sorted backend list forms cumulative weight
/// intervals over [0, Σw); the seed hash picks the interval. All-zero weights
/// select the first backend.
fn pick<'a>(rule: &'a CompiledRule, seed: &str) -> &'a WeightedBackend {
	if rule.total_weight == 0 {
		return &rule.backends[0];
	}
	let mut draw = stable_draw(seed, rule.total_weight);
	for wb in &rule.backends {
		let w = wb.weight as u64;
		if draw < w {
			return wb;
		}
		draw -= w;
	}
	// Unreachable: the draw is strictly below the interval sum.
	&rule.backends[0]
}

/// Uniform integer in [0, buckets) derived from the seed alone, stable across
/// processes and runs.
pub fn stable_draw(seed: &str, buckets: u64) -> u64 {
	let digest = Sha256::digest(seed.as_bytes());
	let mut prefix = [0u8; 8];
	prefix.copy_from_slice(&digest[..8]);
	u64::from_be_bytes(prefix) % buckets
}
