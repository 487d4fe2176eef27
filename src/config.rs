use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use arc_swap::ArcSwap;
use notify::{RecursiveMode, Watcher};
use regex::Regex;
use serde::Deserialize;

use crate::auth::BackendAuth;
use crate::cost::CostProgram;
use crate::selector::{DynamicLoadBalancing, EndpointSelector, StickyEndpointSelector};
use crate::serdes;
use crate::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("parse: {0}")]
	Parse(String),
	#[error("rule {rule}: backend list is empty")]
	EmptyBackends { rule: usize },
	#[error("rule {rule}: invalid regex for header {name}: {err}")]
	InvalidRegex {
		rule: usize,
		name: String,
		#[source]
		err: regex::Error,
	},
	#[error("duplicate backend {name} with conflicting definitions")]
	DuplicateBackend { name: String },
	#[error("rule {rule}: dynamic load balancing requires at least one endpoint")]
	NoEndpoints { rule: usize },
	#[error("cost rule {key}: a CEL expression is required")]
	MissingCel { key: String },
	#[error("cost rule {key}: {err}")]
	Cel {
		key: String,
		#[source]
		err: cost::Error,
	},
}

// ----- file schema -----

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawConfig {
	pub schema: RawSchema,
	#[serde(default = "default_model_header")]
	pub model_name_header_key: String,
	#[serde(default = "default_backend_header")]
	pub selected_backend_header_key: String,
	#[serde(default = "default_metadata_namespace")]
	pub metadata_namespace: String,
	#[serde(default)]
	pub rules: Vec<RawRule>,
	#[serde(default)]
	pub llm_request_costs: Vec<RawRequestCost>,
	#[serde(default)]
	pub token_usage_policy: TokenUsagePolicy,
}

fn default_model_header() -> String {
	"x-ai-eg-model".to_string()
}

fn default_backend_header() -> String {
	"x-ai-eg-selected-backend".to_string()
}

fn default_metadata_namespace() -> String {
	"io.envoy.ai_gateway".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawSchema {
	pub name: String,
	#[serde(default)]
	pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawRule {
	#[serde(default)]
	pub headers: Vec<RawHeaderMatch>,
	pub backends: Vec<RawBackend>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawHeaderMatch {
	pub name: String,
	#[serde(rename = "type")]
	pub match_type: MatchType,
	pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MatchType {
	Exact,
	Prefix,
	RegularExpression,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawBackend {
	pub name: String,
	#[serde(default = "default_weight")]
	pub weight: u32,
	pub schema: BackendSchemaRaw,
	#[serde(default)]
	pub auth: Option<BackendAuth>,
	#[serde(default)]
	pub dynamic_load_balancing: Option<DynamicLoadBalancing>,
}

impl RawBackend {
	/// Everything but the per-rule weight must agree for a re-declaration.
	fn same_definition(&self, other: &RawBackend) -> bool {
		self.schema == other.schema
			&& self.auth == other.auth
			&& self.dynamic_load_balancing.as_ref().map(|d| &d.endpoints)
				== other.dynamic_load_balancing.as_ref().map(|d| &d.endpoints)
	}
}

fn default_weight() -> u32 {
	1
}

/// Backend schemas are a closed set; an unknown name fails the load.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackendSchemaRaw {
	pub name: SchemaName,
	#[serde(default)]
	pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SchemaName {
	#[serde(rename = "OpenAI")]
	OpenAI,
	#[serde(rename = "AWSBedrock")]
	AWSBedrock,
	#[serde(rename = "AzureOpenAI")]
	AzureOpenAI,
}

impl std::fmt::Display for SchemaName {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SchemaName::OpenAI => write!(f, "OpenAI"),
			SchemaName::AWSBedrock => write!(f, "AWSBedrock"),
			SchemaName::AzureOpenAI => write!(f, "AzureOpenAI"),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawRequestCost {
	pub metadata_key: String,
	#[serde(rename = "type")]
	pub kind: RawCostType,
	#[serde(default)]
	pub cel: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RawCostType {
	InputToken,
	OutputToken,
	TotalToken,
	#[serde(rename = "CEL")]
	Cel,
}

/// Whether interim usage reports fold into the running totals or only the
/// final report counts. Which backends emit interim usage varies, so this
/// stays a knob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenUsagePolicy {
	#[default]
	Accumulate,
	FinalOnly,
}

// ----- compiled snapshot -----

/// The inbound schema. Only OpenAI is served; anything else is rejected when
/// a stream is constructed, not at load time, so an operator typo doesn't
/// take down the previous good config.
#[derive(Debug, Clone)]
pub struct InputSchema {
	pub name: Strng,
	pub version: Option<Strng>,
}

impl InputSchema {
	pub fn is_openai(&self) -> bool {
		self.name == "OpenAI"
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendSchema {
	pub name: SchemaName,
	pub version: Option<Strng>,
}

#[derive(Debug)]
pub struct Backend {
	pub name: Strng,
	pub schema: BackendSchema,
	pub auth: Option<BackendAuth>,
	pub selector: Option<Arc<dyn EndpointSelector>>,
}

impl Backend {
	pub fn is_dynamic(&self) -> bool {
		self.selector.is_some()
	}
}

#[derive(Debug, Clone)]
pub struct WeightedBackend {
	pub backend: Arc<Backend>,
	pub weight: u32,
}

#[derive(Debug)]
pub struct HeaderMatchGroup {
	pub name: Strng,
	pub kinds: Vec<MatchKind>,
}

#[derive(Debug)]
pub enum MatchKind {
	Exact(Strng),
	Prefix(Strng),
	Regex(Regex),
}

#[derive(Debug)]
pub struct CompiledRule {
	pub matchers: Vec<HeaderMatchGroup>,
	/// Sorted by backend name; order defines the cumulative weight intervals.
	pub backends: Vec<WeightedBackend>,
	pub total_weight: u64,
}

#[derive(Debug)]
pub struct CostRule {
	pub metadata_key: Strng,
	pub kind: CostKind,
}

#[derive(Debug)]
pub enum CostKind {
	InputToken,
	OutputToken,
	TotalToken,
	Cel(CostProgram),
}

/// One immutable generation of configuration. Streams capture the snapshot
/// they started with and never observe a reload mid-flight.
#[derive(Debug)]
pub struct Snapshot {
	pub schema: InputSchema,
	pub model_header: Strng,
	pub backend_header: Strng,
	pub metadata_namespace: Strng,
	pub rules: Vec<CompiledRule>,
	pub backends: HashMap<Strng, Arc<Backend>>,
	pub request_costs: Vec<CostRule>,
	pub token_usage_policy: TokenUsagePolicy,
}

pub fn parse_and_compile(contents: &str) -> Result<Snapshot, Error> {
	let raw: RawConfig =
		serdes::yamlviajson::from_str(contents).map_err(|e| Error::Parse(format!("{e:#}")))?;
	compile(raw)
}

fn compile(raw: RawConfig) -> Result<Snapshot, Error> {
	let mut backends: HashMap<Strng, Arc<Backend>> = HashMap::new();
	let mut raw_backends: HashMap<String, RawBackend> = HashMap::new();
	let mut rules = Vec::with_capacity(raw.rules.len());

	for (rule_index, rule) in raw.rules.into_iter().enumerate() {
		if rule.backends.is_empty() {
			return Err(Error::EmptyBackends { rule: rule_index });
		}
		let matchers = compile_matchers(rule_index, rule.headers)?;

		let mut weighted = Vec::with_capacity(rule.backends.len());
		for rb in rule.backends {
			let name = strng::new(&rb.name);
			match raw_backends.entry(rb.name.clone()) {
				Entry::Occupied(seen) => {
					if !seen.get().same_definition(&rb) {
						return Err(Error::DuplicateBackend { name: rb.name });
					}
				},
				Entry::Vacant(slot) => {
					slot.insert(rb.clone());
				},
			}
			let backend = match backends.entry(name.clone()) {
				Entry::Occupied(b) => b.get().clone(),
				Entry::Vacant(slot) => {
					let selector: Option<Arc<dyn EndpointSelector>> = match &rb.dynamic_load_balancing {
						Some(dlb) => {
							if dlb.endpoints.is_empty() {
								return Err(Error::NoEndpoints { rule: rule_index });
							}
							Some(Arc::new(StickyEndpointSelector::new(dlb.endpoints.clone())))
						},
						None => None,
					};
					let b = Arc::new(Backend {
						name: name.clone(),
						schema: BackendSchema {
							name: rb.schema.name,
							version: rb.schema.version.as_deref().map(strng::new),
						},
						auth: rb.auth.clone(),
						selector,
					});
					slot.insert(b).clone()
				},
			};
			weighted.push(WeightedBackend {
				backend,
				weight: rb.weight,
			});
		}
		// Stable intervals: config-file ordering of the same declarations must
		// not change the draw.
		weighted.sort_by(|a, b| a.backend.name.cmp(&b.backend.name));
		let total_weight = weighted.iter().map(|b| b.weight as u64).sum();
		rules.push(CompiledRule {
			matchers,
			backends: weighted,
			total_weight,
		});
	}

	let mut request_costs = Vec::with_capacity(raw.llm_request_costs.len());
	for rc in raw.llm_request_costs {
		let kind = match rc.kind {
			RawCostType::InputToken => CostKind::InputToken,
			RawCostType::OutputToken => CostKind::OutputToken,
			RawCostType::TotalToken => CostKind::TotalToken,
			RawCostType::Cel => {
				let source = rc.cel.as_deref().ok_or_else(|| Error::MissingCel {
					key: rc.metadata_key.clone(),
				})?;
				CostKind::Cel(CostProgram::compile(source).map_err(|err| Error::Cel {
					key: rc.metadata_key.clone(),
					err,
				})?)
			},
		};
		request_costs.push(CostRule {
			metadata_key: strng::new(&rc.metadata_key),
			kind,
		});
	}

	Ok(Snapshot {
		schema: InputSchema {
			name: strng::new(&raw.schema.name),
			version: raw.schema.version.as_deref().map(strng::new),
		},
		model_header: strng::new(&raw.model_name_header_key),
		backend_header: strng::new(&raw.selected_backend_header_key),
		metadata_namespace: strng::new(&raw.metadata_namespace),
		rules,
		backends,
		request_costs,
		token_usage_policy: raw.token_usage_policy,
	})
}

/// Matchers with the same header name collapse into one OR group; groups AND.
fn compile_matchers(
	rule_index: usize,
	headers: Vec<RawHeaderMatch>,
) -> Result<Vec<HeaderMatchGroup>, Error> {
	let mut groups: Vec<HeaderMatchGroup> = Vec::new();
	for m in headers {
		let name = strng::new(m.name.to_ascii_lowercase());
		let kind = match m.match_type {
			MatchType::Exact => MatchKind::Exact(strng::new(&m.value)),
			MatchType::Prefix => MatchKind::Prefix(strng::new(&m.value)),
			MatchType::RegularExpression => {
				// Anchored; the full value must match.
				let re = Regex::new(&format!("^(?:{})$", m.value)).map_err(|err| Error::InvalidRegex {
					rule: rule_index,
					name: m.name.clone(),
					err,
				})?;
				MatchKind::Regex(re)
			},
		};
		match groups.iter().position(|g| g.name == name) {
			Some(i) => groups[i].kinds.push(kind),
			None => groups.push(HeaderMatchGroup {
				name,
				kinds: vec![kind],
			}),
		}
	}
	Ok(groups)
}

// ----- store and reload -----

/// Holds the active snapshot; swapped atomically on successful reload.
pub struct ConfigStore {
	current: ArcSwap<Snapshot>,
}

impl ConfigStore {
	pub fn new(initial: Snapshot) -> ConfigStore {
		ConfigStore {
			current: ArcSwap::from_pointee(initial),
		}
	}

	pub fn snapshot(&self) -> Arc<Snapshot> {
		self.current.load_full()
	}

	pub fn set(&self, snapshot: Snapshot) {
		self.current.store(Arc::new(snapshot));
	}
}

pub fn load_file(path: &Path) -> anyhow::Result<Snapshot> {
	let contents = std::fs::read_to_string(path)?;
	Ok(parse_and_compile(&contents)?)
}

/// Watch the config file and swap the snapshot on change. A rejected
/// configuration leaves the previous snapshot active. The returned watcher
/// must be kept alive.
pub fn spawn_watcher(
	path: PathBuf,
	store: Arc<ConfigStore>,
) -> anyhow::Result<notify::RecommendedWatcher> {
	let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
	let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
		match res {
			Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
				let _ = tx.send(());
			},
			Ok(_) => {},
			Err(err) => warn!("config watch error: {err}"),
		}
	})?;
	watcher.watch(&path, RecursiveMode::NonRecursive)?;
	tokio::spawn(async move {
		while rx.recv().await.is_some() {
			// Collapse bursts of events from editors that write in several steps.
			tokio::time::sleep(Duration::from_millis(50)).await;
			while rx.try_recv().is_ok() {}
			match load_file(&path) {
				Ok(snapshot) => {
					info!(rules = snapshot.rules.len(), "configuration reloaded");
					store.set(snapshot);
				},
				Err(err) => {
					error!("configuration reload failed, keeping previous snapshot: {err}");
				},
			}
		}
	});
	Ok(watcher)
}
