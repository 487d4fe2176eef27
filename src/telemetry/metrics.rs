use std::fmt::{Display, Write};

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::llm::TokenUsage;
use crate::*;

/// A label value that may not be known yet; encodes as "unknown" until it is.
#[derive(Clone, Hash, Debug, PartialEq, Eq)]
pub enum DefaultedUnknown<T> {
	Unknown,
	Known(T),
}

impl<T> Default for DefaultedUnknown<T> {
	fn default() -> Self {
		DefaultedUnknown::Unknown
	}
}

impl<T> From<Option<T>> for DefaultedUnknown<T> {
	fn from(t: Option<T>) -> Self {
		match t {
			Some(t) => DefaultedUnknown::Known(t),
			None => DefaultedUnknown::Unknown,
		}
	}
}

impl From<Strng> for DefaultedUnknown<RichStrng> {
	fn from(t: Strng) -> Self {
		DefaultedUnknown::Known(RichStrng(t))
	}
}

impl<T: EncodeLabelValue> EncodeLabelValue for DefaultedUnknown<T> {
	fn encode(&self, writer: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
		match self {
			DefaultedUnknown::Unknown => writer.write_str("unknown"),
			DefaultedUnknown::Known(t) => t.encode(writer),
		}
	}
}

#[derive(Clone, Hash, Debug, PartialEq, Eq)]
pub struct RichStrng(pub Strng);

impl EncodeLabelValue for RichStrng {
	fn encode(&self, writer: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
		writer.write_str(self.0.as_str())
	}
}

#[derive(Clone, Hash, Default, Debug, PartialEq, Eq)]
pub struct EncodeDisplay<T>(pub T);

impl<T: Display> EncodeLabelValue for EncodeDisplay<T> {
	fn encode(&self, writer: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
		write!(writer, "{}", self.0)
	}
}

#[derive(Clone, Hash, Default, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct GenLabels {
	pub model: DefaultedUnknown<RichStrng>,
	pub backend: DefaultedUnknown<RichStrng>,
}

#[derive(Clone, Hash, Default, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct CompletionLabels {
	pub model: DefaultedUnknown<RichStrng>,
	pub backend: DefaultedUnknown<RichStrng>,
	pub success: EncodeDisplay<bool>,
}

#[derive(Clone, Hash, Debug, PartialEq, Eq, EncodeLabelValue)]
pub enum TokenKind {
	Input,
	Output,
	Total,
}

#[derive(Clone, Hash, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct TokenLabels {
	pub model: DefaultedUnknown<RichStrng>,
	pub backend: DefaultedUnknown<RichStrng>,
	pub kind: TokenKind,
}

type GenCounter = Family<GenLabels, Counter>;

#[derive(Debug)]
pub struct Metrics {
	pub requests: GenCounter,
	pub requests_completed: Family<CompletionLabels, Counter>,
	pub tokens: Family<TokenLabels, Counter>,
	pub time_to_first_token: Family<GenLabels, Histogram>,
	pub time_per_output_token: Family<GenLabels, Histogram>,
}

fn first_token_histogram() -> Histogram {
	Histogram::new(exponential_buckets(0.01, 2.0, 14))
}

fn per_token_histogram() -> Histogram {
	Histogram::new(exponential_buckets(0.001, 2.0, 14))
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let m = Metrics {
			requests: Family::default(),
			requests_completed: Family::default(),
			tokens: Family::default(),
			time_to_first_token: Family::new_with_constructor(
				first_token_histogram as fn() -> Histogram,
			),
			time_per_output_token: Family::new_with_constructor(
				per_token_histogram as fn() -> Histogram,
			),
		};
		registry.register(
			"llm_requests",
			"The total number of requests seen by the processor",
			m.requests.clone(),
		);
		registry.register(
			"llm_requests_completed",
			"The total number of requests that ran to completion",
			m.requests_completed.clone(),
		);
		registry.register(
			"llm_tokens",
			"The total number of tokens reported by backends",
			m.tokens.clone(),
		);
		registry.register(
			"llm_time_to_first_token_seconds",
			"Time from request start to the first streamed token",
			m.time_to_first_token.clone(),
		);
		registry.register(
			"llm_time_per_output_token_seconds",
			"Inter-chunk latency amortized over new output tokens",
			m.time_per_output_token.clone(),
		);
		m
	}
}

/// Per-request view over the shared sink. Created when a stream starts and
/// records a failed completion on drop unless one was recorded explicitly.
pub struct RequestMetrics {
	metrics: Arc<Metrics>,
	model: DefaultedUnknown<RichStrng>,
	backend: DefaultedUnknown<RichStrng>,
	start: Instant,
	last_token: Option<Instant>,
	completed: bool,
}

impl RequestMetrics {
	pub fn start(metrics: Arc<Metrics>) -> Self {
		metrics.requests.get_or_create(&GenLabels::default()).inc();
		RequestMetrics {
			metrics,
			model: Default::default(),
			backend: Default::default(),
			start: Instant::now(),
			last_token: None,
			completed: false,
		}
	}

	pub fn set_model(&mut self, model: Strng) {
		self.model = model.into();
	}

	pub fn set_backend(&mut self, backend: Strng) {
		self.backend = backend.into();
	}

	fn gen_labels(&self) -> GenLabels {
		GenLabels {
			model: self.model.clone(),
			backend: self.backend.clone(),
		}
	}

	pub fn record_completion(&mut self, success: bool) {
		if self.completed {
			return;
		}
		self.completed = true;
		self
			.metrics
			.requests_completed
			.get_or_create(&CompletionLabels {
				model: self.model.clone(),
				backend: self.backend.clone(),
				success: EncodeDisplay(success),
			})
			.inc();
	}

	pub fn record_usage(&mut self, delta: TokenUsage) {
		let mut record = |kind: TokenKind, n: u32| {
			if n == 0 {
				return;
			}
			self
				.metrics
				.tokens
				.get_or_create(&TokenLabels {
					model: self.model.clone(),
					backend: self.backend.clone(),
					kind,
				})
				.inc_by(n as u64);
		};
		record(TokenKind::Input, delta.input);
		record(TokenKind::Output, delta.output);
		record(TokenKind::Total, delta.total);
	}

	/// Record streaming latency for a body chunk that carried `new_output_tokens`.
	pub fn record_token_latency(&mut self, new_output_tokens: u32) {
		let now = Instant::now();
		match self.last_token {
			None => {
				self
					.metrics
					.time_to_first_token
					.get_or_create(&self.gen_labels())
					.observe((now - self.start).as_secs_f64());
			},
			Some(last) if new_output_tokens > 0 => {
				let per_token = (now - last).as_secs_f64() / new_output_tokens as f64;
				self
					.metrics
					.time_per_output_token
					.get_or_create(&self.gen_labels())
					.observe(per_token);
			},
			Some(_) => {},
		}
		self.last_token = Some(now);
	}
}

impl Drop for RequestMetrics {
	fn drop(&mut self) {
		if !self.completed {
			self.record_completion(false);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn completion_recorded_once() {
		let mut registry = Registry::default();
		let metrics = Arc::new(Metrics::new(&mut registry));
		let mut req = RequestMetrics::start(metrics.clone());
		req.set_model(strng::new("gpt-4o-mini"));
		req.set_backend(strng::new("openai"));
		req.record_completion(true);
		drop(req);

		let labels = CompletionLabels {
			model: strng::new("gpt-4o-mini").into(),
			backend: strng::new("openai").into(),
			success: EncodeDisplay(true),
		};
		assert_eq!(metrics.requests_completed.get_or_create(&labels).get(), 1);
		let failed = CompletionLabels {
			model: strng::new("gpt-4o-mini").into(),
			backend: strng::new("openai").into(),
			success: EncodeDisplay(false),
		};
		assert_eq!(metrics.requests_completed.get_or_create(&failed).get(), 0);
	}

	#[test]
	fn drop_without_completion_is_a_failure() {
		let mut registry = Registry::default();
		let metrics = Arc::new(Metrics::new(&mut registry));
		let req = RequestMetrics::start(metrics.clone());
		drop(req);
		let failed = CompletionLabels {
			success: EncodeDisplay(false),
			..Default::default()
		};
		assert_eq!(metrics.requests_completed.get_or_create(&failed).get(), 1);
	}

	#[test]
	fn token_counters_accumulate() {
		let mut registry = Registry::default();
		let metrics = Arc::new(Metrics::new(&mut registry));
		let mut req = RequestMetrics::start(metrics.clone());
		req.record_usage(TokenUsage {
			input: 10,
			output: 3,
			total: 13,
		});
		req.record_usage(TokenUsage {
			input: 0,
			output: 2,
			total: 2,
		});
		let labels = TokenLabels {
			model: Default::default(),
			backend: Default::default(),
			kind: TokenKind::Output,
		};
		assert_eq!(metrics.tokens.get_or_create(&labels).get(), 5);
		req.record_completion(true);
	}
}
