use async_trait::async_trait;

use crate::auth::{self, PendingRequest};
use crate::config::{Backend, CostKind, Snapshot, TokenUsagePolicy};
use crate::cost::CostContext;
use crate::decompress::BodyDecoder;
use crate::extproc::mutation::{self, Headers};
use crate::llm::{AIError, RequestTransform, RouteType, TokenUsage, Translator, embeddings, universal};
use crate::proto::envoy::service::ext_proc::v3 as pb;
use crate::router;
use crate::selector::ORIGINAL_DESTINATION_CLUSTER;
use crate::telemetry::metrics::RequestMetrics;
use crate::*;

/// Deadline for auth-handler and selector calls, standing in for the proxy's
/// per-request timeout.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
pub enum ProcessorError {
	#[error("unsupported schema: {0}")]
	UnsupportedSchema(String),
	#[error("failed to parse request body: {0}")]
	ParseRequest(String),
	#[error("{0}")]
	NoMatchingRule(String),
	#[error("route computation failed: {0}")]
	RouteCompute(String),
	#[error("translation failed: {0}")]
	Translate(String),
	#[error("decompression failed: {0}")]
	Decompress(String),
	#[error("auth handler failed: {0}")]
	AuthHandler(String),
	#[error("endpoint selector unavailable: {0}")]
	SelectorUnavailable(String),
	#[error("event out of order: unexpected {0}")]
	OutOfOrder(&'static str),
}

impl ProcessorError {
	pub fn status(&self) -> u16 {
		match self {
			ProcessorError::UnsupportedSchema(_) | ProcessorError::ParseRequest(_) => 400,
			ProcessorError::NoMatchingRule(_) => 404,
			ProcessorError::RouteCompute(_)
			| ProcessorError::Translate(_)
			| ProcessorError::Decompress(_)
			| ProcessorError::OutOfOrder(_) => 500,
			ProcessorError::AuthHandler(_) => 502,
			ProcessorError::SelectorUnavailable(_) => 503,
		}
	}

	/// The OpenAI-style error envelope returned to the client.
	pub fn response_body(&self) -> String {
		let kind = if self.status() < 500 {
			"invalid_request_error"
		} else {
			"internal_error"
		};
		serde_json::json!({
			"error": { "type": kind, "message": self.to_string() }
		})
		.to_string()
	}
}

impl From<AIError> for ProcessorError {
	fn from(err: AIError) -> Self {
		match err {
			AIError::UnsupportedSchema(s) => ProcessorError::UnsupportedSchema(s.to_string()),
			other => ProcessorError::Translate(other.to_string()),
		}
	}
}

/// One per stream, driven strictly in event order by the server loop.
#[async_trait]
pub trait Processor: Send {
	async fn request_headers(&mut self) -> Result<pb::ProcessingResponse, ProcessorError>;
	async fn request_body(&mut self, body: pb::HttpBody)
	-> Result<pb::ProcessingResponse, ProcessorError>;
	async fn response_headers(
		&mut self,
		headers: pb::HttpHeaders,
	) -> Result<pb::ProcessingResponse, ProcessorError>;
	async fn response_body(
		&mut self,
		body: pb::HttpBody,
	) -> Result<pb::ProcessingResponse, ProcessorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	Start,
	HeadersSeen,
	Routed,
	RespHeadersSeen,
	Closed,
}

/// Chat-completion and embeddings streams: parse, route, translate, meter.
pub struct CompletionsProcessor {
	snapshot: Arc<Snapshot>,
	metrics: RequestMetrics,
	route: RouteType,
	phase: Phase,
	headers: Headers,
	model: Option<Strng>,
	backend: Option<Arc<Backend>>,
	translator: Option<Translator>,
	streaming: bool,
	response_status: u16,
	decoder: Option<BodyDecoder>,
	usage: TokenUsage,
}

impl CompletionsProcessor {
	pub fn new(
		snapshot: Arc<Snapshot>,
		metrics: RequestMetrics,
		route: RouteType,
		headers: Headers,
	) -> Result<CompletionsProcessor, ProcessorError> {
		if !snapshot.schema.is_openai() {
			return Err(ProcessorError::UnsupportedSchema(format!(
				"input schema {} is not served",
				snapshot.schema.name
			)));
		}
		Ok(CompletionsProcessor {
			snapshot,
			metrics,
			route,
			phase: Phase::Start,
			headers,
			model: None,
			backend: None,
			translator: None,
			streaming: false,
			response_status: 0,
			decoder: None,
			usage: TokenUsage::default(),
		})
	}

	async fn route_and_translate(
		&mut self,
		model: Strng,
		raw_body: &Bytes,
		build: impl FnOnce(&mut Translator) -> Result<RequestTransform, AIError> + Send,
	) -> Result<pb::ProcessingResponse, ProcessorError> {
		let snapshot = self.snapshot.clone();
		self.metrics.set_model(model.clone());

		// The routing table matches on the resolved model name.
		let model_header = http::HeaderName::from_bytes(snapshot.model_header.as_bytes())
			.map_err(|e| ProcessorError::RouteCompute(format!("invalid model header key: {e}")))?;
		let model_value = http::HeaderValue::from_str(&model)
			.map_err(|e| ProcessorError::ParseRequest(format!("model is not a valid header value: {e}")))?;
		self.headers.map.insert(model_header, model_value);

		let decision = router::route(&snapshot.rules, &self.headers.map)
			.map_err(|nm| ProcessorError::NoMatchingRule(nm.reason))?;
		let backend = decision.backend.backend.clone();

		let mut extra_headers: Vec<(Strng, Strng)> = Vec::new();
		let selected_backend = if let Some(selector) = &backend.selector {
			let picked = tokio::time::timeout(CALL_TIMEOUT, selector.select(&self.headers.map))
				.await
				.map_err(|_| ProcessorError::SelectorUnavailable("deadline exceeded".to_string()))?
				.map_err(|e| ProcessorError::SelectorUnavailable(e.to_string()))?;
			debug!(endpoint = %picked.endpoint, "dynamic endpoint selected");
			extra_headers.extend(picked.headers);
			ORIGINAL_DESTINATION_CLUSTER
		} else {
			backend.name.clone()
		};
		self.metrics.set_backend(backend.name.clone());
		info!(model = %model, backend = %backend.name, "backend selected");

		let mut translator = Translator::for_backend(self.route, &backend.schema)?;
		let mut transform = build(&mut translator)?;
		transform
			.headers
			.set
			.push((snapshot.model_header.clone(), model.clone()));
		transform
			.headers
			.set
			.push((snapshot.backend_header.clone(), selected_backend));
		transform.headers.set.extend(extra_headers);

		// Credentials go on last so signatures cover the translated bytes.
		// Dynamic backends authenticate at the picked endpoint instead.
		if let Some(backend_auth) = backend.auth.as_ref().filter(|_| !backend.is_dynamic()) {
			let path = transform
				.headers
				.set
				.iter()
				.rev()
				.find(|(k, _)| k.as_str() == ":path")
				.map(|(_, v)| v.clone())
				.or_else(|| self.headers.path.as_deref().map(strng::new))
				.unwrap_or_default();
			let body = transform.body.as_deref().unwrap_or(raw_body.as_ref());
			let pending = PendingRequest {
				method: self.headers.method.as_deref().unwrap_or("POST"),
				path: path.as_str(),
				content_type: "application/json",
				body,
			};
			let signed = tokio::time::timeout(CALL_TIMEOUT, auth::apply_backend_auth(backend_auth, pending))
				.await
				.map_err(|_| ProcessorError::AuthHandler("deadline exceeded".to_string()))?
				.map_err(|e| ProcessorError::AuthHandler(e.to_string()))?;
			transform.headers.set.extend(signed);
		}

		self.model = Some(model);
		self.backend = Some(backend);
		self.translator = Some(translator);
		self.phase = Phase::Routed;
		// The proxy must re-run route selection against the mutated headers.
		Ok(mutation::request_body_response(
			mutation::header_mutation(transform.headers.set, transform.headers.remove),
			transform.body,
			true,
		))
	}

	fn cost_metadata(&self) -> Option<prost_wkt_types::Struct> {
		if self.snapshot.request_costs.is_empty() {
			return None;
		}
		let model = self.model.as_deref().unwrap_or("");
		let backend = self
			.backend
			.as_ref()
			.map(|b| b.name.as_str())
			.unwrap_or("");
		let mut entries = Vec::with_capacity(self.snapshot.request_costs.len());
		for rule in &self.snapshot.request_costs {
			let value = match &rule.kind {
				CostKind::InputToken => self.usage.input as u64,
				CostKind::OutputToken => self.usage.output as u64,
				CostKind::TotalToken => self.usage.total as u64,
				CostKind::Cel(program) => {
					match program.eval(&CostContext {
						model,
						backend,
						usage: self.usage,
					}) {
						Ok(v) => v,
						Err(err) => {
							// The stream continues; the field is simply omitted.
							warn!(key = %rule.metadata_key, %err, "cost expression failed");
							continue;
						},
					}
				},
			};
			let value = if value > u32::MAX as u64 {
				warn!(key = %rule.metadata_key, value, "cost value clamped to u32 range");
				u32::MAX as u64
			} else {
				value
			};
			entries.push((rule.metadata_key.clone(), value));
		}
		mutation::cost_metadata(&self.snapshot.metadata_namespace, &entries)
	}
}

#[async_trait]
impl Processor for CompletionsProcessor {
	async fn request_headers(&mut self) -> Result<pb::ProcessingResponse, ProcessorError> {
		if self.phase != Phase::Start {
			return Err(ProcessorError::OutOfOrder("request headers"));
		}
		self.phase = Phase::HeadersSeen;
		// Headers were captured at construction; nothing to mutate yet.
		Ok(mutation::request_headers_response(None))
	}

	async fn request_body(
		&mut self,
		body: pb::HttpBody,
	) -> Result<pb::ProcessingResponse, ProcessorError> {
		if self.phase != Phase::HeadersSeen {
			return Err(ProcessorError::OutOfOrder("request body"));
		}
		let data = body.body;
		match self.route {
			RouteType::ChatCompletions => {
				let req: universal::Request = serde_json::from_slice(&data)
					.map_err(|e| ProcessorError::ParseRequest(e.to_string()))?;
				let model = strng::new(&req.model);
				self.streaming = req.stream.unwrap_or_default();
				self
					.route_and_translate(model, &data, move |t| t.request_body(req))
					.await
			},
			RouteType::Embeddings => {
				let req: embeddings::Request = serde_json::from_slice(&data)
					.map_err(|e| ProcessorError::ParseRequest(e.to_string()))?;
				let model = strng::new(&req.model);
				self
					.route_and_translate(model, &data, move |t| t.embeddings_body(&req))
					.await
			},
		}
	}

	async fn response_headers(
		&mut self,
		headers: pb::HttpHeaders,
	) -> Result<pb::ProcessingResponse, ProcessorError> {
		// An earlier filter may short-circuit the response before a request
		// body was ever seen; that is not an ordering violation.
		if self.phase != Phase::Routed && self.phase != Phase::HeadersSeen {
			return Err(ProcessorError::OutOfOrder("response headers"));
		}
		let h = Headers::from_proto(headers.headers);
		self.response_status = h.status.unwrap_or(200);
		self.decoder = Some(BodyDecoder::new(h.get("content-encoding")));
		// TODO: the dynamic-selector handle is still held here; decide whether a
		// 5xx status should re-route through it instead of passing through.
		let resp = match self.translator.as_mut() {
			None => mutation::response_headers_response(None, None),
			Some(translator) => {
				let edit = translator.response_headers(self.response_status, &h.map)?;
				let mode_override = if self.streaming && self.response_status == 200 {
					Some(mutation::streamed_response_mode())
				} else {
					None
				};
				mutation::response_headers_response(
					mutation::header_mutation(edit.set, edit.remove),
					mode_override,
				)
			},
		};
		self.phase = Phase::RespHeadersSeen;
		Ok(resp)
	}

	async fn response_body(
		&mut self,
		body: pb::HttpBody,
	) -> Result<pb::ProcessingResponse, ProcessorError> {
		if self.phase != Phase::RespHeadersSeen {
			return Err(ProcessorError::OutOfOrder("response body"));
		}
		let end_of_stream = body.end_of_stream;
		let Some(translator) = self.translator.as_mut() else {
			if end_of_stream {
				let success = (200..300).contains(&self.response_status);
				self.metrics.record_completion(success);
				self.phase = Phase::Closed;
			}
			return Ok(mutation::response_body_response(None, None, None));
		};
		let decoder = self.decoder.get_or_insert_with(|| BodyDecoder::new(None));
		let data = decoder
			.decode(&body.body, end_of_stream)
			.map_err(|e| ProcessorError::Decompress(e.to_string()))?;
		let transform = translator.response_body(&data, end_of_stream)?;

		if let Some(delta) = transform.usage {
			match self.snapshot.token_usage_policy {
				TokenUsagePolicy::Accumulate => self.usage.accumulate(delta),
				TokenUsagePolicy::FinalOnly => self.usage = delta,
			}
			self.metrics.record_usage(delta);
		}
		if self.streaming {
			self
				.metrics
				.record_token_latency(transform.usage.map(|d| d.output).unwrap_or(0));
		}

		let mut dynamic_metadata = None;
		if end_of_stream {
			dynamic_metadata = self.cost_metadata();
			let success = (200..300).contains(&self.response_status);
			self.metrics.record_completion(success);
			self.phase = Phase::Closed;
		}
		Ok(mutation::response_body_response(
			None,
			transform.body,
			dynamic_metadata,
		))
	}
}

/// Paths without a registered factory: no mutation, no translation, but the
/// request still shows up in the metrics.
pub struct PassthroughProcessor {
	metrics: RequestMetrics,
	phase: Phase,
}

impl PassthroughProcessor {
	pub fn new(metrics: RequestMetrics) -> PassthroughProcessor {
		PassthroughProcessor {
			metrics,
			phase: Phase::Start,
		}
	}
}

#[async_trait]
impl Processor for PassthroughProcessor {
	async fn request_headers(&mut self) -> Result<pb::ProcessingResponse, ProcessorError> {
		if self.phase != Phase::Start {
			return Err(ProcessorError::OutOfOrder("request headers"));
		}
		self.phase = Phase::HeadersSeen;
		Ok(mutation::request_headers_response(None))
	}

	async fn request_body(
		&mut self,
		_body: pb::HttpBody,
	) -> Result<pb::ProcessingResponse, ProcessorError> {
		if self.phase != Phase::HeadersSeen {
			return Err(ProcessorError::OutOfOrder("request body"));
		}
		self.phase = Phase::Routed;
		Ok(mutation::request_body_response(None, None, false))
	}

	async fn response_headers(
		&mut self,
		_headers: pb::HttpHeaders,
	) -> Result<pb::ProcessingResponse, ProcessorError> {
		if self.phase != Phase::Routed && self.phase != Phase::HeadersSeen {
			return Err(ProcessorError::OutOfOrder("response headers"));
		}
		self.phase = Phase::RespHeadersSeen;
		Ok(mutation::response_headers_response(None, None))
	}

	async fn response_body(
		&mut self,
		body: pb::HttpBody,
	) -> Result<pb::ProcessingResponse, ProcessorError> {
		if self.phase != Phase::RespHeadersSeen {
			return Err(ProcessorError::OutOfOrder("response body"));
		}
		if body.end_of_stream {
			self.metrics.record_completion(true);
			self.phase = Phase::Closed;
		}
		Ok(mutation::response_body_response(None, None, None))
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use prometheus_client::registry::Registry;
	use serde_json::json;

	use super::*;
	use crate::config;
	use crate::proto::envoy::config::core::v3 as core_pb;
	use crate::telemetry::metrics::Metrics;

	const CONFIG: &str = r#"
schema:
  name: OpenAI
rules:
- headers:
  - name: x-ai-eg-model
    type: Exact
    value: gpt-4o-mini
  backends:
  - name: openai
    weight: 1
    schema:
      name: OpenAI
- headers:
  - name: x-ai-eg-model
    type: Prefix
    value: llama3
  backends:
  - name: aws-bedrock
    weight: 1
    schema:
      name: AWSBedrock
- headers:
  - name: x-ai-eg-model
    type: Exact
    value: picked
  backends:
  - name: dynamic
    weight: 1
    schema:
      name: OpenAI
    dynamicLoadBalancing:
      endpoints: ["10.1.1.1:8080"]
llmRequestCosts:
- metadataKey: input
  type: InputToken
- metadataKey: c
  type: CEL
  cel: "input_tokens * 2 + output_tokens"
"#;

	fn snapshot(contents: &str) -> Arc<Snapshot> {
		Arc::new(config::parse_and_compile(contents).unwrap())
	}

	fn request_metrics() -> RequestMetrics {
		let mut registry = Registry::default();
		RequestMetrics::start(Arc::new(Metrics::new(&mut registry)))
	}

	fn request_headers(path: &str) -> Headers {
		Headers::from_proto(Some(core_pb::HeaderMap {
			headers: vec![
				header(":method", "POST"),
				header(":path", path),
				header("x-request-id", "test-request-1"),
				header("content-type", "application/json"),
			],
		}))
	}

	fn header(key: &str, value: &str) -> core_pb::HeaderValue {
		core_pb::HeaderValue {
			key: key.to_string(),
			value: value.to_string(),
			raw_value: Bytes::new(),
		}
	}

	fn chat_processor(cfg: &str) -> CompletionsProcessor {
		CompletionsProcessor::new(
			snapshot(cfg),
			request_metrics(),
			RouteType::ChatCompletions,
			request_headers("/v1/chat/completions"),
		)
		.unwrap()
	}

	fn body_event(data: &[u8], end_of_stream: bool) -> pb::HttpBody {
		pb::HttpBody {
			body: Bytes::copy_from_slice(data),
			end_of_stream,
		}
	}

	fn response_headers_event(pairs: &[(&str, &str)]) -> pb::HttpHeaders {
		pb::HttpHeaders {
			headers: Some(core_pb::HeaderMap {
				headers: pairs.iter().map(|(k, v)| header(k, v)).collect(),
			}),
			end_of_stream: false,
		}
	}

	fn common(resp: &pb::ProcessingResponse) -> &pb::CommonResponse {
		use crate::proto::envoy::service::ext_proc::v3::processing_response::Response;
		match resp.response.as_ref().unwrap() {
			Response::RequestHeaders(h) | Response::ResponseHeaders(h) => h.response.as_ref().unwrap(),
			Response::RequestBody(b) | Response::ResponseBody(b) => b.response.as_ref().unwrap(),
			other => panic!("unexpected response {other:?}"),
		}
	}

	fn set_headers(resp: &pb::ProcessingResponse) -> Vec<(String, String)> {
		common(resp)
			.header_mutation
			.iter()
			.flat_map(|m| &m.set_headers)
			.filter_map(|o| o.header.as_ref())
			.map(|h| {
				(
					h.key.clone(),
					String::from_utf8_lossy(&h.raw_value).to_string(),
				)
			})
			.collect()
	}

	fn header_value(resp: &pb::ProcessingResponse, key: &str) -> Option<String> {
		set_headers(resp)
			.into_iter()
			.find(|(k, _)| k == key)
			.map(|(_, v)| v)
	}

	fn chat_body() -> Vec<u8> {
		serde_json::to_vec(&json!({
			"model": "gpt-4o-mini",
			"messages": [{"role": "user", "content": "hi"}]
		}))
		.unwrap()
	}

	fn openai_usage_response() -> Vec<u8> {
		serde_json::to_vec(&json!({
			"id": "chatcmpl-1",
			"object": "chat.completion",
			"created": 1,
			"model": "gpt-4o-mini",
			"choices": [],
			"usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
		}))
		.unwrap()
	}

	#[tokio::test]
	async fn openai_passthrough_full_stream() {
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();

		let resp = p.request_body(body_event(&chat_body(), true)).await.unwrap();
		let cr = common(&resp);
		assert!(cr.clear_route_cache);
		// pass-through: no body rewrite
		assert!(cr.body_mutation.is_none());
		assert_eq!(
			header_value(&resp, "x-ai-eg-model").as_deref(),
			Some("gpt-4o-mini")
		);
		assert_eq!(
			header_value(&resp, "x-ai-eg-selected-backend").as_deref(),
			Some("openai")
		);

		let resp = p
			.response_headers(response_headers_event(&[(":status", "200")]))
			.await
			.unwrap();
		assert!(resp.mode_override.is_none());

		let resp = p
			.response_body(body_event(&openai_usage_response(), true))
			.await
			.unwrap();
		assert!(common(&resp).body_mutation.is_none());
		let metadata = resp.dynamic_metadata.unwrap();
		let ns = serde_json::to_value(metadata.fields.get("io.envoy.ai_gateway").unwrap()).unwrap();
		assert_eq!(ns["input"], 10.0);
		assert_eq!(ns["c"], 23.0);
	}

	#[tokio::test]
	async fn no_matching_rule_is_404() {
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		let body = serde_json::to_vec(&json!({
			"model": "unknown-model",
			"messages": [{"role": "user", "content": "hi"}]
		}))
		.unwrap();
		let err = p.request_body(body_event(&body, true)).await.unwrap_err();
		assert!(matches!(err, ProcessorError::NoMatchingRule(_)));
		assert_eq!(err.status(), 404);
		assert!(err.response_body().contains("no routing rule matched"));
	}

	#[tokio::test]
	async fn malformed_request_body_is_400() {
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		let err = p
			.request_body(body_event(b"{not json", true))
			.await
			.unwrap_err();
		assert!(matches!(err, ProcessorError::ParseRequest(_)));
		assert_eq!(err.status(), 400);
	}

	#[tokio::test]
	async fn out_of_order_events_are_fatal() {
		let mut p = chat_processor(CONFIG);
		// body before headers
		let err = p
			.request_body(body_event(&chat_body(), true))
			.await
			.unwrap_err();
		assert!(matches!(err, ProcessorError::OutOfOrder(_)));

		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		let err = p
			.response_body(body_event(&[], true))
			.await
			.unwrap_err();
		assert!(matches!(err, ProcessorError::OutOfOrder(_)));

		// double request headers
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		assert!(matches!(
			p.request_headers().await,
			Err(ProcessorError::OutOfOrder(_))
		));
	}

	#[tokio::test]
	async fn streaming_gets_mode_override() {
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		let body = serde_json::to_vec(&json!({
			"model": "gpt-4o-mini",
			"stream": true,
			"messages": [{"role": "user", "content": "hi"}]
		}))
		.unwrap();
		p.request_body(body_event(&body, true)).await.unwrap();
		let resp = p
			.response_headers(response_headers_event(&[(":status", "200")]))
			.await
			.unwrap();
		let mode = resp.mode_override.unwrap();
		assert_eq!(
			mode.response_body_mode,
			crate::proto::envoy::extensions::filters::http::ext_proc::v3::processing_mode::BodySendMode::Streamed
				as i32
		);

		// a non-200 streaming response keeps the buffered mode
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		let body = serde_json::to_vec(&json!({
			"model": "gpt-4o-mini",
			"stream": true,
			"messages": [{"role": "user", "content": "hi"}]
		}))
		.unwrap();
		p.request_body(body_event(&body, true)).await.unwrap();
		let resp = p
			.response_headers(response_headers_event(&[(":status", "500")]))
			.await
			.unwrap();
		assert!(resp.mode_override.is_none());
	}

	#[tokio::test]
	async fn unsupported_input_schema_fails_construction() {
		let err = CompletionsProcessor::new(
			snapshot("schema:\n  name: Anthropic\n"),
			request_metrics(),
			RouteType::ChatCompletions,
			request_headers("/v1/chat/completions"),
		)
		.err()
		.unwrap();
		assert!(matches!(err, ProcessorError::UnsupportedSchema(_)));
		assert_eq!(err.status(), 400);
	}

	#[tokio::test]
	async fn empty_final_body_still_attaches_cost_metadata() {
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		p.request_body(body_event(&chat_body(), true)).await.unwrap();
		p.response_headers(response_headers_event(&[(":status", "200")]))
			.await
			.unwrap();
		let resp = p.response_body(body_event(&[], true)).await.unwrap();
		assert!(common(&resp).body_mutation.is_none());
		let metadata = resp.dynamic_metadata.unwrap();
		let ns = serde_json::to_value(metadata.fields.get("io.envoy.ai_gateway").unwrap()).unwrap();
		assert_eq!(ns["input"], 0.0);
		assert_eq!(ns["c"], 0.0);
	}

	#[tokio::test]
	async fn gzip_response_bodies_are_decompressed_for_translation() {
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		p.request_body(body_event(&chat_body(), true)).await.unwrap();
		p.response_headers(response_headers_event(&[
			(":status", "200"),
			("content-encoding", "gzip"),
		]))
		.await
		.unwrap();

		let mut enc =
			flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
		enc.write_all(&openai_usage_response()).unwrap();
		let compressed = enc.finish().unwrap();
		let resp = p.response_body(body_event(&compressed, true)).await.unwrap();
		let metadata = resp.dynamic_metadata.unwrap();
		let ns = serde_json::to_value(metadata.fields.get("io.envoy.ai_gateway").unwrap()).unwrap();
		assert_eq!(ns["input"], 10.0);
	}

	#[tokio::test]
	async fn truncated_gzip_is_a_decompress_error() {
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		p.request_body(body_event(&chat_body(), true)).await.unwrap();
		p.response_headers(response_headers_event(&[
			(":status", "200"),
			("content-encoding", "gzip"),
		]))
		.await
		.unwrap();

		let mut enc =
			flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
		enc.write_all(&openai_usage_response()).unwrap();
		let compressed = enc.finish().unwrap();
		let err = p
			.response_body(body_event(&compressed[..compressed.len() - 5], true))
			.await
			.unwrap_err();
		assert!(matches!(err, ProcessorError::Decompress(_)));
		assert_eq!(err.status(), 500);
	}

	#[tokio::test]
	async fn dynamic_backend_uses_selector_and_literal_cluster_name() {
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		let body = serde_json::to_vec(&json!({
			"model": "picked",
			"messages": [{"role": "user", "content": "hi"}]
		}))
		.unwrap();
		let resp = p.request_body(body_event(&body, true)).await.unwrap();
		assert_eq!(
			header_value(&resp, "x-ai-eg-selected-backend").as_deref(),
			Some("original_destination_cluster")
		);
		assert_eq!(
			header_value(&resp, "x-gateway-destination-endpoint").as_deref(),
			Some("10.1.1.1:8080")
		);
	}

	#[tokio::test]
	async fn bedrock_request_is_rewritten() {
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		let body = serde_json::to_vec(&json!({
			"model": "llama3-70b",
			"messages": [{"role": "user", "content": "hi"}]
		}))
		.unwrap();
		let resp = p.request_body(body_event(&body, true)).await.unwrap();
		assert_eq!(
			header_value(&resp, ":path").as_deref(),
			Some("/model/llama3-70b/converse")
		);
		assert_eq!(
			header_value(&resp, "x-ai-eg-selected-backend").as_deref(),
			Some("aws-bedrock")
		);
		let cr = common(&resp);
		let Some(pb::BodyMutation {
			mutation: Some(pb::body_mutation::Mutation::Body(b)),
		}) = &cr.body_mutation
		else {
			panic!("expected a body rewrite");
		};
		let v: serde_json::Value = serde_json::from_slice(b).unwrap();
		assert_eq!(v["modelId"], json!("llama3-70b"));
	}

	#[tokio::test]
	async fn response_headers_without_translator_passes_through() {
		// An earlier filter answered before we saw a request body.
		let mut p = chat_processor(CONFIG);
		p.request_headers().await.unwrap();
		let resp = p
			.response_headers(response_headers_event(&[(":status", "403")]))
			.await
			.unwrap();
		assert!(common(&resp).header_mutation.is_none());
		let resp = p.response_body(body_event(b"denied", true)).await.unwrap();
		assert!(common(&resp).body_mutation.is_none());
		assert!(resp.dynamic_metadata.is_none());
	}

	#[tokio::test]
	async fn passthrough_processor_never_mutates() {
		let mut p = PassthroughProcessor::new(request_metrics());
		let resp = p.request_headers().await.unwrap();
		assert!(common(&resp).header_mutation.is_none());
		let resp = p.request_body(body_event(b"anything", true)).await.unwrap();
		assert!(common(&resp).body_mutation.is_none());
		assert!(!common(&resp).clear_route_cache);
		p.response_headers(response_headers_event(&[(":status", "200")]))
			.await
			.unwrap();
		let resp = p.response_body(body_event(b"anything", true)).await.unwrap();
		assert!(common(&resp).body_mutation.is_none());
	}
}
