use aws_event_stream_parser::EventStreamCodec;
use bytes::BytesMut;
use itertools::Itertools;
use rand::Rng;
use tokio_sse_codec::{Event, Frame, SseEncoder};
use tokio_util::codec::{Decoder, Encoder};

use super::{AIError, BodyTransform, HeaderEdit, RequestTransform, TokenUsage};
use crate::llm::bedrock::types::{
	ContentBlock, ContentBlockDelta, ConverseErrorResponse, ConverseRequest, ConverseResponse,
	ConverseStreamOutput, StopReason,
};
use crate::llm::universal;
use crate::*;

pub const NAME: Strng = strng::literal!("bedrock");

const X_AMZN_REQUEST_ID: &str = "x-amzn-requestid";

/// OpenAI→Bedrock. Requests are re-encoded as the Converse schema and the
/// path is rewritten to the model-scoped invoke URL; streamed responses are
/// re-framed from the AWS binary event stream into OpenAI SSE records.
pub struct Translator {
	model: String,
	streaming: bool,
	ok: bool,
	message_id: Option<String>,
	created: u32,
	decoder: EventStreamCodec,
	buffer: BytesMut,
	encoder: SseEncoder,
	usage_reported: bool,
}

impl Translator {
	pub fn new() -> Translator {
		Translator {
			model: String::new(),
			streaming: false,
			ok: true,
			message_id: None,
			created: 0,
			decoder: EventStreamCodec,
			buffer: BytesMut::new(),
			encoder: SseEncoder::new(),
			usage_reported: false,
		}
	}

	pub fn request_body(&mut self, req: universal::Request) -> Result<RequestTransform, AIError> {
		self.model = req.model.clone();
		self.streaming = req.stream.unwrap_or_default();
		let path = if self.streaming {
			strng::format!("/model/{}/converse-stream", self.model)
		} else {
			strng::format!("/model/{}/converse", self.model)
		};
		let bedrock_request = translate_request(req);
		let body = serde_json::to_vec(&bedrock_request).map_err(AIError::RequestMarshal)?;
		Ok(RequestTransform {
			headers: HeaderEdit {
				set: vec![
					(strng::literal!(":path"), path),
					(strng::literal!("content-type"), strng::literal!("application/json")),
				],
				remove: vec![strng::literal!("content-length")],
			},
			body: Some(Bytes::from(body)),
		})
	}

	pub fn response_headers(
		&mut self,
		status: u16,
		headers: &http::HeaderMap,
	) -> Result<HeaderEdit, AIError> {
		self.ok = (200..300).contains(&status);
		// Bedrock doesn't return an ID, so get one from the request... if we can.
		// Whatever we pick must stay fixed across all chunks of the stream.
		self.message_id = headers
			.get(X_AMZN_REQUEST_ID)
			.and_then(|s| s.to_str().ok().map(|s| s.to_owned()))
			.or_else(|| Some(format!("{:016x}", rand::rng().random::<u64>())));
		// This is static for all chunks!
		self.created = chrono::Utc::now().timestamp() as u32;
		let mut edit = HeaderEdit {
			set: vec![],
			remove: vec![strng::literal!("content-length")],
		};
		if self.streaming && self.ok {
			edit.set.push((
				strng::literal!("content-type"),
				strng::literal!("text/event-stream"),
			));
		} else {
			edit.set.push((
				strng::literal!("content-type"),
				strng::literal!("application/json"),
			));
		}
		Ok(edit)
	}

	pub fn response_body(&mut self, data: &[u8], end_of_stream: bool) -> Result<BodyTransform, AIError> {
		if !self.ok {
			return self.translate_error_body(data, end_of_stream);
		}
		if self.streaming {
			return self.translate_stream_chunk(data, end_of_stream);
		}
		if data.is_empty() {
			return Ok(BodyTransform::default());
		}
		let resp = serde_json::from_slice::<ConverseResponse>(data).map_err(AIError::ResponseParsing)?;
		let usage = resp.usage.map(|u| TokenUsage {
			input: u.input_tokens as u32,
			output: u.output_tokens as u32,
			total: u.total_tokens as u32,
		});
		let openai = translate_response(resp, self.message_id.as_deref(), &self.model, self.created)?;
		let body = serde_json::to_vec(&openai).map_err(AIError::ResponseMarshal)?;
		let usage = if self.usage_reported { None } else { usage };
		self.usage_reported |= usage.is_some();
		Ok(BodyTransform {
			body: Some(Bytes::from(body)),
			usage,
		})
	}

	fn translate_error_body(
		&mut self,
		data: &[u8],
		_end_of_stream: bool,
	) -> Result<BodyTransform, AIError> {
		if data.is_empty() {
			return Ok(BodyTransform::default());
		}
		// Synthesize an OpenAI error envelope even when the body isn't the
		// documented error shape.
		let message = match serde_json::from_slice::<ConverseErrorResponse>(data) {
			Ok(err) => err.message,
			Err(_) => String::from_utf8_lossy(data).to_string(),
		};
		let err = universal::ChatCompletionErrorResponse {
			error: universal::ChatCompletionError {
				r#type: "invalid_request_error".to_string(),
				message,
				param: None,
				code: None,
			},
		};
		let body = serde_json::to_vec(&err).map_err(AIError::ResponseMarshal)?;
		Ok(BodyTransform {
			body: Some(Bytes::from(body)),
			usage: None,
		})
	}

	fn translate_stream_chunk(
		&mut self,
		data: &[u8],
		end_of_stream: bool,
	) -> Result<BodyTransform, AIError> {
		self.buffer.extend_from_slice(data);
		let mut out = BytesMut::new();
		let mut usage = None;
		loop {
			let decoded = if end_of_stream {
				self
					.decoder
					.decode_eof(&mut self.buffer)
					.map_err(|_| AIError::IncompleteFraming(self.buffer.len().max(1)))?
			} else {
				self
					.decoder
					.decode(&mut self.buffer)
					.map_err(|e| AIError::EventStream(e.to_string()))?
			};
			let message = match decoded {
				Some(m) => m,
				None => break,
			};
			let output = match ConverseStreamOutput::deserialize(message) {
				Ok(o) => o,
				Err(e) => {
					// Unknown event types are forward-compatibility, not corruption.
					debug!("skipping bedrock stream event: {e}");
					continue;
				},
			};
			if let Some(chunk) = self.translate_stream_event(output, &mut usage) {
				self.emit_sse(&chunk, &mut out)?;
			}
		}
		if end_of_stream {
			if !self.buffer.is_empty() {
				return Err(AIError::IncompleteFraming(self.buffer.len()));
			}
			self
				.encoder
				.encode(
					Frame::Event(Event::<Bytes> {
						data: Bytes::from_static(b"[DONE]"),
						name: std::borrow::Cow::Borrowed(""),
						id: None,
					}),
					&mut out,
				)
				.map_err(|e| AIError::SseDecode(e.to_string()))?;
		}
		let body = if out.is_empty() {
			None
		} else {
			Some(out.freeze())
		};
		Ok(BodyTransform { body, usage })
	}

	fn emit_sse(&mut self, chunk: &universal::StreamResponse, out: &mut BytesMut) -> Result<(), AIError> {
		let json = serde_json::to_vec(chunk).map_err(AIError::ResponseMarshal)?;
		self
			.encoder
			.encode(
				Frame::Event(Event::<Bytes> {
					data: Bytes::from(json),
					name: std::borrow::Cow::Borrowed(""),
					id: None,
				}),
				out,
			)
			.map_err(|e| AIError::SseDecode(e.to_string()))
	}

	fn translate_stream_event(
		&mut self,
		output: ConverseStreamOutput,
		usage: &mut Option<TokenUsage>,
	) -> Option<universal::StreamResponse> {
		let message_id = self.message_id.clone().unwrap_or_default();
		let model = self.model.clone();
		let created = self.created;
		let mk = move |choices: Vec<universal::ChatChoiceStream>, usage: Option<universal::Usage>| {
			Some(universal::StreamResponse {
				id: message_id.clone(),
				model: model.clone(),
				object: "chat.completion.chunk".to_string(),
				system_fingerprint: None,
				service_tier: None,
				created,
				choices,
				usage,
			})
		};
		match output {
			ConverseStreamOutput::ContentBlockDelta(d) => match d.delta {
				Some(ContentBlockDelta::Text(s)) => {
					let choice = universal::ChatChoiceStream {
						index: 0,
						logprobs: None,
						delta: universal::StreamResponseDelta {
							role: None,
							content: Some(s),
							refusal: None,
							#[allow(deprecated)]
							function_call: None,
							tool_calls: None,
						},
						finish_reason: None,
					};
					mk(vec![choice], None)
				},
				_ => None,
			},
			ConverseStreamOutput::ContentBlockStart(_) => {
				// TODO support tool calls
				None
			},
			ConverseStreamOutput::ContentBlockStop(_) => None,
			ConverseStreamOutput::MessageStart(start) => {
				// Just send a blob with the role
				let choice = universal::ChatChoiceStream {
					index: 0,
					logprobs: None,
					delta: universal::StreamResponseDelta {
						role: Some(match start.role {
							types::Role::Assistant => universal::Role::Assistant,
							types::Role::User => universal::Role::User,
						}),
						content: None,
						refusal: None,
						#[allow(deprecated)]
						function_call: None,
						tool_calls: None,
					},
					finish_reason: None,
				};
				mk(vec![choice], None)
			},
			ConverseStreamOutput::MessageStop(stop) => {
				let choice = universal::ChatChoiceStream {
					index: 0,
					logprobs: None,
					delta: universal::StreamResponseDelta {
						role: None,
						content: None,
						refusal: None,
						#[allow(deprecated)]
						function_call: None,
						tool_calls: None,
					},
					finish_reason: Some(translate_stop_reason(&stop.stop_reason)),
				};
				mk(vec![choice], None)
			},
			ConverseStreamOutput::Metadata(metadata) => {
				let token_usage = metadata.usage?;
				if !self.usage_reported {
					self.usage_reported = true;
					*usage = Some(TokenUsage {
						input: token_usage.input_tokens as u32,
						output: token_usage.output_tokens as u32,
						total: token_usage.total_tokens as u32,
					});
				}
				mk(
					vec![],
					Some(universal::Usage {
						prompt_tokens: token_usage.input_tokens as u32,
						completion_tokens: token_usage.output_tokens as u32,
						total_tokens: token_usage.total_tokens as u32,
						prompt_tokens_details: None,
						completion_tokens_details: None,
					}),
				)
			},
		}
	}
}

pub(super) fn translate_response(
	resp: ConverseResponse,
	message_id: Option<&str>,
	model: &str,
	created: u32,
) -> Result<universal::Response, AIError> {
	let output = resp.output.ok_or(AIError::IncompleteResponse)?;
	let message = match output {
		types::ConverseOutput::Message(msg) => msg,
		types::ConverseOutput::Unknown => return Err(AIError::IncompleteResponse),
	};
	// Bedrock has a vec of possible content types, while openai allows 1 text
	// content and many tool calls. Assume the bedrock response has only one text.
	let mut tool_calls: Vec<universal::MessageToolCall> = Vec::new();
	let mut content = None;
	for block in &message.content {
		match block {
			ContentBlock::Text(text) => {
				content = Some(text.clone());
			},
			ContentBlock::ToolResult(_) => {
				// There should not be a ToolResult in the response, only in the request
				continue;
			},
			ContentBlock::ToolUse(tu) => {
				let Ok(args) = serde_json::to_string(&tu.input) else {
					continue;
				};
				tool_calls.push(universal::MessageToolCall {
					id: tu.tool_use_id.clone(),
					r#type: universal::ToolType::Function,
					function: universal::FunctionCall {
						name: tu.name.clone(),
						arguments: args,
					},
				});
			},
		};
	}

	let message = universal::ResponseMessage {
		role: universal::Role::Assistant,
		content,
		tool_calls: if tool_calls.is_empty() {
			None
		} else {
			Some(tool_calls)
		},
		#[allow(deprecated)]
		function_call: None,
		refusal: None,
		audio: None,
	};
	let choice = universal::ChatChoice {
		index: 0,
		message,
		finish_reason: Some(translate_stop_reason(&resp.stop_reason)),
		logprobs: None,
	};

	let usage = resp
		.usage
		.map(|token_usage| universal::Usage {
			prompt_tokens: token_usage.input_tokens as u32,
			completion_tokens: token_usage.output_tokens as u32,
			total_tokens: token_usage.total_tokens as u32,
			prompt_tokens_details: None,
			completion_tokens_details: None,
		})
		.unwrap_or_default();

	let id = message_id
		.map(|m| m.to_string())
		.unwrap_or_else(|| format!("bedrock-{}", chrono::Utc::now().timestamp_millis()));

	Ok(universal::Response {
		id,
		object: "chat.completion".to_string(),
		created,
		model: model.to_string(),
		choices: vec![choice],
		usage: Some(usage),
		service_tier: None,
		system_fingerprint: None,
	})
}

fn translate_stop_reason(resp: &StopReason) -> universal::FinishReason {
	match resp {
		StopReason::EndTurn => universal::FinishReason::Stop,
		StopReason::MaxTokens => universal::FinishReason::Length,
		StopReason::StopSequence => universal::FinishReason::Stop,
		StopReason::ContentFiltered => universal::FinishReason::ContentFilter,
		StopReason::GuardrailIntervened => universal::FinishReason::ContentFilter,
		StopReason::ToolUse => universal::FinishReason::ToolCalls,
	}
}

pub(super) fn translate_request(req: universal::Request) -> ConverseRequest {
	// Bedrock has system prompts in a separate field. Join them
	let system = req
		.messages
		.iter()
		.filter_map(|msg| {
			if universal::message_role(msg) == universal::SYSTEM_ROLE {
				universal::message_text(msg).map(|s| s.to_string())
			} else {
				None
			}
		})
		.collect::<Vec<String>>()
		.join("\n");

	let messages = req
		.messages
		.iter()
		.filter(|msg| universal::message_role(msg) != universal::SYSTEM_ROLE)
		.filter_map(|msg| {
			let role = match universal::message_role(msg) {
				universal::ASSISTANT_ROLE => types::Role::Assistant,
				// Default to user for other roles
				_ => types::Role::User,
			};
			universal::message_text(msg)
				.map(|s| vec![ContentBlock::Text(s.to_string())])
				.map(|content| types::Message { role, content })
		})
		.collect();

	let inference_config = types::InferenceConfiguration {
		max_tokens: universal::max_tokens(&req),
		temperature: req.temperature,
		top_p: req.top_p,
		stop_sequences: universal::stop_sequence(&req),
	};

	let metadata = req
		.user
		.map(|user| HashMap::from([("user_id".to_string(), user)]));

	let tool_choice = match req.tool_choice {
		Some(universal::ToolChoiceOption::Named(universal::NamedToolChoice {
			r#type: _,
			function,
		})) => Some(types::ToolChoice::Tool {
			name: function.name,
		}),
		Some(universal::ToolChoiceOption::Auto) => Some(types::ToolChoice::Auto),
		Some(universal::ToolChoiceOption::Required) => Some(types::ToolChoice::Any),
		Some(universal::ToolChoiceOption::None) => None,
		None => None,
	};
	let tools = req.tools.map(|tools| {
		tools
			.into_iter()
			.map(|tool| {
				types::Tool::ToolSpec(types::ToolSpecification {
					name: tool.function.name,
					description: tool.function.description,
					input_schema: tool.function.parameters.map(types::ToolInputSchema::Json),
				})
			})
			.collect_vec()
	});
	let tool_config = tools.map(|tools| types::ToolConfiguration { tools, tool_choice });

	ConverseRequest {
		model_id: req.model,
		messages,
		system: if system.is_empty() {
			None
		} else {
			Some(vec![types::SystemContentBlock::Text { text: system }])
		},
		inference_config: Some(inference_config),
		tool_config,
		request_metadata: metadata,
	}
}

pub(super) mod types {
	use std::collections::HashMap;

	use serde::{Deserialize, Serialize};

	#[derive(Copy, Clone, Deserialize, Serialize, Debug, Default)]
	#[serde(rename_all = "camelCase")]
	pub enum Role {
		#[default]
		User,
		Assistant,
	}

	#[derive(Clone, Deserialize, Serialize, Debug)]
	#[serde(rename_all = "camelCase")]
	pub enum ContentBlock {
		Text(String),
		ToolResult(ToolResultBlock),
		ToolUse(ToolUseBlock),
	}

	#[derive(Clone, Deserialize, Serialize, Debug)]
	#[serde(rename_all = "camelCase")]
	pub struct ToolResultBlock {
		/// The ID of the tool request that this is the result for.
		pub tool_use_id: String,
		/// The content for tool result content block.
		pub content: Vec<ToolResultContentBlock>,
	}

	#[derive(Clone, Deserialize, Serialize, Debug)]
	#[serde(rename_all = "camelCase")]
	pub struct ToolUseBlock {
		/// The ID for the tool request.
		pub tool_use_id: String,
		/// The name of the tool that the model wants to use.
		pub name: String,
		/// The input to pass to the tool.
		pub input: serde_json::Value,
	}

	#[derive(Clone, Deserialize, Serialize, Debug)]
	#[serde(rename_all = "camelCase")]
	pub enum ToolResultContentBlock {
		/// A tool result that is text.
		Text(String),
	}

	#[derive(Clone, Deserialize, Serialize, Debug)]
	#[serde(rename_all = "camelCase")]
	#[serde(untagged)]
	pub enum SystemContentBlock {
		Text { text: String },
	}

	#[derive(Clone, Deserialize, Serialize, Debug)]
	#[serde(rename_all = "camelCase")]
	pub struct Message {
		pub role: Role,
		pub content: Vec<ContentBlock>,
	}

	#[derive(Clone, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "camelCase")]
	pub struct InferenceConfiguration {
		/// The maximum number of tokens to generate before stopping.
		pub max_tokens: usize,
		/// Amount of randomness injected into the response.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub temperature: Option<f32>,
		/// Use nucleus sampling.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub top_p: Option<f32>,
		/// The stop sequences to use.
		#[serde(skip_serializing_if = "Vec::is_empty")]
		pub stop_sequences: Vec<String>,
	}

	#[derive(Clone, Serialize, Debug)]
	#[serde(rename_all = "camelCase")]
	pub struct ConverseRequest {
		/// Specifies the model or throughput with which to run inference.
		pub model_id: String,
		/// The messages that you want to send to the model.
		pub messages: Vec<Message>,
		/// A prompt that provides instructions or context to the model.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub system: Option<Vec<SystemContentBlock>>,
		/// Inference parameters to pass to the model.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub inference_config: Option<InferenceConfiguration>,
		/// Configuration information for the tools that the model can use.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub tool_config: Option<ToolConfiguration>,
		/// Request metadata.
		#[serde(skip_serializing_if = "Option::is_none")]
		pub request_metadata: Option<HashMap<String, String>>,
	}

	#[derive(Clone, Serialize, Debug)]
	pub struct ToolConfiguration {
		/// An array of tools that you want to pass to a model.
		pub tools: Vec<Tool>,
		/// If supported by model, forces the model to request a tool.
		pub tool_choice: Option<ToolChoice>,
	}

	#[derive(Clone, Debug, Serialize)]
	#[serde(rename_all = "camelCase")]
	pub enum Tool {
		/// The specification for the tool.
		ToolSpec(ToolSpecification),
	}

	#[derive(Clone, Debug, Serialize)]
	#[serde(rename_all = "camelCase")]
	pub struct ToolSpecification {
		/// The name for the tool.
		pub name: String,
		/// The description for the tool.
		pub description: Option<String>,
		/// The input schema for the tool in JSON format.
		pub input_schema: Option<ToolInputSchema>,
	}

	#[derive(Clone, Debug, Serialize)]
	#[serde(rename_all = "camelCase")]
	pub enum ToolInputSchema {
		Json(serde_json::Value),
	}

	#[derive(Clone, Debug, Serialize)]
	#[serde(rename_all = "camelCase")]
	pub enum ToolChoice {
		/// The model must request at least one tool (no text is generated).
		Any,
		/// (Default). The Model automatically decides if a tool should be called.
		Auto,
		/// The Model must request the specified tool.
		Tool { name: String },
	}

	/// The response from the Bedrock Converse API (matches AWS SDK ConverseOutput)
	#[derive(Debug, Deserialize, Clone)]
	pub struct ConverseResponse {
		/// The result from the call to Converse
		pub output: Option<ConverseOutput>,
		/// The reason why the model stopped generating output
		#[serde(rename = "stopReason")]
		pub stop_reason: StopReason,
		/// The total number of tokens used in the call to Converse
		pub usage: Option<TokenUsage>,
	}

	#[derive(Debug, Deserialize, Clone)]
	pub struct ConverseErrorResponse {
		pub message: String,
	}

	/// The actual content output from the model
	#[derive(Debug, Deserialize, Clone)]
	#[serde(rename_all = "camelCase")]
	pub enum ConverseOutput {
		Message(Message),
		#[serde(other)]
		Unknown,
	}

	/// Token usage information
	#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct TokenUsage {
		/// The number of input tokens which were used
		pub input_tokens: usize,
		/// The number of output tokens which were used
		pub output_tokens: usize,
		/// The total number of tokens used
		pub total_tokens: usize,
	}

	/// Reason for stopping the response generation.
	#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
	#[serde(rename_all = "snake_case")]
	pub enum StopReason {
		ContentFiltered,
		EndTurn,
		GuardrailIntervened,
		MaxTokens,
		StopSequence,
		ToolUse,
	}

	// This is NOT deserialized directly, see the associated method
	#[derive(Clone, Debug)]
	pub enum ConverseStreamOutput {
		/// The messages output content block delta.
		ContentBlockDelta(ContentBlockDeltaEvent),
		/// Start information for a content block.
		#[allow(unused)]
		ContentBlockStart(ContentBlockStartEvent),
		/// Stop information for a content block.
		#[allow(unused)]
		ContentBlockStop(ContentBlockStopEvent),
		/// Message start information.
		MessageStart(MessageStartEvent),
		/// Message stop information.
		MessageStop(MessageStopEvent),
		/// Metadata for the converse output stream.
		Metadata(ConverseStreamMetadataEvent),
	}

	impl ConverseStreamOutput {
		pub fn deserialize(m: aws_event_stream_parser::Message) -> anyhow::Result<Self> {
			let Some(v) = m
				.headers
				.headers
				.iter()
				.find(|h| h.key.as_str() == ":event-type")
				.and_then(|v| match &v.value {
					aws_event_stream_parser::HeaderValue::String(s) => Some(s.to_string()),
					_ => None,
				})
			else {
				anyhow::bail!("no event type header")
			};
			Ok(match v.as_str() {
				"contentBlockDelta" => ConverseStreamOutput::ContentBlockDelta(serde_json::from_slice::<
					ContentBlockDeltaEvent,
				>(&m.body)?),
				"contentBlockStart" => ConverseStreamOutput::ContentBlockStart(serde_json::from_slice::<
					ContentBlockStartEvent,
				>(&m.body)?),
				"contentBlockStop" => ConverseStreamOutput::ContentBlockStop(serde_json::from_slice::<
					ContentBlockStopEvent,
				>(&m.body)?),
				"messageStart" => {
					ConverseStreamOutput::MessageStart(serde_json::from_slice::<MessageStartEvent>(&m.body)?)
				},
				"messageStop" => {
					ConverseStreamOutput::MessageStop(serde_json::from_slice::<MessageStopEvent>(&m.body)?)
				},
				"metadata" => ConverseStreamOutput::Metadata(serde_json::from_slice::<
					ConverseStreamMetadataEvent,
				>(&m.body)?),
				m => anyhow::bail!("unexpected event type: {m}"),
			})
		}
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct ContentBlockDeltaEvent {
		/// The delta for a content block delta event.
		pub delta: Option<ContentBlockDelta>,
		/// The block index for a content block delta event.
		#[allow(dead_code)]
		pub content_block_index: i32,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	#[allow(unused)]
	pub struct ContentBlockStartEvent {
		/// Start information about a content block start event.
		pub start: Option<serde_json::Value>,
		/// The index for a content block start event.
		pub content_block_index: i32,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	#[allow(unused)]
	pub struct ContentBlockStopEvent {
		/// The index for a content block.
		pub content_block_index: i32,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct MessageStartEvent {
		/// The role for the message.
		pub role: Role,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct MessageStopEvent {
		/// The reason why the model stopped generating output.
		pub stop_reason: StopReason,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub struct ConverseStreamMetadataEvent {
		/// Usage information for the conversation stream event.
		pub usage: Option<TokenUsage>,
	}

	#[derive(Clone, Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	pub enum ContentBlockDelta {
		/// The content text.
		Text(String),
		// TODO: tool use deltas
	}
}
