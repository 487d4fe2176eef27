use bytes::BytesMut;
use tokio_sse_codec::{Frame, SseDecoder};
use tokio_util::codec::Decoder;

use super::{AIError, BodyTransform, HeaderEdit, RequestTransform, RouteType, TokenUsage};
use crate::llm::{embeddings, universal};
use crate::*;

pub const NAME: Strng = strng::literal!("openai");

/// OpenAI→OpenAI is pass-through: the only body rewrite is forcing
/// `stream_options.include_usage` on for streams, so usage stays observable.
pub struct Translator {
	route: RouteType,
	streaming: bool,
	ok: bool,
	usage_reported: bool,
	scanner: SseUsageScanner,
}

impl Translator {
	pub fn new(route: RouteType) -> Translator {
		Translator {
			route,
			streaming: false,
			ok: true,
			usage_reported: false,
			scanner: SseUsageScanner::new(),
		}
	}

	pub fn request_body(&mut self, mut req: universal::Request) -> Result<RequestTransform, AIError> {
		self.streaming = req.stream.unwrap_or_default();
		// If a user doesn't request usage, we will not get token information
		// which we need. We always set it. Notably, this adds a final SSE event.
		let body = if self.streaming && req.stream_options.is_none() {
			req.stream_options = Some(universal::StreamOptions {
				include_usage: true,
			});
			Some(Bytes::from(
				serde_json::to_vec(&req).map_err(AIError::RequestMarshal)?,
			))
		} else {
			None
		};
		Ok(RequestTransform {
			headers: HeaderEdit::default(),
			body,
		})
	}

	pub fn embeddings_body(&mut self, _req: &embeddings::Request) -> Result<RequestTransform, AIError> {
		Ok(RequestTransform::default())
	}

	pub fn response_headers(
		&mut self,
		status: u16,
		_headers: &http::HeaderMap,
	) -> Result<HeaderEdit, AIError> {
		self.ok = (200..300).contains(&status);
		Ok(HeaderEdit::default())
	}

	pub fn response_body(&mut self, data: &[u8], end_of_stream: bool) -> Result<BodyTransform, AIError> {
		if !self.ok {
			// Error envelopes are already OpenAI-shaped; pass them through.
			return Ok(BodyTransform::default());
		}
		if self.streaming {
			let usage = self.scanner.scan(data, end_of_stream)?;
			return Ok(BodyTransform { body: None, usage });
		}
		if data.is_empty() || self.usage_reported {
			return Ok(BodyTransform::default());
		}
		let usage = match self.route {
			RouteType::ChatCompletions => serde_json::from_slice::<universal::Response>(data)
				.map_err(AIError::ResponseParsing)?
				.usage
				.as_ref()
				.map(TokenUsage::from_usage),
			RouteType::Embeddings => serde_json::from_slice::<embeddings::Response>(data)
				.map_err(AIError::ResponseParsing)?
				.usage
				.map(|u| TokenUsage {
					input: u.prompt_tokens,
					output: 0,
					total: u.total_tokens,
				}),
		};
		if usage.is_some() {
			self.usage_reported = true;
		}
		Ok(BodyTransform { body: None, usage })
	}
}

/// Scans an OpenAI SSE stream for the `usage` object without rewriting it.
/// Buffers partial frames across events; a residue at end-of-stream means the
/// upstream truncated a record.
pub(super) struct SseUsageScanner {
	decoder: SseDecoder<Bytes>,
	buffer: BytesMut,
	usage_reported: bool,
}

impl SseUsageScanner {
	pub(super) fn new() -> SseUsageScanner {
		SseUsageScanner {
			decoder: SseDecoder::<Bytes>::with_max_size(2_097_152),
			buffer: BytesMut::new(),
			usage_reported: false,
		}
	}

	pub(super) fn scan(
		&mut self,
		data: &[u8],
		end_of_stream: bool,
	) -> Result<Option<TokenUsage>, AIError> {
		self.buffer.extend_from_slice(data);
		let mut delta = None;
		loop {
			// At end-of-stream, decode_eof flushes any pending record or fails.
			let decoded = if end_of_stream {
				self
					.decoder
					.decode_eof(&mut self.buffer)
					.map_err(|_| AIError::IncompleteFraming(self.buffer.len().max(1)))?
			} else {
				self
					.decoder
					.decode(&mut self.buffer)
					.map_err(|e| AIError::SseDecode(e.to_string()))?
			};
			match decoded {
				Some(Frame::Event(ev)) => {
					if ev.data.as_ref() == b"[DONE]" || self.usage_reported {
						continue;
					}
					match serde_json::from_slice::<universal::StreamResponse>(&ev.data) {
						Ok(chunk) => {
							if let Some(u) = chunk.usage {
								self.usage_reported = true;
								delta = Some(TokenUsage::from_usage(&u));
							}
						},
						Err(e) => {
							debug!("failed to parse streaming response: {e}");
						},
					}
				},
				Some(_) => {},
				None => break,
			}
		}
		if end_of_stream && !self.buffer.is_empty() {
			return Err(AIError::IncompleteFraming(self.buffer.len()));
		}
		Ok(delta)
	}
}
