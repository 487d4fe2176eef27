use crate::config::{BackendSchema, SchemaName};
use crate::*;

pub mod azure;
pub mod bedrock;
pub mod embeddings;
pub mod openai;
pub mod universal;

#[derive(thiserror::Error, Debug)]
pub enum AIError {
	#[error("unsupported schema: {0}")]
	UnsupportedSchema(Strng),
	#[error("failed to parse request: {0}")]
	RequestParsing(#[source] serde_json::Error),
	#[error("failed to marshal request: {0}")]
	RequestMarshal(#[source] serde_json::Error),
	#[error("failed to parse response: {0}")]
	ResponseParsing(#[source] serde_json::Error),
	#[error("failed to marshal response: {0}")]
	ResponseMarshal(#[source] serde_json::Error),
	#[error("incomplete response")]
	IncompleteResponse,
	#[error("stream ended with {0} bytes of unfinished framing")]
	IncompleteFraming(usize),
	#[error("event stream: {0}")]
	EventStream(String),
	#[error("server-sent events: {0}")]
	SseDecode(String),
}

/// Which inbound API surface a stream is serving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteType {
	ChatCompletions,
	Embeddings,
}

/// Token tallies reported by a backend. Deltas accumulate saturating;
/// totals never decrease over the life of a stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
	pub input: u32,
	pub output: u32,
	pub total: u32,
}

impl TokenUsage {
	pub fn from_usage(u: &universal::Usage) -> TokenUsage {
		TokenUsage {
			input: u.prompt_tokens,
			output: u.completion_tokens,
			total: u.total_tokens,
		}
	}

	pub fn is_zero(&self) -> bool {
		*self == TokenUsage::default()
	}

	pub fn accumulate(&mut self, delta: TokenUsage) {
		self.input = self.input.saturating_add(delta.input);
		self.output = self.output.saturating_add(delta.output);
		self.total = self.total.saturating_add(delta.total);
	}
}

#[derive(Debug, Default, Clone)]
pub struct HeaderEdit {
	pub set: Vec<(Strng, Strng)>,
	pub remove: Vec<Strng>,
}

impl HeaderEdit {
	pub fn is_empty(&self) -> bool {
		self.set.is_empty() && self.remove.is_empty()
	}
}

/// The outbound rewrite for one request: headers to set/remove plus an
/// optional replacement body. `body: None` means pass through untouched.
#[derive(Debug, Default)]
pub struct RequestTransform {
	pub headers: HeaderEdit,
	pub body: Option<Bytes>,
}

/// The inbound rewrite for one response-body event.
#[derive(Debug, Default)]
pub struct BodyTransform {
	pub body: Option<Bytes>,
	pub usage: Option<TokenUsage>,
}

/// Schema adapters, one constructed per stream. Discovered through
/// [`Translator::for_backend`], keyed by the backend's schema name.
pub enum Translator {
	OpenAI(openai::Translator),
	Bedrock(bedrock::Translator),
	AzureOpenAI(azure::Translator),
}

impl Translator {
	pub fn for_backend(route: RouteType, schema: &BackendSchema) -> Result<Translator, AIError> {
		match schema.name {
			SchemaName::OpenAI => Ok(Translator::OpenAI(openai::Translator::new(route))),
			SchemaName::AWSBedrock if route == RouteType::ChatCompletions => {
				Ok(Translator::Bedrock(bedrock::Translator::new()))
			},
			SchemaName::AWSBedrock => Err(AIError::UnsupportedSchema(strng::literal!(
				"AWSBedrock does not serve embeddings"
			))),
			SchemaName::AzureOpenAI => Ok(Translator::AzureOpenAI(azure::Translator::new(
				route,
				schema.version.clone(),
			))),
		}
	}

	pub fn name(&self) -> Strng {
		match self {
			Translator::OpenAI(_) => openai::NAME,
			Translator::Bedrock(_) => bedrock::NAME,
			Translator::AzureOpenAI(_) => azure::NAME,
		}
	}

	pub fn request_body(&mut self, req: universal::Request) -> Result<RequestTransform, AIError> {
		match self {
			Translator::OpenAI(t) => t.request_body(req),
			Translator::Bedrock(t) => t.request_body(req),
			Translator::AzureOpenAI(t) => t.request_body(req),
		}
	}

	pub fn embeddings_body(&mut self, req: &embeddings::Request) -> Result<RequestTransform, AIError> {
		match self {
			Translator::OpenAI(t) => t.embeddings_body(req),
			Translator::AzureOpenAI(t) => t.embeddings_body(req),
			Translator::Bedrock(_) => Err(AIError::UnsupportedSchema(strng::literal!(
				"AWSBedrock does not serve embeddings"
			))),
		}
	}

	pub fn response_headers(
		&mut self,
		status: u16,
		headers: &http::HeaderMap,
	) -> Result<HeaderEdit, AIError> {
		match self {
			Translator::OpenAI(t) => t.response_headers(status, headers),
			Translator::Bedrock(t) => t.response_headers(status, headers),
			Translator::AzureOpenAI(t) => t.response_headers(status, headers),
		}
	}

	pub fn response_body(
		&mut self,
		data: &[u8],
		end_of_stream: bool,
	) -> Result<BodyTransform, AIError> {
		match self {
			Translator::OpenAI(t) => t.response_body(data, end_of_stream),
			Translator::Bedrock(t) => t.response_body(data, end_of_stream),
			Translator::AzureOpenAI(t) => t.response_body(data, end_of_stream),
		}
	}
}
