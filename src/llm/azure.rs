use super::{AIError, BodyTransform, HeaderEdit, RequestTransform, RouteType};
use crate::llm::{embeddings, openai, universal};
use crate::*;

pub const NAME: Strng = strng::literal!("azure.openai");

pub const DEFAULT_API_VERSION: &str = "2025-01-01-preview";

/// OpenAI→AzureOpenAI: the body is already the right shape, only the path
/// moves to the deployment-scoped URL for the configured API version.
pub struct Translator {
	route: RouteType,
	api_version: Strng,
	inner: openai::Translator,
}

impl Translator {
	pub fn new(route: RouteType, api_version: Option<Strng>) -> Translator {
		Translator {
			route,
			api_version: api_version.unwrap_or_else(|| strng::new(DEFAULT_API_VERSION)),
			inner: openai::Translator::new(route),
		}
	}

	pub fn request_body(&mut self, req: universal::Request) -> Result<RequestTransform, AIError> {
		let model = req.model.clone();
		let mut transform = self.inner.request_body(req)?;
		transform
			.headers
			.set
			.push((strng::literal!(":path"), self.path_for_model(&model)));
		Ok(transform)
	}

	pub fn embeddings_body(&mut self, req: &embeddings::Request) -> Result<RequestTransform, AIError> {
		let mut transform = self.inner.embeddings_body(req)?;
		transform
			.headers
			.set
			.push((strng::literal!(":path"), self.path_for_model(&req.model)));
		Ok(transform)
	}

	pub fn response_headers(
		&mut self,
		status: u16,
		headers: &http::HeaderMap,
	) -> Result<HeaderEdit, AIError> {
		self.inner.response_headers(status, headers)
	}

	pub fn response_body(&mut self, data: &[u8], end_of_stream: bool) -> Result<BodyTransform, AIError> {
		self.inner.response_body(data, end_of_stream)
	}

	fn path_for_model(&self, model: &str) -> Strng {
		let t = if self.route == RouteType::Embeddings {
			strng::literal!("embeddings")
		} else {
			strng::literal!("chat/completions")
		};
		if self.api_version == "v1" {
			strng::format!("/openai/v1/{t}")
		} else if self.api_version == "preview" {
			// v1 preview API
			strng::format!("/openai/v1/{t}?api-version=preview")
		} else {
			strng::format!(
				"/openai/deployments/{}/{t}?api-version={}",
				model,
				self.api_version
			)
		}
	}
}
