use serde::{Deserialize, Serialize};

/// The embeddings surface only needs the model name for routing; everything
/// else passes through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	pub model: String,
	#[serde(flatten)]
	pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	#[serde(default)]
	pub usage: Option<Usage>,
	#[serde(flatten)]
	pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
	pub prompt_tokens: u32,
	#[serde(default)]
	pub total_tokens: u32,
}
