use crate::proto::envoy::config::core::v3 as core_pb;
use crate::proto::envoy::extensions::filters::http::ext_proc::v3 as mode_pb;
use crate::proto::envoy::r#type::v3 as type_pb;
use crate::proto::envoy::service::ext_proc::v3 as pb;
use crate::proto::envoy::service::ext_proc::v3::processing_response::Response;
use crate::*;

/// A decoded header event: pseudo headers split out, the rest in a real
/// header map so matchers and selectors can work on it.
#[derive(Debug, Default)]
pub struct Headers {
	pub map: http::HeaderMap,
	pub method: Option<String>,
	pub path: Option<String>,
	pub authority: Option<String>,
	pub scheme: Option<String>,
	pub status: Option<u16>,
}

impl Headers {
	pub fn from_proto(h: Option<core_pb::HeaderMap>) -> Headers {
		let mut out = Headers::default();
		for hv in h.map(|h| h.headers).unwrap_or_default() {
			let value = if hv.raw_value.is_empty() {
				hv.value
			} else {
				String::from_utf8_lossy(&hv.raw_value).to_string()
			};
			match hv.key.as_str() {
				":method" => out.method = Some(value),
				":path" => out.path = Some(value),
				":authority" => out.authority = Some(value),
				":scheme" => out.scheme = Some(value),
				":status" => out.status = value.parse().ok(),
				key => {
					let Ok(name) = http::HeaderName::from_bytes(key.as_bytes()) else {
						continue;
					};
					let Ok(value) = http::HeaderValue::from_str(&value) else {
						continue;
					};
					out.map.append(name, value);
				},
			}
		}
		out
	}

	/// The request path with any query string stripped.
	pub fn route_path(&self) -> &str {
		self
			.path
			.as_deref()
			.map(|p| p.split('?').next().unwrap_or(p))
			.unwrap_or("")
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.map.get(name).and_then(|v| v.to_str().ok())
	}
}

fn set_header(key: &str, value: &str) -> core_pb::HeaderValueOption {
	core_pb::HeaderValueOption {
		header: Some(core_pb::HeaderValue {
			key: key.to_string(),
			value: String::new(),
			raw_value: Bytes::copy_from_slice(value.as_bytes()),
		}),
		append_action: core_pb::header_value_option::HeaderAppendAction::OverwriteIfExistsOrAdd
			as i32,
		keep_empty_value: false,
	}
}

pub fn header_mutation(
	set: Vec<(Strng, Strng)>,
	remove: Vec<Strng>,
) -> Option<pb::HeaderMutation> {
	if set.is_empty() && remove.is_empty() {
		return None;
	}
	Some(pb::HeaderMutation {
		set_headers: set.iter().map(|(k, v)| set_header(k, v)).collect(),
		remove_headers: remove.iter().map(|r| r.to_string()).collect(),
	})
}

fn common_response(
	header_mutation: Option<pb::HeaderMutation>,
	body: Option<Bytes>,
	clear_route_cache: bool,
) -> pb::CommonResponse {
	pb::CommonResponse {
		status: pb::common_response::ResponseStatus::Continue as i32,
		header_mutation,
		body_mutation: body.map(|b| pb::BodyMutation {
			mutation: Some(pb::body_mutation::Mutation::Body(b)),
		}),
		trailers: None,
		clear_route_cache,
	}
}

pub fn request_headers_response(mutation: Option<pb::HeaderMutation>) -> pb::ProcessingResponse {
	pb::ProcessingResponse {
		response: Some(Response::RequestHeaders(pb::HeadersResponse {
			response: Some(common_response(mutation, None, false)),
		})),
		..Default::default()
	}
}

pub fn request_body_response(
	mutation: Option<pb::HeaderMutation>,
	body: Option<Bytes>,
	clear_route_cache: bool,
) -> pb::ProcessingResponse {
	pb::ProcessingResponse {
		response: Some(Response::RequestBody(pb::BodyResponse {
			response: Some(common_response(mutation, body, clear_route_cache)),
		})),
		..Default::default()
	}
}

pub fn response_headers_response(
	mutation: Option<pb::HeaderMutation>,
	mode_override: Option<mode_pb::ProcessingMode>,
) -> pb::ProcessingResponse {
	pb::ProcessingResponse {
		response: Some(Response::ResponseHeaders(pb::HeadersResponse {
			response: Some(common_response(mutation, None, false)),
		})),
		mode_override,
		..Default::default()
	}
}

pub fn response_body_response(
	mutation: Option<pb::HeaderMutation>,
	body: Option<Bytes>,
	dynamic_metadata: Option<prost_wkt_types::Struct>,
) -> pb::ProcessingResponse {
	pb::ProcessingResponse {
		response: Some(Response::ResponseBody(pb::BodyResponse {
			response: Some(common_response(mutation, body, false)),
		})),
		dynamic_metadata,
		..Default::default()
	}
}

pub fn request_trailers_response() -> pb::ProcessingResponse {
	pb::ProcessingResponse {
		response: Some(Response::RequestTrailers(pb::TrailersResponse {
			header_mutation: None,
		})),
		..Default::default()
	}
}

pub fn response_trailers_response() -> pb::ProcessingResponse {
	pb::ProcessingResponse {
		response: Some(Response::ResponseTrailers(pb::TrailersResponse {
			header_mutation: None,
		})),
		..Default::default()
	}
}

/// Tell the proxy to deliver subsequent response-body events as they land.
pub fn streamed_response_mode() -> mode_pb::ProcessingMode {
	mode_pb::ProcessingMode {
		response_body_mode: mode_pb::processing_mode::BodySendMode::Streamed as i32,
		..Default::default()
	}
}

pub fn immediate_response(status: u16, body: String) -> pb::ProcessingResponse {
	pb::ProcessingResponse {
		response: Some(Response::ImmediateResponse(pb::ImmediateResponse {
			status: Some(type_pb::HttpStatus {
				code: status as i32,
			}),
			headers: header_mutation(
				vec![(
					strng::literal!("content-type"),
					strng::literal!("application/json"),
				)],
				vec![],
			),
			body,
			grpc_status: None,
			details: String::new(),
		})),
		..Default::default()
	}
}

/// `{ namespace: { key: value, … } }`, the shape downstream filters consume.
pub fn cost_metadata(
	namespace: &str,
	entries: &[(Strng, u64)],
) -> Option<prost_wkt_types::Struct> {
	if entries.is_empty() {
		return None;
	}
	let fields: serde_json::Map<String, serde_json::Value> = entries
		.iter()
		.map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
		.collect();
	let value = serde_json::json!({ namespace: fields });
	serde_json::from_value::<prost_wkt_types::Struct>(value).ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pseudo_headers_split_out() {
		let h = Headers::from_proto(Some(core_pb::HeaderMap {
			headers: vec![
				core_pb::HeaderValue {
					key: ":path".to_string(),
					value: "/v1/chat/completions?k=v".to_string(),
					raw_value: Bytes::new(),
				},
				core_pb::HeaderValue {
					key: ":method".to_string(),
					value: "POST".to_string(),
					raw_value: Bytes::new(),
				},
				core_pb::HeaderValue {
					key: "x-request-id".to_string(),
					value: String::new(),
					raw_value: Bytes::from_static(b"abc123"),
				},
			],
		}));
		assert_eq!(h.route_path(), "/v1/chat/completions");
		assert_eq!(h.method.as_deref(), Some("POST"));
		assert_eq!(h.get("x-request-id"), Some("abc123"));
	}

	#[test]
	fn status_parsed() {
		let h = Headers::from_proto(Some(core_pb::HeaderMap {
			headers: vec![core_pb::HeaderValue {
				key: ":status".to_string(),
				value: "200".to_string(),
				raw_value: Bytes::new(),
			}],
		}));
		assert_eq!(h.status, Some(200));
	}

	#[test]
	fn empty_header_mutation_collapses_to_none() {
		assert!(header_mutation(vec![], vec![]).is_none());
	}

	#[test]
	fn cost_metadata_shape() {
		let s = cost_metadata(
			"io.envoy.ai_gateway",
			&[(strng::new("input"), 10), (strng::new("c"), 23)],
		)
		.unwrap();
		let outer = s.fields.get("io.envoy.ai_gateway").unwrap();
		let json = serde_json::to_value(outer).unwrap();
		assert_eq!(json["input"], 10.0);
		assert_eq!(json["c"], 23.0);
	}

	#[test]
	fn cost_metadata_empty_is_none() {
		assert!(cost_metadata("ns", &[]).is_none());
	}
}
