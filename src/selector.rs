use async_trait::async_trait;
use serde::Deserialize;

use crate::router::stable_draw;
use crate::*;

/// Header the proxy reads to pin the upstream connection to the picked
/// endpoint (original-destination cluster routing).
pub const DESTINATION_ENDPOINT_HEADER: &str = "x-gateway-destination-endpoint";

/// Literal written to the selected-backend header when the endpoint was
/// chosen at request time rather than by a configured cluster.
pub const ORIGINAL_DESTINATION_CLUSTER: Strng = strng::literal!("original_destination_cluster");

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("no endpoints available")]
	NoEndpoints,
	#[error("selector unavailable: {0}")]
	Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct PickedEndpoint {
	pub endpoint: Strng,
	/// Headers the proxy needs to route to the endpoint.
	pub headers: Vec<(Strng, Strng)>,
}

/// Picks a concrete upstream endpoint at request time. Implementations are
/// shared across streams and must be reentrant. The processor holds the
/// handle for the life of its stream.
#[async_trait]
pub trait EndpointSelector: Send + Sync + std::fmt::Debug {
	async fn select(&self, headers: &http::HeaderMap) -> Result<PickedEndpoint, Error>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DynamicLoadBalancing {
	pub endpoints: Vec<Strng>,
}

/// Deterministic selector over a fixed endpoint list: the same request id
/// lands on the same endpoint, mirroring the router's weighted draw.
#[derive(Debug)]
pub struct StickyEndpointSelector {
	endpoints: Vec<Strng>,
}

impl StickyEndpointSelector {
	pub fn new(endpoints: Vec<Strng>) -> StickyEndpointSelector {
		StickyEndpointSelector { endpoints }
	}
}

#[async_trait]
impl EndpointSelector for StickyEndpointSelector {
	async fn select(&self, headers: &http::HeaderMap) -> Result<PickedEndpoint, Error> {
		if self.endpoints.is_empty() {
			return Err(Error::NoEndpoints);
		}
		let seed = headers
			.get(crate::router::REQUEST_ID_HEADER)
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default();
		let idx = stable_draw(seed, self.endpoints.len() as u64) as usize;
		let endpoint = self.endpoints[idx].clone();
		Ok(PickedEndpoint {
			headers: vec![(strng::new(DESTINATION_ENDPOINT_HEADER), endpoint.clone())],
			endpoint,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn headers(id: &str) -> http::HeaderMap {
		let mut h = http::HeaderMap::new();
		h.insert("x-request-id", id.parse().unwrap());
		h
	}

	#[tokio::test]
	async fn sticky_across_calls() {
		let s = StickyEndpointSelector::new(vec![
			strng::literal!("10.0.0.1:8080"),
			strng::literal!("10.0.0.2:8080"),
			strng::literal!("10.0.0.3:8080"),
		]);
		let first = s.select(&headers("req-1")).await.unwrap();
		for _ in 0..10 {
			let again = s.select(&headers("req-1")).await.unwrap();
			assert_eq!(first.endpoint, again.endpoint);
		}
		assert_eq!(
			first.headers,
			vec![(strng::new(DESTINATION_ENDPOINT_HEADER), first.endpoint.clone())]
		);
	}

	#[tokio::test]
	async fn empty_list_is_unavailable() {
		let s = StickyEndpointSelector::new(vec![]);
		assert!(matches!(
			s.select(&http::HeaderMap::new()).await,
			Err(Error::NoEndpoints)
		));
	}
}
