pub mod mutation;
pub mod processor;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::config::{ConfigStore, Snapshot};
use crate::extproc::mutation::Headers;
use crate::extproc::processor::{
	CompletionsProcessor, PassthroughProcessor, Processor, ProcessorError,
};
use crate::llm::RouteType;
use crate::proto::envoy::service::ext_proc::v3 as pb;
use crate::proto::envoy::service::ext_proc::v3::external_processor_server::{
	ExternalProcessor, ExternalProcessorServer,
};
use crate::proto::envoy::service::ext_proc::v3::processing_request::Request as Event;
use crate::telemetry::metrics::{Metrics, RequestMetrics};
use crate::*;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const EMBEDDINGS_PATH: &str = "/v1/embeddings";

/// The ext_proc service: accepts one bidirectional stream per client HTTP
/// request and pumps its events through a per-stream processor.
pub struct ExtProcService {
	store: Arc<ConfigStore>,
	metrics: Arc<Metrics>,
}

impl ExtProcService {
	pub fn new(store: Arc<ConfigStore>, metrics: Arc<Metrics>) -> ExtProcService {
		ExtProcService { store, metrics }
	}

	pub fn into_server(self) -> ExternalProcessorServer<ExtProcService> {
		ExternalProcessorServer::new(self)
	}
}

#[tonic::async_trait]
impl ExternalProcessor for ExtProcService {
	type ProcessStream = ReceiverStream<Result<pb::ProcessingResponse, Status>>;

	async fn process(
		&self,
		request: Request<Streaming<pb::ProcessingRequest>>,
	) -> Result<Response<Self::ProcessStream>, Status> {
		// In-flight streams keep the snapshot they started with; reloads only
		// affect streams opened afterwards.
		let snapshot = self.store.snapshot();
		let metrics = self.metrics.clone();
		let events = request.into_inner();
		let (tx, rx) = mpsc::channel(16);
		tokio::spawn(run_stream(snapshot, metrics, events, tx));
		Ok(Response::new(ReceiverStream::new(rx)))
	}
}

/// Pick the per-stream processor from the request path.
fn route_processor(
	snapshot: Arc<Snapshot>,
	metrics: Arc<Metrics>,
	headers: Headers,
) -> Result<Box<dyn Processor>, ProcessorError> {
	let request_metrics = RequestMetrics::start(metrics);
	match headers.route_path() {
		CHAT_COMPLETIONS_PATH => Ok(Box::new(CompletionsProcessor::new(
			snapshot,
			request_metrics,
			RouteType::ChatCompletions,
			headers,
		)?)),
		EMBEDDINGS_PATH => Ok(Box::new(CompletionsProcessor::new(
			snapshot,
			request_metrics,
			RouteType::Embeddings,
			headers,
		)?)),
		_ => Ok(Box::new(PassthroughProcessor::new(request_metrics))),
	}
}

/// Events are consumed strictly in arrival order; each handler runs to
/// completion before the next event is read. Any processor error terminates
/// this stream with an immediate response and never touches other streams.
async fn run_stream(
	snapshot: Arc<Snapshot>,
	metrics: Arc<Metrics>,
	mut events: Streaming<pb::ProcessingRequest>,
	tx: mpsc::Sender<Result<pb::ProcessingResponse, Status>>,
) {
	let first = match events.message().await {
		Ok(Some(msg)) => msg,
		Ok(None) => return,
		Err(err) => {
			debug!("stream read failed: {err}");
			return;
		},
	};
	let Some(Event::RequestHeaders(h)) = first.request else {
		let _ = tx
			.send(Err(Status::failed_precondition(
				"expected request headers as the first event",
			)))
			.await;
		return;
	};
	let headers = Headers::from_proto(h.headers);
	trace!(path = headers.route_path(), headers = ?headers.map, "stream opened");

	let mut processor = match route_processor(snapshot, metrics, headers) {
		Ok(p) => p,
		Err(err) => {
			send_error(&tx, err).await;
			return;
		},
	};
	match processor.request_headers().await {
		Ok(resp) => {
			if tx.send(Ok(resp)).await.is_err() {
				return;
			}
		},
		Err(err) => {
			send_error(&tx, err).await;
			return;
		},
	}

	loop {
		let msg = match events.message().await {
			Ok(Some(msg)) => msg,
			// The proxy closed the stream (request finished or was cancelled);
			// per-stream resources drop here.
			Ok(None) => return,
			Err(err) => {
				debug!("stream read failed: {err}");
				return;
			},
		};
		let result = match msg.request {
			Some(Event::RequestBody(b)) => processor.request_body(b).await,
			Some(Event::ResponseHeaders(h)) => processor.response_headers(h).await,
			Some(Event::ResponseBody(b)) => processor.response_body(b).await,
			Some(Event::RequestTrailers(_)) => Ok(mutation::request_trailers_response()),
			Some(Event::ResponseTrailers(_)) => Ok(mutation::response_trailers_response()),
			Some(Event::RequestHeaders(_)) => Err(ProcessorError::OutOfOrder("request headers")),
			None => continue,
		};
		match result {
			Ok(resp) => {
				if tx.send(Ok(resp)).await.is_err() {
					return;
				}
			},
			Err(err) => {
				send_error(&tx, err).await;
				return;
			},
		}
	}
}

async fn send_error(
	tx: &mpsc::Sender<Result<pb::ProcessingResponse, Status>>,
	err: ProcessorError,
) {
	// NoMatchingRule is expected traffic; everything else indicates trouble.
	match &err {
		ProcessorError::NoMatchingRule(reason) => info!("request rejected: {reason}"),
		other => error!("stream failed: {other}"),
	}
	let _ = tx
		.send(Ok(mutation::immediate_response(
			err.status(),
			err.response_body(),
		)))
		.await;
}
