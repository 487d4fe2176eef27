use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use prometheus_client::registry::Registry;
use tracing::{error, info};

use llmgate::config::{self, ConfigStore};
use llmgate::extproc::ExtProcService;
use llmgate::signal;
use llmgate::telemetry::{self, metrics::Metrics};

#[derive(Parser, Debug)]
#[command(about, version, long_about = None)]
struct Args {
	/// Path to the configuration file
	#[arg(long, value_name = "path")]
	config: PathBuf,

	/// Listen address for the ext_proc gRPC server
	#[arg(long, value_name = "host:port", default_value = "0.0.0.0:1063")]
	address: String,

	/// Log level when RUST_LOG is not set
	#[arg(long, value_name = "level", default_value = "info")]
	log_level: String,
}

fn main() -> ExitCode {
	let args = Args::parse();
	if let Err(err) = telemetry::setup_logging(&args.log_level) {
		eprintln!("invalid log level {:?}: {err}", args.log_level);
		return ExitCode::from(1);
	}

	// A broken configuration at startup is exit 2; later reload failures only
	// log and keep the last good snapshot.
	let snapshot = match config::load_file(&args.config) {
		Ok(s) => s,
		Err(err) => {
			error!("failed to load configuration from {:?}: {err}", args.config);
			return ExitCode::from(2);
		},
	};

	let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
		Ok(rt) => rt,
		Err(err) => {
			error!("failed to start runtime: {err}");
			return ExitCode::from(1);
		},
	};
	match runtime.block_on(run(args, snapshot)) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("{err:#}");
			ExitCode::from(1)
		},
	}
}

async fn run(args: Args, snapshot: config::Snapshot) -> anyhow::Result<()> {
	info!(
		rules = snapshot.rules.len(),
		backends = snapshot.backends.len(),
		"configuration loaded"
	);
	let store = Arc::new(ConfigStore::new(snapshot));
	let _watcher = config::spawn_watcher(args.config.clone(), store.clone())?;

	// Metric export is owned by the embedding environment; the sink itself
	// lives here.
	let mut registry = Registry::default();
	let metrics = Arc::new(Metrics::new(&mut registry));

	let address: SocketAddr = args.address.parse()?;
	let listener = tokio::net::TcpListener::bind(address).await?;
	info!(%address, "ext_proc server listening");

	let shutdown = signal::Shutdown::new();
	let service = ExtProcService::new(store, metrics);
	tonic::transport::Server::builder()
		.add_service(service.into_server())
		.serve_with_incoming_shutdown(
			tokio_stream::wrappers::TcpListenerStream::new(listener),
			shutdown.wait(),
		)
		.await?;
	info!("shutdown complete");
	Ok(())
}
