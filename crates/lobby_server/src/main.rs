#![forbid(unsafe_code)]

mod config;
mod server;
mod util;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context as _;
use lobby_util::parse_bind;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::server::coordinator::Coordinator;
use crate::server::http::{AppState, HealthState, serve};
use crate::server::hub::Hub;
use crate::server::sweeper::spawn_sweeper;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: lobby_server [--bind http://host:port] [--config path]\n\
\n\
Options:\n\
\t--bind    Bind endpoint (default: server.bind from config, else http://127.0.0.1:8080)\n\
\t         Format: http://host:port\n\
\t--config  Config file (default: ~/.lobby/config.toml)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

struct Args {
	bind: Option<String>,
	config: Option<PathBuf>,
}

fn parse_args() -> Args {
	let mut args = Args {
		bind: None,
		config: None,
	};

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--bind" | "--listen" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--bind must be non-empty (expected http://host:port)");
					usage_and_exit();
				}
				args.bind = Some(v);
			}
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				args.config = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	args
}

fn resolve_bind(endpoint: &str) -> SocketAddr {
	parse_bind(endpoint).unwrap_or_else(|e| {
		eprintln!("{e}");
		usage_and_exit();
	})
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,lobby_server=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("lobby_server");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let args = parse_args();

	let config_path = match args.config {
		Some(path) => path,
		None => crate::config::default_config_path()?,
	};
	let server_cfg = crate::config::load_server_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded server config (toml + env overrides)");

	init_metrics(server_cfg.server.metrics_bind.as_deref());

	let bind_addr = resolve_bind(args.bind.as_deref().unwrap_or(&server_cfg.server.bind));

	let hub = Hub::new(server_cfg.to_hub_config());
	let coordinator = Coordinator::new(hub);

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let sweeper = spawn_sweeper(
		coordinator.clone(),
		server_cfg.presence.sweep_interval,
		shutdown_rx.clone(),
	);

	let listener = TcpListener::bind(bind_addr)
		.await
		.with_context(|| format!("bind {bind_addr}"))?;

	let health = HealthState::new();
	let state = AppState {
		coordinator,
		health: health.clone(),
		max_body_bytes: server_cfg.server.max_body_bytes,
	};
	let server = tokio::spawn(serve(listener, state, shutdown_rx));

	health.mark_ready();
	info!(bind = %bind_addr, "lobby_server: ready");

	tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
	info!("shutdown requested");
	let _ = shutdown_tx.send(true);

	if let Err(e) = sweeper.await {
		warn!(error = %e, "sweeper task failed");
	}
	match server.await {
		Ok(res) => res?,
		Err(e) => warn!(error = %e, "http server task failed"),
	}

	Ok(())
}
