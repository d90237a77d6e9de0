use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use snaplabel_model::{read_artifact, write_color_demo, ArtifactFetcher, ModelService};
use snaplabel_server::cli::{Cli, Commands};
use snaplabel_server::config::ServerConfig;
use snaplabel_server::server::run_server;
use snaplabel_server::state::AppState;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match &cli.command {
        Commands::Serve { .. } => {
            let config = ServerConfig::load(&cli.config, &cli)?;
            let metrics_handle = init_metrics()?;

            let addr: SocketAddr = format!("{}:{}", config.server.address, config.server.port)
                .parse()
                .context("invalid listen address")?;

            let model = ModelService::from_settings(&config.model)?;
            info!(
                remote_id = %config.model.remote_id,
                local_path = %config.model.local_path.display(),
                eager = config.server.eager_load,
                "Starting snaplabel"
            );

            let state = AppState::new(config, model).with_metrics(metrics_handle);
            run_server(state, addr).await?;
        }

        Commands::Fetch => {
            let config = ServerConfig::load(&cli.config, &cli)?;
            let fetcher = ArtifactFetcher::from_settings(&config.model)?;
            let path = fetcher
                .ensure_local(&config.model.remote_id, &config.model.local_path)
                .await?;
            println!("{}", path.display());
        }

        Commands::Predict { image } => {
            let config = ServerConfig::load(&cli.config, &cli)?;
            let bytes = tokio::fs::read(image)
                .await
                .with_context(|| format!("cannot read {}", image.display()))?;

            let model = ModelService::from_settings(&config.model)?.get().await?;
            let prediction =
                tokio::task::spawn_blocking(move || model.pipeline.predict(&bytes)).await??;

            println!();
            println!("  Prediction: {}", prediction.result.label());
            println!();
            for entry in prediction.result.ranked() {
                let marker = if entry.highlighted { ">" } else { " " };
                println!(
                    "  {} {:<24} {:>7.2}%  {}",
                    marker,
                    entry.label,
                    entry.percent,
                    "#".repeat((entry.percent / 4.0).round() as usize)
                );
            }
            println!();
        }

        Commands::Inspect => {
            let config = ServerConfig::load(&cli.config, &cli)?;
            let fetcher = ArtifactFetcher::from_settings(&config.model)?;
            let path = fetcher
                .ensure_local(&config.model.remote_id, &config.model.local_path)
                .await?;

            let (manifest, bytes) = read_artifact(&path)?;
            println!("# {} ({} bytes)", path.display(), bytes.len());
            print!("{}", serde_yaml::to_string(&manifest)?);
        }

        Commands::ExportDemo { path } => {
            let manifest = write_color_demo(path)?;
            println!(
                "Wrote {} classifier for [{}] to {}",
                manifest.architecture,
                manifest.labels.join(", "),
                path.display()
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "snaplabel=debug,snaplabel_server=debug,snaplabel_model=debug,tower_http=debug"
    } else {
        "snaplabel=info,snaplabel_server=info,snaplabel_model=info,tower_http=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "snaplabel_requests_total",
        "Total number of prediction requests received"
    );
    metrics::describe_counter!(
        "snaplabel_predictions_total",
        "Successful predictions by predicted label"
    );
    metrics::describe_counter!("snaplabel_errors_total", "Failed requests by error kind");
    metrics::describe_histogram!(
        "snaplabel_inference_latency_us",
        metrics::Unit::Microseconds,
        "Time spent inside the predictor in microseconds"
    );
    metrics::describe_counter!(
        "snaplabel_artifact_downloads_total",
        "Model artifacts downloaded from the remote source"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
