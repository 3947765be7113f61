mod config;

use std::path::Path;

use clap::Parser;
use graph_upsert::driver::{GraphDriver, MemoryGraph, Neo4jDriver};
use graph_upsert::model::MdfModel;
use graph_upsert::wipe::{wipe_database, wipe_subgraph};
use graph_upsert::{Loader, LoaderConfig};
use tokio::signal;
use tracing::{error, info, warn};

use crate::config::{discover_tsv_files, Cli, Command, LoadArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("graph_upsert=info".parse()?),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // ── Config ────────────────────────────────────────────────────────────────
    let mut config = LoaderConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;
    cli.apply(&mut config);
    config.check()?;

    info!(
        uri = %config.neo4j_uri,
        id_field = %config.id_field,
        chunk_size = config.chunk_size,
        "configuration loaded"
    );

    tokio::select! {
        result = run(cli.command, &config) => result,
        _ = shutdown_signal() => {
            warn!("interrupted; batches committed so far remain in the graph");
            anyhow::bail!("interrupted")
        }
    }
}

async fn run(command: Command, config: &LoaderConfig) -> anyhow::Result<()> {
    match command {
        Command::Load(args) if args.dry_run => {
            info!("dry run against an in-memory graph");
            load(MemoryGraph::new(), &args, config).await
        }
        Command::Load(args) => load(connect(config).await?, &args, config).await,
        Command::Wipe { .. } => {
            let driver = connect(config).await?;
            let report = wipe_database(&driver, config.wipe_batch_size).await?;
            driver.close().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::WipeSubgraph {
            label, prop, value, ..
        } => {
            let driver = connect(config).await?;
            let report =
                wipe_subgraph(&driver, &label, &prop, &value, config.subgraph_batch_size).await?;
            driver.close().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Ping => {
            let driver = connect(config).await?;
            driver.close().await?;
            info!("neo4j reachable");
            Ok(())
        }
    }
}

async fn connect(config: &LoaderConfig) -> anyhow::Result<Neo4jDriver> {
    let driver = Neo4jDriver::connect(config).await?;
    driver.ping().await.map_err(|e| {
        error!(uri = %config.neo4j_uri, "Neo4j is not reachable: {}", e);
        e
    })?;
    Ok(driver)
}

async fn load<D: GraphDriver>(driver: D, args: &LoadArgs, config: &LoaderConfig) -> anyhow::Result<()> {
    let model = read_model(&args.model_file, args.props_file.as_deref())?;
    let files = discover_tsv_files(&args.data_dir).await?;
    if files.is_empty() {
        warn!(dir = %args.data_dir.display(), "no .tsv files found");
    }
    info!(files = files.len(), dir = %args.data_dir.display(), "starting load");

    let loader = Loader::new(driver, config);
    let report = loader.load_files(&files, &model).await;
    loader.driver().close().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    let totals = report.totals();
    info!(
        nodes_created = totals.nodes_created,
        relationships_created = totals.relationships_created,
        relationships_skipped = totals.relationships_skipped,
        "load finished"
    );

    let failed = report.failed().count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} file(s) failed", report.files.len());
    }
    Ok(())
}

fn read_model(model_file: &Path, props_file: Option<&Path>) -> anyhow::Result<MdfModel> {
    let model = match props_file {
        Some(props_file) => MdfModel::from_files(model_file, props_file)?,
        None => {
            let yaml = std::fs::read_to_string(model_file).map_err(|e| {
                anyhow::anyhow!("Cannot read model file '{}': {}", model_file.display(), e)
            })?;
            MdfModel::from_yaml_str(&yaml, "")?
        }
    };
    info!(model = %model_file.display(), "model loaded");
    Ok(model)
}

/// Resolves on SIGTERM or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl-C, shutting down"); }
        _ = terminate => { info!("received SIGTERM, shutting down"); }
    }
}
