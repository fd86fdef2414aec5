use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{error, info, warn};

use m3u_slim::{
    config::{derived_key, Config, MAX_EPG_BYTES, MAX_PLAYLIST_BYTES},
    epg::EpgReducer,
    playlist::PlaylistFilter,
    storage::S3Client,
    utils::StandardHttpClient,
};

const PLAYLIST_CONTENT_TYPE: &str = "application/x-mpegurl";

#[derive(Parser)]
#[command(name = "m3u-slim")]
#[command(about = "Filter an M3U playlist and reduce its XMLTV guide, then publish both")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write local artifacts but skip uploads
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("m3u_slim={}", cli.log_level).into()),
        )
        .init();

    info!("Starting m3u-slim v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.dry_run {
        config.dry_run = true;
    }

    let validation_errors = config.validate();
    if !validation_errors.is_empty() {
        for validation_error in &validation_errors {
            error!("Configuration error: {validation_error}");
        }
        anyhow::bail!("configuration validation failed");
    }

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .context("creating output directory")?;

    // Step 1: fetch and filter the playlist
    let playlist_client = StandardHttpClient::new(MAX_PLAYLIST_BYTES)?;
    let playlist_text = playlist_client
        .fetch_text(&config.playlist_source_url)
        .await?;

    let filter = PlaylistFilter::new(
        &config.filters.categories_to_keep,
        &config.filters.channel_names_to_exclude,
        config.s3.public_epg_url(),
    )?;
    let outcome = filter.filter(&playlist_text);

    write_artifact(&config, &config.s3.playlist_key, outcome.playlist.as_bytes()).await?;
    write_artifact(
        &config,
        &config.s3.all_categories_key(),
        playlist_text.as_bytes(),
    )
    .await?;

    // Step 2: fetch and reduce the guide, when a source is configured
    let reduced_epg: Option<Vec<u8>> = match &config.epg_source_url {
        Some(epg_url) => {
            info!("Starting guide reduction");
            let epg_client = StandardHttpClient::new(MAX_EPG_BYTES)?;
            let epg_text = epg_client.fetch_text(epg_url).await?;

            let policy = config.epg.retention_policy();
            let reducer = EpgReducer::new(&policy);
            let reduced = reducer.reduce(&epg_text, &outcome.retained, Utc::now())?;

            let payload = if config.s3.epg_key.ends_with(".gz") {
                gzip_compress(reduced.as_bytes()).context("compressing reduced guide")?
            } else {
                reduced.into_bytes()
            };
            write_artifact(&config, &derived_key(&config.s3.epg_key, "-filtered"), &payload)
                .await?;
            Some(payload)
        }
        None => {
            warn!("No guide source configured, skipping guide reduction");
            None
        }
    };

    if config.dry_run {
        info!("Dry-run mode: artifacts saved locally, skipping uploads");
        return Ok(());
    }

    // Step 3: publish
    let storage = S3Client::from_env(&config.s3.endpoint_url, &config.s3.region)?;
    storage
        .put_object(
            &config.s3.bucket,
            &config.s3.playlist_key,
            outcome.playlist.into_bytes(),
            PLAYLIST_CONTENT_TYPE,
        )
        .await?;
    storage
        .put_object(
            &config.s3.bucket,
            &config.s3.all_categories_key(),
            playlist_text.into_bytes(),
            PLAYLIST_CONTENT_TYPE,
        )
        .await?;
    if let Some(payload) = reduced_epg {
        let content_type = if config.s3.epg_key.ends_with(".gz") {
            "application/gzip"
        } else {
            "application/xml"
        };
        storage
            .put_object(&config.s3.bucket, &config.s3.epg_key, payload, content_type)
            .await?;
    }

    info!("Process completed successfully");
    Ok(())
}

/// Write an artifact into the output directory under its object-key filename
async fn write_artifact(config: &Config, key: &str, payload: &[u8]) -> Result<()> {
    // Keys can carry prefixes; local artifacts use the final path segment
    let filename = key.rsplit('/').next().unwrap_or(key);
    let path = config.output_dir.join(filename);
    tokio::fs::write(&path, payload)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Saved artifact: {} ({} bytes)", path.display(), payload.len());
    Ok(())
}

fn gzip_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
