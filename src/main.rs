// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Thin CLI over the sync engine.
//!
//! Every flag maps onto a [`SyncConfig`] field; the binary holds no logic
//! of its own beyond wiring the HTTP clients together and printing the
//! report. Credentials come from the environment so they never appear in
//! shell history.

use anyhow::Context;
use clap::Parser;
use collection_sync::config::{RuntimeOptions, SourceConfig, SyncConfig, TargetConfig};
use collection_sync::record::RecordType;
use collection_sync::store::SourceMappingStore;
use collection_sync::{HttpSourceStore, HttpTargetClient, SyncEngine, SyncReport};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "collection-sync",
    about = "Synchronize editorial content into the site CMS",
    version
)]
struct Cli {
    /// Source store API base URL
    #[arg(long, env = "SOURCE_API_URL")]
    source_url: String,

    /// Source dataset name
    #[arg(long, env = "SOURCE_DATASET", default_value = "production")]
    dataset: String,

    /// Source API token
    #[arg(long, env = "SOURCE_TOKEN", hide_env_values = true)]
    source_token: String,

    /// Asset CDN base URL
    #[arg(long, env = "SOURCE_ASSET_BASE_URL")]
    asset_base_url: String,

    /// Target CMS API base URL
    #[arg(long, env = "TARGET_API_URL")]
    target_url: String,

    /// Target site id (scopes asset uploads)
    #[arg(long, env = "TARGET_SITE_ID")]
    site_id: String,

    /// Target API token
    #[arg(long, env = "TARGET_TOKEN", hide_env_values = true)]
    target_token: String,

    /// Sync only this collection (artists, artworks, exhibitions)
    #[arg(long)]
    collection: Option<String>,

    /// Sync a single record by source id (requires --collection)
    #[arg(long, requires = "collection")]
    record: Option<String>,

    /// Dry run: report what would change, write nothing
    #[arg(long)]
    check: bool,

    /// Force updates even when content hashes match
    #[arg(long)]
    force: bool,

    /// Publish items created or updated by this run
    #[arg(long)]
    publish: bool,

    /// Publish every mapped item, touched or not
    #[arg(long)]
    publish_all: bool,

    /// Only sync records modified at or after this RFC 3339 timestamp
    #[arg(long)]
    since: Option<String>,

    /// Disable adoption by display name (slug adoption stays on)
    #[arg(long)]
    no_adopt_by_name: bool,

    /// Run the interactive trigger server instead of a one-shot sync
    #[arg(long)]
    serve: bool,

    /// Trigger server port
    #[arg(long, env = "SYNC_PORT", default_value_t = 3000)]
    port: u16,
}

impl Cli {
    fn into_config(self) -> (SyncConfig, CliMode) {
        let mode = if self.serve {
            CliMode::Serve { port: self.port }
        } else if let Some(record) = self.record.clone() {
            CliMode::Single {
                record,
                collection: self.collection.clone().unwrap_or_default(),
            }
        } else if let Some(collection) = self.collection.clone() {
            CliMode::Collection { collection }
        } else {
            CliMode::Full
        };

        let config = SyncConfig {
            source: SourceConfig {
                api_url: self.source_url,
                dataset: self.dataset,
                token: self.source_token,
                asset_base_url: self.asset_base_url,
            },
            target: TargetConfig {
                api_url: self.target_url,
                site_id: self.site_id,
                token: self.target_token,
            },
            runtime: RuntimeOptions {
                force: self.force,
                auto_publish: self.publish,
                publish_all: self.publish_all,
                check_only: self.check,
                since: self.since,
                adopt_by_name: !self.no_adopt_by_name,
            },
            limits: Default::default(),
        };
        (config, mode)
    }
}

enum CliMode {
    Full,
    Collection { collection: String },
    Single { record: String, collection: String },
    Serve { port: u16 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "collection_sync=info".into()),
        )
        .init();

    let (config, mode) = Cli::parse().into_config();
    config.validate().context("invalid configuration")?;

    let source = Arc::new(HttpSourceStore::new(config.source.clone()));
    let api = Arc::new(HttpTargetClient::new(
        config.target.clone(),
        config.limits.clone(),
    ));
    let store = Arc::new(SourceMappingStore::new(Arc::clone(&source)));
    let engine = SyncEngine::new(api, source, store, config);

    match mode {
        CliMode::Full => {
            let report = engine.run_full().await.context("full sync failed")?;
            print_report(&report);
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        CliMode::Collection { collection } => {
            let record_type = RecordType::from_collection(&collection)
                .with_context(|| format!("unknown collection {collection:?}"))?;
            let report = engine
                .run_collection(record_type)
                .await
                .context("collection sync failed")?;
            print_report(&report);
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        CliMode::Single { record, collection } => {
            let record_type = RecordType::from_collection(&collection)
                .with_context(|| format!("unknown collection {collection:?}"))?;
            let auto_publish = engine.config().runtime.auto_publish;
            let report = engine
                .run_single(&record, record_type, auto_publish)
                .await
                .context("record sync failed")?;
            print_report(&report);
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        CliMode::Serve { port } => {
            collection_sync::trigger::serve(Arc::new(engine), port)
                .await
                .context("trigger server failed")?;
        }
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    for (collection, outcome) in &report.collections {
        println!(
            "{collection}: created {}, updated {}, skipped {}, ambiguous {}, errored {}",
            outcome.created, outcome.updated, outcome.skipped, outcome.ambiguous, outcome.errored
        );
    }
    let totals = report.totals();
    println!(
        "total: {} records in {} ms{}",
        totals.total(),
        report.duration_ms,
        if report.check_only { " (dry run)" } else { "" }
    );
}
