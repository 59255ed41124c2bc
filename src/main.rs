use std::sync::Arc;

use anyhow::{Context, Result};
use entitlements::{
    claims::ClaimCoordinator,
    cli::args_from_env,
    config::Config,
    engine::EntitlementEngine,
    logging::init_tracing,
    store::{InMemoryStore, SnapshotStore},
    types::EvaluationContext,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = args_from_env()?;
    let config = Config::load(&args.config_path)
        .with_context(|| format!("failed to load config from {}", args.config_path.display()))?;
    let logging_guard = init_tracing(&config.logging)?;

    let snapshot = SnapshotStore::new(config.store.snapshot_path.clone());
    let contents = snapshot
        .load()
        .with_context(|| format!("failed to load snapshot {}", snapshot.path().display()))?
        .unwrap_or_default();
    let store = Arc::new(InMemoryStore::new(contents));

    let target_year = args
        .target_year
        .unwrap_or_else(|| config.evaluation.resolve_target_year());
    let ctx = EvaluationContext::new(
        args.organization_id,
        args.tier_id,
        args.package_id,
        target_year,
    );
    tracing::info!(
        target: "entitlements",
        run_id = %logging_guard.run_id(),
        organization_id = %ctx.organization_id,
        tier_id = %ctx.tier_id,
        target_year = ctx.target_year,
        "evaluation_started"
    );

    let claims = ClaimCoordinator::from_config(&config.claims)
        .context("failed to configure claim guard")?;
    let engine = EntitlementEngine::new(store, claims);
    let report = engine
        .evaluate(&ctx)
        .await
        .context("failed to evaluate entitlements")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render report")?
    );
    Ok(())
}
