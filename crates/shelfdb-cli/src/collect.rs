//! The `collect` command: live storefront catalogs through the reconciler
//! and into the store.
//!
//! Per-source failures are logged and recorded on the run rather than
//! propagated, so one unreachable storefront does not abort the whole pass.

use shelfdb_core::AppConfig;
use shelfdb_extract::{ProductSource, ShopifySource, StorefrontClient};
use shelfdb_reconcile::{IdentityRules, Reconciler};

use crate::fail_run_best_effort;
use crate::ingest::load_prior_state;

/// Load the sources to process for a collect run.
///
/// If `source_filter` is `Some(slug)`, fetches that single source and returns
/// an error if not found or if `shop_url` is `None`. If `None`, returns all
/// active sources, filtering out those without a `shop_url` (with a warning).
async fn load_sources_for_collect(
    pool: &sqlx::PgPool,
    source_filter: Option<&str>,
) -> anyhow::Result<Vec<shelfdb_db::SourceRow>> {
    if let Some(slug) = source_filter {
        let source = shelfdb_db::get_source_by_slug(pool, slug)
            .await?
            .ok_or_else(|| anyhow::anyhow!("source '{slug}' not found"))?;
        if source.shop_url.is_none() {
            anyhow::bail!(
                "source '{slug}' exists but has no shop_url configured; update config/sources.yaml"
            );
        }
        Ok(vec![source])
    } else {
        let all = shelfdb_db::list_active_sources(pool).await?;
        let sources: Vec<shelfdb_db::SourceRow> = all
            .into_iter()
            .filter(|s| {
                if s.shop_url.is_none() {
                    tracing::warn!(slug = %s.slug, "skipping source — shop_url is not set");
                    false
                } else {
                    true
                }
            })
            .collect();
        Ok(sources)
    }
}

fn build_storefront_client(config: &AppConfig) -> anyhow::Result<StorefrontClient> {
    Ok(StorefrontClient::new(
        config.fetch_request_timeout_secs,
        &config.fetch_user_agent,
        config.fetch_inter_request_delay_ms,
        config.fetch_max_pages,
    )?)
}

/// Collect storefront catalogs and reconcile them into the product store.
///
/// When `dry_run` is `true` the function prints which sources would be
/// collected and returns without fetching anything.
///
/// # Errors
///
/// Returns an error if the source filter resolves to nothing, the run cannot
/// be created, or every source fails. Individual source failures are logged
/// and recorded on the run.
pub(crate) async fn run_collect(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    source_filter: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let sources = load_sources_for_collect(pool, source_filter).await?;
    if sources.is_empty() {
        println!("no eligible sources found for collection; skipping run creation");
        return Ok(());
    }

    if dry_run {
        let slugs: Vec<&str> = sources.iter().map(|s| s.slug.as_str()).collect();
        println!(
            "dry-run: would collect catalogs for {} sources: [{}]",
            sources.len(),
            slugs.join(", ")
        );
        return Ok(());
    }

    let registry = shelfdb_core::load_sources(&config.sources_path)?;
    let reconciler = Reconciler::new(IdentityRules::from_sources(&registry));

    let run = shelfdb_db::create_ingest_run(pool, "storefront", "cli").await?;
    if let Err(e) = shelfdb_db::start_ingest_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, "storefront", format!("{e:#}")).await;
        return Err(e.into());
    }

    let mut total_records_in = 0usize;
    let mut total_identities = 0usize;
    let mut total_unidentifiable = 0usize;
    let mut failed_sources = 0usize;
    let source_count = sources.len();

    for s in &sources {
        let shop_url = s.shop_url.as_deref().unwrap_or_default();
        match collect_source(pool, config, &reconciler, &s.slug, shop_url).await {
            Ok(summary) => {
                total_records_in += summary.records_in;
                total_identities += summary.unique_identities;
                total_unidentifiable += summary.unidentifiable;
                shelfdb_db::upsert_ingest_run_source(
                    pool,
                    run.id,
                    &s.slug,
                    "succeeded",
                    Some(i32::try_from(summary.records_in).unwrap_or(i32::MAX)),
                    None,
                )
                .await?;
                println!("{}: {summary}", s.slug);
            }
            Err(e) => {
                tracing::error!(source = %s.slug, error = %e, "failed to collect storefront catalog");
                shelfdb_db::upsert_ingest_run_source(
                    pool,
                    run.id,
                    &s.slug,
                    "failed",
                    None,
                    Some(&format!("{e:#}")),
                )
                .await?;
                failed_sources += 1;
            }
        }
    }

    if failed_sources > 0 {
        tracing::warn!(
            failed_sources,
            total_sources = source_count,
            "some sources failed during collection"
        );
    }

    if failed_sources == source_count {
        let message = format!("all {failed_sources} sources failed collection");
        fail_run_best_effort(pool, run.id, "storefront", message.clone()).await;
        anyhow::bail!("{message}");
    }

    if let Err(err) = shelfdb_db::complete_ingest_run(
        pool,
        run.id,
        i32::try_from(total_records_in).unwrap_or(i32::MAX),
        i32::try_from(total_identities).unwrap_or(i32::MAX),
        i32::try_from(total_unidentifiable).unwrap_or(i32::MAX),
    )
    .await
    {
        fail_run_best_effort(pool, run.id, "storefront", format!("{err:#}")).await;
        return Err(err.into());
    }

    println!(
        "collected {total_records_in} records into {total_identities} products \
         across {source_count} sources"
    );
    Ok(())
}

async fn collect_source(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    reconciler: &Reconciler,
    slug: &str,
    shop_url: &str,
) -> anyhow::Result<shelfdb_reconcile::ReconcileSummary> {
    let client = build_storefront_client(config)?;
    let source = ShopifySource::new(client, slug, shop_url);
    let harvest = source.produce_candidates().await?;

    let prior = load_prior_state(pool, slug).await?;
    let mut reconciliation = reconciler.reconcile(prior, harvest.records);
    reconciliation.summary.add_malformed(harvest.malformed);

    shelfdb_db::upsert_products(pool, reconciliation.products.values()).await?;
    Ok(reconciliation.summary)
}
