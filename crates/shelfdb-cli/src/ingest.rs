//! The `ingest` command: browser-export files through the reconciler and
//! into the store.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use shelfdb_core::{AppConfig, CanonicalProduct, IdentityKey};
use shelfdb_reconcile::{IdentityRules, Reconciler};

use crate::fail_run_best_effort;

/// Loads this source's stored products as prior state for the reconciler.
pub(crate) async fn load_prior_state(
    pool: &sqlx::PgPool,
    source_slug: &str,
) -> anyhow::Result<BTreeMap<IdentityKey, CanonicalProduct>> {
    let rows = shelfdb_db::list_products_for_source(pool, source_slug).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let product = row.into_canonical();
            (product.key.clone(), product)
        })
        .collect())
}

/// Ingest one or more export files for a single source.
///
/// Loads the files, reconciles their records against the source's stored
/// products, and upserts the result, recording the run in `ingest_runs`.
/// With `dry_run` the reconciliation runs against empty prior state and only
/// the summary is printed.
///
/// # Errors
///
/// Returns an error if the source slug is unknown, a file is unreadable, or
/// any database step fails. Malformed elements inside readable files are
/// counted in the summary instead.
pub(crate) async fn run_ingest(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    source_slug: &str,
    files: &[PathBuf],
    observed_at: Option<DateTime<Utc>>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let registry = shelfdb_core::load_sources(&config.sources_path)?;
    if registry.by_slug(source_slug).is_none() {
        anyhow::bail!(
            "source '{source_slug}' is not in {}; add it to the registry first",
            config.sources_path.display()
        );
    }
    let reconciler = Reconciler::new(IdentityRules::from_sources(&registry));

    let fallback_observed_at = observed_at.unwrap_or_else(Utc::now);
    let harvest =
        shelfdb_extract::load_export_files(files, source_slug, fallback_observed_at)?;
    let record_count = harvest.records.len();

    if dry_run {
        let mut reconciliation = reconciler.reconcile(BTreeMap::new(), harvest.records);
        reconciliation.summary.add_malformed(harvest.malformed);
        println!("dry-run: {}", reconciliation.summary);
        return Ok(());
    }

    shelfdb_db::get_source_by_slug(pool, source_slug)
        .await?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "source '{source_slug}' not found; seed the registry with `shelfdb sources seed`"
            )
        })?;

    let run = shelfdb_db::create_ingest_run(pool, "export", "cli").await?;
    if let Err(e) = shelfdb_db::start_ingest_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, "export", format!("{e:#}")).await;
        return Err(e.into());
    }

    let outcome = async {
        let prior = load_prior_state(pool, source_slug).await?;
        let mut reconciliation = reconciler.reconcile(prior, harvest.records);
        reconciliation.summary.add_malformed(harvest.malformed);

        shelfdb_db::upsert_products(pool, reconciliation.products.values()).await?;
        anyhow::Ok(reconciliation.summary)
    }
    .await;

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            fail_run_best_effort(pool, run.id, "export", format!("{e:#}")).await;
            return Err(e);
        }
    };

    shelfdb_db::upsert_ingest_run_source(
        pool,
        run.id,
        source_slug,
        "succeeded",
        Some(i32::try_from(record_count).unwrap_or(i32::MAX)),
        None,
    )
    .await?;

    if let Err(e) = shelfdb_db::complete_ingest_run(
        pool,
        run.id,
        i32::try_from(summary.records_in).unwrap_or(i32::MAX),
        i32::try_from(summary.unique_identities).unwrap_or(i32::MAX),
        i32::try_from(summary.unidentifiable).unwrap_or(i32::MAX),
    )
    .await
    {
        fail_run_best_effort(pool, run.id, "export", format!("{e:#}")).await;
        return Err(e.into());
    }

    println!("{summary}");
    Ok(())
}
