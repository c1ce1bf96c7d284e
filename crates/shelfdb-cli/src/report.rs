//! The `report` command: per-source pricing, category breakdown, and best
//! sellers, printed as plain aligned text.

use rust_decimal::Decimal;

const BEST_SELLER_LIMIT: i64 = 10;

fn fmt_price(price: Option<Decimal>) -> String {
    price.map_or_else(|| "-".to_string(), |p| format!("{p:.2}"))
}

pub(crate) async fn run_report(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let summary = shelfdb_db::pricing_summary(pool).await?;
    if summary.is_empty() {
        println!("no products in the store yet; run `shelfdb ingest` or `shelfdb collect` first");
        return Ok(());
    }

    println!("pricing by source");
    println!(
        "  {:<24} {:<12} {:>8} {:>10} {:>10} {:>10} {:>8}",
        "source", "role", "products", "avg", "min", "max", "on sale"
    );
    for row in &summary {
        println!(
            "  {:<24} {:<12} {:>8} {:>10} {:>10} {:>10} {:>8}",
            row.source_slug,
            row.role,
            row.product_count,
            fmt_price(row.avg_price),
            fmt_price(row.min_price),
            fmt_price(row.max_price),
            row.on_sale_count,
        );
    }

    let categories = shelfdb_db::category_breakdown(pool).await?;
    println!("\ncategory breakdown");
    println!(
        "  {:<24} {:<16} {:>8} {:>10}",
        "source", "category", "products", "avg"
    );
    for row in &categories {
        println!(
            "  {:<24} {:<16} {:>8} {:>10}",
            row.source_slug,
            row.category,
            row.product_count,
            fmt_price(row.avg_price),
        );
    }

    let best_sellers = shelfdb_db::list_best_sellers(pool, BEST_SELLER_LIMIT).await?;
    if !best_sellers.is_empty() {
        println!("\nbest sellers");
        for row in &best_sellers {
            let rank = row
                .best_seller_rank
                .map_or_else(|| "  -".to_string(), |r| format!("#{r:>2}"));
            println!(
                "  {rank} {:<24} {:<32} {}",
                row.source_slug,
                row.name.as_deref().unwrap_or(&row.product_code),
                fmt_price(row.price),
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_price_pads_to_cents() {
        assert_eq!(fmt_price(Some(Decimal::new(4000, 2))), "40.00");
        assert_eq!(fmt_price(Some(Decimal::new(68, 0))), "68.00");
        assert_eq!(fmt_price(None), "-");
    }
}
