//! Aggregation over the loaded table and chart rendering.
//!
//! Runs a grouped average over the destination table, logs the ranked
//! groups, and renders them as a bar chart artifact. Ranking is fully
//! deterministic: descending mean, then dimension value ascending.

pub mod chart;

use snafu::prelude::*;
use std::path::PathBuf;
use tokio_postgres::error::SqlState;
use tracing::{info, warn};

use crate::config::AnalyticsConfig;
use crate::emit;
use crate::error::{AnalyzeConnectionSnafu, AnalyzeError, QuerySnafu};
use crate::metrics::events::{AggregateGroups, ChartWritten};
use crate::warehouse::{self, TableIdent, quote_ident};

/// One ranked group of the aggregation result.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    /// Dimension value the rows were grouped by.
    pub group: String,
    /// Mean of the measure over the group, rounded to two decimals.
    pub mean: f64,
}

/// Result of the analyze stage.
#[derive(Debug)]
pub struct AnalyzeOutcome {
    /// Ranked groups, best first.
    pub groups: Vec<AggregateRow>,
    /// Path of the published chart artifact.
    pub chart: PathBuf,
}

/// Computes the grouped average and renders the chart artifact.
pub struct Analyzer {
    url: String,
    table: TableIdent,
    analytics: AnalyticsConfig,
}

impl Analyzer {
    /// Create an analyzer over the configured destination table.
    pub fn new(url: &str, table: TableIdent, analytics: &AnalyticsConfig) -> Self {
        Self {
            url: url.to_string(),
            table,
            analytics: analytics.clone(),
        }
    }

    /// Query the destination table and publish the chart.
    pub async fn run(&self) -> Result<AnalyzeOutcome, AnalyzeError> {
        let client = warehouse::connect(&self.url)
            .await
            .context(AnalyzeConnectionSnafu)?;

        let sql = aggregate_sql(&self.table, &self.analytics);
        let result = client
            .query(&sql, &[])
            .await
            .map_err(|e| classify(e, &self.table))?;

        let mut groups = Vec::with_capacity(result.len());
        for row in &result {
            let group: String = row.try_get(0).context(QuerySnafu)?;
            let mean: f64 = row.try_get(1).context(QuerySnafu)?;
            groups.push(AggregateRow { group, mean });
        }

        if groups.is_empty() {
            warn!("Aggregation over {} returned no groups", self.table);
        } else {
            info!(
                "Top {} {} by average {}:",
                groups.len(),
                self.analytics.dimension,
                self.analytics.measure
            );
            for entry in &groups {
                info!("{:<24} {:.2}", entry.group, entry.mean);
            }
        }
        emit!(AggregateGroups {
            count: groups.len(),
        });

        let chart_path = PathBuf::from(&self.analytics.chart_path);
        chart::render_bar_chart(
            &chart_path,
            &self.analytics.title(),
            &self.analytics.dimension,
            &format!("Average {}", self.analytics.measure),
            &groups,
        )?;
        info!("Chart written to {}", chart_path.display());
        emit!(ChartWritten);

        Ok(AnalyzeOutcome {
            groups,
            chart: chart_path,
        })
    }
}

/// Build the grouped-average query.
///
/// Empty measure values are excluded from both the average and the group
/// filter, so a group mean is never NULL; NULL or empty dimension values
/// are excluded entirely.
fn aggregate_sql(table: &TableIdent, analytics: &AnalyticsConfig) -> String {
    let dimension = quote_ident(&analytics.dimension);
    let measure = quote_ident(&analytics.measure);
    format!(
        "SELECT {dimension}, ROUND(AVG(NULLIF({measure}, '')::numeric), 2)::float8 AS avg_measure \
         FROM {table} \
         WHERE {dimension} IS NOT NULL AND {dimension} <> '' \
         AND NULLIF({measure}, '') IS NOT NULL \
         GROUP BY {dimension} \
         ORDER BY avg_measure DESC, {dimension} ASC \
         LIMIT {top_n}",
        table = table.qualified(),
        top_n = analytics.top_n,
    )
}

fn classify(err: tokio_postgres::Error, table: &TableIdent) -> AnalyzeError {
    if let Some(db) = err.as_db_error() {
        // A missing schema surfaces as INVALID_SCHEMA_NAME, not UNDEFINED_TABLE.
        let code = db.code();
        if code == &SqlState::UNDEFINED_TABLE || code == &SqlState::INVALID_SCHEMA_NAME {
            return AnalyzeError::TableMissing {
                table: table.to_string(),
            };
        }
    }
    if warehouse::is_transient(&err) {
        AnalyzeError::AnalyzeConnection { source: err }
    } else {
        AnalyzeError::QueryError { source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analytics() -> AnalyticsConfig {
        AnalyticsConfig {
            dimension: "city".to_string(),
            measure: "review_stars".to_string(),
            top_n: 10,
            chart_path: "avg_stars_by_city.svg".to_string(),
            chart_title: None,
        }
    }

    #[test]
    fn test_aggregate_sql_shape() {
        let table = TableIdent::parse("analytics.yelp_merged").unwrap();
        let sql = aggregate_sql(&table, &analytics());

        assert_eq!(
            sql,
            "SELECT \"city\", ROUND(AVG(NULLIF(\"review_stars\", '')::numeric), 2)::float8 \
             AS avg_measure FROM \"analytics\".\"yelp_merged\" \
             WHERE \"city\" IS NOT NULL AND \"city\" <> '' \
             AND NULLIF(\"review_stars\", '') IS NOT NULL \
             GROUP BY \"city\" \
             ORDER BY avg_measure DESC, \"city\" ASC \
             LIMIT 10"
        );
    }

    #[test]
    fn test_aggregate_sql_respects_top_n() {
        let table = TableIdent::parse("analytics.yelp_merged").unwrap();
        let mut config = analytics();
        config.top_n = 3;

        assert!(aggregate_sql(&table, &config).ends_with("LIMIT 3"));
    }
}
