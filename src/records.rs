use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, TimeZone};
use serde::Serialize;

use crate::error::ResolveError;
use crate::parser::fields::ParsedAlert;
use crate::resolver::{HeadClient, UrlResolver};

/// One output row. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationRecord {
    pub email_file_name: String,
    pub email_timestamp: String,
    pub query: String,
    pub title: String,
    pub url: String,
    pub authors: String,
    pub blurb: String,
}

impl CitationRecord {
    pub const FIELDS: [&'static str; 7] = [
        "email_file_name",
        "email_timestamp",
        "query",
        "title",
        "url",
        "authors",
        "blurb",
    ];
}

#[derive(Debug, Clone)]
pub struct EmailMeta {
    pub file_name: String,
    pub timestamp: DateTime<FixedOffset>,
}

/// Second-precision timestamp in `zone`, e.g. `2024-07-01 19:52:37`.
pub fn format_timestamp<Tz: TimeZone>(timestamp: &DateTime<FixedOffset>, zone: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp
        .with_timezone(zone)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Resolve every citation URL and emit records in citation order.
///
/// Fails on the first unresolvable URL; no partial list is returned.
pub async fn build_records<C: HeadClient>(
    meta: &EmailMeta,
    alert: ParsedAlert,
    resolver: &UrlResolver<C>,
) -> Result<Vec<CitationRecord>, ResolveError> {
    let email_timestamp = format_timestamp(&meta.timestamp, &Local);
    let mut records = Vec::with_capacity(alert.citations.len());

    for citation in alert.citations {
        let url = resolver.resolve(&citation.tracking_url).await?;
        records.push(CitationRecord {
            email_file_name: meta.file_name.clone(),
            email_timestamp: email_timestamp.clone(),
            query: alert.query.clone(),
            title: citation.title,
            url,
            authors: citation.authors,
            blurb: citation.blurb,
        });
    }

    Ok(records)
}

/// Write records with a header row, even when there are none.
pub fn write_csv(path: &Path, records: &[CitationRecord]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create CSV writer for {}", path.display()))?;

    wtr.write_record(CitationRecord::FIELDS)
        .context("Failed to write CSV header")?;
    for record in records {
        wtr.serialize(record).context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV")?;
    Ok(())
}
