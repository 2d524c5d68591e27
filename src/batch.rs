use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{EmailError, ResolveError};
use crate::mail;
use crate::parser::{self, fields::ParsedAlert};
use crate::records::{self, build_records, CitationRecord, EmailMeta};
use crate::resolver::{HeadClient, UrlResolver};
use crate::settings::Settings;

const EMAIL_EXTENSION: &str = "eml";
const REPORT_FILE: &str = "report.json";

/// Where one batch writes its side effects.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub batch_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    pub dump_html: bool,
}

impl BatchContext {
    pub fn new(batch_dir: PathBuf, settings: &Settings) -> Self {
        let quarantine_dir = batch_dir.join(&settings.quarantine_dir);
        Self {
            batch_dir,
            quarantine_dir,
            dump_html: settings.dump_html,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub file: String,
    pub kind: &'static str,
    pub error: String,
    pub quarantined_to: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub records: Vec<CitationRecord>,
    pub succeeded: Vec<String>,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub batch: String,
    pub emails: usize,
    pub records: usize,
    pub succeeded: Vec<String>,
    pub failures: Vec<Failure>,
}

/// All `*.eml` files directly inside `dir`, sorted by name.
pub fn collect_emails(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let is_email = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(EMAIL_EXTENSION));
        if is_email && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Create `<batches>/<stamp><letter>` using the first free letter a..z.
pub fn new_batch_dir(batches: &Path, stamp: &str) -> Result<PathBuf> {
    for letter in 'a'..='z' {
        let batch = batches.join(format!("{stamp}{letter}"));
        if !batch.exists() {
            std::fs::create_dir_all(&batch)
                .with_context(|| format!("Failed to create {}", batch.display()))?;
            return Ok(batch);
        }
    }
    bail!("too many batches for timestamp {stamp}")
}

/// Move the emails into the batch directory; returns the new paths, sorted.
pub fn move_into(paths: &[PathBuf], batch_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut moved = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .with_context(|| format!("{} has no file name", path.display()))?;
        let target = batch_dir.join(name);
        std::fs::rename(path, &target)
            .with_context(|| format!("Failed to move {} into batch", path.display()))?;
        moved.push(target);
    }
    moved.sort();
    Ok(moved)
}

/// Copy a failed input, untouched, into the quarantine directory.
pub fn quarantine(dir: &Path, path: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = path.file_name().unwrap_or(path.as_os_str());
    let target = dir.join(name);
    std::fs::copy(path, &target)?;
    Ok(target)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Everything up to (not including) URL resolution. No network, no shared state.
fn prepare(ctx: &BatchContext, path: &Path) -> Result<(EmailMeta, ParsedAlert), EmailError> {
    let raw = mail::read_eml(path)?;
    let name = file_name(path);
    if ctx.dump_html {
        let html_path = ctx.batch_dir.join(Path::new(&name).with_extension("html"));
        if let Err(e) = std::fs::write(&html_path, &raw.html) {
            warn!(path = %html_path.display(), "could not dump html: {}", e);
        }
    }
    let alert = parser::parse_alert(&raw.html)?;
    let meta = EmailMeta {
        file_name: name,
        timestamp: raw.date,
    };
    Ok((meta, alert))
}

/// Process emails in the given order, isolating failures per file.
///
/// Parsing runs in parallel; URL resolution runs one email at a time. A
/// failed email contributes no records and is copied to quarantine.
pub async fn process_emails<C: HeadClient>(
    ctx: &BatchContext,
    paths: &[PathBuf],
    resolver: &UrlResolver<C>,
) -> BatchOutcome {
    let prepared: Vec<_> = paths.par_iter().map(|p| prepare(ctx, p)).collect();

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut outcome = BatchOutcome::default();
    for (path, prepared) in paths.iter().zip(prepared) {
        let name = file_name(path);
        pb.set_message(name.clone());

        let result = match prepared {
            Ok((meta, alert)) => {
                debug!(file = %name, query = %alert.query, citations = alert.citations.len(), "parsed alert");
                build_records(&meta, alert, resolver)
                    .await
                    .map_err(EmailError::from)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(records) => {
                info!(file = %name, records = records.len(), "email converted");
                outcome.records.extend(records);
                outcome.succeeded.push(name);
            }
            Err(e) => {
                warn!(file = %name, kind = e.kind(), "email failed: {}", e);
                if let EmailError::Resolve(ResolveError::UnexpectedStatus { headers, .. }) = &e {
                    debug!(file = %name, ?headers, "redirect response headers");
                }
                let quarantined_to = match quarantine(&ctx.quarantine_dir, path) {
                    Ok(target) => Some(target),
                    Err(qe) => {
                        error!(file = %name, "could not quarantine: {}", qe);
                        None
                    }
                };
                outcome.failures.push(Failure {
                    file: name,
                    kind: e.kind(),
                    error: e.to_string(),
                    quarantined_to,
                });
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    outcome
}

/// Full run over one input directory: new batch, move, convert, write CSV and report.
pub async fn run_batch<C: HeadClient>(
    input_dir: &Path,
    settings: &Settings,
    resolver: &UrlResolver<C>,
) -> Result<BatchReport> {
    let originals = collect_emails(input_dir)?;
    let batches = input_dir.join(&settings.batches_dir);
    let stamp = Local::now().format("%Y-%m-%d_%H%M").to_string();
    let batch_dir = new_batch_dir(&batches, &stamp)?;
    let batch = file_name(&batch_dir);
    info!(batch = %batch, emails = originals.len(), "starting batch");

    let paths = move_into(&originals, &batch_dir)?;
    let ctx = BatchContext::new(batch_dir.clone(), settings);
    let outcome = process_emails(&ctx, &paths, resolver).await;

    let csv_path = batch_dir.join(format!("{batch}.csv"));
    records::write_csv(&csv_path, &outcome.records)?;

    let report = BatchReport {
        batch,
        emails: paths.len(),
        records: outcome.records.len(),
        succeeded: outcome.succeeded,
        failures: outcome.failures,
    };
    let report_path = batch_dir.join(REPORT_FILE);
    std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    info!(
        records = report.records,
        failed = report.failures.len(),
        csv = %csv_path.display(),
        "batch finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::testing::FakeHead;

    const ALERT: &str = "tests/fixtures/alert.eml";
    const BROKEN: &str = "tests/fixtures/broken.eml";

    fn fake() -> FakeHead {
        FakeHead::default().redirect(
            "https://notifications.example.com/track?id=2",
            "https://scholar.google.com/scholar_url?url=https://example.org/survey",
        )
    }

    fn stage(dir: &Path, files: &[(&str, &str)]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|(name, fixture)| {
                let target = dir.join(name);
                std::fs::copy(fixture, &target).unwrap();
                target
            })
            .collect()
    }

    #[tokio::test]
    async fn one_broken_email_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let paths = stage(
            dir.path(),
            &[("1.eml", ALERT), ("2.eml", BROKEN), ("3.eml", ALERT)],
        );
        let settings = Settings::default();
        let ctx = BatchContext::new(dir.path().to_path_buf(), &settings);
        let resolver = UrlResolver::new(fake(), &settings);

        let outcome = process_emails(&ctx, &paths, &resolver).await;

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].file, "2.eml");
        assert_eq!(outcome.failures[0].kind, "structure");
        assert_eq!(outcome.succeeded, ["1.eml", "3.eml"]);

        let files: Vec<_> = outcome.records.iter().map(|r| r.email_file_name.as_str()).collect();
        assert_eq!(files, ["1.eml", "1.eml", "1.eml", "3.eml", "3.eml", "3.eml"]);
        assert_eq!(outcome.records[1].url, "https://example.org/survey");
        assert_eq!(outcome.records[2].url, "https://example.org/third.pdf");

        let quarantined = outcome.failures[0].quarantined_to.clone().unwrap();
        assert_eq!(quarantined, dir.path().join("failed").join("2.eml"));
        assert_eq!(
            std::fs::read(&quarantined).unwrap(),
            std::fs::read(BROKEN).unwrap()
        );
    }

    #[tokio::test]
    async fn resolution_failure_quarantines_whole_email() {
        let dir = tempfile::tempdir().unwrap();
        let paths = stage(dir.path(), &[("a.eml", ALERT)]);
        let settings = Settings::default();
        let ctx = BatchContext::new(dir.path().to_path_buf(), &settings);
        // no route for the tracking link: 404
        let resolver = UrlResolver::new(FakeHead::default(), &settings);

        let outcome = process_emails(&ctx, &paths, &resolver).await;
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, "redirect_protocol");
        assert!(outcome.failures[0].error.contains("404"));
        assert!(dir.path().join("failed").join("a.eml").exists());
    }

    #[tokio::test]
    async fn dump_html_writes_body_next_to_email() {
        let dir = tempfile::tempdir().unwrap();
        let paths = stage(dir.path(), &[("a.eml", ALERT)]);
        let settings = Settings {
            dump_html: true,
            ..Settings::default()
        };
        let ctx = BatchContext::new(dir.path().to_path_buf(), &settings);
        let resolver = UrlResolver::new(fake(), &settings);

        process_emails(&ctx, &paths, &resolver).await;
        let html = std::fs::read_to_string(dir.path().join("a.html")).unwrap();
        assert!(html.contains("gse_alrt_title"));
    }

    #[test]
    fn batch_dir_letters() {
        let dir = tempfile::tempdir().unwrap();
        let first = new_batch_dir(dir.path(), "2024-07-01_1052").unwrap();
        let second = new_batch_dir(dir.path(), "2024-07-01_1052").unwrap();
        assert!(first.ends_with("2024-07-01_1052a"));
        assert!(second.ends_with("2024-07-01_1052b"));
    }

    #[test]
    fn batch_dir_runs_out_of_letters() {
        let dir = tempfile::tempdir().unwrap();
        for letter in 'a'..='z' {
            std::fs::create_dir(dir.path().join(format!("s{letter}"))).unwrap();
        }
        assert!(new_batch_dir(dir.path(), "s").is_err());
    }

    #[test]
    fn collects_only_emails_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.eml", "a.EML", "notes.txt", "c.html"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        std::fs::create_dir(dir.path().join("dir.eml")).unwrap();
        let names: Vec<_> = collect_emails(dir.path())
            .unwrap()
            .iter()
            .map(|p| file_name(p))
            .collect();
        assert_eq!(names, ["a.EML", "b.eml"]);
    }

    #[tokio::test]
    async fn full_run_writes_csv_and_report() {
        let dir = tempfile::tempdir().unwrap();
        stage(dir.path(), &[("1.eml", ALERT), ("2.eml", BROKEN)]);
        let settings = Settings::default();
        let resolver = UrlResolver::new(fake(), &settings);

        let report = run_batch(dir.path(), &settings, &resolver).await.unwrap();
        assert_eq!(report.emails, 2);
        assert_eq!(report.records, 3);
        assert_eq!(report.failures.len(), 1);

        // inputs were moved into the batch
        assert!(!dir.path().join("1.eml").exists());
        let batch_dir = dir.path().join("batches").join(&report.batch);
        assert!(batch_dir.join("1.eml").exists());
        assert!(batch_dir.join("failed").join("2.eml").exists());

        let csv = std::fs::read_to_string(batch_dir.join(format!("{}.csv", report.batch))).unwrap();
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.contains("Deep Learning for Citation Graphs"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(batch_dir.join(REPORT_FILE)).unwrap())
                .unwrap();
        assert_eq!(json["failures"][0]["file"], "2.eml");
    }
}
