//! Report archive rendering.
//!
//! Turns a completed job's results into the downloadable ZIP:
//! ```text
//! competitors.csv
//! keywords.csv
//! drafts/home.txt
//! drafts/services.txt
//! drafts/about.txt
//! report_metadata.json
//! ```
//! Entries are always written in this order. A section without results is
//! still written, as a header-only CSV or an empty draft, and is left out of
//! `sections_present`. `report_metadata.json` carries a SHA-256 checksum and
//! size for each of the other five entries.

mod csv;

use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use seocompass_shared::{
    ArchiveCompression, Competitor, Job, JobId, Keyword, PageDraft, PageName, Result,
    SeoCompassError, Stage,
};

pub use csv::{competitors_csv, keywords_csv};

pub const COMPETITORS_CSV: &str = "competitors.csv";
pub const KEYWORDS_CSV: &str = "keywords.csv";
pub const METADATA_JSON: &str = "report_metadata.json";

/// Archive path of a page draft, e.g. `drafts/home.txt`.
pub fn draft_path(page: PageName) -> String {
    format!("drafts/{page}.txt")
}

/// Everything an archive is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveContents<'a> {
    pub job: &'a Job,
    pub sections_present: &'a [Stage],
    pub competitors: &'a [Competitor],
    pub keywords: &'a [Keyword],
    pub drafts: &'a [PageDraft],
}

/// Checksum entry for one archived file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveFile {
    pub name: String,
    pub sha256: String,
    pub size: usize,
}

/// Entry counts per section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionCounts {
    pub competitors: usize,
    pub keywords: usize,
    pub drafts: usize,
}

/// Contents of `report_metadata.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub job_id: JobId,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sections_present: Vec<Stage>,
    pub counts: SectionCounts,
    pub files: Vec<ArchiveFile>,
    pub generator: String,
}

/// Render the report archive as ZIP bytes.
#[instrument(skip_all, fields(job_id = %contents.job.id))]
pub fn package(contents: &ArchiveContents<'_>, compression: ArchiveCompression) -> Result<Vec<u8>> {
    let mut entries: Vec<(String, Vec<u8>)> = vec![
        (
            COMPETITORS_CSV.to_string(),
            competitors_csv(contents.competitors).into_bytes(),
        ),
        (
            KEYWORDS_CSV.to_string(),
            keywords_csv(contents.keywords).into_bytes(),
        ),
    ];

    for page in PageName::ALL {
        let content = contents
            .drafts
            .iter()
            .find(|d| d.page_name == page)
            .map(|d| d.content.as_bytes().to_vec())
            .unwrap_or_default();
        entries.push((draft_path(page), content));
    }

    let files: Vec<ArchiveFile> = entries
        .iter()
        .map(|(name, bytes)| ArchiveFile {
            name: name.clone(),
            sha256: format!("{:x}", Sha256::digest(bytes)),
            size: bytes.len(),
        })
        .collect();

    let metadata = ReportMetadata {
        job_id: contents.job.id.clone(),
        url: contents.job.url.clone(),
        created_at: contents.job.created_at,
        completed_at: contents.job.completed_at,
        sections_present: contents.sections_present.to_vec(),
        counts: SectionCounts {
            competitors: contents.competitors.len(),
            keywords: contents.keywords.len(),
            drafts: contents.drafts.len(),
        },
        files,
        generator: concat!("seocompass ", env!("CARGO_PKG_VERSION")).to_string(),
    };
    let metadata_json = serde_json::to_vec_pretty(&metadata)
        .map_err(|e| SeoCompassError::Archive(format!("metadata encode: {e}")))?;
    entries.push((METADATA_JSON.to_string(), metadata_json));

    let bytes = write_zip(&entries, compression)?;
    info!(
        entries = entries.len(),
        size = bytes.len(),
        "report archive packaged"
    );
    Ok(bytes)
}

fn write_zip(entries: &[(String, Vec<u8>)], compression: ArchiveCompression) -> Result<Vec<u8>> {
    let method = match compression {
        ArchiveCompression::Deflated => CompressionMethod::Deflated,
        ArchiveCompression::Stored => CompressionMethod::Stored,
    };
    let options = SimpleFileOptions::default().compression_method(method);
    let zip_err = |e: zip::result::ZipError| SeoCompassError::Archive(e.to_string());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        zip.start_file(name.as_str(), options).map_err(zip_err)?;
        zip.write_all(bytes)
            .map_err(|e| SeoCompassError::Archive(format!("{name}: {e}")))?;
        debug!(file = %name, size = bytes.len(), "archived");
    }

    Ok(zip.finish().map_err(zip_err)?.into_inner())
}
