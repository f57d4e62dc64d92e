//! Output contracts every adapter implementation must honor.
//!
//! The pipeline checks adapter output against these before persisting it;
//! a violation is reported as an adapter error and retried like one.

use std::collections::BTreeSet;

use seocompass_shared::{Competitor, Keyword, PageDraft, PageName, Result, SeoCompassError};

/// Upper bound on competitors per job.
pub const MAX_COMPETITORS: usize = 10;

/// Upper bound on keywords per job.
pub const MAX_KEYWORDS: usize = 10;

fn violation(msg: String) -> SeoCompassError {
    SeoCompassError::Adapter(format!("contract violation: {msg}"))
}

/// At most [`MAX_COMPETITORS`], ranks strictly increasing from 1.
pub fn check_competitors(items: &[Competitor]) -> Result<()> {
    if items.len() > MAX_COMPETITORS {
        return Err(violation(format!(
            "{} competitors (max {MAX_COMPETITORS})",
            items.len()
        )));
    }
    let mut previous = 0;
    for (i, c) in items.iter().enumerate() {
        if (i == 0 && c.rank != 1) || c.rank <= previous {
            return Err(violation(format!(
                "competitor ranks must increase from 1, found {} at position {}",
                c.rank,
                i + 1
            )));
        }
        previous = c.rank;
    }
    Ok(())
}

/// At most [`MAX_KEYWORDS`], each difficulty within `[0, 1]`.
pub fn check_keywords(items: &[Keyword]) -> Result<()> {
    if items.len() > MAX_KEYWORDS {
        return Err(violation(format!(
            "{} keywords (max {MAX_KEYWORDS})",
            items.len()
        )));
    }
    if let Some(bad) = items
        .iter()
        .find(|k| !(0.0..=1.0).contains(&k.difficulty))
    {
        return Err(violation(format!(
            "keyword '{}' has difficulty {} outside [0, 1]",
            bad.keyword, bad.difficulty
        )));
    }
    Ok(())
}

/// Exactly one draft per [`PageName`].
pub fn check_drafts(items: &[PageDraft]) -> Result<()> {
    let pages: BTreeSet<PageName> = items.iter().map(|d| d.page_name).collect();
    if items.len() != PageName::ALL.len() || pages.len() != PageName::ALL.len() {
        let names: Vec<&str> = items.iter().map(|d| d.page_name.as_str()).collect();
        return Err(violation(format!(
            "expected one draft each for home, services and about, got [{}]",
            names.join(", ")
        )));
    }
    Ok(())
}
