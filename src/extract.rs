//! Structured extraction over notification and provider HTML.
//!
//! Pure functions over a parsed document tree; no network access. The
//! download engine and pipeline feed these the raw pages they fetch.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::errors::{PipelineError, Result};

/// Hidden fields an ASP.NET verification form must carry before a bypass
/// POST is attempted. Order matters: it is the order fields are emitted in
/// the urlencoded body.
pub const REQUIRED_FORM_FIELDS: [&str; 3] =
    ["__VIEWSTATE", "__VIEWSTATEGENERATOR", "__EVENTVALIDATION"];

/// Extensions that identify a link as a direct file download. Such links are
/// excluded from listing-page candidates since a direct file would already
/// have been classified as binary upstream.
const BINARY_EXTENSIONS: [&str; 7] = [".pdf", ".tif", ".tiff", ".doc", ".docx", ".jpg", ".png"];

/// Anchor text shorter than this falls back to the URL's last path segment
/// when deriving a candidate's suggested name.
const MIN_LINK_TEXT_CHARS: usize = 5;

static A_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static TD_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());
static INPUT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("input").unwrap());
static FORM_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("form").unwrap());

static DISPOSITION_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"filename=["']?(.+?)["']?$"#).unwrap());

/// One downloadable artifact: where to fetch it and what to call it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadInfo {
    pub source: String,
    pub doc_name: Option<String>,
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// The table cell immediately following a cell whose text satisfies `label`.
fn cell_after<F>(document: &Html, label: F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    let cells: Vec<ElementRef> = document.select(&TD_SELECTOR).collect();
    for pair in cells.windows(2) {
        if label(&element_text(pair[0])) {
            return Some(element_text(pair[1]));
        }
    }
    None
}

/// Extract the entry download link and the lead document's display name from
/// a notification email.
///
/// The link is the first anchor whose href matches the provider pattern and
/// is required; the document name comes from the details table and may be
/// absent.
pub fn extract_download_info(document: &Html, link_pattern: &Regex) -> Result<DownloadInfo> {
    let source = document
        .select(&A_SELECTOR)
        .find_map(|anchor| {
            let href = anchor.value().attr("href")?.trim();
            link_pattern.is_match(href).then(|| href.to_string())
        })
        .ok_or_else(|| {
            PipelineError::Extraction("could not find download link in email content".to_string())
        })?;

    // "Page Count" sits in the adjacent row of the same details table; guard
    // against matching it as part of the lead-document label.
    let doc_name = cell_after(document, |text| {
        text.contains("Lead Document") && !text.contains("Page Count")
    })
    .filter(|name| !name.is_empty());

    Ok(DownloadInfo { source, doc_name })
}

/// Extract the case name from the notification's details table.
///
/// Returns `None` when the row is missing or the value is redacted
/// (confidential cases show a "CONFIDENTIAL" placeholder).
pub fn extract_case_name(document: &Html) -> Option<String> {
    cell_after(document, |text| text.contains("Case Name"))
        .filter(|name| !name.is_empty() && !name.contains("CONFIDENTIAL"))
}

/// Collect the three hidden ASP.NET fields required for a verification-form
/// bypass. Fails naming the first missing field; a bypass is never attempted
/// with a partial set.
pub fn extract_form_fields(document: &Html) -> Result<Vec<(String, String)>> {
    let mut found: Vec<(String, String)> = Vec::new();

    for input in document.select(&INPUT_SELECTOR) {
        let name = input.value().attr("name").unwrap_or("");
        let value = input.value().attr("value").unwrap_or("");
        if REQUIRED_FORM_FIELDS.contains(&name) && !value.is_empty() {
            found.push((name.to_string(), value.to_string()));
        }
    }

    let mut out = Vec::with_capacity(REQUIRED_FORM_FIELDS.len());
    for field in REQUIRED_FORM_FIELDS {
        match found.iter().find(|(name, _)| name == field) {
            Some(pair) => out.push(pair.clone()),
            None => {
                return Err(PipelineError::FormBypass {
                    field: field.to_string(),
                })
            }
        }
    }

    Ok(out)
}

/// The target URL for a verification-form POST: the form's `action` resolved
/// against the page's own URL, falling back to the page URL when absent.
pub fn extract_post_url(document: &Html, page_url: &str) -> String {
    let action = document
        .select(&FORM_SELECTOR)
        .find_map(|form| form.value().attr("action"))
        .map(str::trim)
        .filter(|action| !action.is_empty());

    match action {
        Some(action) if action.starts_with("http") => action.to_string(),
        Some(action) => resolve_href(page_url, action),
        None => page_url.to_string(),
    }
}

fn resolve_href(page_url: &str, href: &str) -> String {
    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|joined| joined.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Extract candidate document links from an intermediate listing page.
///
/// Anchors with a non-empty href are kept unless the href ends in a direct
/// file extension or the resolved link contains a "viewstate"/"validation"
/// token. The suggested name prefers the anchor's visible text.
pub fn extract_candidate_links(document: &Html, page_url: &str) -> Vec<DownloadInfo> {
    let mut out = Vec::new();

    for anchor in document.select(&A_SELECTOR) {
        let href = match anchor.value().attr("href") {
            Some(href) => href.trim().to_lowercase(),
            None => continue,
        };
        if href.is_empty() {
            continue;
        }
        if BINARY_EXTENSIONS.iter().any(|ext| href.ends_with(ext)) {
            continue;
        }

        let link = resolve_href(page_url, &href);
        let lowered = link.to_lowercase();
        if lowered.contains("viewstate") || lowered.contains("validation") {
            continue;
        }

        let text = element_text(anchor);
        let name = if text.len() > MIN_LINK_TEXT_CHARS {
            text.replace(' ', "_")
        } else {
            last_path_segment(&href)
        };

        out.push(DownloadInfo {
            source: link,
            doc_name: Some(name),
        });
    }

    out
}

fn last_path_segment(href: &str) -> String {
    let without_query = href.split('?').next().unwrap_or("");
    without_query
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string()
}

/// Parse the filename out of a Content-Disposition header value. Quotes
/// around the filename are optional.
pub fn filename_from_disposition(disposition: &str) -> Option<String> {
    DISPOSITION_FILENAME
        .captures(disposition)
        .map(|captures| captures[1].trim().to_string())
}
