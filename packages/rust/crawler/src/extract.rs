//! Page extraction: title, description, emails, structural flaws and links.
//!
//! `scraper::Html` is not `Send`, so everything async code needs is copied
//! into a [`PageExtract`] and the document is dropped before returning.

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::urls::resolve_link;

/// A named structural check. Returns `true` when the page has the flaw.
pub type FlawCheck = fn(&Html) -> bool;

/// Fixed checklist evaluated independently on every page.
pub const FLAW_CHECKS: &[(&str, FlawCheck)] = &[
    ("missing-viewport", missing_viewport),
    ("missing-charset", missing_charset),
    ("jquery-without-sri", jquery_without_sri),
];

/// Everything the harvester keeps from one parsed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageExtract {
    pub title: String,
    pub description: String,
    pub emails: Vec<String>,
    pub flaws: Vec<String>,
    /// Resolved page links in encounter order, fragments stripped, deduplicated.
    pub links: Vec<Url>,
}

/// Parse `html` and extract a [`PageExtract`], resolving links against `base`.
pub fn extract_page(html: &str, base: &Url) -> PageExtract {
    let doc = Html::parse_document(html);

    PageExtract {
        title: extract_title(&doc),
        description: extract_description(&doc),
        emails: extract_emails(&doc),
        flaws: detect_flaws(&doc),
        links: extract_links(&doc, base),
    }
}

/// `<title>` text, or `"Untitled"`.
fn extract_title(doc: &Html) -> String {
    let sel = Selector::parse("title").expect("valid selector");
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

fn extract_description(doc: &Html) -> String {
    let sel = Selector::parse(r#"meta[name="description"]"#).expect("valid selector");
    doc.select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .unwrap_or_default()
}

/// `mailto:` addresses in encounter order, deduplicated.
fn extract_emails(doc: &Html) -> Vec<String> {
    let sel = Selector::parse("a[href]").expect("valid selector");
    let mut seen = HashSet::new();
    let mut emails = Vec::new();

    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if !href.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("mailto:")) {
            continue;
        }
        let address = href[7..].split('?').next().unwrap_or("").trim();
        if !address.is_empty() && seen.insert(address.to_string()) {
            emails.push(address.to_string());
        }
    }
    emails
}

fn detect_flaws(doc: &Html) -> Vec<String> {
    FLAW_CHECKS
        .iter()
        .filter(|(_, check)| check(doc))
        .map(|(name, _)| name.to_string())
        .collect()
}

fn extract_links(doc: &Html, base: &Url) -> Vec<Url> {
    let sel = Selector::parse("a[href]").expect("valid selector");
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for el in doc.select(&sel) {
        if let Some(link) = el.value().attr("href").and_then(|h| resolve_link(base, h)) {
            if seen.insert(link.to_string()) {
                links.push(link);
            }
        }
    }
    links
}

fn missing_viewport(doc: &Html) -> bool {
    let sel = Selector::parse(r#"meta[name="viewport"]"#).expect("valid selector");
    doc.select(&sel).next().is_none()
}

fn missing_charset(doc: &Html) -> bool {
    let sel = Selector::parse("meta[charset]").expect("valid selector");
    doc.select(&sel).next().is_none()
}

/// A jQuery script tag loaded without an `integrity` attribute.
fn jquery_without_sri(doc: &Html) -> bool {
    let sel = Selector::parse("script[src]").expect("valid selector");
    doc.select(&sel).any(|el| {
        let src = el.value().attr("src").unwrap_or("");
        src.to_ascii_lowercase().contains("jquery") && el.value().attr("integrity").is_none()
    })
}
