//! URL canonicalization and cross-provider citation deduplication.
//!
//! The normalized URL is a best-effort canonical key: a pure function of
//! the input url, independent of provider or ordering. Two inputs that
//! differ only in scheme, a leading `www.`, trailing slashes, or the
//! enumerated tracking parameters normalize identically. Retained query
//! parameters keep their encountered order; re-sorting them would change
//! keys under previously written `sources.json` files.

use std::collections::HashMap;

use crate::types::{Citation, DedupedSource};

/// Query parameters stripped during normalization.
pub const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "ref",
    "fbclid",
    "gclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
];

/// Canonicalize a URL into the key used to bucket citations.
///
/// Parses the URL, lowercases the host, strips a leading `www.`, removes
/// tracking parameters, and rebuilds as
/// `host[:port] + path [+ "?" retained-query] [+ "#" fragment]` with
/// trailing slashes stripped. Unparseable input falls back to
/// lowercase + trailing-slash strip.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(parsed) = url::Url::parse(trimmed) else {
        return trimmed.to_lowercase().trim_end_matches('/').to_string();
    };

    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut out = String::with_capacity(trimmed.len());
    out.push_str(host);
    if let Some(port) = parsed.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(parsed.path().trim_end_matches('/'));

    if let Some(query) = parsed.query() {
        let retained: Vec<&str> = query
            .split('&')
            .filter(|segment| !segment.is_empty())
            .filter(|segment| {
                let key = segment.split('=').next().unwrap_or(segment);
                !TRACKING_PARAMS.contains(&key)
            })
            .collect();
        if !retained.is_empty() {
            out.push('?');
            out.push_str(&retained.join("&"));
        }
    }

    if let Some(fragment) = parsed.fragment() {
        if !fragment.is_empty() {
            out.push('#');
            out.push_str(fragment);
        }
    }

    out.trim_end_matches('/').to_string()
}

/// Bucket citations by normalized URL and rank by citation count.
///
/// Citations with an empty url are dropped. For each bucket:
/// `citation_count` is the bucket size (duplicates from one provider count
/// each time they appear), `providers` lists distinct provider ids in
/// first-seen order, `title` is the first non-empty title, and `url` is
/// the first original url. The result is sorted by `citation_count`
/// descending; ties keep first-seen order (stable sort).
#[must_use]
pub fn dedup_citations(citations: &[Citation]) -> Vec<DedupedSource> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, DedupedSource> = HashMap::new();

    for citation in citations.iter().filter(|c| !c.url.is_empty()) {
        let key = normalize_url(&citation.url);
        if let Some(bucket) = buckets.get_mut(&key) {
            bucket.citation_count += 1;
            if bucket.title.is_none() {
                bucket.title = citation.title.clone().filter(|t| !t.is_empty());
            }
            if !bucket.providers.contains(&citation.provider) {
                bucket.providers.push(citation.provider.clone());
            }
        } else {
            order.push(key.clone());
            let _ = buckets.insert(
                key.clone(),
                DedupedSource {
                    url: citation.url.clone(),
                    normalized_url: key,
                    title: citation.title.clone().filter(|t| !t.is_empty()),
                    providers: vec![citation.provider.clone()],
                    citation_count: 1,
                },
            );
        }
    }

    let mut sources: Vec<DedupedSource> = order
        .iter()
        .filter_map(|key| buckets.remove(key))
        .collect();
    // Vec::sort_by is stable, preserving first-seen order within equal counts
    sources.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
    sources
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
