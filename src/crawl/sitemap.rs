//! Page discovery from `sitemap.xml` / `sitemap_index.xml`.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// Sitemaps tried in order under the seed's origin.
const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml"];

fn loc_pattern() -> &'static Regex {
    static LOC: OnceLock<Regex> = OnceLock::new();
    LOC.get_or_init(|| Regex::new(r"<loc>\s*([^<]+?)\s*</loc>").expect("Invalid regex"))
}

/// `<loc>` values in document order, XML entities decoded.
pub fn extract_locs(xml: &str) -> Vec<String> {
    loc_pattern()
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str().trim()))
        .filter(|loc| !loc.is_empty())
        .collect()
}

pub fn is_sitemap_index(xml: &str) -> bool {
    xml.contains("<sitemapindex")
}

fn is_sitemap(xml: &str) -> bool {
    xml.contains("<urlset") || is_sitemap_index(xml)
}

pub fn same_host(url: &str, seed: &Url) -> bool {
    Url::parse(url)
        .map(|u| u.host_str() == seed.host_str())
        .unwrap_or(false)
}

/// Keep URLs on the seed's host, drop duplicates (first occurrence wins) and clamp.
pub fn select_urls(locs: Vec<String>, seed: &Url, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    locs.into_iter()
        .filter(|u| same_host(u, seed))
        .filter(|u| seen.insert(u.clone()))
        .take(limit)
        .collect()
}

/// Discover page URLs for `seed`. Falls back to the seed alone when no sitemap is found.
pub async fn discover(client: &reqwest::Client, seed: &Url, limit: usize) -> Vec<String> {
    for path in SITEMAP_PATHS {
        let Ok(sitemap_url) = seed.join(path) else {
            continue;
        };
        let Some(xml) = fetch_sitemap(client, sitemap_url.as_str()).await else {
            continue;
        };

        let mut locs = extract_locs(&xml);
        if is_sitemap_index(&xml) {
            locs = expand_index(client, locs, limit).await;
        }

        let urls = select_urls(locs, seed, limit);
        if !urls.is_empty() {
            tracing::info!("Discovered {} URLs from {sitemap_url}", urls.len());
            return urls;
        }
    }

    tracing::warn!("No usable sitemap for {seed}, crawling the seed URL only");
    if limit == 0 {
        return Vec::new();
    }
    vec![seed.to_string()]
}

/// Follow a sitemap index one level down.
async fn expand_index(client: &reqwest::Client, children: Vec<String>, limit: usize) -> Vec<String> {
    let mut locs = Vec::new();
    for child in children {
        if locs.len() >= limit {
            break;
        }
        match fetch_sitemap(client, &child).await {
            Some(xml) if !is_sitemap_index(&xml) => locs.extend(extract_locs(&xml)),
            Some(_) => tracing::debug!("Not following nested sitemap index {child}"),
            None => {}
        }
    }
    locs
}

async fn fetch_sitemap(client: &reqwest::Client, url: &str) -> Option<String> {
    let resp = match client.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!("Failed to fetch {url}: {e}");
            return None;
        }
    };
    if !resp.status().is_success() {
        tracing::debug!("{url} returned {}", resp.status());
        return None;
    }
    let body = resp.text().await.ok()?;
    is_sitemap(&body).then_some(body)
}

fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
