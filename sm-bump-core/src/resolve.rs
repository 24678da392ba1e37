//! Latest-release resolution against the upstream tag registry.
//!
//! Tags such as `FIREFOX_140_12_0esr_RELEASE` do not sort lexicographically by
//! recency (`12` sorts before `3`), so each eligible tag is reduced to a numeric
//! [`SortKey`] and the maximum key wins.

use regex::Regex;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::config::UpstreamConfig;
use crate::contract::UpstreamClient;
use crate::error::SyncError;

/// Numeric version components extracted from a tag, compared component-wise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey(pub Vec<u64>);

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// The selected upstream release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    pub sort_key: SortKey,
    pub tag: String,
    pub changeset: String,
}

/// Derive the sort key of `tag`, or `None` when the tag is outside the convention
/// or its version fragment has a component without leading digits.
///
/// `FIREFOX_140_3_0_1esr_RELEASE` with prefix `FIREFOX_140_` and suffix `_RELEASE`
/// yields `[3, 0, 1]`.
pub fn sort_key(tag: &str, prefix: &str, suffix: &str) -> Option<SortKey> {
    let fragment = tag.strip_prefix(prefix)?.strip_suffix(suffix)?;
    let components = fragment
        .split(['_', '.', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u64>().ok()
        })
        .collect::<Option<Vec<u64>>>()?;
    if components.is_empty() {
        return None;
    }
    Some(SortKey(components))
}

fn tag_matcher(config: &UpstreamConfig) -> Result<Regex, SyncError> {
    let pattern = format!(
        "^{}.*{}$",
        regex::escape(&config.tag_prefix),
        regex::escape(&config.tag_suffix)
    );
    Regex::new(&pattern).map_err(|e| SyncError::Config(format!("invalid tag pattern: {e}")))
}

/// Fetch the tag list once and return the eligible tag with the highest sort key.
pub async fn resolve_latest(
    upstream: &dyn UpstreamClient,
    config: &UpstreamConfig,
) -> Result<ResolvedRelease, SyncError> {
    let matcher = tag_matcher(config)?;
    info!(repo = %config.repo, pattern = %config.tag_pattern(), "[RESOLVE] Fetching upstream tags");
    let tags = upstream.fetch_tags(&config.repo).await?;
    debug!(count = tags.len(), "[RESOLVE] Tag list received");

    let mut best: Option<ResolvedRelease> = None;
    for record in tags.into_iter().filter(|t| matcher.is_match(&t.tag)) {
        let Some(key) = sort_key(&record.tag, &config.tag_prefix, &config.tag_suffix) else {
            warn!(tag = %record.tag, "[RESOLVE] Skipping tag without a numeric version");
            continue;
        };
        let candidate = ResolvedRelease {
            sort_key: key,
            tag: record.tag,
            changeset: record.node,
        };
        // Ties keep the lexicographically greater tag so the result is order-independent.
        let replace = match &best {
            None => true,
            Some(current) => {
                (&candidate.sort_key, &candidate.tag) > (&current.sort_key, &current.tag)
            }
        };
        if replace {
            best = Some(candidate);
        }
    }

    match best {
        Some(release) => {
            info!(
                tag = %release.tag,
                changeset = %release.changeset,
                sort_key = %release.sort_key,
                "[RESOLVE] Selected latest release"
            );
            Ok(release)
        }
        None => {
            error!(repo = %config.repo, pattern = %config.tag_pattern(), "[RESOLVE][ERROR] No matching release tags");
            Err(SyncError::NoMatchingTag {
                repo: config.repo.clone(),
                pattern: config.tag_pattern(),
            })
        }
    }
}
