//! Link resolution: pull the drive file id out of a sharing URL.
//!
//! Pure string analysis, no network. Sharing links come in several shapes
//! (`open?id=…`, `file/d/…/view`, `uc?export=download&id=…`), and a single
//! link can match more than one rule, so the rules are tried in a fixed
//! order and the first hit wins.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Stable identifier of a remote file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Id extraction rules, most specific first.
static ID_RULES: Lazy<[(&str, Regex); 3]> = Lazy::new(|| {
    [
        ("query", Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").unwrap()),
        ("path", Regex::new(r"/d/([A-Za-z0-9_-]+)").unwrap()),
        ("file-path", Regex::new(r"file/d/([A-Za-z0-9_-]+)").unwrap()),
    ]
});

/// Extract the resource id from `link`, or `None` if the link is not a
/// drive link or carries no id.
///
/// `host` is compared against the link's host, case-insensitively. Links
/// pasted without a scheme are accepted.
pub fn resolve_link(link: &str, host: &str) -> Option<ResourceId> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }

    let parsed = if link.contains("://") {
        url::Url::parse(link)
    } else {
        url::Url::parse(&format!("https://{link}"))
    }
    .ok()?;

    if !parsed
        .host_str()
        .is_some_and(|h| h.eq_ignore_ascii_case(host))
    {
        return None;
    }

    ID_RULES.iter().find_map(|(_, re)| {
        re.captures(link)
            .map(|caps| ResourceId(caps[1].to_string()))
    })
}
