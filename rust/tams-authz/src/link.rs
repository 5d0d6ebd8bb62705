use std::collections::BTreeMap;

/// One entry of a `Link` header: `<url>; param=value; …`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The target URL, without angle brackets
    pub url: String,
    /// Link parameters, with surrounding quotes removed from values
    pub params: BTreeMap<String, String>,
}

impl Link {
    /// The value of the `rel` parameter, if any
    pub fn rel(&self) -> Option<&str> {
        self.params.get("rel").map(String::as_str)
    }
}

/// Parse a `Link` header value into its entries.
///
/// Parameters without a `=` are ignored, as are entries with an empty URL.
pub fn parse_link_header(header: &str) -> Vec<Link> {
    header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let url = parts
                .next()?
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string();

            if url.is_empty() {
                return None;
            }

            let params = parts
                .filter_map(|param| {
                    let (name, value) = param.trim().split_once('=')?;
                    Some((name.trim().to_string(), unquote(value.trim()).to_string()))
                })
                .collect();

            Some(Link { url, params })
        })
        .collect()
}

/// The URL of the first entry whose `rel` is `next`
pub fn next_link(header: &str) -> Option<String> {
    parse_link_header(header)
        .into_iter()
        .find(|link| link.rel() == Some("next"))
        .map(|link| link.url)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .unwrap_or(value)
}
