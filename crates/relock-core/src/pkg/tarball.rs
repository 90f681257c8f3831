//! Registry tarball URLs.
//!
//! `{registry}/{name}/-/{unscoped-name}-{version}.tgz[#hash]`

/// A parsed registry tarball URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarballUrl {
    pub registry: String,
    pub name: String,
    pub version: String,
    /// Fragment after `#`, yarn-classic appends the sha1 there.
    pub hash: Option<String>,
}

/// Build a tarball URL.
#[must_use]
pub fn format_tarball_url(name: &str, version: &str, registry: &str) -> String {
    let unscoped = name.rsplit('/').next().unwrap_or(name);
    format!(
        "{}/{name}/-/{unscoped}-{version}.tgz",
        registry.trim_end_matches('/')
    )
}

/// Parse a tarball URL. Returns `None` for anything that is not shaped like
/// a registry tarball.
#[must_use]
pub fn parse_tarball_url(url: &str) -> Option<TarballUrl> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return None;
    }

    let (url, hash) = match url.split_once('#') {
        Some((u, h)) => (u, Some(h.to_string())),
        None => (url, None),
    };

    let (prefix, file) = url.rsplit_once("/-/")?;
    let file = file.strip_suffix(".tgz")?;

    // prefix = {registry}/{name} where name may be scoped (@scope/name)
    let (registry, name) = match prefix.rsplit_once('/') {
        Some((head, last)) => match head.rsplit_once('/') {
            Some((registry, scope)) if scope.starts_with('@') => {
                (registry, format!("{scope}/{last}"))
            }
            _ => (head, last.to_string()),
        },
        None => return None,
    };

    let unscoped = name.rsplit('/').next().unwrap_or(&name);
    let version = file.strip_prefix(unscoped)?.strip_prefix('-')?;
    if version.is_empty() || registry.ends_with(':') || registry.ends_with(":/") {
        return None;
    }

    Some(TarballUrl {
        registry: registry.to_string(),
        name,
        version: version.to_string(),
        hash,
    })
}
