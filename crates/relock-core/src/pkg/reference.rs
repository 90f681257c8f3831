//! Dependency declaration parsing.
//!
//! Classifies the right-hand side of a `dependencies` entry:
//! - `^1.2.3`, `1.x`, `*` → semver
//! - `latest` → tag
//! - `npm:1.0.0`, `npm:other@^2` → npm (alias when a target name is present)
//! - `workspace:*` → workspace
//! - `git+ssh://...#sha`, `git@host:owner/repo.git` → git
//! - `github:owner/repo#sha`, `owner/repo` → github
//! - `https://host/x.tgz` → tarball
//! - `file:`, `link:`, `portal:`, `patch:` → local pointers

use super::spec::name_end;
use super::version::{coerce, is_range};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declaration protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Semver,
    Tag,
    Npm,
    Workspace,
    Git,
    Github,
    Tarball,
    File,
    Link,
    Portal,
    Patch,
}

impl Protocol {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semver => "semver",
            Self::Tag => "tag",
            Self::Npm => "npm",
            Self::Workspace => "workspace",
            Self::Git => "git",
            Self::Github => "github",
            Self::Tarball => "tarball",
            Self::File => "file",
            Self::Link => "link",
            Self::Portal => "portal",
            Self::Patch => "patch",
        }
    }

    /// Local pointers resolve to a directory, not to a registry package.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Workspace | Self::File | Self::Link | Self::Portal)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub protocol: Protocol,
    /// The declaration as written.
    pub raw: String,
    /// Inner identifier: the range, tag, commit, or path.
    pub id: String,
    /// Aliased package name (npm) or `owner/repo` (git, github).
    pub target: Option<String>,
    /// VCS host, when the declaration names one.
    pub host: Option<String>,
}

impl Reference {
    fn new(protocol: Protocol, raw: &str, id: &str) -> Self {
        Self {
            protocol,
            raw: raw.to_string(),
            id: id.to_string(),
            target: None,
            host: None,
        }
    }

    /// True for `npm:<name>@<range>`.
    #[must_use]
    pub fn is_alias(&self) -> bool {
        self.protocol == Protocol::Npm && self.target.is_some()
    }
}

/// Classify a raw declaration.
#[must_use]
pub fn parse_reference(raw: &str) -> Reference {
    let trimmed = raw.trim();

    for (prefix, protocol) in [
        ("workspace:", Protocol::Workspace),
        ("file:", Protocol::File),
        ("link:", Protocol::Link),
        ("portal:", Protocol::Portal),
        ("patch:", Protocol::Patch),
        ("semver:", Protocol::Semver),
        ("tag:", Protocol::Tag),
    ] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return Reference::new(protocol, raw, rest);
        }
    }

    if let Some(rest) = trimmed.strip_prefix("npm:") {
        let mut r = Reference::new(Protocol::Npm, raw, rest);
        if let Some(at) = name_end(rest) {
            r.target = Some(rest[..at].to_string());
            r.id = rest[at + 1..].to_string();
        }
        return r;
    }

    if let Some(rest) = trimmed.strip_prefix("github:") {
        return shorthand(Protocol::Github, raw, rest);
    }

    if is_git_url(trimmed) {
        return parse_git(raw, trimmed);
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Reference::new(Protocol::Tarball, raw, trimmed);
    }

    if is_range(trimmed) {
        return Reference::new(Protocol::Semver, raw, trimmed);
    }

    if is_path(trimmed) {
        return Reference::new(Protocol::File, raw, trimmed);
    }

    if is_github_shorthand(trimmed) {
        return shorthand(Protocol::Github, raw, trimmed);
    }

    Reference::new(Protocol::Tag, raw, trimmed)
}

/// Normalize a declaration to yarn-berry's descriptor form.
///
/// Plain ranges get `semver:`, tags get `tag:`, github shorthands get
/// `github:`, scp-style git urls get `git:`. Everything already carrying a
/// protocol passes through.
#[must_use]
pub fn normalize_reference(raw: &str) -> String {
    let r = parse_reference(raw);
    let has_prefix = |p: &str| raw.starts_with(p);

    match r.protocol {
        Protocol::Semver if !has_prefix("semver:") => format!("semver:{raw}"),
        Protocol::Tag if !has_prefix("tag:") => format!("tag:{raw}"),
        Protocol::Github if !has_prefix("github:") => format!("github:{raw}"),
        Protocol::Git if raw.starts_with("git@") => format!("git:{raw}"),
        _ => raw.to_string(),
    }
}

/// Strip normalization prefixes and the plain `npm:` registry marker.
///
/// Two declarations with equal canonical forms denote the same target.
/// An alias (`npm:other@^1`) keeps its prefix, so it is never equivalent to
/// the plain `^1`.
#[must_use]
pub fn canonical_range(raw: &str) -> &str {
    for prefix in ["semver:", "tag:", "git:"] {
        if let Some(rest) = raw.strip_prefix(prefix) {
            return rest;
        }
    }
    if let Some(rest) = raw.strip_prefix("npm:") {
        if name_end(rest).is_none() {
            return rest;
        }
    }
    raw
}

/// Protocol-aware equivalence of two declarations.
#[must_use]
pub fn ranges_equivalent(a: &str, b: &str) -> bool {
    a == b || canonical_range(a) == canonical_range(b)
}

/// How [`map_reference`] derives the new version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapStrategy {
    /// Keep the `^`/`~` prefix of the current declaration.
    Inherit,
    /// Exact version.
    Pin,
    /// Use this literal instead of a version.
    Literal(String),
}

impl FromStr for MapStrategy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "inherit" => Self::Inherit,
            "pin" => Self::Pin,
            other => Self::Literal(other.to_string()),
        })
    }
}

/// Rewrite a declaration to another protocol.
///
/// `target` is `Semver`, `Npm` or `Workspace`. Same-protocol declarations
/// are returned untouched; declarations without a recoverable version
/// become `<prefix>*`.
#[must_use]
pub fn map_reference(current: &str, target: Protocol, strategy: &MapStrategy) -> String {
    let r = parse_reference(current);
    let prefix = if target == Protocol::Semver {
        String::new()
    } else {
        format!("{target}:")
    };

    if r.protocol == target {
        return current.to_string();
    }

    let Some(version) = coerce(&r.id) else {
        return format!("{prefix}*");
    };

    let caret = match r.id.chars().next() {
        Some(c @ ('^' | '~')) => c.to_string(),
        _ => String::new(),
    };

    match strategy {
        MapStrategy::Inherit => format!("{prefix}{caret}{version}"),
        MapStrategy::Pin => format!("{prefix}{version}"),
        MapStrategy::Literal(s) => format!("{prefix}{s}"),
    }
}

fn shorthand(protocol: Protocol, raw: &str, rest: &str) -> Reference {
    let (repo, id) = rest.split_once('#').unwrap_or((rest, ""));
    let mut r = Reference::new(protocol, raw, id);
    r.target = Some(repo.to_string());
    r
}

fn is_git_url(s: &str) -> bool {
    s.starts_with("git+")
        || s.starts_with("git://")
        || s.starts_with("git@")
        || s.starts_with("git:")
        || ((s.starts_with("https://") || s.starts_with("http://") || s.starts_with("ssh://"))
            && s.split('#').next().is_some_and(|u| u.ends_with(".git")))
}

fn parse_git(raw: &str, s: &str) -> Reference {
    let s = s.strip_prefix("git:").filter(|r| !r.starts_with("//")).unwrap_or(s);
    let (url, fragment) = s.split_once('#').unwrap_or((s, ""));
    let id = fragment.strip_prefix("commit=").unwrap_or(fragment);

    let mut r = Reference::new(Protocol::Git, raw, id);

    // Drop scheme and credentials: git+ssh://git@github.com:owner/repo.git
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let rest = rest.split_once('@').map_or(rest, |(_, rest)| rest);
    if let Some(sep) = rest.find([':', '/']) {
        let host = &rest[..sep];
        let path = rest[sep + 1..].trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        if !host.is_empty() {
            r.host = Some(host.to_string());
        }
        if !path.is_empty() {
            r.target = Some(path.to_string());
        }
    }
    r
}

fn is_path(s: &str) -> bool {
    s.starts_with("./") || s.starts_with("../") || s.starts_with('/') || s.starts_with("~/")
}

fn is_github_shorthand(s: &str) -> bool {
    let repo = s.split('#').next().unwrap_or(s);
    let Some((owner, name)) = repo.split_once('/') else {
        return false;
    };
    !owner.is_empty()
        && !name.is_empty()
        && !owner.starts_with('@')
        && !name.contains('/')
        && !repo.contains(':')
}
