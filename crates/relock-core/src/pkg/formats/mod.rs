//! Lockfile dialects.
//!
//! Each dialect module reads its text into a [`Snapshot`] and writes a
//! snapshot back out. Readers of hoisted dialects (npm) go through
//! [`invert`](crate::pkg::hoist::invert); every writer runs the resolver
//! first, so an inconsistent snapshot never produces output.

mod npm1;
mod npm2;
mod npm3;
mod yarn_berry;
mod yarn_classic;

use super::error::LockError;
use super::graph::resolve_all;
use super::hoist::project;
use super::observe::GraphObserver;
use super::reference::{parse_reference, Protocol};
use super::snapshot::{Manifest, PackageRecord, Snapshot, Source};
use super::tarball::{format_tarball_url, parse_tarball_url, TarballUrl};
use crate::config::{FormatOptions, NPM_REGISTRY, YARN_REGISTRY};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A supported lockfile dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    #[serde(rename = "npm-1")]
    Npm1,
    #[serde(rename = "npm-2")]
    Npm2,
    #[serde(rename = "npm-3")]
    Npm3,
    #[serde(rename = "yarn-classic")]
    YarnClassic,
    #[serde(rename = "yarn-berry")]
    YarnBerry,
}

impl Format {
    pub const ALL: [Self; 5] = [
        Self::Npm1,
        Self::Npm2,
        Self::Npm3,
        Self::YarnClassic,
        Self::YarnBerry,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm1 => "npm-1",
            Self::Npm2 => "npm-2",
            Self::Npm3 => "npm-3",
            Self::YarnClassic => "yarn-classic",
            Self::YarnBerry => "yarn-berry",
        }
    }

    /// Guess the dialect of a lockfile from its text.
    #[must_use]
    pub fn detect(text: &str) -> Option<Self> {
        match npm_lockfile_version(text) {
            Some(1) => return Some(Self::Npm1),
            Some(2) => return Some(Self::Npm2),
            Some(3) => return Some(Self::Npm3),
            _ => {}
        }
        if text.contains("# yarn lockfile v1") {
            return Some(Self::YarnClassic);
        }
        if text.contains("\n__metadata:\n  version:") || text.starts_with("__metadata:\n  version:") {
            return Some(Self::YarnBerry);
        }
        None
    }

    /// Dialects whose lockfile does not carry the root manifest.
    #[must_use]
    pub fn requires_manifest(self) -> bool {
        matches!(self, Self::Npm1 | Self::YarnClassic)
    }

    /// Dialects that store a hoisted `node_modules` layout.
    #[must_use]
    pub fn is_hoisted(self) -> bool {
        matches!(self, Self::Npm1 | Self::Npm2 | Self::Npm3)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = LockError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "npm-1" => Ok(Self::Npm1),
            "npm-2" => Ok(Self::Npm2),
            "npm-3" => Ok(Self::Npm3),
            "yarn-classic" | "yarn-1" => Ok(Self::YarnClassic),
            "yarn-berry" | "yarn-5" | "yarn-6" => Ok(Self::YarnBerry),
            other => Err(LockError::UnsupportedFormat {
                hint: other.to_string(),
            }),
        }
    }
}

fn npm_lockfile_version(text: &str) -> Option<u32> {
    let at = text.find("\"lockfileVersion\"")?;
    let rest = text[at + "\"lockfileVersion\"".len()..].trim_start();
    let rest = rest.strip_prefix(':')?.trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Read `text` as `format`.
pub(crate) fn parse(format: Format, text: &str, manifest: Option<&Manifest>) -> Result<Snapshot> {
    if format.requires_manifest() && manifest.is_none() {
        return Err(LockError::invalid_manifest(format!(
            "{format} lockfiles need the project's package.json"
        ))
        .into());
    }

    match format {
        Format::Npm1 => npm1::parse(text, manifest),
        Format::Npm2 => npm2::parse(text, manifest),
        Format::Npm3 => npm3::parse(text, manifest),
        Format::YarnClassic => yarn_classic::parse(text, manifest),
        Format::YarnBerry => yarn_berry::parse(text, manifest),
    }
}

/// Write `snapshot` as `format`.
pub(crate) fn format(
    format: Format,
    snapshot: &Snapshot,
    opts: &FormatOptions,
    observer: &dyn GraphObserver,
) -> Result<String> {
    let resolution = resolve_all(snapshot, observer)?;

    if format.is_hoisted() {
        let placement = project(snapshot, &resolution, observer)?;
        return match format {
            Format::Npm1 => npm1::format(snapshot, &placement, opts),
            Format::Npm2 => npm2::format(snapshot, &placement, opts),
            _ => npm3::format(snapshot, &placement, opts),
        };
    }

    match format {
        Format::YarnBerry => yarn_berry::format(snapshot, &resolution, opts),
        _ => yarn_classic::format(snapshot, &resolution, opts),
    }
}

/// Dialect spelling of `resolved` URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolvedStyle {
    /// GitHub as `github:owner/repo#sha`.
    Npm1,
    /// GitHub as `git+ssh://git@github.com/owner/repo.git#sha`.
    Npm3,
    /// GitHub as `https://codeload.github.com/owner/repo/tar.gz/sha`,
    /// tarball URLs keep their `#sha1` fragment.
    YarnClassic,
}

const GITHUB: &str = "github.com";
const CODELOAD: &str = "https://codeload.github.com/";

fn is_default_registry(registry: &str) -> bool {
    let registry = registry.trim_end_matches('/');
    registry == NPM_REGISTRY || registry == YARN_REGISTRY
}

/// Source of a record installed as `name` from a registry tarball.
pub(crate) fn tarball_source(name: &str, tarball: TarballUrl) -> Source {
    let registry = (!is_default_registry(&tarball.registry)).then_some(tarball.registry);
    if tarball.name == name {
        Source::Registry {
            registry,
            hash: tarball.hash,
        }
    } else {
        Source::Alias {
            target: tarball.name,
            registry,
            hash: tarball.hash,
        }
    }
}

/// Classify a `resolved` field as npm and yarn-classic write it.
pub(crate) fn source_from_resolved(name: &str, resolved: Option<&str>) -> std::result::Result<Source, LockError> {
    let Some(resolved) = resolved.filter(|r| !r.is_empty()) else {
        return Ok(Source::registry());
    };

    if let Some(rest) = resolved.strip_prefix(CODELOAD) {
        let (repo, commit) = rest
            .rsplit_once("/tar.gz/")
            .ok_or_else(|| LockError::unsupported_resolution(resolved))?;
        return Ok(Source::Vcs {
            host: Some(GITHUB.to_string()),
            repo: repo.to_string(),
            commit: commit.to_string(),
        });
    }

    if let Some(tarball) = parse_tarball_url(resolved) {
        return Ok(tarball_source(name, tarball));
    }

    let reference = parse_reference(resolved);
    match reference.protocol {
        Protocol::Git | Protocol::Github => {
            let repo = reference
                .target
                .ok_or_else(|| LockError::unsupported_resolution(resolved))?;
            Ok(Source::Vcs {
                host: Some(reference.host.unwrap_or_else(|| GITHUB.to_string())),
                repo,
                commit: reference.id,
            })
        }
        Protocol::Tarball => Ok(Source::Tarball {
            url: resolved.to_string(),
        }),
        Protocol::File | Protocol::Link | Protocol::Portal | Protocol::Workspace => Ok(Source::Local {
            protocol: reference.protocol,
            path: reference.id,
        }),
        _ => Err(LockError::unsupported_resolution(resolved)),
    }
}

/// `resolved` URL of a record, `None` for local and patch sources.
pub(crate) fn format_resolved(record: &PackageRecord, registry: &str, style: ResolvedStyle) -> Option<String> {
    match &record.source {
        Source::Registry { registry: own, hash } => {
            let url = format_tarball_url(&record.name, &record.version, own.as_deref().unwrap_or(registry));
            Some(with_fragment(url, hash.as_deref(), style))
        }
        Source::Alias {
            target,
            registry: own,
            hash,
        } => {
            let url = format_tarball_url(target, &record.version, own.as_deref().unwrap_or(registry));
            Some(with_fragment(url, hash.as_deref(), style))
        }
        Source::Vcs { host, repo, commit } => {
            let host = host.as_deref().unwrap_or(GITHUB);
            Some(match style {
                ResolvedStyle::Npm1 if host == GITHUB => format!("github:{repo}#{commit}"),
                ResolvedStyle::YarnClassic if host == GITHUB => format!("{CODELOAD}{repo}/tar.gz/{commit}"),
                _ => format!("git+ssh://git@{host}/{repo}.git#{commit}"),
            })
        }
        Source::Tarball { url } => Some(url.clone()),
        Source::Local { .. } | Source::Patch { .. } => None,
    }
}

fn with_fragment(url: String, hash: Option<&str>, style: ResolvedStyle) -> String {
    match hash {
        Some(hash) if style == ResolvedStyle::YarnClassic => format!("{url}#{hash}"),
        _ => url,
    }
}

/// SRI integrity string: algorithm-tagged digests only.
pub(crate) fn sri_integrity(record: &PackageRecord) -> Option<String> {
    let mut hashes = record.hashes.clone();
    hashes.remove("checksum");
    super::integrity::format_integrity(&hashes)
}
