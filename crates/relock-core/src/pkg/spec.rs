//! Lockfile descriptor parsing.
//!
//! Yarn lockfiles key their entries by descriptors:
//! - `react@^18.0.0`
//! - `@types/node@^20`
//! - `string-width-cjs@npm:string-width@^4.2.0`
//! - `"@babel/core@^7.0.0", "@babel/core@^7.12.3"` (comma-joined list)

use super::error::LockError;

/// A parsed `name@range` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Scope without the @ prefix, if scoped.
    pub scope: Option<String>,
    /// Everything after the name's `@`. May itself contain `@`.
    pub range: String,
}

impl Descriptor {
    /// Parse a descriptor. The range may be empty (`foo@`), the name may not.
    ///
    /// # Errors
    /// Returns `InvalidLockfile` if the descriptor has no name or no `@`.
    pub fn parse(input: &str) -> Result<Self, LockError> {
        let input = input.trim().trim_matches('"');

        let Some(at_pos) = name_end(input) else {
            return Err(invalid(input, "missing '@' between name and range"));
        };

        let name = &input[..at_pos];
        let range = &input[at_pos + 1..];
        Self::validate_name(name).map_err(|msg| invalid(input, &msg))?;

        let scope = name
            .strip_prefix('@')
            .and_then(|rest| rest.split_once('/'))
            .map(|(scope, _)| scope.to_string());

        Ok(Self {
            name: name.to_string(),
            scope,
            range: range.to_string(),
        })
    }

    /// Parse a comma-joined descriptor list as used in yarn entry keys.
    ///
    /// # Errors
    /// Returns the first descriptor error.
    pub fn parse_list(input: &str) -> Result<Vec<Self>, LockError> {
        input
            .split(", ")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }

    fn validate_name(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err("empty package name".to_string());
        }

        let bare = match name.strip_prefix('@') {
            Some(rest) => match rest.split_once('/') {
                Some((scope, pkg)) if !scope.is_empty() && !pkg.is_empty() => pkg,
                _ => return Err(format!("invalid scoped name '{name}'")),
            },
            None => name,
        };

        for c in bare.chars() {
            if !c.is_alphanumeric() && !matches!(c, '-' | '_' | '.' | '~' | '!' | '*' | '\'' | '(' | ')') {
                return Err(format!("invalid character '{c}' in package name '{name}'"));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.scope.is_some()
    }

    /// Get the unscoped portion of the name.
    ///
    /// For `@scope/name`, returns `name`.
    #[must_use]
    pub fn unscoped_name(&self) -> &str {
        unscoped_name(&self.name)
    }

    /// Format back to `name@range`.
    #[must_use]
    pub fn to_key(&self) -> String {
        format!("{}@{}", self.name, self.range)
    }
}

/// Byte offset of the `@` separating name from range.
///
/// Scoped names start with `@`, so the search starts at index 1.
#[must_use]
pub fn name_end(input: &str) -> Option<usize> {
    input.get(1..)?.find('@').map(|pos| pos + 1)
}

/// For `@scope/name`, returns `name`; otherwise the input.
#[must_use]
pub fn unscoped_name(name: &str) -> &str {
    if name.starts_with('@') {
        name.split_once('/').map_or(name, |(_, pkg)| pkg)
    } else {
        name
    }
}

fn invalid(input: &str, msg: &str) -> LockError {
    LockError::invalid_lockfile("yarn", format!("bad descriptor '{input}': {msg}"))
}
