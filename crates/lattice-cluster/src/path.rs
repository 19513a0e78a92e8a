// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hierarchical, context-scoped, wildcard-aware addresses.
//!
//! A [`Path`] is an optional context string (a cluster/node scope, usually a
//! serialized `NodeId`, or the wildcard `*`) plus an ordered sequence of
//! non-empty components. At most one component may be the wildcard `*`; its
//! index becomes the path's *max compare index*, truncating every comparison
//! and match to the components before it.
//!
//! String form is bit-exact: `<context>://<c1>/<c2>/...`; a path without
//! context omits the `://` and renders as `/<c1>/<c2>`. The context literal
//! `?` forces a null context on parse.
//!
//! Paths are values: every transformation returns a new instance.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Separator between the context and the components. Literal value `://`.
pub const CONTEXT_SEPARATOR: &str = "://";

/// Separator between components. Literal value `/`.
pub const PATH_SEPARATOR: &str = "/";

/// Separator used by [`Path::append_extension`]. Literal value `.`.
pub const EXTENSION_SEPARATOR: &str = ".";

/// The wildcard component and wildcard context. Literal value `*`.
pub const WILDCARD: &str = "*";

/// Context literal that forces a null context on parse. Literal value `?`.
pub const NULL_CONTEXT: &str = "?";

/// Errors raised when constructing or combining paths.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum PathError {
    /// A component was empty or contained a separator.
    #[error("invalid path component '{0}'")]
    InvalidComponent(String),

    /// More than one component was the wildcard.
    #[error("path may contain at most one wildcard component")]
    MultipleWildcards,

    /// The context half of a path string was empty or contained a separator.
    #[error("malformed context in path '{0}'")]
    MalformedContext(String),

    /// Two paths with different contexts were appended.
    #[error("context mismatch: '{left}' != '{right}'")]
    ContextMismatch {
        /// Context of the left-hand path.
        left: String,
        /// Context of the right-hand path.
        right: String,
    },
}

/// A hierarchical cluster address.
///
/// Used as the directory key mapping to resources and as the channel key for
/// event observation. See the module docs for the wildcard and context rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    context: Option<String>,
    components: Vec<String>,
    max_compare_index: usize,
    wildcard: bool,
}

impl Path {
    /// The root path: no context, no components.
    pub fn root() -> Self {
        Self {
            context: None,
            components: Vec::new(),
            max_compare_index: 0,
            wildcard: false,
        }
    }

    /// Builds a path from components with no context.
    pub fn from_components<I, S>(components: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_context_and_components(None::<String>, components)
    }

    /// Builds a path from an optional context plus components.
    ///
    /// Components must be non-empty and must not contain the path separator.
    /// At most one component may be the wildcard.
    pub fn from_context_and_components<I, S>(
        context: Option<impl Into<String>>,
        components: I,
    ) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let context = match context.map(Into::into) {
            Some(c) if c.is_empty() => return Err(PathError::MalformedContext(c)),
            Some(c) if c.contains(PATH_SEPARATOR) => return Err(PathError::MalformedContext(c)),
            other => other,
        };

        let components: Vec<String> = components.into_iter().map(Into::into).collect();

        let mut wildcard_index = None;

        for (index, component) in components.iter().enumerate() {
            if component.is_empty() || component.contains(PATH_SEPARATOR) {
                return Err(PathError::InvalidComponent(component.clone()));
            }
            if component == WILDCARD {
                if wildcard_index.is_some() {
                    return Err(PathError::MultipleWildcards);
                }
                wildcard_index = Some(index);
            }
        }

        let wildcard = wildcard_index.is_some();
        let max_compare_index = wildcard_index.unwrap_or(components.len());

        Ok(Self {
            context,
            components,
            max_compare_index,
            wildcard,
        })
    }

    /// Parses the bit-exact string form.
    ///
    /// `app://rooms/1` is context `app`, components `[rooms, 1]`.
    /// `/rooms/1` and `rooms/1` are the same context-free path. A context of
    /// `?` parses to no context.
    pub fn from_path_string(path: &str) -> Result<Self, PathError> {
        let (context, remainder) = match path.find(CONTEXT_SEPARATOR) {
            None => (None, path),
            Some(at) => {
                let context = path[..at].trim();
                let remainder = &path[at + CONTEXT_SEPARATOR.len()..];
                if context.is_empty() || remainder.contains(CONTEXT_SEPARATOR) {
                    return Err(PathError::MalformedContext(path.to_string()));
                }
                if context == NULL_CONTEXT {
                    (None, remainder)
                } else {
                    (Some(context.to_string()), remainder)
                }
            }
        };

        let components = remainder
            .split(PATH_SEPARATOR)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Self::from_context_and_components(context, components)
    }

    /// The context, if any.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// True if this path has a context.
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// True if the context is the wildcard context.
    pub fn is_wildcard_context(&self) -> bool {
        self.context.as_deref() == Some(WILDCARD)
    }

    /// The ordered components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// True if this path has no components.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// True if one component is the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// True if the wildcard is the final component.
    pub fn is_wildcard_terminated(&self) -> bool {
        self.wildcard && self.max_compare_index == self.components.len() - 1
    }

    /// The number of components considered by comparisons and matches.
    ///
    /// Equal to the wildcard's index for wildcard paths, or the component
    /// count otherwise.
    pub fn max_compare_index(&self) -> usize {
        self.max_compare_index
    }

    /// Wildcard-aware comparison.
    ///
    /// If either path is a wildcard, only the components before the smaller
    /// max compare index participate, lexicographically and short-circuiting
    /// on the first difference; an equal prefix compares equal. If neither is
    /// a wildcard, a differing component count is itself the result, else
    /// components compare pairwise.
    ///
    /// This is not a total order over wildcard paths; it exists to drive
    /// [`Path::matches`]. The context does not participate.
    pub fn compare(&self, other: &Path) -> Ordering {
        if self.wildcard || other.wildcard {
            let limit = self.max_compare_index.min(other.max_compare_index);
            for (l, r) in self
                .components
                .iter()
                .zip(other.components.iter())
                .take(limit)
            {
                match l.cmp(r) {
                    Ordering::Equal => continue,
                    unequal => return unequal,
                }
            }
            Ordering::Equal
        } else {
            match self.components.len().cmp(&other.components.len()) {
                Ordering::Equal => self.components.cmp(&other.components),
                unequal => unequal,
            }
        }
    }

    /// True if this path matches the other, honoring wildcards.
    ///
    /// Contexts match when equal or when either side carries the wildcard
    /// context. A non-wildcard path must reach at least the wildcard's
    /// compare index: the root never matches `a/*`, only another root or a
    /// wildcard at index zero. Absolute equality is [`PartialEq`]; matching
    /// is looser.
    pub fn matches(&self, other: &Path) -> bool {
        let contexts_match = self.is_wildcard_context()
            || other.is_wildcard_context()
            || self.context == other.context;

        let reaches_wildcard = match (self.wildcard, other.wildcard) {
            (true, false) => other.components.len() >= self.max_compare_index,
            (false, true) => self.components.len() >= other.max_compare_index,
            _ => true,
        };

        contexts_match && reaches_wildcard && self.compare(other) == Ordering::Equal
    }

    /// Appends another path's components onto this one.
    ///
    /// Both paths carrying different contexts is an error; otherwise the
    /// surviving context is this path's, or the other's if this has none.
    pub fn append(&self, other: &Path) -> Result<Path, PathError> {
        let context = match (&self.context, &other.context) {
            (Some(l), Some(r)) if l != r => {
                return Err(PathError::ContextMismatch {
                    left: l.clone(),
                    right: r.clone(),
                });
            }
            (Some(l), _) => Some(l.clone()),
            (None, r) => r.clone(),
        };

        let components = self
            .components
            .iter()
            .chain(other.components.iter())
            .cloned();

        Self::from_context_and_components(context, components)
    }

    /// Appends the given components, preserving the context.
    pub fn append_components<I, S>(&self, components: I) -> Result<Path, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let combined = self
            .components
            .iter()
            .cloned()
            .chain(components.into_iter().map(Into::into));
        Self::from_context_and_components(self.context.clone(), combined)
    }

    /// Appends an extension to the final component, preserving the context.
    ///
    /// The root path has no component to extend and is returned unchanged.
    pub fn append_extension(&self, extension: &str) -> Result<Path, PathError> {
        if self.components.is_empty() {
            return Ok(self.clone());
        }

        let mut components = self.components.clone();
        let last = components
            .pop()
            .map(|c| format!("{c}{EXTENSION_SEPARATOR}{extension}"))
            .unwrap_or_default();
        components.push(last);

        Self::from_context_and_components(self.context.clone(), components)
    }

    /// The parent path, preserving the context. The root is its own parent.
    pub fn parent(&self) -> Path {
        if self.components.is_empty() {
            return self.clone();
        }

        let components = self.components[..self.components.len() - 1].to_vec();
        let max_compare_index = if self.wildcard && self.max_compare_index < components.len() {
            self.max_compare_index
        } else {
            components.len()
        };

        Path {
            context: self.context.clone(),
            wildcard: self.wildcard && self.max_compare_index < components.len(),
            max_compare_index,
            components,
        }
    }

    /// Strips the wildcard and everything after it.
    ///
    /// A non-wildcard path is returned unchanged.
    pub fn strip_wildcard(&self) -> Path {
        if !self.wildcard {
            return self.clone();
        }

        let components = self.components[..self.max_compare_index].to_vec();
        Path {
            context: self.context.clone(),
            max_compare_index: components.len(),
            wildcard: false,
            components,
        }
    }

    /// Completes a wildcard-terminated path with a random UUID component.
    ///
    /// Non-wildcard-terminated paths are returned unchanged. Used when a
    /// caller creates a resource "somewhere under" a prefix and lets the
    /// runtime pick the concrete address.
    pub fn append_uuid_if_wildcard(&self) -> Path {
        if !self.is_wildcard_terminated() {
            return self.clone();
        }

        let mut components = self.components[..self.max_compare_index].to_vec();
        components.push(Uuid::new_v4().to_string());

        Path {
            context: self.context.clone(),
            max_compare_index: components.len(),
            wildcard: false,
            components,
        }
    }

    /// Returns this path with the given context.
    pub fn with_context(&self, context: impl Into<String>) -> Result<Path, PathError> {
        Self::from_context_and_components(Some(context.into()), self.components.clone())
    }

    /// Returns this path with no context.
    pub fn without_context(&self) -> Path {
        Path {
            context: None,
            components: self.components.clone(),
            max_compare_index: self.max_compare_index,
            wildcard: self.wildcard,
        }
    }

    /// The bit-exact normalized string form.
    pub fn to_normalized_path_string(&self) -> String {
        let joined = self.components.join(PATH_SEPARATOR);
        match &self.context {
            Some(context) => format!("{context}{CONTEXT_SEPARATOR}{joined}"),
            None => format!("{PATH_SEPARATOR}{joined}"),
        }
    }

    /// The UTF-8 bytes of the normalized string form.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_normalized_path_string().into_bytes()
    }

    /// Parses a path from the UTF-8 bytes of its normalized string form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Path, PathError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|_| PathError::MalformedContext(String::from_utf8_lossy(bytes).into_owned()))?;
        Self::from_path_string(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_normalized_path_string())
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_path_string(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
