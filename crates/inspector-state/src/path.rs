//! Addressing scheme for nodes in the state tree.
//!
//! A [`Path`] is an ordered sequence of [`PathElement`]s. Its canonical text
//! form joins the stringified elements with `/` and prefixes the result with a
//! `/`; the root path renders as the empty string. Mapping keys are
//! percent-encoded so any key survives a round trip, and sequence positions
//! render as `[n]`. Because `[` is always escaped inside a key, a bracketed
//! segment unambiguously denotes an index.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use thiserror::Error;

/// Bytes left unescaped in a path element: the URL-safe unreserved set.
const ELEMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const SEPARATOR: char = '/';

/// A single step in a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathElement {
    /// Key of a mapping entry.
    Key(String),
    /// Position within a sequence.
    Index(usize),
}

impl PathElement {
    /// Builds a key element.
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    fn parse(segment: &str) -> Result<Self, PathError> {
        if segment.is_empty() {
            return Err(PathError::EmptySegment);
        }
        if let Some(inner) = segment.strip_prefix('[') {
            let digits = inner
                .strip_suffix(']')
                .ok_or_else(|| PathError::invalid_index(segment))?;
            if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(PathError::invalid_index(segment));
            }
            return digits
                .parse::<usize>()
                .map(Self::Index)
                .map_err(|_| PathError::invalid_index(segment));
        }
        percent_decode_str(segment)
            .decode_utf8()
            .map(|decoded| Self::Key(decoded.into_owned()))
            .map_err(|_| PathError::InvalidEncoding {
                segment: segment.to_owned(),
            })
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(formatter, "{}", utf8_percent_encode(key, ELEMENT_ENCODE_SET)),
            Self::Index(index) => write!(formatter, "[{index}]"),
        }
    }
}

impl From<&str> for PathElement {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for PathElement {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathElement {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Location of a node in the state tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    elements: Vec<PathElement>,
}

impl Path {
    /// The root of the state tree.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            elements: Vec::new(),
        }
    }

    /// Builds a path from its elements.
    #[must_use]
    pub fn new(elements: impl IntoIterator<Item = PathElement>) -> Self {
        Self {
            elements: elements.into_iter().collect(),
        }
    }

    /// Parses the canonical text form.
    ///
    /// A leading separator is optional and trailing separators are ignored,
    /// so `""`, `"/"`, and `"//"` all denote the root.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when an interior segment is empty, a bracketed
    /// segment is not a non-negative integer, or a key does not decode to
    /// UTF-8.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let body = input.strip_prefix(SEPARATOR).unwrap_or(input);
        let body = body.trim_end_matches(SEPARATOR);
        if body.is_empty() {
            return Ok(Self::root());
        }
        body.split(SEPARATOR)
            .map(PathElement::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(|elements| Self { elements })
    }

    /// Elements from the root downwards.
    #[must_use]
    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// Returns `true` for the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns a new path one level below this one.
    #[must_use]
    pub fn child(&self, element: impl Into<PathElement>) -> Self {
        let mut elements = self.elements.clone();
        elements.push(element.into());
        Self { elements }
    }

    /// Splits off the last element, returning the parent and the element.
    #[must_use]
    pub fn split_last(&self) -> Option<(Self, &PathElement)> {
        self.elements.split_last().map(|(last, parent)| {
            (
                Self {
                    elements: parent.to_vec(),
                },
                last,
            )
        })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            write!(formatter, "{SEPARATOR}{element}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<I: IntoIterator<Item = PathElement>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Errors raised while parsing a [`Path`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Two separators appeared back to back inside the path.
    #[error("path contains an empty segment")]
    EmptySegment,
    /// A bracketed segment did not contain a non-negative integer.
    #[error("invalid index segment '{segment}'")]
    InvalidIndex {
        /// Offending segment text.
        segment: String,
    },
    /// A key segment did not percent-decode to UTF-8.
    #[error("segment '{segment}' is not valid percent-encoded UTF-8")]
    InvalidEncoding {
        /// Offending segment text.
        segment: String,
    },
}

impl PathError {
    fn invalid_index(segment: &str) -> Self {
        Self::InvalidIndex {
            segment: segment.to_owned(),
        }
    }
}
