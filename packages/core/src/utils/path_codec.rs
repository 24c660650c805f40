//! Ancestor Path Codec
//!
//! A materialized path lists the external ids of a node's ancestors from the
//! root down to the immediate parent, each wrapped in braces:
//!
//! ```text
//! {1}{10}{20}   -> node at level 3, parent 20, root 1
//! ```
//!
//! Root nodes store no path at all. An empty-but-present path is not a valid
//! encoding and is rejected like any other malformed string.

use crate::models::NodeId;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Opening delimiter of a path element
pub const PATH_ELEMENT_OPEN: char = '{';

/// Closing delimiter of a path element
pub const PATH_ELEMENT_CLOSE: char = '}';

/// Grammar of a non-root ancestor path: one or more `{digits}` tokens, no separators
const PATH_PATTERN: &str = r"^(\{[0-9]+\})+$";

/// Path codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path string does not match the `{id}{id}...` grammar
    #[error("Ancestor path has invalid format: '{path}'")]
    InvalidFormat { path: String },
}

impl PathError {
    /// Create an invalid format error
    pub fn invalid_format(path: impl Into<String>) -> Self {
        Self::InvalidFormat { path: path.into() }
    }
}

fn path_regex() -> &'static Regex {
    static PATH_REGEX: OnceLock<Regex> = OnceLock::new();
    PATH_REGEX.get_or_init(|| Regex::new(PATH_PATTERN).unwrap())
}

/// Wrap a single id as a path element (`42` -> `{42}`)
pub fn encode_element(node_id: NodeId) -> String {
    format!("{}{}{}", PATH_ELEMENT_OPEN, node_id, PATH_ELEMENT_CLOSE)
}

/// Decode a path into ancestor ids, root first
///
/// An absent path is the root case and yields an empty chain without any
/// grammar check.
///
/// # Errors
///
/// `PathError::InvalidFormat` if the string is present but does not match the
/// grammar, or if a token does not fit in a `NodeId`.
pub fn decode(path: Option<&str>) -> Result<Vec<NodeId>, PathError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    if !path_regex().is_match(path) {
        return Err(PathError::invalid_format(path));
    }

    path.split(PATH_ELEMENT_CLOSE)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .trim_start_matches(PATH_ELEMENT_OPEN)
                .parse::<NodeId>()
                .map_err(|_| PathError::invalid_format(path))
        })
        .collect()
}

/// Path a child of `node_id` must store, given `node_id`'s own path
pub fn append(path: Option<&str>, node_id: NodeId) -> String {
    let mut next = String::from(path.unwrap_or_default());
    next.push_str(&encode_element(node_id));
    next
}
