//! Paths addressing values inside an entity.
//!
//! A path is an ordered list of segments starting at the entity root, e.g.
//! `["fields", "title", "en-US"]` or `["fields", "tags", "en-US", 2]`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, ToSmolStr};

/// Root key of the field map.
pub const FIELDS: &str = "fields";
/// Root key of the system envelope.
pub const SYS: &str = "sys";

/// One step in a path: an object key or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    Index(usize),
    Key(SmolStr),
}

impl Segment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(k) => Some(k.as_str()),
            Segment::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Index(i) => Some(*i),
            Segment::Key(_) => None,
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.into())
    }
}

impl From<SmolStr> for Segment {
    fn from(key: SmolStr) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Address of a value inside an entity, from the entity root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Segment>);

impl Path {
    /// The entity root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// `["fields"]`
    pub fn fields() -> Self {
        Self(vec![Segment::Key(FIELDS.into())])
    }

    /// `["fields", field]`
    pub fn field(field: &str) -> Self {
        Self::fields().child(field)
    }

    /// `["fields", field, locale]`
    pub fn field_locale(field: &str, locale: &str) -> Self {
        Self::field(field).child(locale)
    }

    /// Parse a `/`-separated path. All-digit segments become indices.
    pub fn parse(s: &str) -> Self {
        Self(
            s.split('/')
                .filter(|seg| !seg.is_empty())
                .map(|seg| match seg.parse::<usize>() {
                    Ok(i) => Segment::Index(i),
                    Err(_) => Segment::Key(seg.to_smolstr()),
                })
                .collect(),
        )
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// A new path one key deeper.
    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.into()));
        Self(segments)
    }

    /// A new path one index deeper.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Self(segments)
    }

    pub fn push(&mut self, segment: impl Into<Segment>) {
        self.0.push(segment.into());
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// True if either path is a prefix of the other.
    ///
    /// Overlapping paths address the same value or nested values; disjoint
    /// paths can be edited independently.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    pub fn strip_prefix(&self, prefix: &Path) -> Option<&[Segment]> {
        self.0.strip_prefix(prefix.0.as_slice())
    }

    /// Whether the path lives under `sys`.
    pub fn is_sys(&self) -> bool {
        self.0.first().and_then(Segment::as_key) == Some(SYS)
    }

    /// Whether the path lives under `fields` (or is `fields` itself).
    pub fn is_fields(&self) -> bool {
        self.0.first().and_then(Segment::as_key) == Some(FIELDS)
    }

    /// The `(field, locale)` pair this path lives under, if it is that deep.
    pub fn field_locale_ids(&self) -> Option<(&str, &str)> {
        match self.0.as_slice() {
            [Segment::Key(root), Segment::Key(field), Segment::Key(locale), ..] if root == FIELDS => {
                Some((field.as_str(), locale.as_str()))
            }
            _ => None,
        }
    }

    /// This path truncated to at most `["fields", field, locale]`.
    ///
    /// Field-locale values are the unit of diffing and acknowledgement.
    pub fn value_scope(&self) -> Path {
        Self(self.0.iter().take(3).cloned().collect())
    }
}

impl FromIterator<Segment> for Path {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.0 {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
