//! Element addressing and race outcomes

use std::fmt;

use cdp_adapter::ElementPath;
use serde::{Deserialize, Serialize};

/// How an element is located on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorDescriptor {
    /// CSS selector
    Css(String),

    /// Tag name, used for lookups relative to a container
    Tag(String),
}

impl AnchorDescriptor {
    pub fn css(selector: impl Into<String>) -> Self {
        AnchorDescriptor::Css(selector.into())
    }

    pub fn tag(name: impl Into<String>) -> Self {
        AnchorDescriptor::Tag(name.into())
    }

    /// Selector understood by `querySelectorAll`.
    pub fn selector(&self) -> &str {
        match self {
            AnchorDescriptor::Css(selector) => selector,
            AnchorDescriptor::Tag(name) => name,
        }
    }

    /// Path to the `index`-th document-level match.
    pub fn nth(&self, index: usize) -> ElementRef {
        ElementRef::new(ElementPath::nth(self.selector(), index))
    }
}

impl fmt::Display for AnchorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorDescriptor::Css(selector) => write!(f, "css:{selector}"),
            AnchorDescriptor::Tag(name) => write!(f, "tag:{name}"),
        }
    }
}

/// Handle to a located element. Re-resolved on every use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    path: ElementPath,
}

impl ElementRef {
    pub fn new(path: ElementPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &ElementPath {
        &self.path
    }

    /// The `index`-th match of `anchor` below this element.
    pub fn child(&self, anchor: &AnchorDescriptor, index: usize) -> ElementRef {
        ElementRef::new(self.path.child(anchor.selector(), index))
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.fmt(f)
    }
}

/// One side of an outcome race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceCondition {
    /// Current URL equals the string exactly
    UrlEquals(String),

    /// At least one element matches the anchor
    ElementPresent(AnchorDescriptor),
}

impl fmt::Display for RaceCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceCondition::UrlEquals(url) => write!(f, "url == {url}"),
            RaceCondition::ElementPresent(anchor) => write!(f, "present({anchor})"),
        }
    }
}

/// Which race condition was observed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceWinner {
    First,
    Second,
}
