//! Command payloads shared between the adapter and the navigator layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One hop in an element path: the `index`-th match of `selector` below the previous hop.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub selector: String,
    pub index: usize,
}

/// Re-resolvable handle to a DOM element.
///
/// Elements are never held as remote object ids across awaits; every command
/// walks the path again from `document`, so a handle survives re-renders that
/// keep the same structure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementPath {
    steps: Vec<PathStep>,
}

impl ElementPath {
    /// Path resolving to `document` itself.
    pub fn root() -> Self {
        Self::default()
    }

    /// First element matching `selector` in the document.
    pub fn css(selector: impl Into<String>) -> Self {
        Self::nth(selector, 0)
    }

    pub fn nth(selector: impl Into<String>, index: usize) -> Self {
        Self {
            steps: vec![PathStep {
                selector: selector.into(),
                index,
            }],
        }
    }

    /// Extend the path with the `index`-th descendant matching `selector`.
    pub fn child(&self, selector: impl Into<String>, index: usize) -> Self {
        let mut steps = self.steps.clone();
        steps.push(PathStep {
            selector: selector.into(),
            index,
        });
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// JavaScript expression evaluating to the element, or `null` when any hop misses.
    pub fn resolve_expression(&self) -> String {
        let steps: Vec<Value> = self
            .steps
            .iter()
            .map(|step| json!([step.selector, step.index]))
            .collect();
        format!(
            "(() => {{\n    let node = document;\n    for (const [selector, index] of {steps}) {{\n        if (!node) {{ return null; }}\n        let matches;\n        try {{ matches = node.querySelectorAll(selector); }} catch (err) {{ return null; }}\n        node = matches[index] || null;\n    }}\n    return node;\n}})()",
            steps = Value::Array(steps),
        )
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "document");
        }
        let rendered: Vec<String> = self
            .steps
            .iter()
            .map(|step| format!("{}[{}]", step.selector, step.index))
            .collect();
        write!(f, "{}", rendered.join(" > "))
    }
}

/// Choose an `<option>` of a `<select>` element by value (or visible label).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectSpec {
    pub target: ElementPath,
    pub value: String,
    pub match_label: bool,
}

impl SelectSpec {
    pub fn by_value(target: ElementPath, value: impl Into<String>) -> Self {
        Self {
            target,
            value: value.into(),
            match_label: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_steps() {
        let path = ElementPath::nth(".table tbody tr", 2).child("td", 1);
        assert_eq!(path.to_string(), ".table tbody tr[2] > td[1]");
        assert_eq!(ElementPath::root().to_string(), "document");
    }

    #[test]
    fn resolve_expression_embeds_escaped_steps() {
        let path = ElementPath::css("label[for='seatPref2']");
        let expr = path.resolve_expression();
        assert!(expr.contains(r#"[["label[for='seatPref2']",0]]"#));
        assert!(expr.starts_with("(() =>"));
    }

    #[test]
    fn root_path_has_no_steps() {
        let root = ElementPath::root();
        assert!(root.is_root());
        assert!(root.resolve_expression().contains("of []"));
        assert!(!root.child("td", 0).is_root());
    }
}
