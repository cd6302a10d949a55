//! Structured receipt payloads
//!
//! A receipt is rendered to plain text sized for the paper width and then
//! printed like any other text job.

use serde::{Deserialize, Serialize};

use crate::profile::PaperWidth;

/// One left/right justified receipt row, e.g. item and price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub left: String,
    #[serde(default)]
    pub right: String,
}

impl ReceiptLine {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// Receipt data accepted by `print_receipt`
///
/// A receipt carrying only `text` prints that text unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub lines: Vec<ReceiptLine>,
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl Receipt {
    /// Receipt made of free text only
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Render to text for the given paper width
    pub fn render(&self, width: PaperWidth) -> String {
        let chars = width.chars();
        let mut out: Vec<String> = Vec::new();

        if let Some(title) = &self.title {
            out.push(center(title, chars));
            out.push("=".repeat(chars));
        }

        for line in &self.lines {
            out.push(line_lr(&line.left, &line.right, chars));
        }

        if let Some(footer) = &self.footer {
            if !out.is_empty() {
                out.push("-".repeat(chars));
            }
            out.push(center(footer, chars));
        }

        if let Some(text) = &self.text {
            out.push(text.clone());
        }

        out.join("\n")
    }
}

/// Left text left-aligned, right text right-aligned, spaces between.
/// Falls back to a single space when both do not fit.
fn line_lr(left: &str, right: &str, width: usize) -> String {
    let lw = left.chars().count();
    let rw = right.chars().count();

    if lw + rw >= width {
        format!("{} {}", left, right)
    } else {
        format!("{}{}{}", left, " ".repeat(width - lw - rw), right)
    }
}

fn center(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    format!("{}{}", " ".repeat((width - len) / 2), s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_only_receipt_is_unchanged() {
        let r = Receipt::from_text("Order 12\nPizza");
        assert_eq!(r.render(PaperWidth::Mm80), "Order 12\nPizza");
    }

    #[test]
    fn test_line_lr() {
        assert_eq!(line_lr("Pizza", "89.00", 20), "Pizza          89.00");
        assert_eq!(line_lr("Pizza", "89.00", 10), "Pizza 89.00");
    }

    #[test]
    fn test_render_structured() {
        let r = Receipt {
            title: Some("Kvitto".into()),
            lines: vec![ReceiptLine::new("Kebab", "95.00")],
            footer: Some("Tack!".into()),
            text: None,
        };
        let out = r.render(PaperWidth::Mm58);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], format!("{}Kvitto", " ".repeat(13)));
        assert_eq!(lines[1], "=".repeat(32));
        assert_eq!(lines[2].len(), 32);
        assert!(lines[2].starts_with("Kebab") && lines[2].ends_with("95.00"));
        assert_eq!(lines[3], "-".repeat(32));
        assert!(lines[4].ends_with("Tack!"));
    }

    #[test]
    fn test_deserialize() {
        let r: Receipt = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(r, Receipt::from_text("hello"));
    }
}
