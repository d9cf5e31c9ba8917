//! Action mini-language
//!
//! Test cases describe UI interactions as pipe-delimited tokens:
//!
//! ```text
//! click|#submit
//! type|#name|John|click|#go
//! select|#country|India
//! ```
//!
//! Parsing is separate from execution so scripts can be validated without
//! a browser.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single UI interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionStep {
    Click { locator: String },
    Type { locator: String, value: String },
    Select { locator: String, value: String },
}

impl ActionStep {
    pub fn locator(&self) -> &str {
        match self {
            ActionStep::Click { locator }
            | ActionStep::Type { locator, .. }
            | ActionStep::Select { locator, .. } => locator,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ActionStep::Click { locator } => format!("click:{}", locator),
            ActionStep::Type { locator, .. } => format!("type:{}", locator),
            ActionStep::Select { locator, .. } => format!("select:{}", locator),
        }
    }
}

/// A token sequence the parser could not turn into a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedToken {
    /// Index of the first skipped token
    pub position: usize,
    pub tokens: Vec<String>,
    pub reason: &'static str,
}

/// Result of parsing an action script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionScript {
    pub steps: Vec<ActionStep>,
    pub skipped: Vec<SkippedToken>,
}

impl ActionScript {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

enum Kind {
    Click,
    Type,
    Select,
}

impl Kind {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "click" => Some(Kind::Click),
            "type" => Some(Kind::Type),
            "select" | "dropdown" => Some(Kind::Select),
            _ => None,
        }
    }

    /// Tokens consumed including the action name
    fn arity(&self) -> usize {
        match self {
            Kind::Click => 2,
            Kind::Type | Kind::Select => 3,
        }
    }
}

/// Parse a pipe-delimited action script.
///
/// Unknown tokens consume one position; a known action without enough
/// operands or with an empty locator consumes what it can and is skipped.
/// Neither aborts the remaining steps.
pub fn parse_action_script(script: &str) -> ActionScript {
    let mut parsed = ActionScript::default();
    if script.trim().is_empty() {
        return parsed;
    }

    let tokens: Vec<&str> = script.split('|').map(str::trim).collect();
    let mut i = 0;

    while i < tokens.len() {
        let Some(kind) = Kind::from_token(tokens[i]) else {
            if !tokens[i].is_empty() {
                warn!("Unsupported action type '{}' at token {}", tokens[i], i);
            }
            parsed.skipped.push(SkippedToken {
                position: i,
                tokens: vec![tokens[i].to_string()],
                reason: "unsupported action",
            });
            i += 1;
            continue;
        };

        let end = (i + kind.arity()).min(tokens.len());
        let operands = &tokens[i + 1..end];

        if operands.len() + 1 < kind.arity() || operands[0].is_empty() {
            warn!("Malformed '{}' action at token {}: {:?}", tokens[i], i, operands);
            parsed.skipped.push(SkippedToken {
                position: i,
                tokens: tokens[i..end].iter().map(|t| t.to_string()).collect(),
                reason: "missing operand",
            });
            i = end;
            continue;
        }

        let locator = operands[0].to_string();
        let step = match kind {
            Kind::Click => ActionStep::Click { locator },
            Kind::Type => ActionStep::Type {
                locator,
                value: operands[1].to_string(),
            },
            Kind::Select => ActionStep::Select {
                locator,
                value: operands[1].to_string(),
            },
        };
        parsed.steps.push(step);
        i = end;
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn click(locator: &str) -> ActionStep {
        ActionStep::Click { locator: locator.to_string() }
    }

    #[test]
    fn test_single_click() {
        let script = parse_action_script("click|#submit");
        assert_eq!(script.steps, vec![click("#submit")]);
        assert!(script.skipped.is_empty());
    }

    #[test]
    fn test_type_then_click() {
        let script = parse_action_script("type|#name|John|click|#go");
        assert_eq!(
            script.steps,
            vec![
                ActionStep::Type { locator: "#name".into(), value: "John".into() },
                click("#go"),
            ]
        );
    }

    #[test]
    fn test_click_then_select() {
        let script = parse_action_script("click|#menu|select|#country|India");
        assert_eq!(
            script.steps,
            vec![
                click("#menu"),
                ActionStep::Select { locator: "#country".into(), value: "India".into() },
            ]
        );
    }

    #[test_case("dropdown|#size|XL" ; "dropdown alias")]
    #[test_case("SELECT|#size|XL" ; "uppercase")]
    #[test_case(" select | #size | XL " ; "padded tokens")]
    fn test_select_variants(raw: &str) {
        let script = parse_action_script(raw);
        assert_eq!(
            script.steps,
            vec![ActionStep::Select { locator: "#size".into(), value: "XL".into() }]
        );
    }

    #[test]
    fn test_unknown_token_consumes_one() {
        let script = parse_action_script("hover|click|#go");
        assert_eq!(script.steps, vec![click("#go")]);
        assert_eq!(script.skipped.len(), 1);
        assert_eq!(script.skipped[0].tokens, vec!["hover".to_string()]);
    }

    #[test]
    fn test_unknown_token_does_not_abort() {
        // hover and its locator are each skipped as one unknown token
        let script = parse_action_script("hover|#a|click|#b");
        assert_eq!(script.steps, vec![click("#b")]);
        assert_eq!(script.skipped.len(), 2);
    }

    #[test]
    fn test_truncated_type_is_skipped() {
        let script = parse_action_script("click|#go|type|#name");
        assert_eq!(script.steps, vec![click("#go")]);
        assert_eq!(script.skipped.len(), 1);
        assert_eq!(script.skipped[0].reason, "missing operand");
    }

    #[test]
    fn test_empty_locator_is_skipped() {
        let script = parse_action_script("click||click|#ok");
        assert_eq!(script.steps, vec![click("#ok")]);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    fn test_blank_script_has_no_steps(raw: &str) {
        let script = parse_action_script(raw);
        assert!(script.is_empty());
        assert!(script.skipped.is_empty());
    }

    #[test]
    fn test_type_value_may_be_empty() {
        let script = parse_action_script("type|#q|");
        assert_eq!(
            script.steps,
            vec![ActionStep::Type { locator: "#q".into(), value: String::new() }]
        );
    }
}
