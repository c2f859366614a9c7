//! Checks for translated rows of the dialogue rules table.
//!
//! The game engine reads `$tokens`, highlight commands and line breaks out of
//! these cells, so a translation that drops any of them breaks the dialogue.

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// File name of the table the validator runs on.
pub const RULES_FILE_NAME: &str = "rules.csv";

/// Column holding the script commands.
pub const SCRIPT_COLUMN: &str = "script";

static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$[a-zA-Z0-9][a-zA-Z0-9_.]+[a-zA-Z0-9]").expect("valid rules token regex")
});

// Pronoun and address tokens are expected to disappear in translation.
static IGNORED_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"([Pp]ersonLastName|[Pp]layerSirOrMadam|[Pp]layerName|ranks?|[Oo]nOrAt|[Ii]sOrAre|[Hh]isOrHer|[Hh]eOrShe|[Hh]imOrHer|[Hh]imOrHerself|shipOrFleet|[Aa]OrAn|[Bb]rotherOrSister|marketFactionArticle)",
    )
    .expect("valid ignored token regex")
});

static HIGHLIGHT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:SetTextHighlights|Highlight) (.*)$").expect("valid highlight regex")
});

const FULL_WIDTH_QUOTES: [char; 2] = ['\u{201C}', '\u{201D}'];

const CJK_PUNCTUATION: &str = "，。！？；：、“”‘’（）《》〈〉【】「」『』…—～";

/// One rule broken by a translated row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    /// The cell used `“` or `”`; it was reverted to the original text.
    FullWidthQuote { column: String },
    MissingTokens { column: String, tokens: BTreeSet<String> },
    LineCountMismatch {
        column: String,
        original: usize,
        translation: usize,
    },
    /// A highlight target from the script is absent from the row text.
    MissingHighlight { target: String },
    /// A highlight target only appears glued to other characters.
    UnboundedHighlight { target: String },
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleViolation::FullWidthQuote { column } => write!(
                f,
                "column \"{column}\" contains full-width quotes, reverted to the original"
            ),
            RuleViolation::MissingTokens { column, tokens } => {
                let list: Vec<&str> = tokens.iter().map(String::as_str).collect();
                write!(f, "column \"{column}\" is missing tokens {}", list.join(", "))
            }
            RuleViolation::LineCountMismatch {
                column,
                original,
                translation,
            } => write!(
                f,
                "column \"{column}\" has {translation} lines, the original has {original}"
            ),
            RuleViolation::MissingHighlight { target } => {
                write!(f, "highlight \"{target}\" does not appear in the translated text")
            }
            RuleViolation::UnboundedHighlight { target } => write!(
                f,
                "highlight \"{target}\" is not separated from the surrounding text"
            ),
        }
    }
}

/// One translatable cell of a rules row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCell {
    pub column: String,
    pub original: String,
    pub translation: String,
}

impl RuleCell {
    pub fn new(
        column: impl Into<String>,
        original: impl Into<String>,
        translation: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            original: original.into(),
            translation: translation.into(),
        }
    }

    fn is_translated(&self) -> bool {
        self.translation != self.original
    }
}

pub fn extract_tokens(text: &str) -> BTreeSet<String> {
    TOKEN_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Tokens of `original` that `translation` lost, compared case-insensitively.
pub fn missing_tokens(original: &str, translation: &str) -> BTreeSet<String> {
    let present: BTreeSet<String> = extract_tokens(translation)
        .into_iter()
        .map(|t| t.to_lowercase())
        .collect();

    extract_tokens(original)
        .into_iter()
        .filter(|t| !IGNORED_TOKEN_REGEX.is_match(t))
        .filter(|t| !present.contains(&t.to_lowercase()))
        .collect()
}

/// Double-quoted arguments of a command line; `\` escapes the next character.
pub fn quoted_strings(input: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for c in input.chars() {
        if escape {
            current.push(c);
            escape = false;
        } else if c == '\\' {
            escape = true;
        } else if c == '"' {
            if in_quotes {
                result.push(std::mem::take(&mut current));
            }
            in_quotes = !in_quotes;
        } else if in_quotes {
            current.push(c);
        }
    }

    result
}

/// Strings named by `SetTextHighlights` / `Highlight` commands in a script.
pub fn highlight_targets(script: &str) -> BTreeSet<String> {
    HIGHLIGHT_REGEX
        .captures_iter(script)
        .filter_map(|caps| caps.get(1))
        .flat_map(|args| quoted_strings(args.as_str()))
        .filter(|target| !target.is_empty())
        .collect()
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_punctuation() || CJK_PUNCTUATION.contains(c)
}

/// Whether `target` occurs in `text` with a boundary (or the text edge) on
/// both sides.
pub fn has_bounded_occurrence(text: &str, target: &str) -> bool {
    text.match_indices(target).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        before.map_or(true, is_boundary) && after.map_or(true, is_boundary)
    })
}

fn line_count(text: &str) -> usize {
    1 + text.matches('\n').count() + text.matches("^n").count()
}

/// Validate one row. Cells with full-width quotes are reverted in place.
///
/// Token and line checks run on every translated cell, `script` included,
/// since script commands reference the same `$tokens` as the dialogue text.
/// Rows where no cell differs from the original are not checked.
pub fn validate_row(cells: &mut [RuleCell]) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    if !cells.iter().any(RuleCell::is_translated) {
        return violations;
    }

    for cell in cells.iter_mut().filter(|c| c.is_translated()) {
        if cell.translation.contains(FULL_WIDTH_QUOTES) {
            cell.translation = cell.original.clone();
            violations.push(RuleViolation::FullWidthQuote {
                column: cell.column.clone(),
            });
            continue;
        }

        let tokens = missing_tokens(&cell.original, &cell.translation);
        if !tokens.is_empty() {
            violations.push(RuleViolation::MissingTokens {
                column: cell.column.clone(),
                tokens,
            });
        }

        let original = line_count(&cell.original);
        let translation = line_count(&cell.translation);
        if original != translation {
            violations.push(RuleViolation::LineCountMismatch {
                column: cell.column.clone(),
                original,
                translation,
            });
        }
    }

    let Some(script) = cells.iter().find(|c| c.column == SCRIPT_COLUMN) else {
        return violations;
    };
    let targets = highlight_targets(&script.translation);
    if targets.is_empty() {
        return violations;
    }

    let text: Vec<&str> = cells
        .iter()
        .filter(|c| c.column != SCRIPT_COLUMN)
        .map(|c| c.translation.as_str())
        .collect();
    let text = text.join("\n");

    for target in targets {
        if !text.contains(target.as_str()) {
            violations.push(RuleViolation::MissingHighlight { target });
        } else if !has_bounded_occurrence(&text, &target) {
            violations.push(RuleViolation::UnboundedHighlight { target });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_highlight_is_reported() {
        let mut cells = vec![
            RuleCell::new("script", "SetTextHighlights \"door\"", "SetTextHighlights \"door\""),
            RuleCell::new("text", "Open the \"door\" now", "现在打开它"),
        ];
        let violations = validate_row(&mut cells);
        assert_eq!(
            violations,
            vec![RuleViolation::MissingHighlight {
                target: "door".to_string()
            }]
        );
        assert!(violations[0].to_string().contains("door"));
    }

    #[test]
    fn highlight_glued_to_cjk_text_is_unbounded() {
        let mut cells = vec![
            RuleCell::new("script", "Highlight \"关闭你的应答器\"", "Highlight \"关闭你的应答器\""),
            RuleCell::new("text", "turn off your transponder", "如果关闭你的应答器隐瞒身份"),
        ];
        let violations = validate_row(&mut cells);
        assert_eq!(
            violations,
            vec![RuleViolation::UnboundedHighlight {
                target: "关闭你的应答器".to_string()
            }]
        );
    }

    #[test]
    fn highlight_next_to_cjk_punctuation_passes() {
        let mut cells = vec![
            RuleCell::new("script", "Highlight \"应答器\"", "Highlight \"应答器\""),
            RuleCell::new("text", "the transponder", "关闭【应答器】，然后离开"),
        ];
        assert!(validate_row(&mut cells).is_empty());
    }

    #[test]
    fn full_width_quotes_revert_the_cell() {
        let mut cells = vec![RuleCell::new("text", "Say \"hi\"", "说“你好”")];
        let violations = validate_row(&mut cells);
        assert_eq!(
            violations,
            vec![RuleViolation::FullWidthQuote {
                column: "text".to_string()
            }]
        );
        assert_eq!(cells[0].translation, "Say \"hi\"");
    }

    #[test]
    fn tokens_compare_case_insensitively_and_skip_pronouns() {
        let missing = missing_tokens(
            "$PersonRank $heOrShe met $market.name at $playerName",
            "$personrank 遇见了 $market.name",
        );
        assert!(missing.is_empty());

        let missing = missing_tokens("Pay $credits now", "现在付款");
        assert_eq!(missing, BTreeSet::from(["$credits".to_string()]));
    }

    #[test]
    fn script_cell_losing_a_token_is_reported() {
        let mut cells = vec![
            RuleCell::new(
                "script",
                "AddText \"Pay $credits\"\nFireBest DialogOptionSelected",
                "AddText \"付款\"\nFireBest DialogOptionSelected",
            ),
            RuleCell::new("text", "Pay up", "付钱"),
        ];
        let violations = validate_row(&mut cells);
        assert_eq!(
            violations,
            vec![RuleViolation::MissingTokens {
                column: "script".to_string(),
                tokens: BTreeSet::from(["$credits".to_string()]),
            }]
        );
    }

    #[test]
    fn line_counts_include_literal_breaks() {
        let mut cells = vec![RuleCell::new("text", "one^ntwo\nthree", "一二三")];
        let violations = validate_row(&mut cells);
        assert_eq!(
            violations,
            vec![RuleViolation::LineCountMismatch {
                column: "text".to_string(),
                original: 3,
                translation: 1,
            }]
        );
    }

    #[test]
    fn untranslated_rows_are_not_checked() {
        let mut cells = vec![
            RuleCell::new("script", "Highlight \"door\"", "Highlight \"door\""),
            RuleCell::new("text", "No match here $credits", "No match here $credits"),
        ];
        assert!(validate_row(&mut cells).is_empty());
    }

    #[test]
    fn quoted_strings_honor_escapes() {
        assert_eq!(
            quoted_strings(r#""a \"b\"" plain "c\\d""#),
            vec!["a \"b\"".to_string(), "c\\d".to_string()]
        );
    }

    #[test]
    fn collects_targets_from_every_command_line() {
        let targets = highlight_targets("Highlight \"one\" \"two\"\nShowPersonVisual\nSetTextHighlights \"three\"");
        assert_eq!(
            targets,
            BTreeSet::from(["one".to_string(), "two".to_string(), "three".to_string()])
        );
    }
}
