//! Lossless, cursor-aware argument tokenizer for partially typed command lines.
//!
//! Tokenizing never fails: unterminated quotes and dangling escapes are reported as lexical
//! state on the affected [`Argument`] so the interpreter can treat them as incomplete input.
//! Whitespace is never discarded. It is attached to the prefix of the following argument, and
//! trailing whitespace produces a final empty argument, so joining the arguments reproduces the
//! typed text exactly.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

use serde::{Deserialize, Serialize};

/// Lexical completeness of one argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LexicalState {
    /// The argument is lexically complete.
    #[default]
    Closed,
    /// A quote was opened and never closed; the argument runs to the end of input.
    UnterminatedQuote,
    /// Input ends with an escape character that has nothing to escape.
    DanglingEscape,
}

/// One token of typed input with its surrounding source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    /// Unescaped, unquoted value.
    pub text: String,
    /// Leading whitespace plus the opening quote, if any.
    pub prefix: String,
    /// Body exactly as typed, escapes intact.
    pub source: String,
    /// Closing quote, if any.
    pub suffix: String,
    /// Byte offset where `prefix` starts.
    pub start: usize,
    /// Byte offset just past `suffix`.
    pub end: usize,
    /// Quote character that opened the argument.
    pub quote: Option<char>,
    /// Lexical completeness.
    pub state: LexicalState,
}

impl Argument {
    /// Builds an argument for `value`, quoting and escaping it when needed so that
    /// re-tokenizing the source yields `value` again.
    pub fn from_value(value: &str, prefix_whitespace: &str) -> Self {
        let needs_quotes = value.is_empty()
            || value
                .chars()
                .any(|ch| ch.is_whitespace() || ch == '"' || ch == '\'' || ch == '\\');
        let (source, quote) = if needs_quotes {
            let mut escaped = String::with_capacity(value.len());
            for ch in value.chars() {
                if ch == '"' || ch == '\\' {
                    escaped.push('\\');
                }
                escaped.push(ch);
            }
            (escaped, Some('"'))
        } else {
            (value.to_string(), None)
        };
        let mut prefix = prefix_whitespace.to_string();
        let mut suffix = String::new();
        if let Some(quote) = quote {
            prefix.push(quote);
            suffix.push(quote);
        }
        let end = prefix.len() + source.len() + suffix.len();
        Self {
            text: value.to_string(),
            prefix,
            source,
            suffix,
            start: 0,
            end,
            quote,
            state: LexicalState::Closed,
        }
    }

    /// Reconstructs the exact typed text of this argument.
    pub fn to_source(&self) -> String {
        format!("{}{}{}", self.prefix, self.source, self.suffix)
    }

    /// Leading whitespace only, without any opening quote.
    pub fn whitespace(&self) -> &str {
        match self.quote {
            Some(quote) => self.prefix.strip_suffix(quote).unwrap_or(&self.prefix),
            None => &self.prefix,
        }
    }

    /// Byte offset where the argument body starts.
    pub fn text_start(&self) -> usize {
        self.start + self.prefix.len()
    }

    /// Whether the argument is lexically complete.
    pub fn is_closed(&self) -> bool {
        self.state == LexicalState::Closed
    }

    /// Whether the argument carries no value (whitespace-only or nothing at all).
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.quote.is_none()
    }
}

/// A tokenized command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexedLine {
    /// Arguments in source order.
    pub arguments: Vec<Argument>,
}

impl LexedLine {
    /// Tokenizes `line`.
    pub fn parse(line: &str) -> Self {
        Self {
            arguments: tokenize(line),
        }
    }

    /// Joins the arguments back into the typed text.
    pub fn to_source(&self) -> String {
        join(&self.arguments)
    }

    /// Whether there is nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.arguments.iter().all(Argument::is_empty)
    }

    /// Index of the argument the cursor is in, see [`argument_at`].
    pub fn argument_at(&self, cursor: usize) -> Option<usize> {
        argument_at(&self.arguments, cursor)
    }
}

/// Splits `line` into arguments on unescaped whitespace, honoring `"` and `'` quotes and `\`
/// escapes.
pub fn tokenize(line: &str) -> Vec<Argument> {
    let mut arguments = Vec::new();
    let mut chars = line.char_indices().peekable();

    loop {
        let ws_start = chars.peek().map(|(index, _)| *index).unwrap_or(line.len());
        while let Some((_, ch)) = chars.peek() {
            if !ch.is_whitespace() {
                break;
            }
            chars.next();
        }
        let token_start = chars.peek().map(|(index, _)| *index).unwrap_or(line.len());
        let whitespace = &line[ws_start..token_start];

        let Some(&(_, first)) = chars.peek() else {
            if !whitespace.is_empty() {
                arguments.push(Argument {
                    prefix: whitespace.to_string(),
                    start: ws_start,
                    end: line.len(),
                    ..Argument::default()
                });
            }
            break;
        };

        let mut text = String::new();
        let mut state = LexicalState::Closed;
        let mut suffix = String::new();
        let quote = (first == '"' || first == '\'').then_some(first);

        let body_start = match quote {
            Some(_) => {
                chars.next();
                token_start + first.len_utf8()
            }
            None => token_start,
        };
        let mut body_end = line.len();

        while let Some(&(index, ch)) = chars.peek() {
            match quote {
                Some(active) if ch == active => {
                    body_end = index;
                    chars.next();
                    suffix.push(active);
                    break;
                }
                None if ch.is_whitespace() => {
                    body_end = index;
                    break;
                }
                _ if ch == '\\' => {
                    chars.next();
                    match chars.next() {
                        Some((_, escaped)) => text.push(escaped),
                        None => state = LexicalState::DanglingEscape,
                    }
                }
                _ => {
                    text.push(ch);
                    chars.next();
                }
            }
        }

        if quote.is_some() && suffix.is_empty() && state == LexicalState::Closed {
            state = LexicalState::UnterminatedQuote;
        }

        let mut prefix = whitespace.to_string();
        if let Some(quote) = quote {
            prefix.push(quote);
        }
        let end = body_end + suffix.len();
        arguments.push(Argument {
            text,
            prefix,
            source: line[body_start..body_end].to_string(),
            suffix,
            start: ws_start,
            end,
            quote,
            state,
        });
    }

    arguments
}

/// Reconstructs the typed text from a sequence of arguments.
pub fn join(arguments: &[Argument]) -> String {
    arguments.iter().map(Argument::to_source).collect()
}

/// Returns the index of the argument containing `cursor`.
///
/// A cursor sitting just before whitespace belongs to the preceding argument; a cursor past the
/// end of the input belongs to the last argument.
pub fn argument_at(arguments: &[Argument], cursor: usize) -> Option<usize> {
    if arguments.is_empty() {
        return None;
    }
    arguments
        .iter()
        .position(|argument| cursor <= argument.end && cursor >= argument.start)
        .or(Some(arguments.len() - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(line: &str) -> Vec<String> {
        tokenize(line).into_iter().map(|arg| arg.text).collect()
    }

    #[test]
    fn tokenizes_quoted_segments() {
        assert_eq!(texts("open \"hello world\""), vec!["open", "hello world"]);
        assert_eq!(texts("echo 'single quoted'"), vec!["echo", "single quoted"]);
    }

    #[test]
    fn tokenizes_escaped_whitespace() {
        let arguments = tokenize("open hello\\ world");
        assert_eq!(arguments[1].text, "hello world");
        assert_eq!(arguments[1].source, "hello\\ world");
    }

    #[test]
    fn whitespace_attaches_to_following_argument() {
        let arguments = tokenize("  addon   enable");
        assert_eq!(arguments[0].prefix, "  ");
        assert_eq!(arguments[1].prefix, "   ");
        assert_eq!(arguments[1].start, 7);
        assert_eq!(arguments[1].text_start(), 10);
    }

    #[test]
    fn trailing_whitespace_yields_empty_argument() {
        let arguments = tokenize("addon enable ");
        assert_eq!(arguments.len(), 3);
        assert!(arguments[2].is_empty());
        assert_eq!(arguments[2].prefix, " ");

        let blank = LexedLine::parse("   ");
        assert_eq!(blank.arguments.len(), 1);
        assert!(blank.is_blank());
        assert!(LexedLine::parse("").arguments.is_empty());
    }

    #[test]
    fn unterminated_quote_keeps_remainder_as_one_argument() {
        let arguments = tokenize("open \"unterminated text ");
        assert_eq!(arguments.len(), 2);
        assert_eq!(arguments[1].text, "unterminated text ");
        assert_eq!(arguments[1].state, LexicalState::UnterminatedQuote);
        assert!(!arguments[1].is_closed());
    }

    #[test]
    fn dangling_escape_is_reported_not_thrown() {
        let arguments = tokenize("open abc\\");
        assert_eq!(arguments[1].text, "abc");
        assert_eq!(arguments[1].state, LexicalState::DanglingEscape);
    }

    #[test]
    fn joining_reconstructs_input_exactly() {
        for line in [
            "",
            "   ",
            "addon enable Foo",
            "  addon  enable \"Some Addon\"  ",
            "pref set 'a b' \\\"x\\\" --flag",
            "screenshot --selector \"div > p\" file.png ",
            "echo 'it''s'",
            "unicode äöü  ✓ ",
        ] {
            assert_eq!(join(&tokenize(line)), line, "line {line:?}");
        }
    }

    #[test]
    fn empty_quotes_are_not_empty_arguments() {
        let arguments = tokenize("set \"\"");
        assert_eq!(arguments[1].text, "");
        assert!(!arguments[1].is_empty());
    }

    #[test]
    fn from_value_quotes_only_when_needed() {
        assert_eq!(Argument::from_value("theme", " ").to_source(), " theme");
        let quoted = Argument::from_value("My \"Addon\"", " ");
        assert_eq!(quoted.to_source(), " \"My \\\"Addon\\\"\"");
        let reparsed = tokenize(&format!("x{}", quoted.to_source()));
        assert_eq!(reparsed[1].text, "My \"Addon\"");
        assert_eq!(reparsed[1].whitespace(), " ");
    }

    #[test]
    fn cursor_before_whitespace_belongs_to_previous_argument() {
        let line = LexedLine::parse("addon enable Foo");
        assert_eq!(line.argument_at(0), Some(0));
        assert_eq!(line.argument_at(5), Some(0));
        assert_eq!(line.argument_at(6), Some(1));
        assert_eq!(line.argument_at(16), Some(2));
        assert_eq!(line.argument_at(99), Some(2));
        assert_eq!(LexedLine::default().argument_at(0), None);
    }
}
