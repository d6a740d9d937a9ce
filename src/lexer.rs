//! Splitting of a raw line into top-level tokens.
//!
//! The splitter is a small state machine that keeps track of an open quote,
//! the nesting depth of parenthesized blocks and a pending backslash escape.
//! A separator only splits the line when it is found outside of quotes and
//! blocks. Malformed input never fails: an unterminated quote or block simply
//! swallows the rest of the line into the last token.

/// State of the splitter between two characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    /// Outside of any quote; `depth` counts the open parentheses.
    Plain { depth: usize },
    /// Inside a quote opened with the given mark.
    Quoted { mark: char, depth: usize },
}

struct SplitFSM {
    separator: char,
    state: SplitState,
    escape: bool,
    buffer: String,
    tokens: Vec<String>,
}

impl SplitFSM {
    fn new(separator: char) -> Self {
        SplitFSM {
            separator,
            state: SplitState::Plain { depth: 0 },
            escape: false,
            buffer: String::new(),
            tokens: Vec::new(),
        }
    }

    fn make_tokens(mut self, text: &str) -> Vec<String> {
        for ch in text.chars() {
            self.feed(ch);
        }
        self.flush();
        self.tokens
    }

    fn feed(&mut self, ch: char) {
        if self.escape {
            self.escape = false;
            self.buffer.push(ch);
            return;
        }
        // The backslash stays in the token, only the next character is protected.
        if ch == '\\' {
            self.escape = true;
            self.buffer.push(ch);
            return;
        }

        match self.state {
            SplitState::Quoted { mark, depth } => {
                self.buffer.push(ch);
                if ch == mark {
                    self.state = SplitState::Plain { depth };
                }
            }
            SplitState::Plain { depth } => match ch {
                '\'' | '"' => {
                    self.buffer.push(ch);
                    self.state = SplitState::Quoted { mark: ch, depth };
                }
                '(' => {
                    self.buffer.push(ch);
                    self.state = SplitState::Plain { depth: depth + 1 };
                }
                ')' => {
                    // Excess closing parens are absorbed, depth never goes negative.
                    self.buffer.push(ch);
                    self.state = SplitState::Plain {
                        depth: depth.saturating_sub(1),
                    };
                }
                c if c == self.separator && depth == 0 => self.flush(),
                c => self.buffer.push(c),
            },
        }
    }

    fn flush(&mut self) {
        let token = self.buffer.trim();
        if !token.is_empty() {
            self.tokens.push(token.to_string());
        }
        self.buffer.clear();
    }
}

/// Split `text` on `separator`, ignoring separators inside quotes and blocks.
///
/// Tokens are trimmed of surrounding whitespace and empty tokens are dropped,
/// so runs of separators behave like a single one.
pub fn split_into_tokens(text: &str, separator: char) -> Vec<String> {
    SplitFSM::new(separator).make_tokens(text)
}

/// Split a command line on spaces.
pub fn split_line(line: &str) -> Vec<String> {
    split_into_tokens(line, ' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_words_match_whitespace_split() {
        let line = "  alpha beta   gamma 12 ";
        let expected: Vec<String> = line.split_whitespace().map(String::from).collect();
        assert_eq!(split_line(line), expected);
    }

    #[test]
    fn test_unquoted_text_matches_trimmed_split() {
        let cases = [
            ("", ' '),
            ("a", ' '),
            ("  a  ", ' '),
            ("a\tb c", ' '),
            ("a  b   c ", ' '),
            ("\n\na\n\n b \n", '\n'),
            ("one\ntwo\n\n\nthree", '\n'),
            ("\n\n\n", '\n'),
        ];
        for (text, separator) in cases {
            let expected: Vec<String> = text
                .split(separator)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
            assert_eq!(split_into_tokens(text, separator), expected, "{text:?}");
        }
    }

    #[test]
    fn test_quoted_space_is_kept() {
        assert_eq!(split_line(r#"a "b c" d"#), vec!["a", "\"b c\"", "d"]);
        assert_eq!(split_line("say 'x y'"), vec!["say", "'x y'"]);
    }

    #[test]
    fn test_block_is_never_split() {
        assert_eq!(split_line("cmd (1 2 3) x"), vec!["cmd", "(1 2 3)", "x"]);
        assert_eq!(
            split_line("repeat 2 (run (echo 1 2))"),
            vec!["repeat", "2", "(run (echo 1 2))"]
        );
    }

    #[test]
    fn test_parens_inside_quotes_are_not_tracked() {
        assert_eq!(split_line(r#"echo "(" next"#), vec!["echo", "\"(\"", "next"]);
    }

    #[test]
    fn test_escaped_quote_does_not_open_string() {
        assert_eq!(split_line(r#"a \"b c"#), vec!["a", r#"\"b"#, "c"]);
        assert_eq!(split_line(r#""x\" y" z"#), vec![r#""x\" y""#, "z"]);
    }

    #[test]
    fn test_escaped_separator_stays_in_token() {
        assert_eq!(split_line(r"a\ b c"), vec![r"a\ b", "c"]);
    }

    #[test]
    fn test_excess_closing_paren_is_absorbed() {
        assert_eq!(split_line("a ) b (c d)"), vec!["a", ")", "b", "(c d)"]);
    }

    #[test]
    fn test_unterminated_constructs_swallow_rest() {
        assert_eq!(split_line(r#"echo "never closed here"#), vec![
            "echo",
            "\"never closed here"
        ]);
        assert_eq!(split_line("run (echo 1 2"), vec!["run", "(echo 1 2"]);
    }

    #[test]
    fn test_custom_separator_for_lines() {
        let text = "echo 1\necho \"a\nb\"\n\nrun (echo 2\necho 3)\n";
        assert_eq!(split_into_tokens(text, '\n'), vec![
            "echo 1",
            "echo \"a\nb\"",
            "run (echo 2\necho 3)"
        ]);
    }

    #[test]
    fn test_empty_input() {
        assert!(split_line("").is_empty());
        assert!(split_line("    ").is_empty());
    }
}
