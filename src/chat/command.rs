/// Command-line parsing — tokenizer and the command set.
///
/// Commands arrive as single text lines. Tokens are separated by spaces,
/// except that a `"`-delimited span is one token (the quotes are
/// stripped); a `"` immediately preceded by `\` does not toggle quoting.
/// The first token selects the command case-insensitively; each command
/// carries its own argument-arity contract.
use std::mem;

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register { username: String },
    Broadcast { text: String },
    Join { group: String },
    Leave { group: String },
    Groupcast { group: String, text: String },
    Status,
    Quit,
    Help,
}

/// Why a non-empty line failed to parse into a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command")]
    Unknown,
    #[error("wrong argument count")]
    BadArity,
}

impl Command {
    /// Parse one input line. `Ok(None)` means the line was empty (after
    /// trimming) and warrants no response at all.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let tokens = tokenize(line.trim());
        let Some(head) = tokens.first() else {
            return Ok(None);
        };

        let cmd = match head.to_uppercase().as_str() {
            "REGISTER" => {
                if tokens.len() != 2 {
                    return Err(CommandError::BadArity);
                }
                Self::Register {
                    username: tokens[1].clone(),
                }
            }
            "BROADCAST" => {
                if tokens.len() < 2 {
                    return Err(CommandError::BadArity);
                }
                Self::Broadcast {
                    text: tokens[1..].join(" "),
                }
            }
            "JOIN" => {
                if tokens.len() != 2 {
                    return Err(CommandError::BadArity);
                }
                Self::Join {
                    group: tokens[1].clone(),
                }
            }
            "LEAVE" => {
                if tokens.len() != 2 {
                    return Err(CommandError::BadArity);
                }
                Self::Leave {
                    group: tokens[1].clone(),
                }
            }
            "GROUPCAST" => {
                if tokens.len() < 3 {
                    return Err(CommandError::BadArity);
                }
                Self::Groupcast {
                    group: tokens[1].clone(),
                    text: tokens[2..].join(" "),
                }
            }
            // Extra tokens after these are ignored.
            "STATUS" => Self::Status,
            "QUIT" => Self::Quit,
            "HELP" => Self::Help,
            _ => return Err(CommandError::Unknown),
        };

        Ok(Some(cmd))
    }
}

/// Split a line into tokens, honoring double-quoted spans.
///
/// Quote characters toggle quoting and are dropped, unless the previous
/// raw character was a backslash — then both the backslash and the quote
/// are kept literally. An unterminated quote runs to the end of the line.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut prev: Option<char> = None;

    for c in input.chars() {
        if c == '"' && prev != Some('\\') {
            in_quotes = !in_quotes;
        } else if c == ' ' && !in_quotes {
            if !current.is_empty() {
                tokens.push(mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
        prev = Some(c);
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── Tokenizer ────────────────────────────────────────────────

    #[test]
    fn tokenize_splits_on_spaces() {
        assert_eq!(tokenize("JOIN team"), vec!["JOIN", "team"]);
    }

    #[test]
    fn tokenize_collapses_repeated_spaces() {
        assert_eq!(tokenize("JOIN   team"), vec!["JOIN", "team"]);
    }

    #[test]
    fn tokenize_quoted_span_is_one_token() {
        assert_eq!(
            tokenize(r#"BROADCAST "hello there" friends"#),
            vec!["BROADCAST", "hello there", "friends"]
        );
    }

    #[test]
    fn tokenize_escaped_quote_keeps_backslash_and_quote() {
        assert_eq!(tokenize(r#"BROADCAST \"hi\""#), vec!["BROADCAST", r#"\"hi\""#]);
    }

    #[test]
    fn tokenize_escaped_quote_does_not_toggle_quoting() {
        // The quoted span continues past the escaped quote.
        assert_eq!(
            tokenize(r#"BROADCAST "say \"hi\" twice""#),
            vec!["BROADCAST", r#"say \"hi\" twice"#]
        );
    }

    #[test]
    fn tokenize_unterminated_quote_runs_to_end() {
        assert_eq!(tokenize(r#"BROADCAST "hello the"#), vec!["BROADCAST", "hello the"]);
    }

    #[test]
    fn tokenize_lone_quote_yields_nothing() {
        assert_eq!(tokenize(r#"""#), Vec::<String>::new());
    }

    // ── Command selection ────────────────────────────────────────

    #[test]
    fn parse_empty_line_is_no_command() {
        assert_eq!(Command::parse(""), Ok(None));
        assert_eq!(Command::parse("   "), Ok(None));
    }

    #[test]
    fn parse_command_is_case_insensitive() {
        assert_eq!(
            Command::parse("register alice"),
            Ok(Some(Command::Register {
                username: "alice".into()
            }))
        );
        assert_eq!(Command::parse("quit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(Command::parse("SHOUT hello"), Err(CommandError::Unknown));
    }

    #[test]
    fn parse_broadcast_rejoins_text() {
        assert_eq!(
            Command::parse("BROADCAST hello   there everyone"),
            Ok(Some(Command::Broadcast {
                text: "hello there everyone".into()
            }))
        );
    }

    #[test]
    fn parse_groupcast_splits_group_and_text() {
        assert_eq!(
            Command::parse("GROUPCAST team lunch at noon"),
            Ok(Some(Command::Groupcast {
                group: "team".into(),
                text: "lunch at noon".into()
            }))
        );
    }

    #[test]
    fn parse_quoted_group_name() {
        assert_eq!(
            Command::parse(r#"JOIN "my team""#),
            Ok(Some(Command::Join {
                group: "my team".into()
            }))
        );
    }

    // ── Arity contracts ──────────────────────────────────────────

    #[test]
    fn register_takes_exactly_one_argument() {
        assert_eq!(Command::parse("REGISTER"), Err(CommandError::BadArity));
        assert_eq!(Command::parse("REGISTER a b"), Err(CommandError::BadArity));
    }

    #[test]
    fn broadcast_needs_text() {
        assert_eq!(Command::parse("BROADCAST"), Err(CommandError::BadArity));
    }

    #[test]
    fn join_and_leave_take_exactly_one_argument() {
        assert_eq!(Command::parse("JOIN"), Err(CommandError::BadArity));
        assert_eq!(Command::parse("JOIN a b"), Err(CommandError::BadArity));
        assert_eq!(Command::parse("LEAVE"), Err(CommandError::BadArity));
        assert_eq!(Command::parse("LEAVE a b"), Err(CommandError::BadArity));
    }

    #[test]
    fn groupcast_needs_group_and_text() {
        assert_eq!(Command::parse("GROUPCAST"), Err(CommandError::BadArity));
        assert_eq!(Command::parse("GROUPCAST team"), Err(CommandError::BadArity));
    }

    #[test]
    fn status_quit_help_ignore_extra_tokens() {
        assert_eq!(Command::parse("STATUS please"), Ok(Some(Command::Status)));
        assert_eq!(Command::parse("QUIT now"), Ok(Some(Command::Quit)));
        assert_eq!(Command::parse("HELP me"), Ok(Some(Command::Help)));
    }
}
