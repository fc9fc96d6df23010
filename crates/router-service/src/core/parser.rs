// =============================================================================
// Command text parsing — ports
// `original_source/services/telegram_router/app/core/parser.py`
// =============================================================================

/// Strip a leading `/`, lowercase, drop an `@botname` suffix, and re-prefix
/// with `/`. An empty input stays empty (the caller treats that as "no
/// command", i.e. free text merged into an active session). `bot_username`
/// is accepted for symmetry with the original's signature but unused here —
/// the `@suffix` is stripped unconditionally rather than checked against it.
pub fn normalize_command(raw: &str, _bot_username: Option<&str>) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    let s = s.strip_prefix('/').unwrap_or(s);
    let base = match s.split_once('@') {
        Some((cmd, _at)) => cmd,
        None => s,
    };
    format!("/{}", base.to_ascii_lowercase())
}

/// Shell-like tokenizer: splits on whitespace, honors single and double
/// quotes, collapses repeated whitespace. Falls back to plain whitespace
/// splitting on unbalanced quotes rather than failing the whole command.
pub fn tokenize_args(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => {
                quote = None;
            }
            Some(_) => current.push(c),
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                    in_token = true;
                } else if c.is_whitespace() {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                } else {
                    current.push(c);
                    in_token = true;
                }
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Splits inbound text into `(command, tokens)`. Returns `(None, tokens)`
/// when the text isn't a slash command (the caller merges `tokens` into an
/// active session instead).
pub fn parse_text(text: &str, bot_username: Option<&str>) -> (Option<String>, Vec<String>) {
    let text = text.trim();
    if text.is_empty() {
        return (None, Vec::new());
    }
    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    if !first.starts_with('/') {
        return (None, tokenize_args(text));
    }
    let cmd = normalize_command(first, bot_username);
    let rest = parts.next().unwrap_or("");
    (Some(cmd), tokenize_args(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_slash_and_lowercases() {
        assert_eq!(normalize_command("/Price", None), "/price");
    }

    #[test]
    fn strips_bot_username_suffix() {
        assert_eq!(normalize_command("/price@myportfoliobot", Some("myportfoliobot")), "/price");
    }

    #[test]
    fn tokenizes_quoted_segments() {
        let tokens = tokenize_args(r#"aapl "Apple Inc" 'second co'"#);
        assert_eq!(tokens, vec!["aapl", "Apple Inc", "second co"]);
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(tokenize_args("  a   b  "), vec!["a", "b"]);
    }

    #[test]
    fn plain_text_has_no_command() {
        let (cmd, tokens) = parse_text("aapl nope.us", None);
        assert_eq!(cmd, None);
        assert_eq!(tokens, vec!["aapl", "nope.us"]);
    }

    #[test]
    fn slash_command_splits_rest_into_tokens() {
        let (cmd, tokens) = parse_text("/price aapl sap.xetra", None);
        assert_eq!(cmd.as_deref(), Some("/price"));
        assert_eq!(tokens, vec!["aapl", "sap.xetra"]);
    }
}
