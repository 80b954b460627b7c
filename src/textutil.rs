pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

pub fn join_tokens(tokens: &[String]) -> String {
    tokens.join(" ")
}

/// Joined sentence for console display, case-folded when the target
/// vocabulary is lowercased.
pub fn display_sentence(tokens: &[String], lowercase: bool) -> String {
    let sent = join_tokens(tokens);
    if lowercase {
        sent.to_lowercase()
    } else {
        sent
    }
}
