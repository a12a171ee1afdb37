use crate::models::{Category, ChangelogEntry};

/// A generated line that did not follow the `<category>: <description>` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub batch_index: usize,
    pub line_number: usize,
    pub line: String,
    pub reason: &'static str,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "batch {} line {}: {} ({:?})",
            self.batch_index + 1,
            self.line_number,
            self.reason,
            self.line
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub entries: Vec<ChangelogEntry>,
    pub warnings: Vec<ParseWarning>,
}

pub fn parse_llm_response(response: &str, batch_index: usize) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();

    for (line_index, raw) in response.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }

        match parse_line(line) {
            Ok((category, description, commits)) => {
                match ChangelogEntry::new(category, description, commits, (batch_index, line_index)) {
                    Some(entry) => parsed.entries.push(entry),
                    None => parsed.warnings.push(warning(batch_index, line_index, raw, "empty description")),
                }
            }
            Err(reason) => parsed.warnings.push(warning(batch_index, line_index, raw, reason)),
        }
    }

    parsed
}

fn warning(batch_index: usize, line_index: usize, line: &str, reason: &'static str) -> ParseWarning {
    ParseWarning {
        batch_index,
        line_number: line_index + 1,
        line: line.to_string(),
        reason,
    }
}

fn parse_line(line: &str) -> Result<(Category, &str, Vec<String>), &'static str> {
    let line = strip_list_marker(line);
    let Some((head, rest)) = line.split_once(':') else {
        return Err("missing category separator");
    };

    let head = head.trim().trim_matches(|c| matches!(c, '*' | '_' | '`' | '[' | ']'));
    let (head, breaking) = match head.strip_suffix('!') {
        Some(stripped) => (stripped, true),
        None => (head, false),
    };
    // Tolerate conventional-commit style scopes such as `fix(api)`
    let head = match head.find('(') {
        Some(paren) if head.ends_with(')') => &head[..paren],
        _ => head,
    };
    let category = Category::from_label(head).ok_or("unknown category")?;
    let category = if breaking { Category::Breaking } else { category };

    let rest = rest.trim().trim_start_matches(['*', '_']).trim();
    let (description, commits) = split_commit_refs(rest);
    Ok((category, description, commits))
}

fn strip_list_marker(line: &str) -> &str {
    for marker in ["- ", "* ", "• ", "+ "] {
        if let Some(stripped) = line.strip_prefix(marker) {
            return stripped.trim_start();
        }
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let after = &line[digits..];
        if let Some(stripped) = after.strip_prefix(". ").or_else(|| after.strip_prefix(") ")) {
            return stripped.trim_start();
        }
    }

    line
}

/// Splits a trailing `[abc1234, def5678]` or `(abc1234)` list off the text.
fn split_commit_refs(text: &str) -> (&str, Vec<String>) {
    for (open, close) in [('[', ']'), ('(', ')')] {
        if !text.ends_with(close) {
            continue;
        }
        let Some(start) = text.rfind(open) else {
            continue;
        };

        let inner = &text[start + 1..text.len() - 1];
        let refs: Vec<String> = inner
            .split(',')
            .map(|r| r.trim().trim_matches('`').to_string())
            .collect();

        if !refs.is_empty() && refs.iter().all(|r| is_commit_ref(r)) {
            return (text[..start].trim_end(), refs);
        }
    }

    (text, Vec::new())
}

/// Full-length short hashes, or shorter abbreviations that contain a hex
/// letter so years and issue numbers are not mistaken for refs.
fn is_commit_ref(candidate: &str) -> bool {
    if !(4..=40).contains(&candidate.len()) || !candidate.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    candidate.len() >= 7 || candidate.chars().any(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_lines() {
        let input = "feature: Add OAuth login [abc1234, def5678]\nfix: Resolve crash on startup [0123abc]\nchore: Update dependencies";
        let parsed = parse_llm_response(input, 0);

        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.entries.len(), 3);
        assert_eq!(parsed.entries[0].category, Category::Feature);
        assert_eq!(parsed.entries[0].description, "Add OAuth login");
        assert_eq!(parsed.entries[0].commits, vec!["abc1234", "def5678"]);
        assert_eq!(parsed.entries[1].category, Category::Fix);
        assert_eq!(parsed.entries[2].commits, Vec::<String>::new());
        assert_eq!(parsed.entries[2].position, (0, 2));
    }

    #[test]
    fn test_parse_tolerates_markdown_decoration() {
        let input = "```\n- **feature**: Dark mode (abc1234)\n2. Fix: Handle empty config\n* breaking: Drop Python 3.7\n```";
        let parsed = parse_llm_response(input, 1);

        assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
        let categories: Vec<_> = parsed.entries.iter().map(|e| e.category).collect();
        assert_eq!(categories, vec![Category::Feature, Category::Fix, Category::Breaking]);
        assert_eq!(parsed.entries[0].description, "Dark mode");
        assert_eq!(parsed.entries[0].commits, vec!["abc1234"]);
    }

    #[test]
    fn test_malformed_lines_become_warnings() {
        let input = "Here are your entries:\nfeature: Search\nsummary: nothing\nfix:   \n## Bug Fixes";
        let parsed = parse_llm_response(input, 3);

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].description, "Search");

        let reasons: Vec<_> = parsed.warnings.iter().map(|w| (w.line_number, w.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (1, "unknown category"),
                (3, "unknown category"),
                (4, "empty description"),
                (5, "missing category separator"),
            ]
        );
        assert!(parsed.warnings.iter().all(|w| w.batch_index == 3));
    }

    #[test]
    fn test_non_hash_brackets_stay_in_description() {
        let parsed = parse_llm_response("feature: Support [beta] flags", 0);
        assert_eq!(parsed.entries[0].description, "Support [beta] flags");
        assert!(parsed.entries[0].commits.is_empty());
    }

    #[test]
    fn test_numeric_parenthetical_is_not_a_commit_ref() {
        let parsed = parse_llm_response("fix: Handle leap year (2024)\nfix: Handle leap day (2024) [abc1234]", 0);
        assert_eq!(parsed.entries[0].description, "Handle leap year (2024)");
        assert!(parsed.entries[0].commits.is_empty());
        assert_eq!(parsed.entries[1].description, "Handle leap day (2024)");
        assert_eq!(parsed.entries[1].commits, vec!["abc1234"]);

        let short = parse_llm_response("chore: Bump deps (ab12)", 0);
        assert_eq!(short.entries[0].commits, vec!["ab12"]);
    }

    #[test]
    fn test_scoped_category() {
        let parsed = parse_llm_response("fix(api): Return 404 for missing users\nfeat(cli)!: Rename --out", 0);
        assert_eq!(parsed.entries[0].category, Category::Fix);
        assert_eq!(parsed.entries[1].category, Category::Breaking);
    }
}
