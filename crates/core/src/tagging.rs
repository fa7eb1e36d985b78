//! Bracketed-token tag parsing, shared by the catalog (which must keep
//! a file's tag set consistent with its basename) and the rename/tag
//! mutator (which rewrites both sides of that relationship).
//!
//! A basename like `[Action][Comedy] Some Series v01.cbz` carries its
//! tags as `[Tag]` tokens at the front of the name; everything after
//! the last bracketed token is the display title.

/// One bracketed token extracted from a basename, in left-to-right order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketToken {
    pub text: String,
}

/// Split a basename into its leading `[Tag]` tokens and the remaining
/// title text. Tokens must appear contiguously (allowing whitespace
/// between them) at the start of the name; a `[...]` token appearing
/// after plain text is left untouched as part of the title.
pub fn parse_bracket_tokens(basename: &str) -> (Vec<BracketToken>, String) {
    let mut tokens = Vec::new();
    let mut rest = basename.trim_start();

    loop {
        rest = rest.trim_start();
        if !rest.starts_with('[') {
            break;
        }
        let Some(end) = rest.find(']') else { break };
        let inner = &rest[1..end];
        if inner.is_empty() {
            break;
        }
        tokens.push(BracketToken { text: inner.trim().to_string() });
        rest = &rest[end + 1..];
    }

    (tokens, rest.trim_start().to_string())
}

/// Render a title plus tag set back into a basename, in the same
/// `[Tag][Tag] Title` form `parse_bracket_tokens` reads.
pub fn render_bracket_tokens(tags: &[String], title: &str) -> String {
    let mut out = String::new();
    for tag in tags {
        out.push('[');
        out.push_str(tag);
        out.push(']');
    }
    if !tags.is_empty() && !title.is_empty() {
        out.push(' ');
    }
    out.push_str(title);
    out
}

/// Difference between a file's current tag assignments and the tokens
/// parsed from its basename, to drive index resync after a rename or
/// bulk-tag operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagDiff {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute the tag-index delta needed to make `current_tags` match the
/// bracketed tokens in `basename`, case-insensitively.
pub fn diff_against_basename(basename: &str, current_tags: &[String]) -> TagDiff {
    let (tokens, _title) = parse_bracket_tokens(basename);
    let wanted: Vec<String> = tokens.into_iter().map(|t| t.text).collect();

    let wanted_lower: Vec<String> = wanted.iter().map(|t| t.to_lowercase()).collect();
    let current_lower: Vec<String> = current_tags.iter().map(|t| t.to_lowercase()).collect();

    let to_add = wanted
        .iter()
        .zip(wanted_lower.iter())
        .filter(|(_, lower)| !current_lower.contains(lower))
        .map(|(t, _)| t.clone())
        .collect();

    let to_remove = current_tags
        .iter()
        .zip(current_lower.iter())
        .filter(|(_, lower)| !wanted_lower.contains(lower))
        .map(|(t, _)| t.clone())
        .collect();

    TagDiff { to_add, to_remove }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_bracket_tokens() {
        let (tokens, title) = parse_bracket_tokens("[Action][Comedy] Some Series v01.cbz");
        assert_eq!(tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(), vec!["Action", "Comedy"]);
        assert_eq!(title, "Some Series v01.cbz");
    }

    #[test]
    fn no_tokens_yields_whole_name_as_title() {
        let (tokens, title) = parse_bracket_tokens("Some Series v01.cbz");
        assert!(tokens.is_empty());
        assert_eq!(title, "Some Series v01.cbz");
    }

    #[test]
    fn bracket_after_title_text_is_not_a_token() {
        let (tokens, title) = parse_bracket_tokens("Some [Series] v01.cbz");
        assert!(tokens.is_empty());
        assert_eq!(title, "Some [Series] v01.cbz");
    }

    #[test]
    fn render_roundtrips_parse() {
        let basename = "[Action][Comedy] Some Series v01.cbz";
        let (tokens, title) = parse_bracket_tokens(basename);
        let tags: Vec<String> = tokens.into_iter().map(|t| t.text).collect();
        assert_eq!(render_bracket_tokens(&tags, &title), basename);
    }

    #[test]
    fn diff_detects_additions_and_removals() {
        let diff = diff_against_basename(
            "[Action][Drama] Title.cbz",
            &["action".to_string(), "comedy".to_string()],
        );
        assert_eq!(diff.to_add, vec!["Drama".to_string()]);
        assert_eq!(diff.to_remove, vec!["comedy".to_string()]);
    }

    #[test]
    fn diff_is_empty_when_consistent() {
        let diff = diff_against_basename("[Action] Title.cbz", &["Action".to_string()]);
        assert!(diff.is_empty());
    }
}
