use std::sync::OnceLock;

use regex::Regex;

use super::classifier::find_email;
use super::conversation::VisitorInfo;

// Introduction phrase, then one or two capitalized words.
const NAME_PATTERN: &str = r"(?:^|[^\p{L}])(?i:my name is|i am|i'm|je m'appelle|je suis|me llamo|mi nombre es|soy)\s+(\p{Lu}[\p{L}'-]*(?:\s+\p{Lu}[\p{L}'-]*)?)";

/// Pulls a visitor name and email out of free text.
pub fn extract_visitor_info(text: &str) -> VisitorInfo {
    VisitorInfo {
        name: find_name(text),
        email: find_email(text).map(str::to_string),
    }
}

fn find_name(text: &str) -> Option<String> {
    name_pattern()?
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

fn name_pattern() -> Option<&'static Regex> {
    static NAME: OnceLock<Option<Regex>> = OnceLock::new();
    NAME.get_or_init(|| match Regex::new(NAME_PATTERN) {
        Ok(pattern) => Some(pattern),
        Err(error) => {
            tracing::error!(error = %error, "visitor name pattern failed to compile");
            None
        }
    })
    .as_ref()
}
