//! Interactive redaction of one item

use regex::{NoExpand, RegexBuilder};
use serde::Serialize;

/// Placeholder left where a searched phrase was cut out
pub const REDACTION_MARKER: &str = "__redacted__";

/// What the session is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeMode {
    /// A phrase to cut out of the working content
    Search,
    /// Text to put where the marker is
    Replace,
    /// A complete replacement of the working content
    Rewrite,
}

/// Effect of one input on the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeStep {
    /// `cancel`: working content restored
    Reset,
    /// `rewrite`: waiting for the full new text
    Rewriting,
    /// Working content replaced wholesale
    Rewritten,
    /// Phrase found and swapped for the marker
    Marked,
    /// Marker substituted with the given text
    Replaced,
    /// Phrase does not occur in the working content
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizeSession {
    review_item_id: i64,
    original: String,
    working: String,
    mode: SanitizeMode,
}

impl SanitizeSession {
    pub fn new(review_item_id: i64, content: impl Into<String>) -> Self {
        let original = content.into();
        Self {
            review_item_id,
            working: original.clone(),
            original,
            mode: SanitizeMode::Search,
        }
    }

    pub fn review_item_id(&self) -> i64 {
        self.review_item_id
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn working(&self) -> &str {
        &self.working
    }

    pub fn mode(&self) -> SanitizeMode {
        self.mode
    }

    /// Feed one line of reviewer input
    pub fn apply(&mut self, input: &str) -> SanitizeStep {
        let input = input.trim();

        if input.eq_ignore_ascii_case("cancel") {
            self.working = self.original.clone();
            self.mode = SanitizeMode::Search;
            return SanitizeStep::Reset;
        }
        if input.eq_ignore_ascii_case("rewrite") {
            self.mode = SanitizeMode::Rewrite;
            return SanitizeStep::Rewriting;
        }

        match self.mode {
            SanitizeMode::Rewrite => {
                self.working = input.to_string();
                self.mode = SanitizeMode::Search;
                SanitizeStep::Rewritten
            }
            SanitizeMode::Replace => {
                self.working = self.working.replace(REDACTION_MARKER, input);
                self.mode = SanitizeMode::Search;
                SanitizeStep::Replaced
            }
            SanitizeMode::Search => {
                if input.is_empty() {
                    return SanitizeStep::NotFound;
                }
                // Matched literally, ignoring case on both sides
                let Ok(phrase) = RegexBuilder::new(&regex::escape(input))
                    .case_insensitive(true)
                    .build()
                else {
                    return SanitizeStep::NotFound;
                };
                if !phrase.is_match(&self.working) {
                    return SanitizeStep::NotFound;
                }
                self.working = phrase
                    .replace_all(&self.working, NoExpand(REDACTION_MARKER))
                    .into_owned();
                self.mode = SanitizeMode::Replace;
                SanitizeStep::Marked
            }
        }
    }

    /// Heading and instruction shown with the working content
    pub fn prompt(&self, last_step: Option<SanitizeStep>) -> (&'static str, &'static str) {
        let title = match last_step {
            Some(SanitizeStep::NotFound) => "Not found, try again",
            _ if self.mode == SanitizeMode::Rewrite => "Rewriting",
            _ => "Sanitize message",
        };
        let instruction = match self.mode {
            SanitizeMode::Search => "Type the word or phrase you wish to replace.",
            SanitizeMode::Replace => "Type the text to put in its place.",
            SanitizeMode::Rewrite => "Type the new message.",
        };
        (title, instruction)
    }

    /// Full text of the sanitize view
    pub fn render(&self, last_step: Option<SanitizeStep>) -> String {
        let (title, instruction) = self.prompt(last_step);
        format!("{}\n\n{}\n\n{}", title, self.working, instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_then_replace() {
        let mut session = SanitizeSession::new(1, "tell bob he is an idiot");

        assert_eq!(session.apply("Bob"), SanitizeStep::Marked);
        assert_eq!(session.mode(), SanitizeMode::Replace);
        assert_eq!(session.working(), "tell __redacted__ he is an idiot");

        assert_eq!(session.apply("__name__"), SanitizeStep::Replaced);
        assert_eq!(session.mode(), SanitizeMode::Search);
        assert_eq!(session.working(), "tell __name__ he is an idiot");
    }

    #[test]
    fn test_search_ignores_case_of_content_and_input() {
        let mut session = SanitizeSession::new(1, "Call Alice Now");
        assert_eq!(session.apply("alice"), SanitizeStep::Marked);
        assert_eq!(session.working(), "Call __redacted__ Now");

        session.apply("rewrite");
        session.apply("Tell Bob hi, BOB");
        assert_eq!(session.apply("Bob"), SanitizeStep::Marked);
        assert_eq!(session.working(), "Tell __redacted__ hi, __redacted__");

        assert_eq!(session.apply("Carol"), SanitizeStep::Replaced);
        assert_eq!(session.apply("carol"), SanitizeStep::Marked);
    }

    #[test]
    fn test_search_phrase_is_literal() {
        let mut session = SanitizeSession::new(1, "costs $5 (maybe)");
        assert_eq!(session.apply("$5 (maybe)"), SanitizeStep::Marked);
        assert_eq!(session.working(), "costs __redacted__");
        assert_eq!(session.apply("$1"), SanitizeStep::Replaced);
        assert_eq!(session.working(), "costs $1");
    }

    #[test]
    fn test_search_miss_stays_in_search() {
        let mut session = SanitizeSession::new(1, "some text");
        assert_eq!(session.apply("absent"), SanitizeStep::NotFound);
        assert_eq!(session.apply("   "), SanitizeStep::NotFound);
        assert_eq!(session.mode(), SanitizeMode::Search);
        assert_eq!(session.working(), "some text");
    }

    #[test]
    fn test_rewrite_replaces_everything() {
        let mut session = SanitizeSession::new(1, "original words");
        assert_eq!(session.apply("REWRITE"), SanitizeStep::Rewriting);
        assert_eq!(session.mode(), SanitizeMode::Rewrite);

        assert_eq!(session.apply("completely new"), SanitizeStep::Rewritten);
        assert_eq!(session.mode(), SanitizeMode::Search);
        assert_eq!(session.working(), "completely new");
        assert_eq!(session.original(), "original words");
    }

    #[test]
    fn test_cancel_restores_original_from_any_mode() {
        let mut session = SanitizeSession::new(1, "call alice now");
        session.apply("alice");
        assert_eq!(session.mode(), SanitizeMode::Replace);

        assert_eq!(session.apply("Cancel"), SanitizeStep::Reset);
        assert_eq!(session.mode(), SanitizeMode::Search);
        assert_eq!(session.working(), "call alice now");

        session.apply("rewrite");
        assert_eq!(session.apply("cancel"), SanitizeStep::Reset);
        assert_eq!(session.mode(), SanitizeMode::Search);
    }

    #[test]
    fn test_render_reflects_mode() {
        let mut session = SanitizeSession::new(1, "text");
        assert!(session.render(None).starts_with("Sanitize message"));

        let step = session.apply("nope");
        assert!(session.render(Some(step)).starts_with("Not found"));

        session.apply("rewrite");
        assert!(session.render(None).ends_with("Type the new message."));
    }
}
