//! Text normalization before an item is shown to reviewers
//!
//! Names on the blacklist, links and platform mentions are replaced with
//! neutral tokens; punctuation and contractions are flattened so reviewers
//! see comparable text.

use flagbot_common::{Error, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

struct Patterns {
    url: Regex,
    custom_emoji: Regex,
    user_mention: Regex,
    role_mention: Regex,
    channel_mention: Regex,
    non_word: Regex,
    whitespace: Regex,
}

static PATTERNS: Lazy<Patterns> = Lazy::new(|| Patterns {
    url: Regex::new(r"https?://(?:[a-zA-Z]|[0-9]|[#-_]|[!*\(\),]|(?:%[0-9a-fA-F][0-9a-fA-F]))+")
        .expect("url pattern"),
    custom_emoji: Regex::new(r"<a?:\w{2,32}:\d{15,21}>").expect("emoji pattern"),
    user_mention: Regex::new(r"<@!?\d{15,21}>").expect("user mention pattern"),
    role_mention: Regex::new(r"<@&\d{15,21}>").expect("role mention pattern"),
    channel_mention: Regex::new(r"<#\d{15,21}>").expect("channel mention pattern"),
    non_word: Regex::new(r"\W").expect("non-word pattern"),
    whitespace: Regex::new(r"\s+").expect("whitespace pattern"),
});

/// Applied in order after lowercasing
const CONTRACTIONS: [(&str, &str); 9] = [
    ("what's", "what is"),
    ("'s", ""),
    ("'ve", " have"),
    ("can't", "cannot"),
    ("i'm", "i am"),
    ("'re", " are"),
    ("'d", " would"),
    ("'ll", " will"),
    ("'", ""),
];

/// Token that stands in for a blacklisted phrase
pub const NAME_TOKEN: &str = "__name__";

pub struct TextCleaner {
    blacklist: Vec<Regex>,
}

impl TextCleaner {
    /// Build a cleaner; blacklist phrases match literally, ignoring case
    pub fn new(blacklist: &[String]) -> Result<Self> {
        let blacklist = blacklist
            .iter()
            .filter(|phrase| !phrase.trim().is_empty())
            .map(|phrase| {
                RegexBuilder::new(&regex::escape(phrase))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::InvalidInput(format!("Blacklist phrase {:?}: {}", phrase, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { blacklist })
    }

    /// Normalize `text`; a result of fewer than two words is returned empty
    pub fn clean(&self, text: &str) -> String {
        let mut text = text.to_string();
        for phrase in &self.blacklist {
            text = phrase.replace_all(&text, NAME_TOKEN).into_owned();
        }

        let patterns = &*PATTERNS;
        let mut text = text.to_lowercase();
        text = patterns.url.replace_all(&text, "__url__").into_owned();
        text = patterns.custom_emoji.replace_all(&text, "").into_owned();
        text = patterns.user_mention.replace_all(&text, "__user__").into_owned();
        text = patterns.role_mention.replace_all(&text, "__role__").into_owned();
        text = patterns.channel_mention.replace_all(&text, "__channel__").into_owned();

        for (from, to) in CONTRACTIONS {
            text = text.replace(from, to);
        }

        text = patterns.non_word.replace_all(&text, " ").into_owned();
        text = patterns.whitespace.replace_all(&text, " ").into_owned();
        let text = text.trim();

        if text.split_whitespace().count() > 1 {
            text.to_string()
        } else {
            String::new()
        }
    }
}
