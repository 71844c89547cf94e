//! Output sanitization.
//!
//! Raw model output goes through an ordered chain of rewrites:
//!
//! | # | Rule | Function |
//! |---|------|----------|
//! | 1 | trim | `str::trim` |
//! | 2 | echoed length constraints | [`strip_length_constraints`] |
//! | 3 | echoed meta-instructions | [`strip_meta_instructions`] |
//! | 4 | leading `answer:` label | [`strip_answer_label`] |
//! | 5 | leading list numbering | [`strip_numbering`] |
//! | 6 | leading greeting filler | [`strip_greeting`] |
//! | 7 | whitespace runs | [`collapse_whitespace`] |
//! | 8 | short `label:` prefix | [`strip_short_label`] |
//! | 9 | first sentence | [`first_sentence`] |
//!
//! Rules 1-8 run in order and repeat until nothing changes (a stripped label
//! can expose a greeting, a stripped greeting can expose numbering); rule 9
//! runs once at the end. Every rule 1-8 either leaves the text alone or
//! shortens it, and none of them can match inside a first-sentence prefix of
//! a text they no longer match, so `sanitize` is idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest label (in chars) dropped by [`strip_short_label`].
pub const LABEL_LEN_MAX: usize = 14;

const CLOSING_QUOTES: &[char] = &['"', '\'', '\u{201D}', '\u{2019}'];

static LENGTH_CONSTRAINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s*\(?\s*(?:<=|≤|<|under|fewer than|less than|at most|no more than|maximum of|max\.?)\s*\d+\s*words?(?:\s*\))?|\s*\(?\s*\d+\s*words?\s+or\s+(?:less|fewer)(?:\s*\))?",
    )
    .expect("length constraint pattern is valid")
});

static META_INSTRUCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*\bdo(?:\s+not|n'?t)\s+mention\b[^.!?]*?\b(?:names?|tokens?)\b[^.!?]*[.!?]?")
        .expect("meta instruction pattern is valid")
});

static ANSWER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^answer\s*:\s*").expect("answer label pattern is valid"));

static NUMBERING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+[.)]\s+)+").expect("numbering pattern is valid"));

static GREETING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:sure|certainly|of course|here['’]?s|well|okay|ok)[,!.:;\s]+(?:-+\s*)?)+")
        .expect("greeting pattern is valid")
});

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}").expect("whitespace pattern is valid"));

/// Rule 2: drop echoed constraints such as `<= 25 words` or `under 20 words`.
pub fn strip_length_constraints(text: &str) -> String {
    LENGTH_CONSTRAINT.replace_all(text, "").into_owned()
}

/// Rule 3: drop clauses like `Do not mention specific token names.`
pub fn strip_meta_instructions(text: &str) -> String {
    META_INSTRUCTION.replace_all(text, "").into_owned()
}

/// Rule 4.
pub fn strip_answer_label(text: &str) -> String {
    ANSWER_LABEL.replace(text, "").into_owned()
}

/// Rule 5: drop one or more leading `1. ` / `2) ` markers.
pub fn strip_numbering(text: &str) -> String {
    NUMBERING.replace(text, "").into_owned()
}

/// Rule 6: drop leading filler (`sure`, `certainly`, `of course`, `here's`,
/// `well`, `okay`, `ok`) followed by punctuation or whitespace.
pub fn strip_greeting(text: &str) -> String {
    GREETING.replace(text, "").into_owned()
}

/// Rule 7.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// Rule 8: if the text before the first label colon is at most
/// `label_len_max` chars, keep only what follows it.
///
/// A label colon is followed by whitespace or ends the text, so times and
/// ratios like `10:30` or `3:1` are never split.
pub fn strip_short_label(text: &str, label_len_max: usize) -> String {
    let Some(idx) = label_colon(text) else {
        return text.to_string();
    };
    if text[..idx].chars().count() <= label_len_max {
        text[idx + 1..].trim().to_string()
    } else {
        text.to_string()
    }
}

fn label_colon(text: &str) -> Option<usize> {
    text.match_indices(':')
        .map(|(idx, _)| idx)
        .find(|&idx| text[idx + 1..].chars().next().map_or(true, char::is_whitespace))
}

/// Rule 9: shortest prefix ending in `.`, `!` or `?` (plus a closing quote
/// if one follows).
///
/// Stricter than a plain "first terminator" cut: the punctuation must be
/// followed by whitespace, a quote, or the end of the text. That keeps `2.5%`
/// whole, but also means `"Sell.Then wait."` has no boundary before `Then`.
/// Without a boundary the text is returned whole.
pub fn first_sentence(text: &str) -> &str {
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = idx + c.len_utf8();
        match chars.peek() {
            None => return &text[..end],
            Some(&(next_idx, next)) if CLOSING_QUOTES.contains(&next) => {
                return &text[..next_idx + next.len_utf8()];
            }
            Some(&(_, next)) if next.is_whitespace() => return &text[..end],
            Some(_) => {}
        }
    }
    text
}

/// The rule chain with its tunable threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    label_len_max: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            label_len_max: LABEL_LEN_MAX,
        }
    }
}

impl Sanitizer {
    pub fn new(label_len_max: usize) -> Self {
        Self { label_len_max }
    }

    /// Run the full chain. An empty result means there was no usable text.
    pub fn sanitize(&self, raw: &str) -> String {
        let mut text = raw.trim().to_string();
        // Terminates: every pass that changes the text shortens it
        loop {
            let next = self.clean_pass(&text);
            if next == text {
                break;
            }
            debug_assert!(next.len() < text.len(), "sanitizer rules must only shorten");
            text = next;
        }
        first_sentence(&text).to_string()
    }

    /// Rules 1-8, once.
    fn clean_pass(&self, text: &str) -> String {
        let text = text.trim();
        let text = strip_length_constraints(text);
        let text = strip_meta_instructions(&text);
        let text = strip_answer_label(&text);
        let text = strip_numbering(&text);
        let text = strip_greeting(&text);
        let text = collapse_whitespace(&text);
        strip_short_label(&text, self.label_len_max)
    }
}

/// Sanitize with the default threshold.
pub fn sanitize(raw: &str) -> String {
    Sanitizer::default().sanitize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tip_sim::{DeterministicRng, CANNED_OUTPUTS};

    #[test]
    fn test_greeting_and_truncation() {
        assert_eq!(
            sanitize("Sure, buy low. Extra trailing clause here."),
            "buy low."
        );
    }

    #[test]
    fn test_numbering() {
        assert_eq!(
            sanitize("1. Diversify your holdings. 2. Avoid leverage."),
            "Diversify your holdings."
        );
        assert_eq!(strip_numbering("1) 2. Hold."), "Hold.");
        assert_eq!(strip_numbering("3.5% is a lot"), "3.5% is a lot");
    }

    #[test]
    fn test_short_label() {
        assert_eq!(
            sanitize("Tip: Use a stop-loss order."),
            "Use a stop-loss order."
        );
        // Label longer than the threshold stays
        assert_eq!(
            sanitize("The most important rule: never chase pumps."),
            "The most important rule: never chase pumps."
        );
        assert_eq!(strip_short_label("Tip: x", 2), "Tip: x");
    }

    #[test]
    fn test_times_and_ratios_survive() {
        assert_eq!(sanitize("Time: 10:30 is best."), "10:30 is best.");
        assert_eq!(sanitize("Use 3:1 reward to risk."), "Use 3:1 reward to risk.");
        assert_eq!(sanitize("Sell at 10:30 sharp."), "Sell at 10:30 sharp.");
        assert_eq!(strip_short_label("Ratio 3:1: keep it.", 14), "keep it.");
    }

    #[test]
    fn test_stacked_labels_fully_stripped() {
        let raw = format!("{}Buy low.", "a: ".repeat(40));
        assert_eq!(sanitize(&raw), "Buy low.");

        let glued = format!("{}Buy low.", "a:".repeat(40));
        let once = sanitize(&glued);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn test_length_constraints() {
        assert_eq!(
            strip_length_constraints("Hold stablecoins (<= 25 words) during drawdowns."),
            "Hold stablecoins during drawdowns."
        );
        assert_eq!(
            strip_length_constraints("Rebalance monthly under 20 words please."),
            "Rebalance monthly please."
        );
        assert_eq!(
            strip_length_constraints("Be brief, 25 words or less."),
            "Be brief,."
        );
    }

    #[test]
    fn test_meta_instructions() {
        assert_eq!(
            strip_meta_instructions("Do not mention specific token names. Take profits in stages."),
            " Take profits in stages."
        );
        assert_eq!(
            sanitize("Don't mention any coin names! Size positions by risk, not conviction."),
            "Size positions by risk, not conviction."
        );
    }

    #[test]
    fn test_answer_label_and_greetings() {
        assert_eq!(sanitize("Answer: Sure! Check liquidity first."), "Check liquidity first.");
        assert_eq!(sanitize("Okay - set alerts instead of watching charts."), "set alerts instead of watching charts.");
        assert_eq!(sanitize("Here's a tip: journal every trade."), "journal every trade.");
        assert_eq!(
            sanitize("Sure, okay, 1. Take partial profits."),
            "Take partial profits."
        );
        // Not a greeting: no punctuation or space after "Well"
        assert_eq!(
            strip_greeting("Well-known exchanges still get hacked."),
            "Well-known exchanges still get hacked."
        );
    }

    #[test]
    fn test_whitespace_collapse() {
        assert_eq!(collapse_whitespace("  Buy   the \n\n dip  "), "Buy the dip");
    }

    #[test]
    fn test_first_sentence_boundaries() {
        assert_eq!(first_sentence("Keep 2.5% in cash. Then wait."), "Keep 2.5% in cash.");
        assert_eq!(first_sentence("He said \"sell.\" Then left."), "He said \"sell.\"");
        assert_eq!(first_sentence("Why wait? Act."), "Why wait?");
        assert_eq!(first_sentence("no boundary here"), "no boundary here");
        assert_eq!(
            first_sentence("Use stop-losses.Always size small."),
            "Use stop-losses.Always size small."
        );
        assert_eq!(first_sentence(""), "");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   \n "), "");
        assert_eq!(sanitize("Sure, "), "");
        assert_eq!(sanitize("Tip:"), "");
    }

    #[test]
    fn test_idempotent_on_canned_outputs() {
        for raw in CANNED_OUTPUTS {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_idempotent_on_random_compositions() {
        const FRAGMENTS: &[&str] = &[
            "Sure, ", "ok ", "Well. ", "1. ", "2) ", "Tip: ", "Answer: ", "Note:", "(<= 25 words) ",
            "under 10 words", "Do not mention token names. ", "Buy low.", " Sell high!", "  ",
            "\n", "Why? ", "2.5% ", "\"Hold.\" ", "a very long label here: ", "keep going", ":",
            "Certainly! ", "here’s ", "- ", "a:", "a: ", "10:30 ", "3:1",
        ];

        let mut rng = DeterministicRng::new(2024);
        for _ in 0..5000 {
            let parts = rng.gen_range(1..8);
            let raw: String = (0..parts)
                .map(|_| *rng.choose(FRAGMENTS).unwrap())
                .collect();
            let once = sanitize(&raw);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", raw);
        }

        for count in [31, 32, 33, 40, 100] {
            for label in ["a:", "a: ", "Tip: ", "Sure, Tip: "] {
                let raw = format!("{}Buy low.", label.repeat(count));
                let once = sanitize(&raw);
                assert_eq!(sanitize(&once), once, "not idempotent for {:?}", raw);
            }
        }
    }

    #[test]
    fn test_custom_label_threshold() {
        let sanitizer = Sanitizer::new(30);
        assert_eq!(
            sanitizer.sanitize("The most important rule: never chase pumps."),
            "never chase pumps."
        );
    }
}
