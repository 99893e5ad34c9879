//! Sorts inbound text into greetings, the trigger phrase, questions and the rest.

/// Greetings that get the welcome text, compared case-insensitively.
const GREETINGS: &[&str] = &["привет", "здравствуйте", "добрый день", "tere", "tsau", "hei"];

/// Phrase answered with the image instead of being stored.
const SPECIAL_TRIGGER: &str = "доколе?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Greeting,
    SpecialTrigger,
    Question,
    Unrecognized,
}

/// Classify already-trimmed message text. First matching rule wins.
pub fn classify(text: &str) -> Outcome {
    if text.is_empty() {
        return Outcome::Unrecognized;
    }

    let lower = text.to_lowercase();

    if GREETINGS.contains(&lower.as_str()) {
        return Outcome::Greeting;
    }

    if lower == SPECIAL_TRIGGER {
        return Outcome::SpecialTrigger;
    }

    if text.ends_with('?') {
        return Outcome::Question;
    }

    Outcome::Unrecognized
}
