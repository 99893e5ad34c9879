//! Two-locale language detection by script.

/// Reply language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    Ru,
    Et,
}

impl Locale {
    /// Map a Telegram `language_code` (e.g. "ru", "et-EE") to a locale.
    pub fn from_language_code(code: Option<&str>) -> Option<Self> {
        let code = code?.to_ascii_lowercase();
        if code.starts_with("ru") {
            Some(Locale::Ru)
        } else if code.starts_with("et") {
            Some(Locale::Et)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Ru => "ru",
            Locale::Et => "et",
        }
    }
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}

/// `Ru` if the text has any Cyrillic letter, otherwise `Et`.
pub fn detect(text: &str) -> Locale {
    if text.chars().any(is_cyrillic) {
        Locale::Ru
    } else {
        Locale::Et
    }
}
