//! IETF (BCP 47) language tags as they appear in subtitle file names, e.g.
//! `show.en-US.ass`, and their ISO 639 three-letter codes for ffmpeg.

use isolang::Language;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LanguageError {
    #[error("not a language tag: {0}")]
    Invalid(String),
    #[error("language tag {0} has no three-letter code")]
    NoAlpha3(String),
}

/// A syntactically valid tag whose primary language subtag is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageTag {
    tag: String,
    language: String,
}

impl LanguageTag {
    pub fn parse(tag: &str) -> Result<Self, LanguageError> {
        let language = primary_subtag(tag).ok_or_else(|| LanguageError::Invalid(tag.to_string()))?;
        if !is_known_language(&language) {
            return Err(LanguageError::Invalid(tag.to_string()));
        }
        Ok(Self {
            tag: tag.to_string(),
            language,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// Lower-cased primary language subtag (`en` for `en-US`).
    pub fn language(&self) -> &str {
        &self.language
    }

    /// ISO 639-3 code, e.g. `eng` for `en-US` and `jpn` for `ja`.
    pub fn to_alpha3(&self) -> Result<&'static str, LanguageError> {
        lookup(&self.language)
            .map(|lang| lang.to_639_3())
            .ok_or_else(|| LanguageError::NoAlpha3(self.tag.clone()))
    }
}

pub fn is_valid(tag: &str) -> bool {
    LanguageTag::parse(tag).is_ok()
}

fn lookup(language: &str) -> Option<Language> {
    match language.len() {
        2 => Language::from_639_1(language),
        3 => Language::from_639_3(language),
        _ => None,
    }
}

/// `qaa`..`qtz` are reserved for local use: valid, but never mapped.
fn is_private_use(language: &str) -> bool {
    let bytes = language.as_bytes();
    bytes.len() == 3 && bytes[0] == b'q' && (b'a'..=b't').contains(&bytes[1])
}

fn is_known_language(language: &str) -> bool {
    lookup(language).is_some() || is_private_use(language)
}

/// Checks the tag's shape and returns its primary language subtag.
///
/// Accepted: `language(-extlang){0,3}(-script)?(-region)?(-variant)*
/// (-extension)*(-x-private)?`. Grandfathered and private-use-only tags are
/// rejected since neither names a language ffmpeg understands.
fn primary_subtag(tag: &str) -> Option<String> {
    let subtags: Vec<&str> = tag.split('-').collect();
    if subtags.iter().any(|part| part.is_empty() || part.len() > 8) {
        return None;
    }
    let mut parts = subtags.iter().map(|part| part.to_ascii_lowercase()).peekable();

    let language = parts.next()?;
    if !(2..=3).contains(&language.len()) || !is_alpha(&language) {
        return None;
    }

    let mut extlangs = 0;
    while extlangs < 3
        && parts
            .peek()
            .is_some_and(|part| part.len() == 3 && is_alpha(part))
    {
        parts.next();
        extlangs += 1;
    }
    if parts.peek().is_some_and(|part| part.len() == 4 && is_alpha(part)) {
        parts.next();
    }
    if parts.peek().is_some_and(|part| {
        (part.len() == 2 && is_alpha(part)) || (part.len() == 3 && is_digit(part))
    }) {
        parts.next();
    }
    while parts.peek().is_some_and(|part| is_variant(part)) {
        parts.next();
    }

    while let Some(part) = parts.next() {
        if part == "x" {
            let mut any = false;
            for private in parts.by_ref() {
                if !is_alnum(&private) {
                    return None;
                }
                any = true;
            }
            return any.then_some(language);
        }
        if part.len() != 1 || !is_alnum(&part) {
            return None;
        }
        let mut any = false;
        while parts
            .peek()
            .is_some_and(|next| next.len() >= 2 && is_alnum(next))
        {
            parts.next();
            any = true;
        }
        if !any {
            return None;
        }
    }
    Some(language)
}

fn is_alpha(part: &str) -> bool {
    part.bytes().all(|b| b.is_ascii_alphabetic())
}

fn is_digit(part: &str) -> bool {
    part.bytes().all(|b| b.is_ascii_digit())
}

fn is_alnum(part: &str) -> bool {
    part.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn is_variant(part: &str) -> bool {
    is_alnum(part)
        && ((5..=8).contains(&part.len())
            || (part.len() == 4 && part.as_bytes()[0].is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_subtitle_tags() {
        for tag in ["en", "en-US", "ja", "es-419", "pt-BR", "zh-Hant-TW", "de-CH-1996", "EN-us"] {
            assert!(is_valid(tag), "{tag} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_or_unknown_tags() {
        for tag in ["", "xx", "e", "english", "en-", "-en", "en--US", "x-private", "en-US-x", "S01"] {
            assert!(!is_valid(tag), "{tag} should be invalid");
        }
    }

    #[test]
    fn extensions_and_private_use_parse() {
        assert!(is_valid("en-US-u-ca-gregory"));
        assert!(is_valid("en-x-fansub"));
        assert!(!is_valid("en-u"));
    }

    #[test]
    fn resolves_three_letter_codes() {
        assert_eq!(LanguageTag::parse("en-US").unwrap().to_alpha3(), Ok("eng"));
        assert_eq!(LanguageTag::parse("ja").unwrap().to_alpha3(), Ok("jpn"));
        assert_eq!(LanguageTag::parse("pt-BR").unwrap().to_alpha3(), Ok("por"));
        assert_eq!(LanguageTag::parse("deu").unwrap().to_alpha3(), Ok("deu"));
    }

    #[test]
    fn private_use_language_is_valid_but_unmapped() {
        let tag = LanguageTag::parse("qab").unwrap();
        assert_eq!(tag.language(), "qab");
        assert_eq!(
            tag.to_alpha3(),
            Err(LanguageError::NoAlpha3("qab".to_string()))
        );
    }
}
