//! Language-qualified category identifiers.

use std::fmt;

/// Separator between a raw category id and its language id.
///
/// Raw source ids must not contain it.
pub const CATEGORY_LANGUAGE_SEPARATOR: &str = "_LANG_";

/// A category id with an optional language dimension folded in.
///
/// A source category that exists once per locale is imported once per locale,
/// so `5` in language `2` is keyed as `5_LANG_2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeCategoryKey {
    raw: String,
    language: Option<String>,
}

impl CompositeCategoryKey {
    /// Builds a key from its parts. An empty language means no language.
    #[must_use]
    pub fn new(raw: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            raw: raw.into(),
            language: language.filter(|l| !l.is_empty()).map(str::to_string),
        }
    }

    /// Splits a stored id back into its parts.
    #[must_use]
    pub fn parse(id: &str) -> Self {
        match id.split_once(CATEGORY_LANGUAGE_SEPARATOR) {
            Some((raw, language)) => Self::new(raw, Some(language)),
            None => Self::new(id, None),
        }
    }

    /// Composes the persisted form of `raw` in `language`.
    #[must_use]
    pub fn compose(raw: &str, language: &str) -> String {
        format!("{raw}{CATEGORY_LANGUAGE_SEPARATOR}{language}")
    }

    /// Qualifies `id` with `language` unless it already carries one.
    #[must_use]
    pub fn localize(id: &str, language: Option<&str>) -> String {
        match language.filter(|l| !l.is_empty()) {
            Some(language) if !id.contains(CATEGORY_LANGUAGE_SEPARATOR) => {
                Self::compose(id, language)
            }
            _ => id.to_string(),
        }
    }

    /// Prefix matching every language variant of `raw`.
    #[must_use]
    pub fn language_prefix(raw: &str) -> String {
        format!("{raw}{CATEGORY_LANGUAGE_SEPARATOR}")
    }

    /// Raw source id without the language.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Language id, if any.
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

impl fmt::Display for CompositeCategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.language {
            Some(language) => write!(f, "{}{}{}", self.raw, CATEGORY_LANGUAGE_SEPARATOR, language),
            None => f.write_str(&self.raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compose_then_parse() {
        let id = CompositeCategoryKey::compose("5", "2");
        assert_eq!(id, "5_LANG_2");

        let key = CompositeCategoryKey::parse(&id);
        assert_eq!(key.raw(), "5");
        assert_eq!(key.language(), Some("2"));
        assert_eq!(key.to_string(), id);
    }

    #[test]
    fn test_parse_plain_id() {
        let key = CompositeCategoryKey::parse("17");
        assert_eq!(key.raw(), "17");
        assert_eq!(key.language(), None);
    }

    #[test]
    fn test_localize_leaves_composite_ids_alone() {
        assert_eq!(CompositeCategoryKey::localize("5", Some("2")), "5_LANG_2");
        assert_eq!(CompositeCategoryKey::localize("5_LANG_1", Some("2")), "5_LANG_1");
        assert_eq!(CompositeCategoryKey::localize("5", None), "5");
        assert_eq!(CompositeCategoryKey::localize("5", Some("")), "5");
    }

    #[test]
    fn test_language_prefix() {
        assert_eq!(CompositeCategoryKey::language_prefix("9"), "9_LANG_");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: any raw id free of the separator round-trips with its language
        #[test]
        fn prop_composite_round_trip(raw in "[a-zA-Z0-9-]{1,12}", language in "[0-9]{1,4}") {
            let composed = CompositeCategoryKey::compose(&raw, &language);
            let key = CompositeCategoryKey::parse(&composed);
            prop_assert_eq!(key.raw(), raw.as_str());
            prop_assert_eq!(key.language(), Some(language.as_str()));
        }
    }
}
