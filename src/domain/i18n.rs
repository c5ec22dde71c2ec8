//! Locale negotiation and translation lookup
//!
//! Content rows (projects, developers, layouts, amenities) keep one translation
//! row per locale. Readers ask for a locale and get the best available text:
//! exact tag, then the base language, then the platform default, then whatever
//! exists first.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::ACCEPT_LANGUAGE, request::Parts},
};
use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::Hash;
use std::sync::Arc;

use crate::app::AppState;
use crate::error::ApiError;

/// Anything stored per locale
pub trait Localized {
    fn locale(&self) -> &str;
}

/// Lowercase a tag and use `-` as the subtag separator
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_lowercase()
}

/// Primary language subtag: `pt-br` -> `pt`
pub fn base_language(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

/// Syntactic check for a BCP 47-ish tag such as `en`, `pt-br`, `zh-hant`
pub fn is_valid_tag(tag: &str) -> bool {
    let mut parts = tag.split('-');
    let Some(lang) = parts.next() else {
        return false;
    };
    let lang_ok = (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_lowercase());
    lang_ok
        && parts.all(|p| (2..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Pick the best translation for `locale`.
pub fn resolve<'a, T: Localized>(items: &'a [T], locale: &str, default_locale: &str) -> Option<&'a T> {
    let wanted = normalize_tag(locale);
    let wanted_base = base_language(&wanted);

    items
        .iter()
        .find(|t| normalize_tag(t.locale()) == wanted)
        .or_else(|| {
            items
                .iter()
                .find(|t| base_language(&normalize_tag(t.locale())) == wanted_base)
        })
        .or_else(|| {
            let default = normalize_tag(default_locale);
            items.iter().find(|t| normalize_tag(t.locale()) == default)
        })
        .or_else(|| items.first())
}

/// Group translation rows fetched for many parents with one `= ANY($1)` query
pub fn group_by_parent<K, T>(rows: Vec<T>, parent: impl Fn(&T) -> K) -> HashMap<K, Vec<T>>
where
    K: Eq + Hash,
{
    let mut grouped: HashMap<K, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(parent(&row)).or_default().push(row);
    }
    grouped
}

/// Choose the response locale from an explicit `?locale=` value, then the
/// `Accept-Language` header (by q-value), then the default.
pub fn negotiate(
    explicit: Option<&str>,
    accept_language: Option<&str>,
    supported: &[String],
    default_locale: &str,
) -> String {
    let match_supported = |tag: &str| -> Option<String> {
        let tag = normalize_tag(tag);
        if supported.iter().any(|s| *s == tag) {
            return Some(tag);
        }
        let base = base_language(&tag);
        supported.iter().find(|s| s.as_str() == base).cloned()
    };

    if let Some(found) = explicit.and_then(|tag| match_supported(tag)) {
        return found;
    }

    if let Some(header) = accept_language {
        let mut ranges: Vec<(&str, f32)> = header
            .split(',')
            .filter_map(|part| {
                let mut pieces = part.trim().split(';');
                let tag = pieces.next()?.trim();
                if tag.is_empty() || tag == "*" {
                    return None;
                }
                let q = pieces
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                (q > 0.0).then_some((tag, q))
            })
            .collect();
        // stable: equal weights keep header order
        ranges.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        if let Some(found) = ranges.into_iter().find_map(|(tag, _)| match_supported(tag)) {
            return found;
        }
    }

    default_locale.to_string()
}

/// Negotiated locale for the current request
#[derive(Debug, Clone)]
pub struct Locale {
    pub tag: String,
    pub default: String,
}

impl Locale {
    pub fn pick<'a, T: Localized>(&self, items: &'a [T]) -> Option<&'a T> {
        resolve(items, &self.tag, &self.default)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Locale {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let explicit = parts.uri.query().and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "locale")
                .map(|(_, v)| v.into_owned())
        });
        let accept = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok());

        let settings = &state.settings;
        Ok(Locale {
            tag: negotiate(
                explicit.as_deref(),
                accept,
                &settings.supported_locales,
                &settings.default_locale,
            ),
            default: settings.default_locale.clone(),
        })
    }
}

/// Validate a locale path segment for translation writes
pub fn checked_locale(raw: &str, supported: &[String]) -> Result<String, ApiError> {
    let tag = normalize_tag(raw);
    if !is_valid_tag(&tag) {
        return Err(ApiError::bad_request(format!("'{raw}' is not a valid locale tag")));
    }
    if !supported.iter().any(|s| *s == tag) {
        return Err(ApiError::bad_request(format!(
            "Locale '{tag}' is not enabled (supported: {})",
            supported.join(", ")
        )));
    }
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct T(&'static str, &'static str);

    impl Localized for T {
        fn locale(&self) -> &str {
            self.0
        }
    }

    fn items() -> Vec<T> {
        vec![T("ru", "Привет"), T("en", "Hello"), T("de-AT", "Servus")]
    }

    #[test]
    fn exact_match_wins() {
        assert_eq!(resolve(&items(), "de-at", "en").unwrap().1, "Servus");
        assert_eq!(resolve(&items(), "RU", "en").unwrap().1, "Привет");
    }

    #[test]
    fn base_language_fallback() {
        assert_eq!(resolve(&items(), "en-GB", "ru").unwrap().1, "Hello");
        assert_eq!(resolve(&items(), "de", "en").unwrap().1, "Servus");
    }

    #[test]
    fn default_then_first_fallback() {
        assert_eq!(resolve(&items(), "fr", "en").unwrap().1, "Hello");
        assert_eq!(resolve(&items(), "fr", "it").unwrap().1, "Привет");
        assert!(resolve::<T>(&[], "en", "en").is_none());
    }

    #[test]
    fn negotiation_prefers_explicit_then_weighted_header() {
        let supported = vec!["en".to_string(), "de".to_string(), "ru".to_string()];
        assert_eq!(negotiate(Some("ru"), Some("de"), &supported, "en"), "ru");
        assert_eq!(negotiate(Some("xx"), Some("de-CH, en;q=0.5"), &supported, "en"), "de");
        assert_eq!(negotiate(None, Some("fr;q=1, ru;q=0.4, en;q=0.9"), &supported, "de"), "en");
        assert_eq!(negotiate(None, Some("*, fr"), &supported, "de"), "de");
        assert_eq!(negotiate(None, Some("ru;q=0"), &supported, "en"), "en");
    }

    #[test]
    fn grouping_keeps_row_order() {
        let grouped = group_by_parent(vec![(1, "a"), (2, "b"), (1, "c")], |r| r.0);
        assert_eq!(grouped[&1], vec![(1, "a"), (1, "c")]);
        assert_eq!(grouped[&2].len(), 1);
    }

    #[test]
    fn tag_validation() {
        assert!(is_valid_tag("en"));
        assert!(is_valid_tag("pt-br"));
        assert!(is_valid_tag("zh-hant"));
        assert!(!is_valid_tag("english"));
        assert!(!is_valid_tag("e"));
        assert!(!is_valid_tag("en-"));
        assert_eq!(normalize_tag(" pt_BR "), "pt-br");
    }

    #[test]
    fn checked_locale_requires_supported() {
        let supported = vec!["en".to_string(), "de".to_string()];
        assert_eq!(checked_locale("DE", &supported).unwrap(), "de");
        assert!(checked_locale("ru", &supported).is_err());
        assert!(checked_locale("not a tag", &supported).is_err());
    }
}
