//! Domain types and DTOs
//!
//! Row types (`sqlx::FromRow`), request DTOs (`validator::Validate`) and
//! response DTOs for the listing platform.

pub mod amenities;
pub mod buildings;
pub mod developers;
pub mod field_mappings;
pub mod i18n;
pub mod imports;
pub mod layouts;
pub mod locations;
pub mod media;
pub mod pricing;
pub mod projects;
pub mod units;

use std::borrow::Cow;
use validator::ValidationError;

/// Text-backed enum stored in a `TEXT` column guarded by a CHECK constraint.
///
/// Generates `as_str`, `FromStr`, `Display` and snake_case serde.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use text_enum;

/// Decode a text column known to hold a valid variant
pub(crate) fn parse_text<T: std::str::FromStr + Default>(raw: &str) -> T {
    raw.parse().unwrap_or_default()
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// URL slugs: lowercase ascii letters, digits and single hyphens, 1..=120 chars
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    let ok = !slug.is_empty()
        && slug.len() <= 120
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--");

    if ok {
        Ok(())
    } else {
        Err(validation_error(
            "slug",
            "must be lowercase letters, digits and single hyphens",
        ))
    }
}

/// ISO 4217 style currency code
pub fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(validation_error("currency", "must be a 3-letter uppercase currency code"))
    }
}

/// Derive a slug from a human title: `"Sea View Residence II"` -> `"sea-view-residence-ii"`.
/// Non-ascii characters are dropped.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug.truncate(120);
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    text_enum! {
        Color { Red => "red", DeepBlue => "deep_blue" } default Red
    }

    #[test]
    fn text_enum_round_trips_names() {
        assert_eq!("deep_blue".parse::<Color>().unwrap(), Color::DeepBlue);
        assert_eq!(Color::DeepBlue.as_str(), "deep_blue");
        assert_eq!(
            serde_json::to_string(&Color::DeepBlue).unwrap(),
            "\"deep_blue\""
        );
        assert!("green".parse::<Color>().is_err());
        assert_eq!(parse_text::<Color>("garbage"), Color::Red);
    }

    #[test]
    fn slug_rules() {
        assert!(validate_slug("sea-view-2").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("Sea-View").is_err());
        assert!(validate_slug("-lead").is_err());
        assert!(validate_slug("double--hyphen").is_err());
        assert!(validate_slug(&"a".repeat(121)).is_err());
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Sea View Residence II "), "sea-view-residence-ii");
        assert_eq!(slugify("Tower #3 / Phase-1"), "tower-3-phase-1");
        assert_eq!(slugify("Жилой комплекс"), "");
    }

    #[test]
    fn currency_codes() {
        assert!(validate_currency("EUR").is_ok());
        assert!(validate_currency("eur").is_err());
        assert!(validate_currency("EURO").is_err());
    }
}
