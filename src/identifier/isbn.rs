//! ISBN-10 / ISBN-13 value object with checksum validation and conversion.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::Serialize;

use super::error::{IdentifierError, IdentifierKind};

/// Which of the two ISBN layouts a value uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IsbnFormat {
    /// 9 digits plus a mod-11 check character (`0-9` or `X`).
    Isbn10,
    /// `978`/`979` prefix plus 10 digits, mod-10 check digit.
    Isbn13,
}

/// A validated ISBN.
///
/// Two ISBNs compare equal (and hash equally) when their ISBN-13 forms match, so an
/// ISBN-10 and its ISBN-13 counterpart are interchangeable as map keys.
#[derive(Debug, Clone, Serialize)]
pub struct Isbn {
    value: String,
    format: IsbnFormat,
}

impl Isbn {
    /// Parses an ISBN, stripping hyphens and whitespace and uppercasing `x`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidFormat`] for the wrong length or characters and
    /// [`IdentifierError::InvalidChecksum`] when the check digit does not match.
    ///
    /// # Examples
    ///
    /// ```
    /// use consearch_core::identifier::Isbn;
    ///
    /// let isbn = Isbn::parse("978-0-13-409341-3").unwrap();
    /// assert_eq!(isbn.value(), "9780134093413");
    /// assert_eq!(isbn.to_isbn10().unwrap().value(), "0134093410");
    /// ```
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let normalized = normalize_isbn_chars(raw);
        match normalized.chars().count() {
            10 => Self::from_isbn10(normalized),
            13 => Self::from_isbn13(normalized),
            other => Err(IdentifierError::invalid_format(
                IdentifierKind::Isbn,
                raw,
                format!("expected 10 or 13 characters after removing separators, found {other}"),
            )),
        }
    }

    fn from_isbn10(value: String) -> Result<Self, IdentifierError> {
        if !is_isbn10_shape(&value) {
            return Err(IdentifierError::invalid_format(
                IdentifierKind::Isbn10,
                &value,
                "expected 9 digits followed by a digit or X",
            ));
        }
        if isbn10_weighted_sum(&value) % 11 != 0 {
            return Err(IdentifierError::invalid_checksum(IdentifierKind::Isbn10, &value));
        }
        Ok(Self {
            value,
            format: IsbnFormat::Isbn10,
        })
    }

    fn from_isbn13(value: String) -> Result<Self, IdentifierError> {
        if !is_isbn13_shape(&value) {
            return Err(IdentifierError::invalid_format(
                IdentifierKind::Isbn13,
                &value,
                "expected 13 digits starting with 978 or 979",
            ));
        }
        if isbn13_weighted_sum(&value) % 10 != 0 {
            return Err(IdentifierError::invalid_checksum(IdentifierKind::Isbn13, &value));
        }
        Ok(Self {
            value,
            format: IsbnFormat::Isbn13,
        })
    }

    /// Canonical digits (with a trailing `X` for some ISBN-10s).
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Layout of this value.
    #[must_use]
    pub fn format(&self) -> IsbnFormat {
        self.format
    }

    /// Converts to ISBN-13, prepending `978` to the ISBN-10 body.
    #[must_use]
    pub fn to_isbn13(&self) -> Self {
        match self.format {
            IsbnFormat::Isbn13 => self.clone(),
            IsbnFormat::Isbn10 => Self {
                value: isbn10_body_to_isbn13(&self.value[..9]),
                format: IsbnFormat::Isbn13,
            },
        }
    }

    /// Converts to ISBN-10. Only `978`-prefixed ISBN-13s have an ISBN-10 form.
    #[must_use]
    pub fn to_isbn10(&self) -> Option<Self> {
        match self.format {
            IsbnFormat::Isbn10 => Some(self.clone()),
            IsbnFormat::Isbn13 => {
                let body = self.value.strip_prefix("978")?;
                let body = &body[..9];
                Some(Self {
                    value: format!("{body}{}", isbn10_check_char(body)),
                    format: IsbnFormat::Isbn10,
                })
            }
        }
    }

    /// Returns `(isbn10, isbn13)` strings for APIs that accept either form.
    #[must_use]
    pub fn both_forms(&self) -> (Option<String>, String) {
        (
            self.to_isbn10().map(|isbn| isbn.value),
            self.to_isbn13().value,
        )
    }

    fn canonical13(&self) -> String {
        match self.format {
            IsbnFormat::Isbn13 => self.value.clone(),
            IsbnFormat::Isbn10 => isbn10_body_to_isbn13(&self.value[..9]),
        }
    }
}

impl PartialEq for Isbn {
    fn eq(&self, other: &Self) -> bool {
        self.canonical13() == other.canonical13()
    }
}

impl Eq for Isbn {}

impl Hash for Isbn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical13().hash(state);
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for Isbn {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Converts a raw ISBN-10 string to its ISBN-13 form.
///
/// Only the length is checked; the ISBN-10 check digit is discarded and a fresh
/// ISBN-13 check digit is computed.
///
/// # Errors
///
/// Returns [`IdentifierError::InvalidFormat`] when the input is not 10 characters of
/// digits (with an optional trailing `X`).
///
/// # Examples
///
/// ```
/// use consearch_core::identifier::isbn_10_to_13;
///
/// assert_eq!(isbn_10_to_13("0134093410").unwrap(), "9780134093413");
/// ```
pub fn isbn_10_to_13(isbn10: &str) -> Result<String, IdentifierError> {
    let normalized = normalize_isbn_chars(isbn10);
    if !is_isbn10_shape(&normalized) {
        return Err(IdentifierError::invalid_format(
            IdentifierKind::Isbn10,
            isbn10,
            "expected 9 digits followed by a digit or X",
        ));
    }
    Ok(isbn10_body_to_isbn13(&normalized[..9]))
}

/// Converts a raw ISBN-13 string to ISBN-10, or `None` when it has no ISBN-10 form.
///
/// # Examples
///
/// ```
/// use consearch_core::identifier::isbn_13_to_10;
///
/// assert_eq!(isbn_13_to_10("9780134093413").as_deref(), Some("0134093410"));
/// assert_eq!(isbn_13_to_10("9790001000000"), None);
/// ```
#[must_use]
pub fn isbn_13_to_10(isbn13: &str) -> Option<String> {
    let normalized = normalize_isbn_chars(isbn13);
    if normalized.len() != 13 || !normalized.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let body = normalized.strip_prefix("978")?;
    let body = &body[..9];
    Some(format!("{body}{}", isbn10_check_char(body)))
}

fn normalize_isbn_chars(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn is_isbn10_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[..9].iter().all(u8::is_ascii_digit)
        && (bytes[9].is_ascii_digit() || bytes[9] == b'X')
}

fn is_isbn13_shape(value: &str) -> bool {
    value.len() == 13
        && value.bytes().all(|b| b.is_ascii_digit())
        && (value.starts_with("978") || value.starts_with("979"))
}

fn digit_value(b: u8) -> u32 {
    if b == b'X' { 10 } else { u32::from(b - b'0') }
}

fn isbn10_weighted_sum(value: &str) -> u32 {
    value
        .bytes()
        .zip((1..=10).rev())
        .map(|(b, weight)| digit_value(b) * weight)
        .sum()
}

fn isbn13_weighted_sum(value: &str) -> u32 {
    value
        .bytes()
        .enumerate()
        .map(|(i, b)| digit_value(b) * if i % 2 == 0 { 1 } else { 3 })
        .sum()
}

/// `body` must be 9 ASCII digits.
fn isbn10_check_char(body: &str) -> char {
    let total: u32 = body
        .bytes()
        .zip((2..=10).rev())
        .map(|(b, weight)| digit_value(b) * weight)
        .sum();
    match (11 - total % 11) % 11 {
        10 => 'X',
        // Remainder is < 10 here.
        check => char::from_digit(check, 10).unwrap_or('0'),
    }
}

/// `body` must be 9 ASCII digits.
fn isbn10_body_to_isbn13(body: &str) -> String {
    let base = format!("978{body}");
    let check = (10 - isbn13_weighted_sum(&base) % 10) % 10;
    format!("{base}{check}")
}
