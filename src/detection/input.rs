//! Input types and detection results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// Kind of query a raw input string represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    /// Digital Object Identifier
    Doi,
    /// 10-character ISBN
    #[serde(rename = "isbn_10")]
    Isbn10,
    /// 13-digit ISBN
    #[serde(rename = "isbn_13")]
    Isbn13,
    /// arXiv preprint identifier
    Arxiv,
    /// PubMed identifier
    Pmid,
    /// URL that did not carry a recognizable identifier
    Url,
    /// Free-text title
    Title,
    /// Free-text bibliographic citation
    Citation,
    /// Nothing could be determined
    Unknown,
}

impl InputType {
    /// All input types, in detection order.
    pub const ALL: [Self; 9] = [
        Self::Doi,
        Self::Arxiv,
        Self::Isbn10,
        Self::Isbn13,
        Self::Pmid,
        Self::Url,
        Self::Citation,
        Self::Title,
        Self::Unknown,
    ];

    /// Stable snake_case name, matching the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doi => "doi",
            Self::Isbn10 => "isbn_10",
            Self::Isbn13 => "isbn_13",
            Self::Arxiv => "arxiv",
            Self::Pmid => "pmid",
            Self::Url => "url",
            Self::Title => "title",
            Self::Citation => "citation",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true for the two ISBN layouts.
    #[must_use]
    pub fn is_isbn(self) -> bool {
        matches!(self, Self::Isbn10 | Self::Isbn13)
    }

    /// Which family of works this input type points at.
    #[must_use]
    pub fn domain(self) -> Domain {
        match self {
            Self::Isbn10 | Self::Isbn13 => Domain::Book,
            Self::Arxiv | Self::Pmid => Domain::Paper,
            _ => Domain::Ambiguous,
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        let wanted = match wanted.as_str() {
            "isbn10" => "isbn_10",
            "isbn13" => "isbn_13",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|input_type| input_type.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                format!("unknown input type '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Family of works a query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// ISBN-identified works
    Book,
    /// arXiv / PubMed-identified works
    Paper,
    /// Could be either (DOI, URL, title, citation)
    Ambiguous,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Book => write!(f, "book"),
            Self::Paper => write!(f, "paper"),
            Self::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// One candidate interpretation of a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    /// Detected type
    pub input_type: InputType,
    /// Family of works `input_type` points at
    pub domain: Domain,
    /// Confidence in `[0, 1]`; exact identifiers score higher than heuristics
    pub confidence: f64,
    /// Cleaned-up value to hand to resolvers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_value: Option<String>,
    /// Parsed value object when the identifier validated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_identifier: Option<Identifier>,
}

impl DetectionResult {
    /// Creates a result without a parsed identifier.
    #[must_use]
    pub fn new(input_type: InputType, confidence: f64, normalized_value: Option<String>) -> Self {
        Self {
            input_type,
            domain: input_type.domain(),
            confidence,
            normalized_value,
            parsed_identifier: None,
        }
    }

    /// Creates a result carrying a validated identifier.
    #[must_use]
    pub fn identified(input_type: InputType, confidence: f64, identifier: Identifier) -> Self {
        Self {
            input_type,
            domain: input_type.domain(),
            confidence,
            normalized_value: Some(identifier.value().to_string()),
            parsed_identifier: Some(identifier),
        }
    }

    /// Creates the UNKNOWN result used for blank input.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(InputType::Unknown, 0.0, None)
    }

    /// Family of works the detected type points at.
    #[must_use]
    pub fn domain(&self) -> Domain {
        self.domain
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {:.2}]", self.input_type, self.confidence)?;
        if let Some(value) = &self.normalized_value {
            write!(f, " {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_input_type_from_str_accepts_common_spellings() {
        assert_eq!("doi".parse::<InputType>().unwrap(), InputType::Doi);
        assert_eq!("ISBN-13".parse::<InputType>().unwrap(), InputType::Isbn13);
        assert_eq!("isbn10".parse::<InputType>().unwrap(), InputType::Isbn10);
        assert_eq!("Title".parse::<InputType>().unwrap(), InputType::Title);
    }

    #[test]
    fn test_input_type_from_str_rejects_unknown() {
        let err = "magazine".parse::<InputType>().unwrap_err();
        assert!(err.contains("magazine"));
        assert!(err.contains("isbn_13"));
    }

    #[test]
    fn test_input_type_serde_names_match_as_str() {
        for input_type in InputType::ALL {
            let json = serde_json::to_string(&input_type).unwrap();
            assert_eq!(json, format!("\"{}\"", input_type.as_str()));
        }
    }

    #[test]
    fn test_domain_mapping() {
        assert_eq!(InputType::Isbn10.domain(), Domain::Book);
        assert_eq!(InputType::Isbn13.domain(), Domain::Book);
        assert_eq!(InputType::Arxiv.domain(), Domain::Paper);
        assert_eq!(InputType::Pmid.domain(), Domain::Paper);
        for ambiguous in [
            InputType::Doi,
            InputType::Url,
            InputType::Title,
            InputType::Citation,
            InputType::Unknown,
        ] {
            assert_eq!(ambiguous.domain(), Domain::Ambiguous, "{ambiguous}");
        }
    }

    #[test]
    fn test_detection_result_display() {
        let result = DetectionResult::new(InputType::Title, 0.5, Some("Dune".to_string()));
        assert_eq!(result.to_string(), "[title 0.50] Dune");
        assert_eq!(DetectionResult::unknown().to_string(), "[unknown 0.00]");
    }

    #[test]
    fn test_detection_result_serializes_domain() {
        let book = DetectionResult::new(InputType::Isbn13, 0.95, Some("9780134093413".to_string()));
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["input_type"], "isbn_13");
        assert_eq!(json["domain"], "book");

        let json = serde_json::to_value(DetectionResult::unknown()).unwrap();
        assert_eq!(json["domain"], "ambiguous");
    }
}
