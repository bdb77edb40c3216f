//! Review response parsing.
//!
//! A completion comes back in one of two shapes, chosen by the provider's
//! declared capability rather than by sniffing the content:
//!
//! - **Structured**: `{"dimensions": [{"name", "score", "justification"}], "overall": 0.8}`
//! - **Free text**: repeated `DIMENSION:` / `SCORE:` / `JUSTIFICATION:` blocks
//!   followed by `OVERALL:`. Field names are matched in upper case only, and
//!   justifications run until the next field line.
//!
//! ## Overall score precedence
//!
//! An overall score reported by the reviewer is used as-is. When none is
//! reported the overall is the arithmetic mean of the dimension scores, and
//! [`ParsedReview::overall_source`] records which of the two happened. A
//! reported overall that differs from the mean by more than
//! [`DISCREPANCY_TOLERANCE`] is kept but flagged in
//! [`ParsedReview::discrepancy`].

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::ReviewDimension;

/// Maximum tolerated gap between a reported overall and the dimension mean.
pub const DISCREPANCY_TOLERANCE: f64 = 0.05;

lazy_static! {
    static ref FIELD_LINE: Regex =
        Regex::new(r"^\s*(DIMENSION|SCORE|JUSTIFICATION|OVERALL)\s*:\s*(.*?)\s*$").unwrap();
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Response is missing dimension {0:?}")]
    MissingDimension(String),

    #[error("Score for {field} is outside [0, 1]: {value}")]
    ScoreOutOfRange { field: String, value: f64 },

    #[error("Score for {field} is not a number: {raw:?}")]
    InvalidScore { field: String, raw: String },

    #[error("Structured response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Response matches no known format: {0}")]
    NoMatch(String),
}

/// A completion's content, tagged by the shape the provider promised.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Structured(Value),
    FreeText(String),
}

impl RawResponse {
    /// Decode the content of a structured-output completion.
    pub fn structured(content: &str) -> Result<Self, ParseError> {
        Ok(RawResponse::Structured(serde_json::from_str(content.trim())?))
    }

    pub fn free_text(content: impl Into<String>) -> Self {
        RawResponse::FreeText(content.into())
    }
}

/// How the overall score was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallSource {
    Reported,
    DimensionMean,
}

/// A reported overall that disagrees with the dimension mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub reported: f64,
    pub dimension_mean: f64,
    pub difference: f64,
}

/// Parsed review: declared dimensions in order plus the overall score.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReview {
    pub dimensions: Vec<ReviewDimension>,
    pub overall_score: f64,
    pub overall_source: OverallSource,
    pub discrepancy: Option<Discrepancy>,
}

/// A dimension as it appeared in the response, before validation.
#[derive(Debug)]
struct RawDimension {
    name: String,
    score: Option<Result<f64, String>>,
    justification: String,
}

struct Extracted {
    dimensions: Vec<RawDimension>,
    overall: Option<Result<f64, String>>,
}

/// Parse a response against the prompt's declared dimensions.
pub fn parse(raw: &RawResponse, expected: &[String]) -> Result<ParsedReview, ParseError> {
    let extracted = match raw {
        RawResponse::Structured(value) => extract_structured(value)?,
        RawResponse::FreeText(text) => extract_free_text(text)?,
    };

    let mut dimensions = Vec::with_capacity(expected.len());
    for name in expected {
        let found = extracted
            .dimensions
            .iter()
            .find(|d| d.name == *name)
            .ok_or_else(|| ParseError::MissingDimension(name.clone()))?;

        dimensions.push(ReviewDimension {
            name: name.clone(),
            score: check_score(name, found.score.clone())?,
            justification: found.justification.trim().to_string(),
        });
    }

    let dimension_mean = if dimensions.is_empty() {
        0.0
    } else {
        dimensions.iter().map(|d| d.score).sum::<f64>() / dimensions.len() as f64
    };

    let (overall_score, overall_source, discrepancy) = match extracted.overall {
        Some(reported) => {
            let reported = check_score("overall", Some(reported))?;
            let difference = (reported - dimension_mean).abs();
            let discrepancy = (difference > DISCREPANCY_TOLERANCE).then_some(Discrepancy {
                reported,
                dimension_mean,
                difference,
            });
            (reported, OverallSource::Reported, discrepancy)
        }
        None => (dimension_mean, OverallSource::DimensionMean, None),
    };

    Ok(ParsedReview {
        dimensions,
        overall_score,
        overall_source,
        discrepancy,
    })
}

fn check_score(field: &str, score: Option<Result<f64, String>>) -> Result<f64, ParseError> {
    let invalid = |raw: String| ParseError::InvalidScore {
        field: field.to_string(),
        raw,
    };

    let value = match score {
        None => return Err(invalid(String::new())),
        Some(Err(raw)) => return Err(invalid(raw)),
        Some(Ok(v)) => v,
    };

    if value.is_nan() {
        return Err(invalid(value.to_string()));
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ParseError::ScoreOutOfRange {
            field: field.to_string(),
            value,
        });
    }
    Ok(value)
}

fn parse_number(text: &str) -> Result<f64, String> {
    text.trim().parse::<f64>().map_err(|_| text.trim().to_string())
}

fn json_number(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| n.to_string()),
        Value::String(s) => parse_number(s),
        other => Err(other.to_string()),
    }
}

fn extract_structured(value: &Value) -> Result<Extracted, ParseError> {
    let items = value
        .get("dimensions")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::NoMatch("structured response has no 'dimensions' array".into()))?;

    let mut dimensions = Vec::with_capacity(items.len());
    for item in items {
        let Some(name) = item.get("name").and_then(Value::as_str) else {
            continue;
        };
        dimensions.push(RawDimension {
            name: name.trim().to_string(),
            score: item.get("score").map(json_number),
            justification: item
                .get("justification")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    let overall = ["overall", "overall_score"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find(|v| !v.is_null())
        .map(json_number);

    Ok(Extracted {
        dimensions,
        overall,
    })
}

fn extract_free_text(text: &str) -> Result<Extracted, ParseError> {
    let mut dimensions: Vec<RawDimension> = Vec::new();
    let mut overall = None;
    let mut in_justification = false;

    for line in text.lines() {
        let field = FIELD_LINE.captures(line).and_then(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2).map_or("", |m| m.as_str());
            // A non-numeric SCORE/OVERALL inside a justification is prose.
            let prose = in_justification
                && matches!(name, "SCORE" | "OVERALL")
                && parse_number(value).is_err();
            (!prose).then_some((name, value))
        });

        let Some((name, value)) = field else {
            if in_justification {
                if let Some(current) = dimensions.last_mut() {
                    current.justification.push('\n');
                    current.justification.push_str(line);
                }
            }
            continue;
        };

        in_justification = false;

        match name {
            "DIMENSION" => dimensions.push(RawDimension {
                name: value.to_string(),
                score: None,
                justification: String::new(),
            }),
            "SCORE" => {
                if let Some(current) = dimensions.last_mut() {
                    current.score.get_or_insert_with(|| parse_number(value));
                }
            }
            "JUSTIFICATION" => {
                if let Some(current) = dimensions.last_mut() {
                    current.justification = value.to_string();
                    in_justification = true;
                }
            }
            _ => {
                overall.get_or_insert_with(|| parse_number(value));
            }
        }
    }

    if dimensions.is_empty() {
        return Err(ParseError::NoMatch(
            "no DIMENSION blocks in free-text response".into(),
        ));
    }

    Ok(Extracted {
        dimensions,
        overall,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    const FREE_TEXT: &str = "\
Here is my review.

DIMENSION: randomization_integrity
SCORE: 0.9
JUSTIFICATION: Balance tables show no meaningful differences.
Assignment was concealed.

DIMENSION: statistical_inference
SCORE: 0.7
JUSTIFICATION: Standard errors are clustered.

OVERALL: 0.8
";

    #[test]
    fn test_parse_free_text() {
        let expected = dims(&["randomization_integrity", "statistical_inference"]);
        let parsed = parse(&RawResponse::free_text(FREE_TEXT), &expected).unwrap();

        assert_eq!(parsed.dimensions.len(), 2);
        assert_eq!(parsed.dimensions[0].score, 0.9);
        assert_eq!(
            parsed.dimensions[0].justification,
            "Balance tables show no meaningful differences.\nAssignment was concealed."
        );
        assert_eq!(parsed.overall_score, 0.8);
        assert_eq!(parsed.overall_source, OverallSource::Reported);
        assert!(parsed.discrepancy.is_none());
    }

    #[test]
    fn test_lowercase_field_words_stay_in_justification() {
        let text = "DIMENSION: a\nSCORE: 0.8\nJUSTIFICATION: Good design.\n\
Overall: the randomization is sound.\nScore: reflects balance checks.\n\nOVERALL: 0.8\n";
        let parsed = parse(&RawResponse::free_text(text), &dims(&["a"])).unwrap();

        assert_eq!(parsed.overall_score, 0.8);
        assert_eq!(parsed.overall_source, OverallSource::Reported);
        assert_eq!(
            parsed.dimensions[0].justification,
            "Good design.\nOverall: the randomization is sound.\nScore: reflects balance checks."
        );
    }

    #[test]
    fn test_non_numeric_field_line_continues_justification() {
        let text = "DIMENSION: a\nSCORE: 0.6\nJUSTIFICATION: First line.\n\
SCORE: reflects balance checks.\nOVERALL: judged on design alone.\nOVERALL: 0.6\n";
        let parsed = parse(&RawResponse::free_text(text), &dims(&["a"])).unwrap();

        assert_eq!(parsed.dimensions[0].score, 0.6);
        assert_eq!(
            parsed.dimensions[0].justification,
            "First line.\nSCORE: reflects balance checks.\nOVERALL: judged on design alone."
        );
        assert_eq!(parsed.overall_score, 0.6);
    }

    #[test]
    fn test_declared_order_and_extras_ignored() {
        let expected = dims(&["statistical_inference", "randomization_integrity"]);
        let text = format!("DIMENSION: bonus\nSCORE: 0.1\nJUSTIFICATION: extra\n{}", FREE_TEXT);
        let parsed = parse(&RawResponse::free_text(text), &expected).unwrap();

        let names: Vec<&str> = parsed.dimensions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["statistical_inference", "randomization_integrity"]);
    }

    #[test]
    fn test_missing_dimension() {
        let expected = dims(&["randomization_integrity", "statistical_inference", "threats_to_validity"]);
        let err = parse(&RawResponse::free_text(FREE_TEXT), &expected).unwrap_err();
        assert!(matches!(err, ParseError::MissingDimension(name) if name == "threats_to_validity"));
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        for bad in ["1.5", "-0.1"] {
            let text = format!("DIMENSION: a\nSCORE: {}\nJUSTIFICATION: x\nOVERALL: 0.5\n", bad);
            let err = parse(&RawResponse::free_text(text), &dims(&["a"])).unwrap_err();
            assert!(matches!(err, ParseError::ScoreOutOfRange { .. }), "{} accepted", bad);
        }
    }

    #[test]
    fn test_non_numeric_and_nan_scores_rejected() {
        for bad in ["high", "NaN"] {
            let text = format!("DIMENSION: a\nSCORE: {}\nJUSTIFICATION: x\n", bad);
            let err = parse(&RawResponse::free_text(text), &dims(&["a"])).unwrap_err();
            assert!(matches!(err, ParseError::InvalidScore { .. }), "{} accepted", bad);
        }
    }

    #[test]
    fn test_out_of_range_overall_rejected() {
        let text = "DIMENSION: a\nSCORE: 0.5\nJUSTIFICATION: x\nOVERALL: 2\n";
        let err = parse(&RawResponse::free_text(text), &dims(&["a"])).unwrap_err();
        assert!(matches!(err, ParseError::ScoreOutOfRange { field, .. } if field == "overall"));
    }

    #[test]
    fn test_no_match() {
        let err = parse(&RawResponse::free_text("Looks fine to me."), &dims(&["a"])).unwrap_err();
        assert!(matches!(err, ParseError::NoMatch(_)));

        let err = parse(
            &RawResponse::Structured(serde_json::json!({"verdict": "ok"})),
            &dims(&["a"]),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::NoMatch(_)));
    }

    #[test]
    fn test_invalid_structured_json() {
        assert!(matches!(
            RawResponse::structured("DIMENSION: a"),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_mean_used_when_overall_absent() {
        let raw = RawResponse::structured(
            r#"{"dimensions": [
                {"name": "a", "score": 0.6, "justification": "ok"},
                {"name": "b", "score": 0.8, "justification": "good"}
            ]}"#,
        )
        .unwrap();
        let parsed = parse(&raw, &dims(&["a", "b"])).unwrap();
        assert!((parsed.overall_score - 0.7).abs() < 1e-12);
        assert_eq!(parsed.overall_source, OverallSource::DimensionMean);
        assert!(parsed.discrepancy.is_none());
    }

    #[test]
    fn test_overall_score_alias_and_discrepancy() {
        let raw = RawResponse::Structured(serde_json::json!({
            "dimensions": [
                {"name": "a", "score": 0.4, "justification": ""},
                {"name": "b", "score": 0.6, "justification": ""}
            ],
            "overall_score": 0.9
        }));
        let parsed = parse(&raw, &dims(&["a", "b"])).unwrap();

        assert_eq!(parsed.overall_score, 0.9);
        assert_eq!(parsed.overall_source, OverallSource::Reported);
        let discrepancy = parsed.discrepancy.unwrap();
        assert!((discrepancy.dimension_mean - 0.5).abs() < 1e-12);
        assert!((discrepancy.difference - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_small_gap_is_not_a_discrepancy() {
        let text = "DIMENSION: a\nSCORE: 0.70\nJUSTIFICATION: x\nOVERALL: 0.73\n";
        let parsed = parse(&RawResponse::free_text(text), &dims(&["a"])).unwrap();
        assert!(parsed.discrepancy.is_none());
    }

    proptest! {
        #[test]
        fn prop_free_text_round_trip(scores in proptest::collection::vec(0.0f64..=1.0, 1..8)) {
            let names: Vec<String> = (0..scores.len()).map(|i| format!("dim_{}", i)).collect();
            let mut text = String::new();
            for (name, score) in names.iter().zip(&scores) {
                text.push_str(&format!(
                    "DIMENSION: {}\nSCORE: {}\nJUSTIFICATION: because {}\n\n",
                    name, score, name
                ));
            }

            let parsed = parse(&RawResponse::free_text(text), &names).unwrap();
            prop_assert_eq!(parsed.dimensions.len(), names.len());
            for (dim, (name, score)) in parsed.dimensions.iter().zip(names.iter().zip(&scores)) {
                prop_assert_eq!(&dim.name, name);
                prop_assert_eq!(dim.score, *score);
            }
            prop_assert_eq!(parsed.overall_source, OverallSource::DimensionMean);
        }
    }
}
