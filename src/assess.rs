//! External impact assessor seam
//!
//! The orchestrator hands each (file, dependency) candidate to an
//! [`Assessor`] and keeps the result only when it reports impact. The
//! assessor is slow (seconds) and may return malformed output; a parse
//! failure is "no impact" for that candidate and never aborts the batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::screen::Dependency;

#[derive(Error, Debug)]
pub enum AssessError {
    #[error("assessor request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("assessor returned status {0}")]
    Status(u16),
    #[error("malformed assessor response: {0}")]
    Malformed(String),
}

/// One observed use of the dependency in the target file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsagePattern {
    pub line_context: String,
    pub usage_type: String,
    pub specific_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactDetails {
    pub affected_lines: String,
    pub impact_description: String,
    pub breaking_change: bool,
    pub risk_level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredChange {
    pub change_type: String,
    pub current_code: String,
    pub suggested_fix: String,
    pub reason: String,
}

/// The assessor's verdict for one candidate pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Assessment {
    pub has_impact: bool,
    pub usage_patterns: Vec<UsagePattern>,
    pub impact_details: Option<ImpactDetails>,
    pub required_changes: Vec<RequiredChange>,
    pub summary: String,
}

/// Everything the assessor needs to judge one candidate pair.
#[derive(Debug, Clone, Copy)]
pub struct AssessRequest<'a> {
    pub source_repo: &'a str,
    pub source_file: &'a str,
    pub dependency: &'a Dependency,
    pub target_repo: &'a str,
    pub target_file: &'a str,
    /// Already truncated by the orchestrator.
    pub content: &'a str,
}

#[async_trait]
pub trait Assessor: Send + Sync {
    async fn assess(&self, request: &AssessRequest<'_>) -> Result<Assessment, AssessError>;
}

/// Parse an assessor reply that may wrap its JSON in a ```json fence.
pub fn parse_assessment(raw: &str) -> Result<Assessment, AssessError> {
    let json_text = match raw.find("```json") {
        Some(start) => {
            let body = &raw[start + 7..];
            match body.find("```") {
                Some(end) => body[..end].trim(),
                None => return Err(AssessError::Malformed("unterminated json fence".into())),
            }
        }
        None => raw.trim(),
    };
    serde_json::from_str(json_text).map_err(|e| AssessError::Malformed(e.to_string()))
}

/// Assessor backed by a generative-model HTTP endpoint
/// (`generateContent`-style request/response shape).
pub struct HttpAssessor {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpAssessor {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn build_prompt(request: &AssessRequest<'_>) -> String {
        format!(
            "Analyze the cross-repository impact of a code change.\n\
             \n\
             SOURCE REPOSITORY: {}\n\
             SOURCE FILE: {}\n\
             CHANGED DEPENDENCY: {} ({:?}, {:?})\n\
             \n\
             TARGET REPOSITORY: {}\n\
             TARGET FILE: {}\n\
             \n\
             TARGET FILE CONTENT:\n```\n{}\n```\n\
             \n\
             Respond with JSON only: {{\"has_impact\": bool, \
             \"usage_patterns\": [{{\"line_context\", \"usage_type\", \"specific_code\"}}], \
             \"impact_details\": {{\"affected_lines\", \"impact_description\", \
             \"breaking_change\", \"risk_level\"}}, \
             \"required_changes\": [{{\"change_type\", \"current_code\", \
             \"suggested_fix\", \"reason\"}}], \"summary\": string}}",
            request.source_repo,
            request.source_file,
            request.dependency.name,
            request.dependency.kind,
            request.dependency.action,
            request.target_repo,
            request.target_file,
            request.content,
        )
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Assessor for HttpAssessor {
    async fn assess(&self, request: &AssessRequest<'_>) -> Result<Assessment, AssessError> {
        let prompt = Self::build_prompt(request);
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssessError::Status(status.as_u16()));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AssessError::Malformed(e.to_string()))?;
        let text = reply
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| AssessError::Malformed("empty candidate list".into()))?;

        parse_assessment(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_json() {
        let assessment = parse_assessment(
            r#"{"has_impact": true, "summary": "breaks the login flow"}"#,
        )
        .unwrap();
        assert!(assessment.has_impact);
        assert_eq!(assessment.summary, "breaks the login flow");
        assert!(assessment.usage_patterns.is_empty());
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "Here is my analysis:\n```json\n{\"has_impact\": false, \"summary\": \"unused\"}\n```\nDone.";
        let assessment = parse_assessment(raw).unwrap();
        assert!(!assessment.has_impact);
        assert_eq!(assessment.summary, "unused");
    }

    #[test]
    fn test_parse_full_shape() {
        let raw = r#"{
            "has_impact": true,
            "usage_patterns": [
                {"line_context": "from api import login", "usage_type": "import", "specific_code": "import login"}
            ],
            "impact_details": {
                "affected_lines": "1-3",
                "impact_description": "import breaks",
                "breaking_change": true,
                "risk_level": "HIGH"
            },
            "required_changes": [
                {"change_type": "import", "current_code": "import login", "suggested_fix": "import auth", "reason": "renamed"}
            ],
            "summary": "update the import"
        }"#;
        let assessment = parse_assessment(raw).unwrap();
        assert_eq!(assessment.usage_patterns.len(), 1);
        assert_eq!(assessment.required_changes.len(), 1);
        let details = assessment.impact_details.unwrap();
        assert!(details.breaking_change);
        assert_eq!(details.risk_level, "HIGH");
    }

    #[test]
    fn test_parse_malformed_is_error_not_panic() {
        assert!(matches!(
            parse_assessment("I cannot answer that."),
            Err(AssessError::Malformed(_))
        ));
        assert!(matches!(
            parse_assessment("```json\n{\"has_impact\": tru"),
            Err(AssessError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_tolerates_missing_fields() {
        let assessment = parse_assessment("{}").unwrap();
        assert!(!assessment.has_impact);
        assert!(assessment.impact_details.is_none());
    }
}
