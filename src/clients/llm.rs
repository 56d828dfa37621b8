//! LLMClient: search-term generation, candidate ranking, and
//! BOM normalization, each a pure function of its inputs plus one LLM call.
//! Failures of the underlying model collapse to a single `LlmError`;
//! callers decide whether that's terminal or advisory for their stage.

use crate::errors::LlmError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::warn;

/// One candidate part surfaced to the evaluation prompt.
#[derive(Debug, Clone)]
pub struct CandidatePart {
    pub manufacturer: Option<String>,
    pub manufacturer_part_number: String,
    pub distributor_part_number: String,
    pub description: Option<String>,
    pub price: Option<String>,
    pub availability: Option<String>,
    pub datasheet_url: Option<String>,
}

/// The line item currently being matched.
#[derive(Debug, Clone)]
pub struct PartInfo {
    pub quantity: i32,
    pub description: String,
    pub possible_mpn: Option<String>,
    pub package: String,
    pub notes: Option<String>,
}

/// An immutable snapshot of the full BOM, passed as cross-item context to
/// the evaluation prompt. Never the stream of previously chosen parts.
#[derive(Debug, Clone)]
pub struct BomContextRow {
    pub description: String,
    pub package: String,
    pub possible_mpn: Option<String>,
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("llm http client"),
            base_url,
            api_key,
        }
    }

    /// Generates roughly 3 comma-separated search phrases, biased towards
    /// any operator-supplied MPN.
    pub async fn generate_search_terms(&self, part: &PartInfo) -> Result<Vec<String>, LlmError> {
        let prompt = format_search_term_prompt(part);
        let response = self.complete(&prompt).await?;
        Ok(parse_search_terms(response.as_deref()))
    }

    /// Ranks `candidates` against `part` and the rest of the BOM, returning
    /// the manufacturer part number the model chose, or `None` if the
    /// required `[ManufacturerPartNumber:XYZ]` token was absent.
    pub async fn choose_best_part(
        &self,
        part: &PartInfo,
        project_description: &str,
        bom: &[BomContextRow],
        candidates: &[CandidatePart],
    ) -> Result<Option<String>, LlmError> {
        let prompt = format_evaluation_prompt(part, project_description, bom, candidates);
        let response = self.complete(&prompt).await?;
        Ok(extract_mpn_from_eval(response.as_deref()))
    }

    /// Best-effort reformat of a loosely typed component array into the
    /// canonical `{qty, description, package, possible_mpn, notes}` shape
    ///. Returns `Err` on any LLM or parse failure; Ingestion
    /// falls back to direct field-by-field validation in that case.
    pub async fn normalize_bom_rows(
        &self,
        raw_components: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, LlmError> {
        let raw_json = raw_components.to_string();
        let prompt = format_bom_reformat_prompt(&raw_json);
        let response = self.complete(&prompt).await?;
        let text = response.ok_or_else(|| LlmError("empty response reformatting BOM".into()))?;
        let cleaned = strip_markdown_fence(&text);

        let parsed: serde_json::Value = serde_json::from_str(cleaned)
            .map_err(|e| LlmError(format!("could not parse reformatted BOM: {e}")))?;

        match parsed {
            serde_json::Value::Array(rows) => Ok(rows),
            _ => Err(LlmError("reformatted BOM was not a JSON array".into())),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<Option<String>, LlmError> {
        let url = format!("{}?key={}", self.base_url, self.api_key);
        let body = GenerateContentRequest {
            contents: vec![Content { role: "user", parts: vec![Part { text: prompt.to_string() }] }],
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError(format!("llm backend returned status {}", response.status())));
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| LlmError(e.to_string()))?;

        let text = parsed
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|p| p.text);

        if text.is_none() {
            warn!("llm response contained no text candidate");
        }

        Ok(text)
    }
}

fn format_search_term_prompt(part: &PartInfo) -> String {
    format!(
        "Your task is to generate a small number of diverse search terms (approximately 3) for \
finding electronic components on a distributor's site based on the following input fields: \
'Description', 'Possible MPN', and 'Package'. The goal is to create search terms that are \
likely to yield relevant results. Consider the following strategies:\n\n\
1. Prioritize the 'Possible MPN': if provided, use it as one of the search terms, ideally as an exact match.\n\
2. Create concise keyword-based searches from the 'Description', focusing on the most important features and component type.\n\
3. Combine keywords from the 'Description' with the 'Package' information to narrow or broaden the search.\n\
4. Vary the level of detail across the generated terms.\n\
5. Consider common abbreviations or alternative names likely to be used in the distributor's search.\n\n\
Here is the input for the current part:\n\
Description: {}\n\
Possible MPN: {}\n\
Package: {}\n\
Other Usage Notes: {}\n\n\
Generate the search terms as a comma-separated list.",
        part.description,
        part.possible_mpn.as_deref().unwrap_or(""),
        part.package,
        part.notes.as_deref().unwrap_or(""),
    )
}

fn parse_search_terms(response: Option<&str>) -> Vec<String> {
    let Some(response) = response else { return Vec::new() };
    response
        .split(',')
        .map(|term| term.trim().to_string())
        .filter(|term| !term.is_empty())
        .collect()
}

fn format_evaluation_prompt(
    part: &PartInfo,
    project_description: &str,
    bom: &[BomContextRow],
    candidates: &[CandidatePart],
) -> String {
    let bom_str = if bom.is_empty() {
        "None".to_string()
    } else {
        bom.iter()
            .map(|row| {
                format!(
                    "- {} (Package: {}, MPN: {})",
                    row.description,
                    row.package,
                    row.possible_mpn.as_deref().unwrap_or("N/A"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let candidates_str = candidates
        .iter()
        .map(|c| {
            format!(
                "Manufacturer: {}\nManufacturer Part Number: {}\nDistributor Part Number: {}\nDescription: {}\nPrice: {}\nAvailability: {}\nDatasheet URL: {}",
                c.manufacturer.as_deref().unwrap_or("N/A"),
                c.manufacturer_part_number,
                c.distributor_part_number,
                c.description.as_deref().unwrap_or("N/A"),
                c.price.as_deref().unwrap_or("N/A"),
                c.availability.as_deref().unwrap_or("N/A"),
                c.datasheet_url.as_deref().unwrap_or("N/A"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Here is a list of potential parts from a distributor for the original part described \
below. Your task is to evaluate this list and select the single best part that matches the \
requirements and context provided. Consider the other parts in the project listed in the BOM.\n\n\
Original Part Details (Currently Evaluating):\n\
Quantity: {}\n\
Description: {}\n\
Possible MPN: {}\n\
Package: {}\n\
Notes/Source: {}\n\n\
Project Description:\n{}\n\n\
Original Bill of Materials (BOM):\n{}\n\n\
Candidate Parts:\n{}\n\n\
When evaluating the candidates, prioritize parts that are currently in stock or have a short \
lead time. The most important factor is that the selected part closely matches the requirements \
and specifications mentioned in the 'Notes/Source' field. Favor parts with readily available \
datasheets. Price should be a secondary consideration after availability and functional \
suitability are established.\n\n\
Return your answer in the following format so it can be easily parsed. Use EXACTLY the \
Manufacturer Part Number as shown in the list above, do not add manufacturer name or any other text:\n\
[ManufacturerPartNumber:XXXXX]",
        part.quantity,
        part.description,
        part.possible_mpn.as_deref().unwrap_or(""),
        part.package,
        part.notes.as_deref().unwrap_or(""),
        project_description,
        bom_str,
        candidates_str,
    )
}

fn extract_mpn_from_eval(response: Option<&str>) -> Option<String> {
    let response = response?;
    let re = Regex::new(r"\[ManufacturerPartNumber:(.*?)\]").expect("static regex");
    re.captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn format_bom_reformat_prompt(raw_components: &str) -> String {
    format!(
        "You are a helpful assistant that reformats Bill of Materials (BOM) data into a \
standardized format. Your task is to convert the following BOM data into a list of components \
matching this schema:\n\
{}\n\n\
Input BOM data:\n{}\n\n\
Rules:\n\
1. Map any quantity field to \"qty\" (convert to integer)\n\
2. Map any description, value, or name field to \"description\"\n\
3. Map any footprint, package, or similar field to \"package\"\n\
4. Map any manufacturer part number, MPN, or similar field to \"possible_mpn\"\n\
5. Map any additional notes, datasheet URLs, or other metadata to \"notes\"\n\
6. If a field is missing, use appropriate defaults (1 for qty, \"unknown\" for package)\n\
7. Return ONLY a valid JSON array of objects matching the schema above\n\
8. Do not include any explanatory text, just the JSON\n\n\
Return the reformatted BOM as a JSON array with no other text. It will be parsed directly.",
        json!({
            "qty": "int",
            "description": "str",
            "package": "str",
            "possible_mpn": "Optional[str]",
            "notes": "Optional[str]",
        }),
        raw_components,
    )
}

/// The backend sometimes wraps its JSON answer in a ```json fence despite
/// being told not to; strip it before parsing.
fn strip_markdown_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_search_terms_splits_trims_and_drops_empties() {
        let terms = parse_search_terms(Some("10k resistor, RC0805FR-0710KL , , SMD 0805"));
        assert_eq!(terms, vec!["10k resistor", "RC0805FR-0710KL", "SMD 0805"]);
    }

    #[test]
    fn parse_search_terms_on_empty_response_is_empty() {
        assert!(parse_search_terms(None).is_empty());
        assert!(parse_search_terms(Some("")).is_empty());
    }

    #[test]
    fn extract_mpn_from_eval_reads_the_bracketed_token() {
        let response = "Based on availability:\n[ManufacturerPartNumber:RC0805FR-0710KL]";
        assert_eq!(extract_mpn_from_eval(Some(response)), Some("RC0805FR-0710KL".to_string()));
    }

    #[test]
    fn extract_mpn_from_eval_missing_token_is_none() {
        assert_eq!(extract_mpn_from_eval(Some("no token here")), None);
        assert_eq!(extract_mpn_from_eval(None), None);
    }

    #[test]
    fn strip_markdown_fence_unwraps_json_code_block() {
        let fenced = "```json\n[{\"qty\": 1}]\n```";
        assert_eq!(strip_markdown_fence(fenced), "[{\"qty\": 1}]");
    }

    #[test]
    fn strip_markdown_fence_passes_through_plain_json() {
        assert_eq!(strip_markdown_fence("[1,2,3]"), "[1,2,3]");
    }
}
