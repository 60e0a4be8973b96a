//! Natural language to Overpass QL through the OpenAI chat completions API.

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

const MODEL: &str = "gpt-3.5-turbo";

const SYSTEM_PROMPT: &str = r#"Turn the user's query into an Overpass QL query to find the data in the OpenStreetMap database. Return a JSON object in the following format:
{
    "query": "the user's query",
    "overpassQL": "the Overpass QL query",
    "explanation": "an explanation of the Overpass QL query"
}

Example:
Input: 11th arrondissement of Paris
Output: {
    "query": "11th arrondissement of Paris",
    "overpassQL": "[out:json][timeout:25];\n(\n  relation[\"admin_level\"=\"9\"][\"name\"=\"Paris 11e Arrondissement\"];\n);\nout body;\n>;\nout skel qt;",
    "explanation": "This overpass query finds the 11th arrondissement in Paris"
}

Example:
Input: museums in Paris
Output: {
    "query": "museums in Paris",
    "overpassQL": "[out:json];\narea[name=\"Paris\"][boundary=administrative]->.parisArea;\n(\n  node[\"tourism\"=\"museum\"](area.parisArea);\n  way[\"tourism\"=\"museum\"](area.parisArea);\n  relation[\"tourism\"=\"museum\"](area.parisArea);\n);\nout body;\n>;\nout skel qt;",
    "explanation": "This overpass query finds museums in Paris"
}
"#;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// A query translated by the language model.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslatedQuery {
    pub query: String,
    #[serde(rename = "overpassQL")]
    pub overpass_ql: String,
    #[serde(default)]
    pub explanation: String,
}

/// Translates a natural-language query into Overpass QL. Requires
/// `OPENAI_API_KEY` in the environment.
pub async fn to_overpass_ql(query: &str) -> anyhow::Result<TranslatedQuery> {
    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;

    let request = ChatRequest {
        model: MODEL,
        messages: [
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: query,
            },
        ],
        response_format: ResponseFormat {
            kind: "json_object",
        },
    };

    let response: ChatResponse = reqwest::Client::new()
        .post(OPENAI_URL)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    parse_completion(response)
}

fn parse_completion(response: ChatResponse) -> anyhow::Result<TranslatedQuery> {
    let content = response
        .choices
        .first()
        .map(|c| c.message.content.as_str())
        .context("completion has no choices")?;

    let translated: TranslatedQuery =
        serde_json::from_str(content).context("completion is not the expected JSON object")?;

    if translated.overpass_ql.trim().is_empty() {
        anyhow::bail!("no Overpass QL query found in translation");
    }

    Ok(translated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content: &str) -> ChatResponse {
        serde_json::from_str(
            &serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn completion_content_parses_to_translation() {
        let translated = parse_completion(response(
            r#"{"query": "museums in Paris",
                "overpassQL": "[out:json];node[tourism=museum];out;",
                "explanation": "finds museums"}"#,
        ))
        .unwrap();

        assert_eq!(translated.query, "museums in Paris");
        assert!(translated.overpass_ql.starts_with("[out:json]"));
        assert_eq!(translated.explanation, "finds museums");
    }

    #[test]
    fn empty_translation_is_rejected() {
        let err = parse_completion(response(r#"{"query": "q", "overpassQL": "  "}"#));
        assert!(err.is_err());
    }

    #[test]
    fn no_choices_is_an_error() {
        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(parse_completion(empty).is_err());
    }
}
