pub fn build_entity_prompt(text: &str) -> String {
    format!(
        r#"Extract named entities from the following text.

INSTRUCTIONS:
1. Identify technologies, organizations, people, dates and numeric quantities
2. Copy each entity exactly as it appears in the text
3. Output ONLY valid JSON, nothing else
4. Use the exact schema below

SCHEMA:
{{
  "entities": [
    {{"text": "exact span from the text", "label": "TECH|ORG|PERSON|DATE|NUMBER"}}
  ]
}}

RULES:
- "text" must be a verbatim substring of the input
- Prefer the longest complete name over fragments
- Output ONLY the JSON object, no markdown, no explanations

TEXT:
{}

JSON OUTPUT:"#,
        text
    )
}

pub fn build_retry_prompt(invalid_json: &str) -> String {
    format!(
        r#"The following JSON is invalid:

{}

Fix this JSON. Output only valid JSON with no markdown formatting, no code blocks, no explanations. Just the raw JSON object."#,
        invalid_json
    )
}
