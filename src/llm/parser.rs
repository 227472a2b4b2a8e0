use crate::aliases::AliasCatalog;
use crate::error::Result;
use crate::intent::IntentParser;
use crate::llm::{client::GeminiClient, prompts::build_intent_prompt, types::Content};
use crate::schema::ExternalIntentFields;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;

/// [`IntentParser`] backed by Gemini structured output.
pub struct GeminiIntentParser {
    client: GeminiClient,
    model: String,
    system_prompt: String,
    response_schema: Value,
}

impl GeminiIntentParser {
    pub fn new(client: GeminiClient, model: impl Into<String>, catalog: &AliasCatalog) -> Result<Self> {
        Ok(Self {
            client,
            model: model.into(),
            system_prompt: build_intent_prompt(catalog),
            response_schema: ExternalIntentFields::response_schema()?,
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

#[async_trait]
impl IntentParser for GeminiIntentParser {
    async fn parse(&self, question: &str) -> Result<Value> {
        let raw = self
            .client
            .generate_content(
                &self.model,
                &self.system_prompt,
                vec![Content::user(question)],
                Some(self.response_schema.clone()),
            )
            .await?;
        debug!("Gemini intent response: {}", raw);

        let cleaned = clean_json_output(&raw);
        Ok(serde_json::from_str(&cleaned)?)
    }
}

/// Cuts a JSON object out of a response that may be wrapped in code fences or
/// prose.
fn clean_json_output(raw: &str) -> String {
    if let Some(start) = raw.find('{') {
        if let Some(end) = raw.rfind('}') {
            if end > start {
                return raw[start..=end].to_string();
            }
        }
    }
    raw.trim().to_string()
}
