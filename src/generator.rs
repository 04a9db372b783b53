//! The generative collaborator: new (scenario, net) pairs and paraphrases.
//!
//! [`Generator`] is the narrow interface the pipeline depends on.
//! [`LlmGenerator`] implements it over any [`MessageSender`], building the
//! forward-generation prompt from few-shot examples and parsing the model's
//! JSON answer. Nothing here validates the net; that happens downstream.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::anthropic::{AnthropicError, Message, MessageSender, MessagesRequest};

pub const PARAPHRASE_SEPARATOR: &str = "---PARAPHRASE_SEPARATOR---";

/// One example pair shown to the model.
#[derive(Debug, Clone)]
pub struct FewShotExample {
    pub scenario_text: String,
    pub petri_json: Value,
}

/// Input to forward generation.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub theme: Option<String>,
    pub examples: Vec<FewShotExample>,
}

/// A freshly generated, unvalidated pair.
#[derive(Debug, Clone)]
pub struct GeneratedPair {
    pub scenario_text: String,
    pub petri_json: Value,
}

#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("model call failed: {0}")]
    Api(#[from] AnthropicError),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("model output is not valid JSON: {reason}")]
    Unparsable { reason: String, output: String },

    #[error("model output is missing {field}")]
    MalformedPair { field: &'static str, output: String },

    #[error("model returned no usable paraphrases")]
    NoParaphrases,
}

impl GenerationFailure {
    /// The model output that could not be used, if any came back.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            GenerationFailure::Unparsable { output, .. }
            | GenerationFailure::MalformedPair { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Short machine-readable cause, stored in diagnostic reports.
    pub fn reason_tag(&self) -> &'static str {
        match self {
            GenerationFailure::Api(_) => "llm_api_error",
            GenerationFailure::EmptyResponse | GenerationFailure::Unparsable { .. } => {
                "llm_response_error"
            }
            GenerationFailure::MalformedPair { .. } => "llm_malformed_output",
            GenerationFailure::NoParaphrases => "llm_no_paraphrases",
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Generator {
    async fn generate(&self, ctx: &PromptContext) -> Result<GeneratedPair, GenerationFailure>;

    async fn paraphrase(
        &self,
        text: &str,
        petri_json: &Value,
        count: usize,
    ) -> Result<Vec<String>, GenerationFailure>;
}

/// Sampling settings for [`LlmGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub model: String,
    pub max_tokens: u32,
    pub generation_temperature: f32,
    pub paraphrase_temperature: f32,
}

pub struct LlmGenerator<S> {
    sender: S,
    settings: GeneratorSettings,
}

impl<S: MessageSender> LlmGenerator<S> {
    pub fn new(sender: S, settings: GeneratorSettings) -> Self {
        Self { sender, settings }
    }

    async fn ask(
        &self,
        system: String,
        prompt: String,
        temperature: f32,
    ) -> Result<String, GenerationFailure> {
        let req = MessagesRequest {
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            system: Some(system),
            temperature: Some(temperature),
            messages: vec![Message::user(prompt)],
        };
        let response = self.sender.send_message(&req).await?;
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "model answered"
        );
        let text = response.text();
        if text.trim().is_empty() {
            return Err(GenerationFailure::EmptyResponse);
        }
        Ok(text)
    }
}

impl<S: MessageSender> Generator for LlmGenerator<S> {
    async fn generate(&self, ctx: &PromptContext) -> Result<GeneratedPair, GenerationFailure> {
        let output = self
            .ask(
                FORWARD_SYSTEM.to_string(),
                forward_prompt(ctx),
                self.settings.generation_temperature,
            )
            .await?;
        parse_generated_pair(&output)
    }

    async fn paraphrase(
        &self,
        text: &str,
        petri_json: &Value,
        count: usize,
    ) -> Result<Vec<String>, GenerationFailure> {
        let net = serde_json::to_string_pretty(petri_json).unwrap_or_default();
        let prompt = format!(
            "Original Scenario Text:\n---\n{text}\n---\n\
             Corresponding Petri Net JSON (for your understanding of the logic to preserve):\n---\n{net}\n---\n\
             Generate {count} diverse paraphrases of the Original Scenario Text.\n\
             Separate paraphrases with '{PARAPHRASE_SEPARATOR}'. Output only the paraphrases."
        );
        let output = self
            .ask(
                PARAPHRASE_SYSTEM.to_string(),
                prompt,
                self.settings.paraphrase_temperature,
            )
            .await?;
        let paraphrases = split_paraphrases(&output, count);
        if paraphrases.is_empty() {
            return Err(GenerationFailure::NoParaphrases);
        }
        Ok(paraphrases)
    }
}

const FORWARD_SYSTEM: &str = "\
You are an expert in modeling multimedia scenarios using Petri nets.
Generate NEW, creative and plausible multimedia scenario descriptions AND their Petri net in JSON.
The Petri net JSON MUST have exactly these keys:
{ \"places\": {id: label}, \"transitions\": {id: label}, \"arcs\": [{\"from\": id, \"to\": id}], \"initial\": {place_id: tokens} }
Constraints:
1. Unique ids; no id is both a place and a transition.
2. Descriptive, non-empty labels.
3. Every arc references declared ids.
4. Arcs connect place to transition or transition to place only.
5. Initial marking keys are declared places with at least 1 token.
6. The net is faithful to the scenario text.
7. Mix sequences, choices and concurrency.
8. Every node is connected; the net is one connected graph.
9. Model \"return to menu\" or \"play again\" as cycles back to earlier places, not new terminal states.
10. Actions available in a state stay available in its sub-modes unless explicitly restricted.
Answer with a single JSON object with keys \"scenario_text\" and \"petri_net_json\" and nothing else.";

const PARAPHRASE_SYSTEM: &str = "\
You are an expert in natural language processing. Paraphrase the given scenario description \
several times; every paraphrase must keep exactly the same underlying logic as the original.";

fn forward_prompt(ctx: &PromptContext) -> String {
    let mut prompt = String::new();
    if let Some(theme) = &ctx.theme {
        prompt.push_str(&format!("Theme: {theme}\n\n"));
    }
    if !ctx.examples.is_empty() {
        prompt.push_str(
            "Here are existing (Scenario Text, Petri Net JSON) pairs to guide style and complexity:\n\
             --- FEW-SHOT EXAMPLES START ---\n",
        );
        for (i, example) in ctx.examples.iter().enumerate() {
            let net = serde_json::to_string_pretty(&example.petri_json).unwrap_or_default();
            prompt.push_str(&format!(
                "Example {}:\nScenario Text:\n\"\"\"\n{}\n\"\"\"\n\nCorresponding Petri Net JSON:\n```json\n{net}\n```\n---\n",
                i + 1,
                example.scenario_text.trim(),
            ));
        }
        prompt.push_str("--- FEW-SHOT EXAMPLES END ---\n\n");
    }
    prompt.push_str(
        "Now generate ONE new, distinct multimedia scenario and its Petri net JSON, \
         as a single JSON object with keys 'scenario_text' and 'petri_net_json'.",
    );
    prompt
}

/// Extracts `{scenario_text, petri_net_json}` from model output, tolerating
/// a surrounding markdown code fence.
pub fn parse_generated_pair(output: &str) -> Result<GeneratedPair, GenerationFailure> {
    let body = strip_code_fence(output);
    let value: Value = serde_json::from_str(body).map_err(|e| GenerationFailure::Unparsable {
        reason: e.to_string(),
        output: output.to_string(),
    })?;

    let malformed = |field| GenerationFailure::MalformedPair {
        field,
        output: output.to_string(),
    };
    let scenario_text = value
        .get("scenario_text")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| malformed("a non-empty 'scenario_text' string"))?
        .to_string();
    let petri_json = value
        .get("petri_net_json")
        .cloned()
        .ok_or_else(|| malformed("'petri_net_json'"))?;

    Ok(GeneratedPair {
        scenario_text,
        petri_json,
    })
}

fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn split_paraphrases(output: &str, count: usize) -> Vec<String> {
    output
        .split(PARAPHRASE_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .take(count)
        .map(str::to_string)
        .collect()
}
