use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::agent::{MoveAgent, MoveRequest};
use crate::config::ArenaConfig;
use crate::error::AgentError;

const SYSTEM_PROMPT: &str = "You are a chess playing AI";

/// Chat-completions client that treats the request's agent id as the model.
pub struct OpenRouterAgent {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenRouterAgent {
    pub fn new(config: &ArenaConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .user_agent("LlmChessArena/1.0")
            .timeout(config.agent_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.openrouter_base_url.trim_end_matches('/').to_string(),
            api_key: config.openrouter_api_key.clone(),
        })
    }
}

#[async_trait]
impl MoveAgent for OpenRouterAgent {
    async fn propose(&self, request: &MoveRequest) -> Result<String, AgentError> {
        let body = json!({
            "model": request.agent,
            "messages": build_messages(request),
            "response_format": { "type": "json_object" },
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = resp.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AgentError::EmptyResponse)?;

        debug!(agent = %request.agent, side = %request.side, len = content.len(), "Agent answered");
        Ok(content)
    }
}

/// System prompt, the move prompt, then one assistant/user pair per failed
/// attempt so the agent sees what went wrong.
fn build_messages(request: &MoveRequest) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: "user",
            content: move_prompt(request),
        },
    ];
    for exchange in &request.history {
        messages.push(ChatMessage {
            role: "assistant",
            content: exchange.response.clone(),
        });
        messages.push(ChatMessage {
            role: "user",
            content: format!(
                "An error occurred. Try again.\n\n**Error Message:** {}",
                exchange.error
            ),
        });
    }
    messages
}

fn move_prompt(request: &MoveRequest) -> String {
    let moves = request
        .legal_moves
        .iter()
        .map(|m| format!("{{\"From\":\"{}\",\"To\":\"{}\"}}", m.from, m.to))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are playing chess as {side}. Choose the best move from the available moves.\n\n\
         # Board Representation\n\
         - White pieces: UPPERCASE (e.g., 'K' for king, 'Q' for queen, 'N' for knight).\n\
         - Black pieces: lowercase (e.g., 'k', 'q', 'n').\n\
         - Empty squares: '.'\n\n\
         # Output Format\n\
         Reply with a single JSON object and nothing else:\n\
         {{\"ReasonForMove\": \"<why, 200 words or less>\", \"From\": \"e2\", \"To\": \"e4\", \"Message\": \"<a short message to your opponent>\"}}\n\n\
         # Available Moves\n{moves}\n\n\
         # Board State (FEN)\n{fen}\n\n\
         # Board State (ASCII)\n{ascii}",
        side = request.side.as_str(),
        fen = request.fen,
        ascii = request.ascii,
    )
}
