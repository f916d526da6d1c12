//! OpenAI-compatible chat completion client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fallback::{parse_reply, Exchange, Fallback, FallbackError, FallbackReply};
use crate::actions::Action;
use crate::config::FallbackConfig;

/// Error bodies are cut to this many bytes before logging
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiFallback {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_prompt: String,
}

impl OpenAiFallback {
    pub fn new(config: &FallbackConfig, robot_name: &str) -> Result<Self, FallbackError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            system_prompt: system_prompt(robot_name),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request<'a>(&'a self, text: &'a str, context: &'a [Exchange]) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(context.len() * 2 + 2);
        messages.push(ChatMessage {
            role: "system",
            content: &self.system_prompt,
        });
        for exchange in context {
            messages.push(ChatMessage {
                role: "user",
                content: &exchange.user,
            });
            messages.push(ChatMessage {
                role: "assistant",
                content: &exchange.reply,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: text,
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.7,
        }
    }
}

fn system_prompt(robot_name: &str) -> String {
    let actions = Action::ALL
        .iter()
        .map(|a| a.name().replace(' ', "_"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are {robot_name}, a friendly robot car assistant.\n\
         You can perform physical actions. When you want to perform an action, put it on a \
         line starting with \"ACTIONS:\" followed by comma-separated action names.\n\n\
         Available actions:\n{actions}\n\n\
         Available modes:\nline_track, obstacle_avoid\n\n\
         Keep responses short and fun. Use actions to express emotions.\n\
         Example response:\nSure, turning left now!\nACTIONS: turn_left"
    )
}

#[async_trait]
impl Fallback for OpenAiFallback {
    async fn respond(&self, text: &str, context: &[Exchange]) -> Result<FallbackReply, FallbackError> {
        let api_key = self.api_key.as_deref().ok_or(FallbackError::MissingApiKey)?;

        debug!(model = %self.model, turns = context.len(), "querying fallback");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&self.request(text, context))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(FallbackError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| FallbackError::InvalidResponse("no choices in response".to_string()))?;

        debug!(%content, "fallback reply");
        Ok(parse_reply(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback() -> OpenAiFallback {
        let config = FallbackConfig {
            base_url: "https://llm.example.test/v1/".to_string(),
            api_key: Some("sk-test".to_string()),
            ..FallbackConfig::default()
        };
        OpenAiFallback::new(&config, "Picar").unwrap()
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(fallback().endpoint(), "https://llm.example.test/v1/chat/completions");
    }

    #[test]
    fn test_request_carries_context() {
        let fallback = fallback();
        let context = vec![Exchange {
            user: "hello".to_string(),
            reply: "hi!".to_string(),
        }];
        let request = fallback.request("tell me a joke", &context);
        let roles: Vec<_> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(request.messages[3].content, "tell me a joke");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
    }

    #[test]
    fn test_system_prompt_lists_actions() {
        let prompt = system_prompt("Picar");
        assert!(prompt.starts_with("You are Picar"));
        assert!(prompt.contains("turn_left"));
        assert!(prompt.contains("spin_around"));
        assert!(prompt.contains("obstacle_avoid"));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let fallback = OpenAiFallback::new(&FallbackConfig::default(), "Picar").unwrap();
        let err = fallback.respond("hi", &[]).await.unwrap_err();
        assert!(matches!(err, FallbackError::MissingApiKey));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"Wheee!\nACTIONS: spin_around"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let content = parsed.choices[0].message.content.as_deref().unwrap();
        assert_eq!(
            parse_reply(content).directives,
            vec![crate::interpreter::Directive::Action(Action::SpinAround)]
        );
    }
}
