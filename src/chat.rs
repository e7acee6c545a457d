//! Text coach: one `generateContent` round trip per learner message.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::prompt::{self, PromptContext};
use crate::protocol::Content;

pub const FALLBACK_REPLY: &str = "I'm processing that...";
pub const CONNECTION_ERROR_REPLY: &str = "Connection error. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Coach,
}

impl Role {
    fn wire_name(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Coach => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Whether this exchange counts as lesson progress.
    pub progress: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub system_instruction: Content,
}

#[derive(Deserialize, Debug, Default)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

pub struct TextCoach {
    client: Client,
    chat_url: String,
    model: String,
    api_key: String,
    context: PromptContext,
    history: Vec<ChatMessage>,
}

impl TextCoach {
    pub fn new(
        chat_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        context: PromptContext,
        phase_id: u32,
        week_id: u32,
    ) -> Self {
        let welcome = prompt::welcome_message(phase_id, week_id, &context);
        Self {
            client: Client::new(),
            chat_url: chat_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            context,
            history: vec![ChatMessage {
                role: Role::Coach,
                text: welcome,
            }],
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn context(&self) -> &PromptContext {
        &self.context
    }

    /// Wrap a writing-task draft the way the coach expects to grade it.
    pub fn draft_submission(draft: &str) -> String {
        format!("MY WRITING DRAFT:\n\n{}\n\nPlease evaluate this response.", draft)
    }

    pub fn build_request(&self, message: &str) -> GenerateContentRequest {
        let mut contents: Vec<Content> = self
            .history
            .iter()
            .map(|m| Content::text(Some(m.role.wire_name()), m.text.clone()))
            .collect();
        contents.push(Content::text(Some(Role::User.wire_name()), message.to_string()));
        GenerateContentRequest {
            contents,
            system_instruction: Content::text(None, prompt::system_prompt(&self.context)),
        }
    }

    /// Send one learner message. Blank input is ignored and returns `None`.
    ///
    /// Network failures do not surface as errors: the coach answers with a
    /// connection-error line instead.
    pub async fn send(&mut self, message: &str) -> Option<Reply> {
        if message.trim().is_empty() {
            return None;
        }

        let request = self.build_request(message);
        // 只有在已有对话基础上的回复才算进度
        let progress = self.history.len() > 2;
        self.history.push(ChatMessage {
            role: Role::User,
            text: message.to_string(),
        });

        let reply = match self.generate(&request).await {
            Ok(raw) => {
                let raw = if raw.trim().is_empty() {
                    FALLBACK_REPLY.to_string()
                } else {
                    raw
                };
                Reply {
                    text: prompt::clean_text(&raw),
                    progress,
                }
            }
            Err(e) => {
                log::warn!("Text coach request failed: {:#}", e);
                Reply {
                    text: CONNECTION_ERROR_REPLY.to_string(),
                    progress: false,
                }
            }
        };

        self.history.push(ChatMessage {
            role: Role::Coach,
            text: reply.text.clone(),
        });
        Some(reply)
    }

    async fn generate(&self, request: &GenerateContentRequest) -> anyhow::Result<String> {
        let url = format!(
            "{}/{}:generateContent",
            self.chat_url.trim_end_matches('/'),
            self.model
        );
        log::debug!("Text coach request: {} ({} turns)", url, request.contents.len());

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("HTTP Error: {}", resp.status());
        }
        let body: GenerateContentResponse = resp.json().await?;
        Ok(body.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coach() -> TextCoach {
        TextCoach::new(
            "http://127.0.0.1:9/v1beta/models",
            "gemini-test",
            "key",
            PromptContext::new("Idea Organization", "Organize ideas first."),
            1,
            3,
        )
    }

    #[test]
    fn history_starts_with_welcome() {
        let c = coach();
        assert_eq!(c.history().len(), 1);
        assert_eq!(c.history()[0].role, Role::Coach);
        assert!(c.history()[0].text.starts_with("Welcome to Phase 1, Week 3"));
        assert_eq!(c.context().title, "Idea Organization");
    }

    #[test]
    fn request_maps_roles_and_appends_message() {
        let c = coach();
        let value = serde_json::to_value(c.build_request("Hi coach")).unwrap();
        assert_eq!(value["contents"][0]["role"], "model");
        assert_eq!(value["contents"][1], json!({ "role": "user", "parts": [{ "text": "Hi coach" }] }));
        assert!(
            value["systemInstruction"]["parts"][0]["text"]
                .as_str()
                .unwrap()
                .contains("Current Week Focus: Idea Organization")
        );
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let body: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "role": "model", "parts": [{ "text": "Hello " }, { "text": "there" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(body.text(), "Hello there");
        assert_eq!(GenerateContentResponse::default().text(), "");
    }

    #[test]
    fn draft_wrapping() {
        assert_eq!(
            TextCoach::draft_submission("Space matters."),
            "MY WRITING DRAFT:\n\nSpace matters.\n\nPlease evaluate this response."
        );
    }

    #[tokio::test]
    async fn blank_message_is_ignored() {
        let mut c = coach();
        assert_eq!(c.send("   ").await, None);
        assert_eq!(c.history().len(), 1);
    }
}
