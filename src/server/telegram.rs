//! Chat-bot bridge: task digests with inline buttons, and the button callbacks.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::{info, warn};

use super::{ApiError, ApiResult, AppState};
use crate::error::{Error, Result};

const BUTTON_LABEL_CHARS: usize = 20;
const ACTIONS_KEPT: usize = 10;
const DONE_ALL: &str = "done_all";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Name(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{id}"),
            ChatId::Name(name) => f.write_str(name),
        }
    }
}

/// Callback token carried by an inline button: `<action>_<taskId>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Start(String),
    Done(String),
    DoneAll,
    Unknown(String),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        if data == DONE_ALL {
            return CallbackAction::DoneAll;
        }
        match data.split_once('_') {
            Some(("start", id)) if !id.is_empty() => CallbackAction::Start(id.to_string()),
            Some(("done", id)) if !id.is_empty() => CallbackAction::Done(id.to_string()),
            _ => CallbackAction::Unknown(data.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CallbackAction::Start(_) => "start",
            CallbackAction::Done(_) => "done",
            CallbackAction::DoneAll => DONE_ALL,
            CallbackAction::Unknown(data) => data,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            CallbackAction::Start(id) | CallbackAction::Done(id) => Some(id),
            _ => None,
        }
    }

    fn confirmation_text(&self) -> Option<&'static str> {
        match self {
            CallbackAction::Start(_) => Some("🔄 *Task Started*\n\n✅ Click \"Done\" when finished!"),
            CallbackAction::Done(_) => Some("✅ *Task Completed*"),
            CallbackAction::DoneAll => Some("✅ *All Tasks Completed!*"),
            CallbackAction::Unknown(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAction {
    pub action: String,
    pub task_id: Option<String>,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

/// Recent button presses per chat. Memory only; lost on restart.
#[derive(Debug, Default)]
pub struct ChatActionLog {
    chats: HashMap<String, VecDeque<ChatAction>>,
}

impl ChatActionLog {
    pub fn record(&mut self, chat: &str, action: &str, task_id: Option<&str>) {
        let entries = self.chats.entry(chat.to_string()).or_default();
        entries.push_back(ChatAction {
            action: action.to_string(),
            task_id: task_id.map(str::to_string),
            timestamp: Utc::now().timestamp_millis(),
        });
        while entries.len() > ACTIONS_KEPT {
            entries.pop_front();
        }
    }

    pub fn actions(&self, chat: &str) -> Vec<ChatAction> {
        self.chats
            .get(chat)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// Bot API client
// =============================================================================

#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

impl BotResponse {
    /// The error description when the Bot API refused the call.
    fn failure(&self) -> Option<&str> {
        if self.ok {
            return None;
        }
        Some(self.description.as_deref().unwrap_or("Telegram API error"))
    }
}

fn warn_on_failure(method: &str, reply: &BotResponse) {
    if let Some(description) = reply.failure() {
        warn!(method, "Telegram call rejected: {}", description);
    }
}

struct Bot<'a> {
    client: &'a reqwest::Client,
    base: String,
}

impl<'a> Bot<'a> {
    fn from_state(state: &'a AppState) -> Result<Self> {
        let config = &state.config.telegram;
        let token = config
            .bot_token
            .as_deref()
            .ok_or(Error::NotConfigured("Telegram bot token"))?;
        Ok(Self {
            client: &state.http,
            base: format!("{}/bot{}", config.api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<B: Serialize + ?Sized>(&self, method: &str, body: &B) -> Result<BotResponse> {
        let response = self
            .client
            .post(format!("{}/{}", self.base, method))
            .json(body)
            .send()
            .await?;
        Ok(response.json().await?)
    }
}

// =============================================================================
// Sending task digests
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ButtonTask {
    id: String,
    #[serde(alias = "title")]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    chat_id: Option<ChatId>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tasks: Vec<ButtonTask>,
    #[serde(default = "default_parse_mode")]
    parse_mode: String,
}

fn default_parse_mode() -> String {
    "HTML".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineButton {
    text: String,
    callback_data: String,
}

#[derive(Serialize)]
struct ReplyMarkup<'a> {
    inline_keyboard: &'a [Vec<InlineButton>],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a ChatId,
    text: &'a str,
    parse_mode: &'a str,
    reply_markup: ReplyMarkup<'a>,
}

fn button_label(text: &str) -> String {
    let mut label: String = text.chars().take(BUTTON_LABEL_CHARS).collect();
    if text.chars().count() > BUTTON_LABEL_CHARS {
        label.push_str("...");
    }
    format!("▶️ {label}")
}

/// Two task buttons per row, then a single "done all" row.
fn task_keyboard(tasks: &[ButtonTask]) -> Vec<Vec<InlineButton>> {
    if tasks.is_empty() {
        return Vec::new();
    }
    let mut rows: Vec<Vec<InlineButton>> = tasks
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|task| InlineButton {
                    text: button_label(&task.text),
                    callback_data: format!("start_{}", task.id),
                })
                .collect()
        })
        .collect();
    rows.push(vec![InlineButton {
        text: "✅ Mark All Done".to_string(),
        callback_data: DONE_ALL.to_string(),
    }]);
    rows
}

#[derive(Serialize)]
pub struct Ready {
    success: bool,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'static str>,
}

pub async fn send_ready() -> Json<Ready> {
    Json(Ready {
        success: true,
        message: "Telegram sync ready",
        instructions: Some("Set TASKDASH_TELEGRAM_BOT_TOKEN or telegram.bot_token"),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sent {
    success: bool,
    message_id: Option<i64>,
}

pub async fn send(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<Sent> {
    let Json(request) = payload?;
    let (Some(chat_id), Some(text)) = (
        request.chat_id.as_ref(),
        request.text.as_deref().filter(|t| !t.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Missing chatId or text"));
    };

    let bot = Bot::from_state(&state)?;
    let keyboard = task_keyboard(&request.tasks);
    let reply = bot
        .call(
            "sendMessage",
            &SendMessage {
                chat_id,
                text,
                parse_mode: &request.parse_mode,
                reply_markup: ReplyMarkup {
                    inline_keyboard: &keyboard,
                },
            },
        )
        .await?;

    if let Some(description) = reply.failure() {
        warn!("Telegram sendMessage failed: {}", description);
        return Err(ApiError::new(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            description,
        ));
    }

    let message_id = reply
        .result
        .as_ref()
        .and_then(|r| r.get("message_id"))
        .and_then(Value::as_i64);
    Ok(Json(Sent {
        success: true,
        message_id,
    }))
}

// =============================================================================
// Button callbacks
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct Update {
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message: Option<CallbackMessage>,
}

#[derive(Debug, Deserialize)]
struct CallbackMessage {
    message_id: i64,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Serialize)]
struct AnswerCallback<'a> {
    callback_query_id: &'a str,
}

#[derive(Serialize)]
struct EditMessage<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Handled {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<String>,
}

pub async fn webhook(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Update>, JsonRejection>,
) -> ApiResult<Handled> {
    let Json(update) = payload?;
    let bot = Bot::from_state(&state)?;

    let Some(query) = update.callback_query else {
        return Ok(Json(Handled {
            success: true,
            action: None,
            task_id: None,
        }));
    };

    let answered = bot
        .call(
            "answerCallbackQuery",
            &AnswerCallback {
                callback_query_id: &query.id,
            },
        )
        .await?;
    warn_on_failure("answerCallbackQuery", &answered);

    let action = CallbackAction::parse(query.data.as_deref().unwrap_or_default());
    if let (Some(text), Some(message)) = (action.confirmation_text(), &query.message) {
        // The press is recorded even if the message could not be edited.
        let edited = bot
            .call(
                "editMessageText",
                &EditMessage {
                    chat_id: message.chat.id,
                    message_id: message.message_id,
                    text,
                    parse_mode: "Markdown",
                },
            )
            .await?;
        warn_on_failure("editMessageText", &edited);

        let chat = message.chat.id.to_string();
        state
            .chat_log
            .lock()
            .await
            .record(&chat, action.name(), action.task_id());
        info!(chat = %chat, action = action.name(), "recorded chat action");
    }

    if matches!(action, CallbackAction::Unknown(_)) {
        return Ok(Json(Handled {
            success: true,
            action: None,
            task_id: None,
        }));
    }

    Ok(Json(Handled {
        success: true,
        action: Some(action.name().to_string()),
        task_id: action.task_id().map(str::to_string),
    }))
}

// =============================================================================
// Polling recorded actions
// =============================================================================

#[derive(Serialize)]
#[serde(untagged)]
pub enum PollResponse {
    Actions {
        success: bool,
        actions: Vec<ChatAction>,
    },
    Ready {
        success: bool,
        message: &'static str,
        setup: &'static str,
    },
}

pub async fn poll(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<PollResponse> {
    match params.get("chatId").filter(|c| !c.is_empty()) {
        Some(chat) => Json(PollResponse::Actions {
            success: true,
            actions: state.chat_log.lock().await.actions(chat),
        }),
        None => Json(PollResponse::Ready {
            success: true,
            message: "Poll endpoint ready",
            setup: "Set the bot token and point the bot webhook at /api/telegram/webhook",
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRequest {
    chat_id: ChatId,
    action: String,
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Serialize)]
pub struct Recorded {
    success: bool,
    message: &'static str,
}

pub async fn record(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RecordRequest>, JsonRejection>,
) -> ApiResult<Recorded> {
    let Json(request) = payload?;
    state.chat_log.lock().await.record(
        &request.chat_id.to_string(),
        &request.action,
        request.task_id.as_deref(),
    );
    Ok(Json(Recorded {
        success: true,
        message: "Action recorded",
    }))
}
