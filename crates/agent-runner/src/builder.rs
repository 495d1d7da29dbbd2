//! Message and event codec
//!
//! Pure functions turning run facts and upstream events into persisted
//! message shapes and wire items.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use agentrun_core::message::{ext_keys, ContentType, InputPart, Message, MessageRole, MessageType};
use agentrun_core::run::{ChunkMessageItem, RunRecord, Usage};

use crate::context::RunContext;
use crate::error::Result;
use crate::event::{FunctionCallEvent, KnowledgeDocument, ModelMessage, ModelRole};
use crate::interrupt::ResumeInfo;
use crate::request::{AdditionalMessage, AgentRunMeta};

const SUB_TYPE_KNOWLEDGE: &str = "knowledge_recall";
const SUB_TYPE_ANSWER_FINISH: &str = "generate_answer_finish";
const SUB_TYPE_INTERRUPT: &str = "interrupt";

#[derive(Debug, Serialize, Deserialize)]
struct BotState {
    agent_id: String,
    agent_name: String,
    awaiting: String,
    bot_id: String,
}

/// Verbose message content, `data` is itself a JSON string
#[derive(Debug, Serialize, Deserialize)]
pub struct VerboseInfo {
    pub msg_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
struct FinishData {
    finish_reason: i32,
    fin_data: String,
}

#[derive(Debug, Serialize)]
struct NamedRef {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct RecallMeta {
    dataset: NamedRef,
    document: NamedRef,
}

#[derive(Debug, Serialize)]
struct RecallChunk {
    slice: String,
    meta: RecallMeta,
    score: f64,
}

#[derive(Debug, Serialize)]
struct RecallData {
    chunks: Vec<RecallChunk>,
    ori_req: String,
    status_code: i32,
}

#[derive(Debug, Serialize)]
struct RequiredAction {
    #[serde(rename = "type")]
    action_type: String,
    submit_tool_outputs: HashMap<String, String>,
}

fn bot_state(ctx: &RunContext) -> Result<String> {
    let agent_id = ctx.meta.agent_id.to_string();
    let state = BotState {
        agent_id: agent_id.clone(),
        agent_name: ctx.agent.name.clone(),
        awaiting: agent_id.clone(),
        bot_id: agent_id,
    };
    Ok(serde_json::to_string(&state)?)
}

/// Assistant message of the current run carrying bot state
fn agent_message(ctx: &RunContext, message_type: MessageType) -> Result<Message> {
    let mut message = Message::new(
        ctx.meta.conversation_id,
        ctx.meta.section_id,
        ctx.meta.agent_id,
        ctx.run.id,
    )
    .with_user(ctx.meta.user_id.clone())
    .with_role(MessageRole::Assistant)
    .with_type(message_type);
    message.content_type = ContentType::Text;
    message
        .ext
        .insert(ext_keys::BOT_STATE.to_string(), bot_state(ctx)?);
    Ok(message)
}

fn verbose_content(msg_type: &str, data: String) -> Result<String> {
    Ok(serde_json::to_string(&VerboseInfo {
        msg_type: msg_type.to_string(),
        data,
    })?)
}

/// Model-native form of the user input
pub fn input_model_message(meta: &AgentRunMeta) -> ModelMessage {
    let mut message = ModelMessage::user(meta.first_text());
    if meta.content.iter().any(|part| part.as_text().is_none()) {
        message.multi_content = meta.content.clone();
    }
    message
}

/// Question message holding the user input
pub fn build_question(ctx: &RunContext) -> Result<Message> {
    let meta = &ctx.meta;
    let mut message = Message::new(meta.conversation_id, meta.section_id, meta.agent_id, ctx.run.id)
        .with_user(meta.user_id.clone())
        .with_role(MessageRole::User)
        .with_type(MessageType::Question)
        .with_content(meta.first_text());
    message.content_type = meta.content_type;
    message.multi_content = meta.content.clone();
    message.display_content = meta.display_content.clone();
    message.ext = meta.ext.clone();
    message.model_content = serde_json::to_string(&input_model_message(meta))?;
    Ok(message)
}

/// Answer draft to reserve before streaming
pub fn build_answer_draft(ctx: &RunContext) -> Result<Message> {
    let mut message = agent_message(ctx, MessageType::Answer)?;
    for (key, value) in &ctx.meta.ext {
        message.ext.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Ok(message)
}

pub fn build_function_call(ctx: &RunContext, event: &FunctionCallEvent) -> Result<Message> {
    let mut message = agent_message(ctx, MessageType::FunctionCall)?;
    if let Some(tool_call) = event.message.tool_calls.first() {
        message.content = serde_json::to_string(tool_call)?;
        message.ext.insert(
            ext_keys::PLUGIN.to_string(),
            tool_call.function.name.clone(),
        );
        message.ext.insert(
            ext_keys::TOOL_NAME.to_string(),
            tool_call.function.name.clone(),
        );
        message
            .ext
            .insert(ext_keys::TIME_COST.to_string(), ctx.time_cost());
        message.model_content = serde_json::to_string(&event.message)?;
    }
    Ok(message)
}

pub fn build_tool_response(ctx: &RunContext, messages: &[ModelMessage]) -> Result<Message> {
    let mut message = agent_message(ctx, MessageType::ToolResponse)?;
    message
        .ext
        .insert(ext_keys::TIME_COST.to_string(), ctx.time_cost());
    if let Some(first) = messages.first() {
        message.content = first.content.clone();
        message.model_content = serde_json::to_string(first)?;
    }
    Ok(message)
}

pub fn build_knowledge(ctx: &RunContext, documents: &[KnowledgeDocument]) -> Result<Message> {
    let chunks = documents
        .iter()
        .map(|doc| RecallChunk {
            slice: doc.content.clone(),
            meta: RecallMeta {
                dataset: NamedRef {
                    id: doc.meta_str("dataset_id").to_string(),
                    name: doc.meta_str("dataset_name").to_string(),
                },
                document: NamedRef {
                    id: doc.meta_str("document_id").to_string(),
                    name: doc.meta_str("document_name").to_string(),
                },
            },
            score: doc.score,
        })
        .collect();
    let data = serde_json::to_string(&RecallData {
        chunks,
        ori_req: String::new(),
        status_code: 0,
    })?;

    let mut message = agent_message(ctx, MessageType::Knowledge)?;
    message.content = verbose_content(SUB_TYPE_KNOWLEDGE, data)?;
    message.model_content = serde_json::to_string(documents)?;
    message
        .ext
        .insert(ext_keys::TIME_COST.to_string(), ctx.time_cost());
    Ok(message)
}

pub fn build_suggest(ctx: &RunContext, suggestion: &str) -> Result<Message> {
    Ok(agent_message(ctx, MessageType::FlowUp)?.with_content(suggestion))
}

/// Verbose marker telling the client the final answer is complete
pub fn build_answer_finish(ctx: &RunContext) -> Result<Message> {
    let data = serde_json::to_string(&FinishData {
        finish_reason: 0,
        fin_data: String::new(),
    })?;
    Ok(agent_message(ctx, MessageType::Verbose)?
        .with_content(verbose_content(SUB_TYPE_ANSWER_FINISH, data)?))
}

/// Hidden Verbose message anchoring a resume on the next turn
pub fn build_interrupt_anchor(ctx: &RunContext, info: &ResumeInfo) -> Result<Message> {
    let action = RequiredAction {
        action_type: "submit_tool_outputs".to_string(),
        submit_tool_outputs: HashMap::new(),
    };
    Ok(agent_message(ctx, MessageType::Verbose)?
        .with_content(verbose_content(SUB_TYPE_INTERRUPT, String::new())?)
        .with_ext(ext_keys::RESUME_INFO, serde_json::to_string(info)?)
        .with_ext(ext_keys::TOOL_CALL_IDS, info.trigger_id())
        .with_ext(ext_keys::REQUIRES_ACTION, serde_json::to_string(&action)?))
}

/// Wire projection of a message of the current run
pub fn build_send_msg(ctx: &RunContext, message: &Message, is_finish: bool) -> ChunkMessageItem {
    ChunkMessageItem {
        id: message.id,
        conversation_id: message.conversation_id,
        section_id: message.section_id,
        agent_id: message.agent_id,
        run_id: ctx.run.id,
        role: message.role,
        message_type: message.message_type,
        content: message.content.clone(),
        content_type: message.content_type,
        reasoning_content: Some(message.reasoning_content.clone()).filter(|r| !r.is_empty()),
        reply_id: ctx.question_id,
        ext: message.ext.clone(),
        is_finish,
        created_at: message.created_at,
        updated_at: message.updated_at,
    }
}

/// Acknowledgement of a stored question
pub fn build_ack(question: &Message) -> ChunkMessageItem {
    ChunkMessageItem {
        id: question.id,
        conversation_id: question.conversation_id,
        section_id: question.section_id,
        agent_id: question.agent_id,
        run_id: question.run_id,
        role: question.role,
        message_type: MessageType::Ack,
        content: question.content.clone(),
        content_type: ContentType::Text,
        reasoning_content: None,
        reply_id: question.id,
        ext: HashMap::new(),
        is_finish: true,
        created_at: question.created_at,
        updated_at: question.updated_at,
    }
}

/// Write token counters into an ext map
pub fn apply_usage_ext(ext: &mut HashMap<String, String>, usage: &Usage) {
    ext.insert(ext_keys::TOKEN.to_string(), usage.total_tokens.to_string());
    ext.insert(
        ext_keys::INPUT_TOKENS.to_string(),
        usage.input_tokens.to_string(),
    );
    ext.insert(
        ext_keys::OUTPUT_TOKENS.to_string(),
        usage.output_tokens.to_string(),
    );
}

pub fn answer_model_content(content: &str) -> Result<String> {
    Ok(serde_json::to_string(&ModelMessage::assistant(content))?)
}

/// Drop function calls of runs whose calls and responses do not pair up
pub fn history_pairs(history: &[Message]) -> Vec<Message> {
    let mut tool_messages: HashMap<i64, usize> = HashMap::new();
    for message in history {
        if matches!(
            message.message_type,
            MessageType::FunctionCall | MessageType::ToolResponse
        ) {
            *tool_messages.entry(message.run_id).or_default() += 1;
        }
    }

    history
        .iter()
        .filter(|message| {
            message.message_type != MessageType::FunctionCall
                || tool_messages.get(&message.run_id).copied().unwrap_or(0) % 2 == 0
        })
        .cloned()
        .collect()
}

/// Prompt history from stored messages
///
/// Verbose and follow-up messages never reach the model, nor do messages
/// without a model-native form. Reasoning is stripped.
pub fn to_model_messages(history: &[Message]) -> Vec<ModelMessage> {
    history
        .iter()
        .filter(|message| {
            !message.model_content.is_empty()
                && !matches!(
                    message.message_type,
                    MessageType::Verbose | MessageType::FlowUp
                )
        })
        .filter_map(|message| {
            match serde_json::from_str::<ModelMessage>(&message.model_content) {
                Ok(mut model) => {
                    model.reasoning_content.clear();
                    Some(model)
                }
                Err(err) => {
                    warn!("Skipping message {} with bad model content: {}", message.id, err);
                    None
                }
            }
        })
        .collect()
}

/// Persisted form of a back-filled message, `None` for unsupported types
pub fn build_additional_message(
    record: &RunRecord,
    additional: &AdditionalMessage,
    user_id: &str,
) -> Result<Option<Message>> {
    let text = additional
        .content
        .iter()
        .find_map(InputPart::as_text)
        .unwrap_or("");
    let mut message = Message::new(
        record.conversation_id,
        record.section_id,
        record.agent_id,
        record.id,
    )
    .with_user(user_id)
    .with_type(additional.message_type)
    .with_content(text);

    match additional.message_type {
        MessageType::Question => {
            message.role = MessageRole::User;
            message.content_type = additional.content_type;
            message.multi_content = additional.content.clone();
            message.model_content = serde_json::to_string(&ModelMessage {
                role: ModelRole::User,
                content: text.to_string(),
                ..ModelMessage::default()
            })?;
        }
        MessageType::Answer => {
            message.role = MessageRole::Assistant;
            message.content_type = ContentType::Text;
            message.model_content = answer_model_content(text)?;
        }
        other => {
            warn!("Skipping additional message of unsupported type {:?}", other);
            return Ok(None);
        }
    }
    Ok(Some(message))
}

/// `USER_INPUT` of a chatflow: texts, then file urls, comma-joined
pub fn concat_workflow_input(parts: &[InputPart]) -> String {
    let texts = parts.iter().filter_map(InputPart::as_text);
    let urls = parts.iter().filter_map(InputPart::url);
    texts
        .chain(urls)
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
