//! Message event handler
//!
//! Owns the draft buffers of one run and turns every upstream event into
//! persisted messages plus client events. It is only ever driven by a single
//! consumer task, so none of its state is shared.
//!
//! Every streamed answer follows the same shape: reserve a draft id, send
//! deltas carrying only the new text, then write the full content and ext
//! back onto the same id and send one `MessageCompleted`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agentrun_core::message::{ext_keys, ContentType, Message, MessagePatch, MessageRepository};
use agentrun_core::run::{AgentRunResponse, ChunkMessageItem, RunError, Usage};

use crate::builder;
use crate::context::RunContext;
use crate::error::{Result, RunnerError};
use crate::event::{
    DataMessage, DataType, FunctionCallEvent, KnowledgeDocument, MessageChunk, ModelMessage,
    StateMessage, WorkflowStatus,
};
use crate::executor::{SuggestRequest, SuggestionGenerator};
use crate::interrupt::{
    render_agent_interrupt, render_workflow_interrupt, AgentInterrupt, InterruptEvent,
    RenderedInterrupt, ResumeInfo,
};
use crate::sink::EventSink;
use crate::stream::StreamReader;

pub struct MessageEventHandler {
    ctx: RunContext,
    messages: Arc<dyn MessageRepository>,
    sink: EventSink,
    cancel: CancellationToken,
    suggester: Option<Arc<dyn SuggestionGenerator>>,

    /// Reasoning of the run, attached to the first answer at the end
    reasoning: String,
    reasoning_msg: Option<Message>,
    first_answer: Option<Message>,
    finish_sent: bool,
    /// Draft opened by a function call for its paired tool response
    tool_response_draft: Option<Message>,
    /// Mid-answer text streamed since the last tool response
    tool_response_content: String,
    usage: Option<Usage>,

    /// Open chatflow answer draft and its accumulated text
    workflow_draft: Option<Message>,
    workflow_content: String,
    last_answer: Option<ChunkMessageItem>,
    workflow_failure: Option<RunError>,
}

impl MessageEventHandler {
    pub fn new(
        ctx: RunContext,
        messages: Arc<dyn MessageRepository>,
        sink: EventSink,
        cancel: CancellationToken,
        suggester: Option<Arc<dyn SuggestionGenerator>>,
    ) -> Self {
        Self {
            ctx,
            messages,
            sink,
            cancel,
            suggester,
            reasoning: String::new(),
            reasoning_msg: None,
            first_answer: None,
            finish_sent: false,
            tool_response_draft: None,
            tool_response_content: String::new(),
            usage: None,
            workflow_draft: None,
            workflow_content: String::new(),
            last_answer: None,
            workflow_failure: None,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Latest usage observed in the run
    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Error of a workflow that reported failure, already sent to the client
    pub fn workflow_failure(&self) -> Option<&RunError> {
        self.workflow_failure.as_ref()
    }

    fn record_usage(&mut self, usage: Option<Usage>) {
        if let Some(usage) = usage {
            self.usage = Some(usage);
        }
    }

    async fn pre_create_answer(&self) -> Result<Message> {
        let draft = builder::build_answer_draft(&self.ctx)?;
        Ok(self.messages.pre_create(draft).await?)
    }

    /// Persist a complete message and send it as completed
    async fn create_completed(&self, message: Message) -> Result<Message> {
        let saved = self.messages.create(message).await?;
        self.sink
            .message_completed(builder::build_send_msg(&self.ctx, &saved, true))
            .await;
        Ok(saved)
    }

    async fn send_delta(&self, draft: &Message, content: &str) {
        let mut item = builder::build_send_msg(&self.ctx, draft, false);
        item.content = content.to_string();
        item.reasoning_content = None;
        self.sink.message_delta(item).await;
    }

    /// Persist the user input and acknowledge it
    pub async fn handle_input(&mut self) -> Result<Message> {
        let question = builder::build_question(&self.ctx)?;
        let saved = self.messages.create(question).await?;
        self.ctx.question_id = saved.id;
        debug!("Stored question {} for run {}", saved.id, self.ctx.run.id);
        self.sink
            .send(AgentRunResponse::Ack(builder::build_ack(&saved)))
            .await;
        Ok(saved)
    }

    /// Write the final form of a draft and send its completed event
    ///
    /// Nothing is persisted when both content and reasoning are empty.
    async fn finalize_answer(
        &mut self,
        draft: &Message,
        content: String,
        content_type: ContentType,
        reasoning: Option<String>,
        usage: Option<Usage>,
    ) -> Result<Option<ChunkMessageItem>> {
        let reasoning = reasoning.unwrap_or_default();
        if content.is_empty() && reasoning.is_empty() {
            return Ok(None);
        }

        let mut message = draft.clone();
        if let Some(usage) = &usage {
            builder::apply_usage_ext(&mut message.ext, usage);
        }
        self.record_usage(usage);
        message
            .ext
            .entry(ext_keys::TIME_COST.to_string())
            .or_insert_with(|| self.ctx.time_cost());
        message.model_content = builder::answer_model_content(&content)?;
        message.content = content;
        message.content_type = content_type;
        message.reasoning_content = reasoning;

        let saved = self.messages.create(message).await?;
        let item = builder::build_send_msg(&self.ctx, &saved, true);
        self.sink.message_completed(item.clone()).await;
        self.last_answer = Some(item.clone());
        Ok(Some(item))
    }

    pub async fn handle_function_call(&mut self, event: FunctionCallEvent) -> Result<()> {
        self.record_usage(event.usage);
        let message = builder::build_function_call(&self.ctx, &event)?;
        self.create_completed(message).await?;

        if self.tool_response_draft.is_none() {
            self.tool_response_draft = Some(self.pre_create_answer().await?);
        }
        Ok(())
    }

    pub async fn handle_tool_response(&mut self, responses: Vec<ModelMessage>) -> Result<()> {
        let mut message = builder::build_tool_response(&self.ctx, &responses)?;
        if let Some(draft) = self.tool_response_draft.take() {
            message.id = draft.id;
            message.created_at = draft.created_at;
            if !self.tool_response_content.is_empty() {
                message.content = format!("{}\n{}", self.tool_response_content, message.content);
            }
        }
        self.tool_response_content.clear();
        self.create_completed(message).await?;
        Ok(())
    }

    pub async fn handle_knowledge(&mut self, documents: Vec<KnowledgeDocument>) -> Result<()> {
        let message = builder::build_knowledge(&self.ctx, &documents)?;
        self.create_completed(message).await?;
        Ok(())
    }

    /// Streamed tool output, split into segments by chunks flagged finished
    pub async fn handle_tool_mid_answer(
        &mut self,
        mut stream: StreamReader<MessageChunk>,
    ) -> Result<()> {
        let cancel = self.cancel.clone();
        let mut draft = self.pre_create_answer().await?;
        let mut full = String::new();
        let mut usage = None;
        let mut previous_finished = false;

        while let Some(chunk) = stream.recv(&cancel).await? {
            if previous_finished {
                draft = self.pre_create_answer().await?;
                previous_finished = false;
            }
            if self.first_answer.is_none() && !chunk.content.is_empty() {
                if let Some(reasoning_msg) = &self.reasoning_msg {
                    draft = reasoning_msg.clone();
                }
                self.first_answer = Some(draft.clone());
            }
            if let Some(title) = chunk.node_name() {
                draft
                    .ext
                    .insert(ext_keys::MESSAGE_TITLE.to_string(), title.to_string());
            }

            self.send_delta(&draft, &chunk.content).await;
            self.tool_response_content.push_str(&chunk.content);
            full.push_str(&chunk.content);
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }

            if chunk.is_finish() {
                previous_finished = true;
                let content = std::mem::take(&mut full);
                self.finalize_answer(&draft, content, ContentType::Text, None, usage)
                    .await?;
            }
        }

        if !previous_finished && !full.is_empty() {
            self.finalize_answer(&draft, full, ContentType::Text, None, usage)
                .await?;
        }
        Ok(())
    }

    /// Tool output streamed as the answer, finalized at end of stream
    pub async fn handle_tool_as_answer(
        &mut self,
        mut stream: StreamReader<MessageChunk>,
    ) -> Result<()> {
        let cancel = self.cancel.clone();
        let draft = self.pre_create_answer().await?;
        if self.first_answer.is_none() {
            self.first_answer = Some(draft.clone());
        }
        let mut full = String::new();
        let mut usage = None;

        while let Some(chunk) = stream.recv(&cancel).await? {
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            full.push_str(&chunk.content);
            self.send_delta(&draft, &chunk.content).await;
        }

        self.finalize_answer(&draft, full, ContentType::Text, None, usage)
            .await?;
        Ok(())
    }

    /// Model answer with independent reasoning and content deltas
    ///
    /// A stream that turns out to request tool calls produces no answer.
    pub async fn handle_model_answer(
        &mut self,
        mut stream: StreamReader<MessageChunk>,
    ) -> Result<()> {
        let cancel = self.cancel.clone();
        let mut full = String::new();
        let mut usage = None;
        let mut has_tool_calls = false;
        let mut answer: Option<Message> = None;

        while let Some(chunk) = stream.recv(&cancel).await? {
            if !chunk.tool_calls.is_empty() {
                has_tool_calls = true;
            }
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.reasoning_content.is_empty() && chunk.content.is_empty() {
                continue;
            }

            if !chunk.reasoning_content.is_empty() {
                if self.reasoning_msg.is_none() {
                    self.reasoning_msg = Some(self.pre_create_answer().await?);
                }
                if let Some(reasoning_msg) = &self.reasoning_msg {
                    let mut item = builder::build_send_msg(&self.ctx, reasoning_msg, false);
                    item.reasoning_content = Some(chunk.reasoning_content.clone());
                    self.sink.message_delta(item).await;
                }
                self.reasoning.push_str(&chunk.reasoning_content);
            }

            if !chunk.content.is_empty() {
                if answer.is_none() {
                    let mut draft = self.pre_create_answer().await?;
                    if self.first_answer.is_none() {
                        // The first answer shares its id with the reasoning shown before it
                        if let Some(reasoning_msg) = &self.reasoning_msg {
                            draft.id = reasoning_msg.id;
                        }
                        self.first_answer = Some(draft.clone());
                    }
                    answer = Some(draft);
                }
                if let Some(draft) = &answer {
                    self.send_delta(draft, &chunk.content).await;
                }
                full.push_str(&chunk.content);
            }
        }

        if has_tool_calls {
            debug!("Model answer of run {} requested tool calls", self.ctx.run.id);
            return Ok(());
        }
        if let Some(draft) = answer {
            self.finalize_answer(&draft, full, ContentType::Text, None, usage)
                .await?;
        }
        Ok(())
    }

    pub async fn handle_suggest(&mut self, suggestion: String) -> Result<()> {
        if !self.finish_sent {
            self.send_answer_finish().await?;
        }
        let message = builder::build_suggest(&self.ctx, &suggestion)?;
        self.create_completed(message).await?;
        Ok(())
    }

    /// Render an agent interrupt and leave a resume anchor behind
    pub async fn handle_interrupt(&mut self, interrupt: AgentInterrupt) -> Result<()> {
        let rendered = render_agent_interrupt(&interrupt)?;
        info!(
            "Run {} interrupted by {} ({})",
            self.ctx.run.id,
            interrupt.tool_call_id,
            interrupt.payload.kind().as_str()
        );
        let reasoning = if self.first_answer.is_none() && !self.reasoning.is_empty() {
            Some(std::mem::take(&mut self.reasoning))
        } else {
            None
        };
        let usage = self.usage;
        self.send_interrupt_answer(rendered, reasoning, usage).await?;

        let anchor = builder::build_interrupt_anchor(&self.ctx, &ResumeInfo::Agent(interrupt))?;
        self.create_completed(anchor).await?;
        Ok(())
    }

    async fn send_interrupt_answer(
        &mut self,
        rendered: RenderedInterrupt,
        reasoning: Option<String>,
        usage: Option<Usage>,
    ) -> Result<()> {
        let mut draft = self.pre_create_answer().await?;
        draft.content_type = rendered.content_type;
        self.send_delta(&draft, &rendered.content).await;
        self.finalize_answer(
            &draft,
            rendered.content,
            rendered.content_type,
            reasoning,
            usage,
        )
        .await?;
        Ok(())
    }

    /// Attach buffered reasoning to the first answer
    ///
    /// A run that only reasoned keeps its reasoning on the reasoning draft.
    async fn save_reasoning(&mut self) -> Result<()> {
        if self.reasoning.is_empty() {
            return Ok(());
        }
        let reasoning = std::mem::take(&mut self.reasoning);
        if let Some(first) = &self.first_answer {
            let patch = MessagePatch::new(first.id).reasoning_content(reasoning);
            self.messages.edit(patch).await?;
            return Ok(());
        }
        if let Some(reasoning_msg) = self.reasoning_msg.clone() {
            self.finalize_answer(
                &reasoning_msg,
                String::new(),
                ContentType::Text,
                Some(reasoning),
                None,
            )
            .await?;
        }
        Ok(())
    }

    /// Send the final-answer marker, at most once per run
    async fn send_answer_finish(&mut self) -> Result<()> {
        if self.finish_sent {
            return Ok(());
        }
        self.finish_sent = true;
        self.save_reasoning().await?;
        let message = builder::build_answer_finish(&self.ctx)?;
        self.create_completed(message).await?;
        Ok(())
    }

    /// The agent stream ended normally
    pub async fn handle_end(&mut self) -> Result<()> {
        self.send_answer_finish().await
    }

    pub async fn handle_workflow_data(&mut self, data: DataMessage) -> Result<()> {
        if data.data_type != DataType::Answer {
            return Ok(());
        }
        if data.node_type.is_interactive() {
            debug!("Suppressing {:?} node output in run {}", data.node_type, self.ctx.run.id);
            return Ok(());
        }

        let draft = match self.workflow_draft.take() {
            Some(draft) => draft,
            None => self.pre_create_answer().await?,
        };
        self.workflow_content.push_str(&data.content);
        self.send_delta(&draft, &data.content).await;

        if data.last {
            let content = std::mem::take(&mut self.workflow_content);
            let usage = self.usage;
            self.finalize_answer(&draft, content, ContentType::Text, None, usage)
                .await?;
        } else {
            self.workflow_draft = Some(draft);
        }
        Ok(())
    }

    /// Apply a run-level workflow update
    ///
    /// A failed workflow is reported to the client right away but the stream
    /// is still drained; the run is marked failed once it ends.
    pub async fn handle_workflow_state(&mut self, state: StateMessage) -> Result<()> {
        self.record_usage(state.usage);
        match state.status {
            WorkflowStatus::Running => Ok(()),
            WorkflowStatus::Failed => {
                let Some(last_error) = state.last_error else {
                    return Err(RunnerError::MissingWorkflowError);
                };
                let err = RunnerError::Workflow {
                    code: last_error.code,
                    message: last_error.message,
                };
                warn!(
                    "Workflow {} of run {} failed: {}",
                    state.execute_id, self.ctx.run.id, err
                );
                self.sink.error(&err, self.ctx.run_mode).await;
                self.workflow_failure = Some(RunError {
                    code: err.code(),
                    message: err.to_string(),
                });
                Ok(())
            }
            WorkflowStatus::Interrupted => {
                let Some(event) = state.interrupt_event else {
                    return Err(RunnerError::MissingInterruptEvent);
                };
                self.handle_workflow_interrupt(state.execute_id, event)
                    .await
            }
            WorkflowStatus::Cancel => Err(RunnerError::Cancelled),
            WorkflowStatus::Success => self.finish_workflow().await,
        }
    }

    async fn handle_workflow_interrupt(
        &mut self,
        execute_id: i64,
        event: InterruptEvent,
    ) -> Result<()> {
        let rendered = render_workflow_interrupt(&event)?;
        info!(
            "Run {} interrupted by workflow event {} ({})",
            self.ctx.run.id,
            event.id,
            event.event_type.as_str()
        );
        self.send_interrupt_answer(rendered, None, None).await?;

        let info = ResumeInfo::Workflow { execute_id, event };
        let anchor = builder::build_interrupt_anchor(&self.ctx, &info)?;
        self.create_completed(anchor).await?;
        Ok(())
    }

    /// Wrap up a chatflow: late usage, finish marker, then suggestions
    pub async fn finish_workflow(&mut self) -> Result<()> {
        if self.finish_sent {
            return Ok(());
        }
        self.flush_workflow_draft().await?;
        self.write_late_usage().await?;
        self.send_answer_finish().await?;
        self.suggest_follow_ups().await
    }

    /// Complete an answer whose closing `last` chunk never arrived
    async fn flush_workflow_draft(&mut self) -> Result<()> {
        let Some(draft) = self.workflow_draft.take() else {
            return Ok(());
        };
        let content = std::mem::take(&mut self.workflow_content);
        let usage = self.usage;
        self.finalize_answer(&draft, content, ContentType::Text, None, usage)
            .await?;
        Ok(())
    }

    /// Usage reported after the last answer was written goes onto its ext
    async fn write_late_usage(&mut self) -> Result<()> {
        let (Some(usage), Some(last)) = (self.usage, self.last_answer.as_mut()) else {
            return Ok(());
        };
        let total = usage.total_tokens.to_string();
        if last.ext.get(ext_keys::TOKEN) == Some(&total) {
            return Ok(());
        }
        builder::apply_usage_ext(&mut last.ext, &usage);
        let patch = MessagePatch::new(last.id).ext(last.ext.clone());
        self.messages.edit(patch).await?;
        Ok(())
    }

    async fn suggest_follow_ups(&mut self) -> Result<()> {
        let Some(suggester) = self.suggester.clone() else {
            return Ok(());
        };
        if !self.ctx.agent.suggest_enabled {
            return Ok(());
        }
        let Some(answer) = self.last_answer.as_ref().map(|item| item.content.clone()) else {
            return Ok(());
        };

        let request = SuggestRequest {
            agent_id: self.ctx.agent.agent_id,
            question: self.ctx.meta.first_text().to_string(),
            answer,
        };
        match suggester.suggest(request).await {
            Ok(suggestions) => {
                for suggestion in suggestions {
                    let message = builder::build_suggest(&self.ctx, &suggestion)?;
                    self.create_completed(message).await?;
                }
            }
            Err(err) => warn!("Suggestion generation failed for run {}: {}", self.ctx.run.id, err),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use agentrun_core::message::FileMessageStore;
    use agentrun_core::run::{RunRecord, RunStatus};
    use async_trait::async_trait;

    use crate::config::RunMode;
    use crate::executor::AgentInfo;
    use crate::request::AgentRunMeta;
    use crate::sink::event_channel;

    /// Message store whose edits always fail
    struct ReadOnlyEdits(FileMessageStore);

    #[async_trait]
    impl MessageRepository for ReadOnlyEdits {
        async fn pre_create(&self, message: Message) -> agentrun_core::Result<Message> {
            self.0.pre_create(message).await
        }

        async fn create(&self, message: Message) -> agentrun_core::Result<Message> {
            self.0.create(message).await
        }

        async fn batch_create(
            &self,
            messages: Vec<Message>,
        ) -> agentrun_core::Result<Vec<Message>> {
            self.0.batch_create(messages).await
        }

        async fn edit(&self, _patch: MessagePatch) -> agentrun_core::Result<Message> {
            Err(agentrun_core::Error::Storage("read only".to_string()))
        }

        async fn get_by_run_ids(
            &self,
            conversation_id: i64,
            run_ids: &[i64],
        ) -> agentrun_core::Result<Vec<Message>> {
            self.0.get_by_run_ids(conversation_id, run_ids).await
        }
    }

    fn handler(messages: Arc<dyn MessageRepository>) -> MessageEventHandler {
        let run = RunRecord {
            id: 5,
            conversation_id: 1,
            section_id: 1,
            agent_id: 1,
            user_id: "u".to_string(),
            connector_id: 0,
            status: RunStatus::InProgress,
            usage: None,
            error: None,
            created_at: 0,
            updated_at: 0,
            completed_at: 0,
            failed_at: 0,
        };
        let ctx = RunContext::new(
            Arc::new(AgentRunMeta::text(1, 1, 1, "u", "hi")),
            Arc::new(AgentInfo::default()),
            run,
            Instant::now(),
            RunMode::Debug,
        );
        let cancel = CancellationToken::new();
        let (sink, _stream) = event_channel(16, cancel.clone());
        MessageEventHandler::new(ctx, messages, sink, cancel, None)
    }

    #[tokio::test]
    async fn test_reasoning_write_failure_fails_the_run() {
        let mut handler = handler(Arc::new(ReadOnlyEdits(FileMessageStore::in_memory())));
        let stream = StreamReader::from_items(vec![
            Ok(MessageChunk::reasoning("weighing options")),
            Ok(MessageChunk::content("pick b")),
        ]);

        handler.handle_model_answer(stream).await.unwrap();
        let err = handler.handle_end().await.unwrap_err();
        assert!(matches!(err, RunnerError::Store(_)));
    }

    #[tokio::test]
    async fn test_reasoning_lands_on_first_answer() {
        let store = Arc::new(FileMessageStore::in_memory());
        let mut handler = handler(store.clone());
        let stream = StreamReader::from_items(vec![
            Ok(MessageChunk::reasoning("weighing options")),
            Ok(MessageChunk::content("pick b")),
        ]);

        handler.handle_model_answer(stream).await.unwrap();
        handler.handle_end().await.unwrap();

        let saved = store.get_by_run_ids(1, &[5]).await.unwrap();
        let answer = saved
            .iter()
            .find(|m| m.content == "pick b")
            .expect("answer was not stored");
        assert_eq!(answer.reasoning_content, "weighing options");
    }
}
