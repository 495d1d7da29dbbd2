//! Shared fakes for the run tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use agent_runner::{
    init_tracing, AgentEvent, AgentExecuteRequest, AgentExecutor, AgentIdentity, AgentInfo,
    AgentInterrupt, AgentResolver, AgentRunMeta, AgentRunService, InterruptPayload, MessageChunk,
    Result, RunEventStream, RunMode, RunnerConfig, RunnerDeps, RunnerError, StreamReader,
    SuggestRequest, SuggestionGenerator, WorkflowExecuteConfig, WorkflowExecutor,
    WorkflowMessage, WorkflowResumeRequest, DEFAULT_LOG_DIRECTIVE,
};
use agentrun_core::message::{FileMessageStore, Message, MessageRepository, MessageType};
use agentrun_core::run::{
    AgentRunResponse, FileRunRecordStore, ListRunRecordMeta, NewRunRecord, RunRecord,
    RunRecordRepository, RunRecordUpdate, RunStatus,
};

pub const CONVERSATION_ID: i64 = 100;
pub const SECTION_ID: i64 = 200;
pub const AGENT_ID: i64 = 300;

pub struct StaticAgents(pub Option<AgentInfo>);

#[async_trait]
impl AgentResolver for StaticAgents {
    async fn obtain_agent(&self, _identity: &AgentIdentity) -> Result<Option<AgentInfo>> {
        Ok(self.0.clone())
    }
}

/// How the agent executor was entered on a turn
#[derive(Debug, Clone)]
pub struct AgentCall {
    pub request: AgentExecuteRequest,
    pub resumed_from: Option<AgentInterrupt>,
}

/// Agent executor replaying one prepared stream per turn
#[derive(Default)]
pub struct ScriptedAgent {
    turns: Mutex<VecDeque<StreamReader<AgentEvent>>>,
    pub calls: Mutex<Vec<AgentCall>>,
}

impl ScriptedAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_turn(&self, stream: StreamReader<AgentEvent>) {
        self.turns.lock().unwrap().push_back(stream);
    }

    pub fn push_events(&self, events: Vec<AgentEvent>) {
        self.push_turn(StreamReader::from_items(events.into_iter().map(Ok).collect()));
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_turn(&self) -> Result<StreamReader<AgentEvent>> {
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RunnerError::upstream("no scripted turn left"))
    }
}

#[async_trait]
impl AgentExecutor for ScriptedAgent {
    async fn stream_execute(
        &self,
        request: AgentExecuteRequest,
    ) -> Result<StreamReader<AgentEvent>> {
        self.calls.lock().unwrap().push(AgentCall {
            request,
            resumed_from: None,
        });
        self.next_turn()
    }

    async fn stream_resume(
        &self,
        request: AgentExecuteRequest,
        interrupt: AgentInterrupt,
    ) -> Result<StreamReader<AgentEvent>> {
        self.calls.lock().unwrap().push(AgentCall {
            request,
            resumed_from: Some(interrupt),
        });
        self.next_turn()
    }
}

/// Workflow executor for agents that never run one
pub struct NoWorkflow;

#[async_trait]
impl WorkflowExecutor for NoWorkflow {
    async fn stream_execute(
        &self,
        _config: WorkflowExecuteConfig,
        _input: HashMap<String, Value>,
    ) -> Result<StreamReader<WorkflowMessage>> {
        Err(RunnerError::upstream("no workflow configured"))
    }

    async fn stream_resume(
        &self,
        _request: WorkflowResumeRequest,
        _config: WorkflowExecuteConfig,
    ) -> Result<StreamReader<WorkflowMessage>> {
        Err(RunnerError::upstream("no workflow configured"))
    }
}

pub struct FixedSuggestions(pub Vec<String>);

#[async_trait]
impl SuggestionGenerator for FixedSuggestions {
    async fn suggest(&self, _request: SuggestRequest) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

pub fn agent_info() -> AgentInfo {
    AgentInfo {
        agent_id: AGENT_ID,
        name: "helper".to_string(),
        ..AgentInfo::default()
    }
}

/// Run store that refuses to start runs
pub struct RejectingStart(pub Arc<FileRunRecordStore>);

#[async_trait]
impl RunRecordRepository for RejectingStart {
    async fn create(&self, record: NewRunRecord) -> agentrun_core::Result<RunRecord> {
        self.0.create(record).await
    }

    async fn get(&self, id: i64) -> agentrun_core::Result<Option<RunRecord>> {
        self.0.get(id).await
    }

    async fn list(&self, filter: &ListRunRecordMeta) -> agentrun_core::Result<Vec<RunRecord>> {
        self.0.list(filter).await
    }

    async fn update(&self, update: RunRecordUpdate) -> agentrun_core::Result<RunRecord> {
        if update.status == RunStatus::InProgress {
            return Err(agentrun_core::Error::Storage("disk full".to_string()));
        }
        self.0.update(update).await
    }

    async fn delete(&self, ids: &[i64]) -> agentrun_core::Result<usize> {
        self.0.delete(ids).await
    }
}

pub struct Harness {
    pub service: AgentRunService,
    pub messages: Arc<FileMessageStore>,
    pub runs: Arc<FileRunRecordStore>,
}

pub struct HarnessBuilder {
    agent: Option<AgentInfo>,
    agent_executor: Arc<dyn AgentExecutor>,
    workflow_executor: Arc<dyn WorkflowExecutor>,
    suggester: Option<Arc<dyn SuggestionGenerator>>,
    reject_start: bool,
    config: RunnerConfig,
}

impl HarnessBuilder {
    pub fn new(agent: Option<AgentInfo>) -> Self {
        Self {
            agent,
            agent_executor: ScriptedAgent::new(),
            workflow_executor: Arc::new(NoWorkflow),
            suggester: None,
            reject_start: false,
            config: RunnerConfig::default(),
        }
    }

    pub fn agent_executor(mut self, executor: Arc<dyn AgentExecutor>) -> Self {
        self.agent_executor = executor;
        self
    }

    pub fn workflow_executor(mut self, executor: Arc<dyn WorkflowExecutor>) -> Self {
        self.workflow_executor = executor;
        self
    }

    pub fn suggester(mut self, suggester: Arc<dyn SuggestionGenerator>) -> Self {
        self.suggester = Some(suggester);
        self
    }

    pub fn reject_start(mut self) -> Self {
        self.reject_start = true;
        self
    }

    pub fn run_mode(mut self, mode: RunMode) -> Self {
        self.config.run_mode = mode;
        self
    }

    pub fn pump_capacity(mut self, capacity: usize) -> Self {
        self.config.pump_capacity = capacity;
        self
    }

    pub fn output_capacity(mut self, capacity: usize) -> Self {
        self.config.output_capacity = capacity;
        self
    }

    pub fn build(self) -> Harness {
        init_tracing(DEFAULT_LOG_DIRECTIVE);
        let messages = Arc::new(FileMessageStore::in_memory());
        let runs = Arc::new(FileRunRecordStore::in_memory());
        let run_repo: Arc<dyn RunRecordRepository> = if self.reject_start {
            Arc::new(RejectingStart(runs.clone()))
        } else {
            runs.clone()
        };
        let deps = RunnerDeps {
            agents: Arc::new(StaticAgents(self.agent)),
            agent_executor: self.agent_executor,
            workflow_executor: self.workflow_executor,
            suggester: self.suggester,
            messages: messages.clone(),
            runs: run_repo,
        };
        Harness {
            service: AgentRunService::new(deps, self.config),
            messages,
            runs,
        }
    }
}

pub fn meta(text: &str) -> AgentRunMeta {
    AgentRunMeta::text(CONVERSATION_ID, SECTION_ID, AGENT_ID, "user-1", text)
}

pub async fn collect(stream: RunEventStream) -> Vec<AgentRunResponse> {
    stream.collect().await
}

pub fn names(events: &[AgentRunResponse]) -> Vec<&'static str> {
    events.iter().map(AgentRunResponse::event_name).collect()
}

/// Id of the run announced by `RunCreated`
pub fn run_id(events: &[AgentRunResponse]) -> i64 {
    events
        .iter()
        .find_map(|event| match event {
            AgentRunResponse::RunCreated(item) => Some(item.id),
            _ => None,
        })
        .expect("run was never created")
}

pub fn deltas(events: &[AgentRunResponse]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            AgentRunResponse::MessageDelta(item) => Some(item.content.clone()),
            _ => None,
        })
        .collect()
}

pub fn completed_of_type(events: &[AgentRunResponse], message_type: MessageType) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            AgentRunResponse::MessageCompleted(item) if item.message_type == message_type => {
                Some(item.content.clone())
            }
            _ => None,
        })
        .collect()
}

pub fn chunks(parts: &[&str]) -> StreamReader<MessageChunk> {
    StreamReader::from_items(
        parts
            .iter()
            .map(|part| Ok(MessageChunk::content(*part)))
            .collect(),
    )
}

pub fn chunk_stream(chunks: Vec<MessageChunk>) -> StreamReader<MessageChunk> {
    StreamReader::from_items(chunks.into_iter().map(Ok).collect())
}

pub fn question_data(text: &str) -> String {
    serde_json::json!({
        "messages": [{"type": "question", "content_type": "text", "content": text}]
    })
    .to_string()
}

pub fn question_interrupt(tool_call_id: &str, text: &str) -> AgentInterrupt {
    AgentInterrupt {
        tool_call_id: tool_call_id.to_string(),
        interrupt_id: format!("interrupt-{}", tool_call_id),
        payload: InterruptPayload::Question {
            data: question_data(text),
        },
    }
}

pub async fn run_messages(harness: &Harness, run_id: i64) -> Vec<Message> {
    harness
        .messages
        .get_by_run_ids(CONVERSATION_ID, &[run_id])
        .await
        .unwrap()
}

pub fn of_type(messages: &[Message], message_type: MessageType) -> Vec<Message> {
    messages
        .iter()
        .filter(|message| message.message_type == message_type)
        .cloned()
        .collect()
}
