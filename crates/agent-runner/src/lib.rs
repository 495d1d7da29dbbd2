//! Agent Runner - Run orchestrator for conversational agents
//!
//! This crate drives one conversational turn from an upstream agent or
//! workflow stream to persisted messages and an ordered client event stream,
//! including interrupts that pause a run and the resume on the next turn.

mod builder;
mod chatflow;
mod config;
mod context;
mod error;
mod event;
mod executor;
mod handler;
mod interrupt;
mod pump;
mod request;
mod run_process;
mod runtime;
mod service;
mod sink;
mod stream;

pub use chatflow::USER_INPUT;
pub use config::{init_tracing, RunMode, RunnerConfig, DEFAULT_LOG_DIRECTIVE};
pub use error::{codes, Result, RunnerError};
pub use event::{
    AgentEvent, DataMessage, DataType, FunctionCallEvent, FunctionInvocation, KnowledgeDocument,
    MessageChunk, ModelMessage, ModelRole, NodeType, StateMessage, ToolCall, WorkflowError,
    WorkflowMessage, WorkflowStatus, EXTRA_IS_FINISH, EXTRA_NODE_NAME,
};
pub use executor::{
    AgentExecuteRequest, AgentExecutor, AgentIdentity, AgentInfo, AgentResolver, BotMode,
    SuggestRequest, SuggestionGenerator, WorkflowExecuteConfig, WorkflowExecutor,
    WorkflowResumeRequest,
};
pub use interrupt::{
    AgentInterrupt, InterruptEvent, InterruptEventType, InterruptPayload, ResumeInfo,
    ToolInterruptEvent,
};
pub use request::{AdditionalMessage, AgentRunMeta};
pub use service::{AgentRunService, RunnerDeps};
pub use sink::RunEventStream;
pub use stream::{pipe, StreamReader, StreamWriter};
