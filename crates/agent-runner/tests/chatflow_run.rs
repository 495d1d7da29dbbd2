mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use agent_runner::{
    codes, AgentInfo, BotMode, DataMessage, InterruptEvent, InterruptEventType, NodeType, Result,
    RunnerError, StateMessage, StreamReader, WorkflowError, WorkflowExecuteConfig,
    WorkflowExecutor, WorkflowMessage, WorkflowResumeRequest, WorkflowStatus, USER_INPUT,
};
use agentrun_core::message::{ext_keys, MessageType};
use agentrun_core::run::{AgentRunResponse, RunRecordRepository, RunStatus, Usage};

use common::*;

const WORKFLOW_ID: i64 = 77;
const EXECUTE_ID: i64 = 555;
const NAME_EVENT: i64 = 1;
const AGE_EVENT: i64 = 2;

fn workflow_agent() -> AgentInfo {
    AgentInfo {
        agent_id: AGENT_ID,
        name: "form filler".to_string(),
        mode: BotMode::Workflow,
        workflow_id: Some(WORKFLOW_ID),
        ..AgentInfo::default()
    }
}

fn stream(items: Vec<WorkflowMessage>) -> StreamReader<WorkflowMessage> {
    StreamReader::from_items(items.into_iter().map(Ok).collect())
}

fn interrupted(event_id: i64, question: &str) -> WorkflowMessage {
    let mut state = StateMessage::new(EXECUTE_ID, WorkflowStatus::Interrupted);
    state.interrupt_event = Some(InterruptEvent {
        id: event_id,
        event_type: InterruptEventType::Question,
        interrupt_data: question_data(question),
        tool_interrupt_event: None,
    });
    WorkflowMessage::State(state)
}

/// Workflow asking for a name and an age, then echoing both as JSON
#[derive(Default)]
struct FormWorkflow {
    calls: Mutex<Vec<String>>,
    inputs: Mutex<Vec<HashMap<String, Value>>>,
    resumes: Mutex<Vec<WorkflowResumeRequest>>,
    name: Mutex<Option<String>>,
}

#[async_trait]
impl WorkflowExecutor for FormWorkflow {
    async fn stream_execute(
        &self,
        config: WorkflowExecuteConfig,
        input: HashMap<String, Value>,
    ) -> Result<StreamReader<WorkflowMessage>> {
        assert_eq!(config.workflow_id, WORKFLOW_ID);
        assert!(config.round_id.is_some());
        self.calls.lock().unwrap().push("execute".to_string());
        self.inputs.lock().unwrap().push(input);
        Ok(stream(vec![
            WorkflowMessage::State(StateMessage::new(EXECUTE_ID, WorkflowStatus::Running)),
            WorkflowMessage::Data(DataMessage::answer(
                NodeType::Question,
                "what's your name?",
                true,
            )),
            interrupted(NAME_EVENT, "what's your name?"),
        ]))
    }

    async fn stream_resume(
        &self,
        request: WorkflowResumeRequest,
        _config: WorkflowExecuteConfig,
    ) -> Result<StreamReader<WorkflowMessage>> {
        self.calls.lock().unwrap().push("resume".to_string());
        self.resumes.lock().unwrap().push(request.clone());
        match request.event_id {
            NAME_EVENT => {
                *self.name.lock().unwrap() = Some(request.resume_data);
                Ok(stream(vec![interrupted(AGE_EVENT, "what's your age?")]))
            }
            AGE_EVENT => {
                let age: i64 = request
                    .resume_data
                    .parse()
                    .map_err(|_| RunnerError::upstream("age is not a number"))?;
                let name = self.name.lock().unwrap().clone().unwrap_or_default();
                let output = json!({"name": name, "age": age}).to_string();
                let mut success = StateMessage::new(EXECUTE_ID, WorkflowStatus::Success);
                success.usage = Some(Usage::new(5, 8));
                Ok(stream(vec![
                    WorkflowMessage::Data(DataMessage::answer(NodeType::Exit, output, true)),
                    WorkflowMessage::State(success),
                ]))
            }
            other => Err(RunnerError::upstream(format!("unknown event {}", other))),
        }
    }
}

/// Workflow replaying a fixed script on execute
struct ScriptedWorkflow(Vec<WorkflowMessage>);

#[async_trait]
impl WorkflowExecutor for ScriptedWorkflow {
    async fn stream_execute(
        &self,
        _config: WorkflowExecuteConfig,
        _input: HashMap<String, Value>,
    ) -> Result<StreamReader<WorkflowMessage>> {
        Ok(stream(self.0.clone()))
    }

    async fn stream_resume(
        &self,
        _request: WorkflowResumeRequest,
        _config: WorkflowExecuteConfig,
    ) -> Result<StreamReader<WorkflowMessage>> {
        Err(RunnerError::upstream("nothing to resume"))
    }
}

#[tokio::test]
async fn test_form_interrupts_resume_to_completion() {
    let workflow = Arc::new(FormWorkflow::default());
    let harness = HarnessBuilder::new(Some(workflow_agent()))
        .workflow_executor(workflow.clone())
        .build();

    let first = collect(
        harness
            .service
            .agent_run(meta("hi"), CancellationToken::new()),
    )
    .await;
    // The question node output only shows up as the rendered interrupt
    assert_eq!(deltas(&first), vec!["what's your name?"]);
    assert!(names(&first).contains(&"RunCompleted"));

    let second = collect(
        harness
            .service
            .agent_run(meta("eino"), CancellationToken::new()),
    )
    .await;
    assert_eq!(deltas(&second), vec!["what's your age?"]);

    let third = collect(
        harness
            .service
            .agent_run(meta("1"), CancellationToken::new()),
    )
    .await;

    assert_eq!(
        *workflow.calls.lock().unwrap(),
        vec!["execute", "resume", "resume"]
    );
    let resumes = workflow.resumes.lock().unwrap().clone();
    assert_eq!(resumes[0].event_id, NAME_EVENT);
    assert_eq!(resumes[0].execute_id, EXECUTE_ID);
    assert_eq!(resumes[1].event_id, AGE_EVENT);
    assert_eq!(resumes[1].resume_data, "1");

    let inputs = workflow.inputs.lock().unwrap().clone();
    assert_eq!(inputs[0].get(USER_INPUT), Some(&Value::from("hi")));

    let run = run_id(&third);
    let record = harness.runs.get(run).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.usage, Some(Usage::new(5, 8)));

    let answers = of_type(&run_messages(&harness, run).await, MessageType::Answer);
    assert_eq!(answers.len(), 1);
    let output: Value = serde_json::from_str(&answers[0].content).unwrap();
    assert_eq!(output, json!({"name": "eino", "age": 1}));
    assert_eq!(answers[0].ext_value(ext_keys::TOKEN), Some("13"));
}

#[tokio::test]
async fn test_success_generates_suggestions_after_finish() {
    let mut agent = workflow_agent();
    agent.suggest_enabled = true;
    let harness = HarnessBuilder::new(Some(agent))
        .workflow_executor(Arc::new(ScriptedWorkflow(vec![
            WorkflowMessage::Data(DataMessage::answer(NodeType::OutputEmitter, "par", false)),
            WorkflowMessage::Data(DataMessage::answer(NodeType::OutputEmitter, "tial", true)),
            WorkflowMessage::Data(DataMessage::answer(NodeType::Exit, "final", true)),
            WorkflowMessage::State(StateMessage::new(EXECUTE_ID, WorkflowStatus::Success)),
        ])))
        .suggester(Arc::new(FixedSuggestions(vec![
            "What next?".to_string(),
        ])))
        .build();

    let mut request = meta("go");
    request
        .chatflow_parameters
        .insert("city".to_string(), json!("Paris"));
    let events = collect(harness.service.agent_run(request, CancellationToken::new())).await;

    let completed: Vec<(MessageType, String)> = events
        .iter()
        .filter_map(|e| match e {
            AgentRunResponse::MessageCompleted(item) => {
                Some((item.message_type, item.content.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(completed.len(), 4);
    assert_eq!(completed[0], (MessageType::Answer, "partial".to_string()));
    assert_eq!(completed[1], (MessageType::Answer, "final".to_string()));
    assert_eq!(completed[2].0, MessageType::Verbose);
    assert_eq!(completed[3], (MessageType::FlowUp, "What next?".to_string()));
    assert_eq!(names(&events).last(), Some(&"StreamDone"));
}

#[tokio::test]
async fn test_failed_workflow_fails_run() {
    let mut failed = StateMessage::new(EXECUTE_ID, WorkflowStatus::Failed);
    failed.last_error = Some(WorkflowError {
        code: 4001,
        message: "node timeout".to_string(),
    });
    let harness = HarnessBuilder::new(Some(workflow_agent()))
        .workflow_executor(Arc::new(ScriptedWorkflow(vec![WorkflowMessage::State(
            failed,
        )])))
        .build();

    let events = collect(
        harness
            .service
            .agent_run(meta("go"), CancellationToken::new()),
    )
    .await;

    let errors: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            AgentRunResponse::Error(err) => Some(err.message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec!["Workflow error 4001: node timeout"]);

    let names = names(&events);
    assert!(names.contains(&"RunFailed"));
    assert!(!names.contains(&"RunCompleted"));

    let record = harness.runs.get(run_id(&events)).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.error.map(|e| e.code), Some(codes::WORKFLOW_FAILED));
}

#[tokio::test]
async fn test_cancel_state_cancels_run() {
    let harness = HarnessBuilder::new(Some(workflow_agent()))
        .workflow_executor(Arc::new(ScriptedWorkflow(vec![
            WorkflowMessage::State(StateMessage::new(EXECUTE_ID, WorkflowStatus::Running)),
            WorkflowMessage::State(StateMessage::new(EXECUTE_ID, WorkflowStatus::Cancel)),
        ])))
        .build();

    let events = collect(
        harness
            .service
            .agent_run(meta("go"), CancellationToken::new()),
    )
    .await;

    let names = names(&events);
    assert!(names.contains(&"RunCancelled"));
    assert!(!names.contains(&"RunCompleted"));
    let record = harness.runs.get(run_id(&events)).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Cancelled);
}

#[tokio::test]
async fn test_agent_without_workflow_fails_run() {
    let mut agent = workflow_agent();
    agent.workflow_id = None;
    let harness = HarnessBuilder::new(Some(agent))
        .workflow_executor(Arc::new(ScriptedWorkflow(Vec::new())))
        .build();

    let events = collect(
        harness
            .service
            .agent_run(meta("go"), CancellationToken::new()),
    )
    .await;

    let record = harness.runs.get(run_id(&events)).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(
        record.error.map(|e| e.code),
        Some(codes::WORKFLOW_NOT_FOUND)
    );
}
