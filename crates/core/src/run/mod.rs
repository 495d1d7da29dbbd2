pub mod event;
mod persistence;
mod repository;
mod run_model;

pub use event::{AgentRunResponse, ChunkMessageItem, ChunkRunItem};
pub use persistence::FileRunRecordStore;
pub use repository::RunRecordRepository;
pub use run_model::{
    ListRunRecordMeta, NewRunRecord, RunError, RunRecord, RunRecordUpdate, RunStatus, Usage,
};
