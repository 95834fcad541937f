pub mod cli;
pub mod config;
pub mod error;
pub mod gui_rpc;
pub mod scheduler_reply;
pub mod state;
pub mod types;
pub mod xml;

pub use config::{ClientConfig, LogFlags};
pub use error::{ClientError, Result};
pub use scheduler_reply::{MergeReport, SchedulerReply};
pub use state::{ClientState, LoadReport, StateSummary};
