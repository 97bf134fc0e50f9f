pub mod client;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod events;
pub mod frames;
pub mod logger;
pub mod normalize;
pub mod store;
pub mod types;

pub use client::{ReportClient, ReportRequest};
pub use config::ClientConfig;
pub use controller::{StreamController, StreamHandle, StreamNotice, StreamSummary};
pub use decoder::{decode_stream, ByteDecoder};
pub use error::{FrameError, StreamError};
pub use events::parse_frame;
pub use frames::FrameAssembler;
pub use store::OutputStore;
pub use types::{AgentOutput, EventKind, OutputKind, Stage, StreamEvent, StreamState};
