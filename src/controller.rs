use crate::client::{ReportClient, ReportRequest};
use crate::decoder::decode_stream;
use crate::error::StreamError;
use crate::events::parse_frame;
use crate::frames::FrameAssembler;
use crate::normalize::{error_message, normalize_final_report, normalize_update};
use crate::store::OutputStore;
use crate::types::{AgentOutput, EventKind, StreamState};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

const NOTICE_CAPACITY: usize = 256;

/// Notifications for the renderer. Snapshots are owned copies.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamNotice {
    /// Published after every accepted upsert and on reset.
    OutputsChanged {
        epoch: u64,
        outputs: Vec<AgentOutput>,
    },
    /// Transient alert, separate from the ordered outputs.
    Alert {
        epoch: u64,
        message: String,
        raised_at: DateTime<Utc>,
    },
    StateChanged {
        epoch: u64,
        state: StreamState,
    },
}

/// Identifies one submitted task. Dropping it does not cancel the stream.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    task_id: Uuid,
    epoch: u64,
    cancel: CancellationToken,
}

impl StreamHandle {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Stop reading the response. Idempotent; a no-op once the stream ended.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What one read loop did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub task_id: Uuid,
    pub epoch: u64,
    pub state: StreamState,
    /// Complete frames handed to the parser.
    pub frames: usize,
    /// Outputs written to the store.
    pub applied: usize,
    /// Malformed frames skipped.
    pub dropped: usize,
    /// Writes discarded because a newer task reset the store.
    pub stale: usize,
    pub aborted: bool,
}

impl StreamSummary {
    fn new(handle: &StreamHandle) -> Self {
        Self {
            task_id: handle.task_id,
            epoch: handle.epoch,
            state: StreamState::Streaming,
            frames: 0,
            applied: 0,
            dropped: 0,
            stale: 0,
            aborted: false,
        }
    }
}

enum Step<T> {
    Aborted,
    Ready(T),
}

#[derive(Debug)]
struct Inner {
    store: OutputStore,
    state: StreamState,
    cancel: Option<CancellationToken>,
}

/// Drives a report stream into the output store.
///
/// One task is active at a time. `begin` resets the store and stamps a new
/// epoch; a read loop still running for an older epoch keeps decoding but
/// none of its writes, alerts or state changes reach the store.
#[derive(Debug)]
pub struct StreamController {
    inner: Mutex<Inner>,
    notices: broadcast::Sender<StreamNotice>,
}

impl Default for StreamController {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamController {
    pub fn new() -> Self {
        let (notices, _rx) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                store: OutputStore::new(),
                state: StreamState::Idle,
                cancel: None,
            }),
            notices,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamNotice> {
        self.notices.subscribe()
    }

    pub fn snapshot(&self) -> Vec<AgentOutput> {
        self.lock().store.snapshot()
    }

    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    pub fn epoch(&self) -> u64 {
        self.lock().store.epoch()
    }

    /// Start a new task: reset the store and enter `Streaming`.
    pub fn begin(&self) -> StreamHandle {
        let cancel = CancellationToken::new();
        let epoch = {
            let mut inner = self.lock();
            let epoch = inner.store.reset();
            inner.state = StreamState::Streaming;
            inner.cancel = Some(cancel.clone());
            epoch
        };
        let handle = StreamHandle {
            task_id: Uuid::new_v4(),
            epoch,
            cancel,
        };
        tracing::info!(task_id = %handle.task_id, epoch, "starting report stream");

        let _ = self.notices.send(StreamNotice::OutputsChanged {
            epoch,
            outputs: Vec::new(),
        });
        let _ = self.notices.send(StreamNotice::StateChanged {
            epoch,
            state: StreamState::Streaming,
        });
        handle
    }

    /// Abort the active task's transport, if any.
    pub fn abort(&self) {
        if let Some(cancel) = &self.lock().cancel {
            cancel.cancel();
        }
    }

    /// Validate, begin, request and stream one task to completion.
    pub async fn submit(
        &self,
        client: &ReportClient,
        task: &str,
    ) -> Result<StreamSummary, StreamError> {
        let request = ReportRequest::new(task)?;
        let handle = self.begin();
        Ok(self.run(client, &request, &handle).await)
    }

    /// Like `submit`, but runs on a tokio task and returns the handle at once
    /// so the caller can abort.
    pub fn spawn_submit(
        self: &Arc<Self>,
        client: Arc<ReportClient>,
        task: &str,
    ) -> Result<(StreamHandle, JoinHandle<StreamSummary>), StreamError> {
        let request = ReportRequest::new(task)?;
        let handle = self.begin();
        let controller = Arc::clone(self);
        let task_handle = handle.clone();
        let join =
            tokio::spawn(async move { controller.run(&client, &request, &task_handle).await });
        Ok((handle, join))
    }

    async fn run(
        &self,
        client: &ReportClient,
        request: &ReportRequest,
        handle: &StreamHandle,
    ) -> StreamSummary {
        let span = tracing::info_span!(
            "report_stream",
            task_id = %handle.task_id,
            epoch = handle.epoch
        );
        async move {
            let opened = tokio::select! {
                biased;
                _ = handle.cancel.cancelled() => Step::Aborted,
                opened = client.open(request) => Step::Ready(opened),
            };
            match opened {
                Step::Aborted => {
                    let mut summary = StreamSummary::new(handle);
                    self.aborted(handle, &mut summary);
                    summary
                }
                Step::Ready(Ok(response)) => {
                    self.drive(handle, response.map(|r| r.bytes_stream())).await
                }
                Step::Ready(Err(err)) => {
                    let mut summary = StreamSummary::new(handle);
                    self.fail(handle, &err, &mut summary);
                    summary
                }
            }
        }
        .instrument(span)
        .await
    }

    /// The read loop. `None` means the transport produced no body at all.
    pub async fn drive<S, B, E>(&self, handle: &StreamHandle, body: Option<S>) -> StreamSummary
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let mut summary = StreamSummary::new(handle);
        let Some(body) = body else {
            self.fail(handle, &StreamError::NoBody, &mut summary);
            return summary;
        };

        let mut assembler = FrameAssembler::new();
        let text = decode_stream(body);
        tokio::pin!(text);

        loop {
            let step = tokio::select! {
                biased;
                _ = handle.cancel.cancelled() => Step::Aborted,
                next = text.next() => Step::Ready(next),
            };
            match step {
                Step::Aborted => {
                    self.aborted(handle, &mut summary);
                    return summary;
                }
                Step::Ready(Some(Ok(fragment))) => {
                    for frame in assembler.push(&fragment) {
                        self.apply_frame(handle, &frame, &mut summary);
                    }
                }
                Step::Ready(Some(Err(err))) => {
                    let err = StreamError::Interrupted(err.to_string());
                    self.fail(handle, &err, &mut summary);
                    return summary;
                }
                Step::Ready(None) => {
                    if let Some(frame) = assembler.finish() {
                        self.apply_frame(handle, &frame, &mut summary);
                    }
                    tracing::info!(
                        frames = summary.frames,
                        applied = summary.applied,
                        dropped = summary.dropped,
                        "report stream completed"
                    );
                    self.transition(handle, StreamState::Completed, &mut summary);
                    return summary;
                }
            }
        }
    }

    fn apply_frame(&self, handle: &StreamHandle, frame: &str, summary: &mut StreamSummary) {
        summary.frames += 1;
        let event = match parse_frame(frame) {
            Ok(event) => event,
            Err(err) => {
                summary.dropped += 1;
                tracing::warn!(error = %err, "dropping malformed frame");
                return;
            }
        };

        match event.kind {
            EventKind::Update => {
                for output in normalize_update(&event.payload) {
                    tracing::debug!(stage = %output.stage, "stage update");
                    self.commit(handle, output, summary);
                }
            }
            EventKind::End => match normalize_final_report(&event.payload) {
                Some(output) => {
                    self.commit(handle, output, summary);
                }
                None => tracing::debug!("end event without a report"),
            },
            EventKind::Error => {
                let message = error_message(&event.payload);
                tracing::warn!(error = %message, "pipeline reported an error");
                if self.commit(handle, AgentOutput::error(message.clone()), summary) {
                    self.alert(handle, message);
                }
            }
            EventKind::Unknown(name) => {
                tracing::debug!(event = %name, "ignoring unknown event");
            }
        }
    }

    /// Epoch-guarded upsert plus change notification.
    fn commit(
        &self,
        handle: &StreamHandle,
        output: AgentOutput,
        summary: &mut StreamSummary,
    ) -> bool {
        let outputs = {
            let mut inner = self.lock();
            if !inner.store.upsert_at(handle.epoch, output) {
                summary.stale += 1;
                return false;
            }
            inner.store.snapshot()
        };
        summary.applied += 1;
        let _ = self.notices.send(StreamNotice::OutputsChanged {
            epoch: handle.epoch,
            outputs,
        });
        true
    }

    fn alert(&self, handle: &StreamHandle, message: String) {
        let _ = self.notices.send(StreamNotice::Alert {
            epoch: handle.epoch,
            message,
            raised_at: Utc::now(),
        });
    }

    fn fail(&self, handle: &StreamHandle, err: &StreamError, summary: &mut StreamSummary) {
        let message = err.to_string();
        tracing::warn!(error = %message, "report stream failed");
        if self.commit(handle, AgentOutput::error(message.clone()), summary) {
            self.alert(handle, message);
        }
        self.transition(handle, StreamState::Failed, summary);
    }

    fn aborted(&self, handle: &StreamHandle, summary: &mut StreamSummary) {
        tracing::info!("report stream aborted");
        summary.aborted = true;
        self.transition(handle, StreamState::Failed, summary);
    }

    fn transition(&self, handle: &StreamHandle, state: StreamState, summary: &mut StreamSummary) {
        summary.state = state;
        {
            let mut inner = self.lock();
            if inner.store.epoch() != handle.epoch {
                return;
            }
            inner.state = state;
        }
        let _ = self.notices.send(StreamNotice::StateChanged {
            epoch: handle.epoch,
            state,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
