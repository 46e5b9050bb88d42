use tokio::sync::{broadcast, watch};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

pub mod decoder;
pub mod events;
pub mod progress;
pub mod state;
pub mod transport;

use self::decoder::RecordStream;
use self::events::{parse_record, BatchEvent, CompletedEvent, StatusEvent};
use self::progress::{ProgressSnapshot, ProgressTracker};
use self::state::{BatchOutcome, CompressionResult, PendingBatch, SelectedFile};
use self::transport::{ChunkStream, Transport};
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::encoder;
use crate::error::{EncodingError, FileError, UploadError};

/// Outcome of one file's upload-and-stream cycle
#[derive(Debug, Default)]
struct FileRun {
    result: Option<CompressionResult>,
    errors: Vec<UploadError>,
    completed: bool,
    rejected: bool,
}

/// Drives a batch: one file at a time, each response stream fully drained
/// before the next upload starts. Failures stay scoped to their file.
pub struct Orchestrator<T> {
    transport: T,
    tracker: ProgressTracker,
    event_sender: broadcast::Sender<BatchEvent>,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(transport: T) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            tracker: ProgressTracker::new(),
            event_sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.event_sender.subscribe()
    }

    pub fn watch_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tracker.subscribe()
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Uploads every file of `batch` in order and collects what came back.
    ///
    /// Nothing is cached: running the same batch twice uploads it twice.
    pub async fn run(&mut self, batch: &PendingBatch, quality: u8) -> BatchOutcome {
        let total = batch.len();
        let mut outcome = BatchOutcome::default();
        let mut failed = 0;
        info!(files = total, quality, "Starting compression batch");

        for (index, file) in batch.files().iter().enumerate() {
            self.emit(BatchEvent::FileStarted {
                file_name: file.name().to_string(),
                index,
                total,
            });

            let mut run = FileRun::default();
            let upload = self.transport.upload(file, quality).await;
            match upload {
                Ok(stream) => self.consume(file, stream, &mut run).await,
                Err(err) => self.record_failure(file, &mut run, err),
            }
            self.tracker.finish(file.name());

            match run.result {
                Some(result) => outcome.results.push(result),
                None => failed += 1,
            }
            outcome
                .errors
                .extend(run.errors.into_iter().map(|e| FileError::new(file.name(), e)));
        }

        self.tracker.clear();
        info!(
            succeeded = outcome.results.len(),
            errors = outcome.errors.len(),
            "Compression batch finished"
        );
        self.emit(BatchEvent::BatchFinished {
            succeeded: outcome.results.len(),
            failed,
        });
        outcome
    }

    async fn consume(&mut self, file: &SelectedFile, stream: ChunkStream, run: &mut FileRun) {
        let mut records = RecordStream::new(stream);

        while let Some(next) = records.next().await {
            match next {
                Ok(record) => self.handle_record(file, &record, run),
                Err(err) => self.record_failure(file, run, err),
            }
        }

        if !run.completed && run.errors.is_empty() {
            self.record_failure(
                file,
                run,
                UploadError::Transport("stream ended before a terminal record".to_string()),
            );
        }
    }

    fn handle_record(&mut self, file: &SelectedFile, record: &str, run: &mut FileRun) {
        if run.completed {
            warn!(file = file.name(), "Ignoring record after completion");
            return;
        }

        let event = match parse_record(record) {
            Ok(event) => event,
            Err(err) => {
                self.record_failure(file, run, err.into());
                return;
            }
        };
        debug!(file = file.name(), ?event, "Status record");

        // Once the service rejected the file only malformed lines are still reported
        if run.rejected {
            warn!(file = file.name(), "Ignoring record after service error");
            return;
        }

        match event {
            StatusEvent::Completed(done) => {
                run.completed = true;
                self.tracker.finish(file.name());
                match build_result(file, done) {
                    Ok(result) => {
                        info!(
                            file = file.name(),
                            original = result.original_size,
                            compressed = result.compressed_size,
                            "File compressed"
                        );
                        self.emit(BatchEvent::FileCompleted {
                            file_name: file.name().to_string(),
                            original_size: result.original_size,
                            compressed_size: result.compressed_size,
                            compression_ratio: result.compression_ratio,
                        });
                        run.result = Some(result);
                    }
                    Err(err) => self.record_failure(file, run, err.into()),
                }
            }
            StatusEvent::Error { message } => {
                run.rejected = true;
                self.tracker.finish(file.name());
                self.record_failure(file, run, UploadError::ServiceReported(message));
            }
            StatusEvent::Progress { percent } | StatusEvent::Unrecognized { percent, .. } => {
                let percent = self.tracker.update(file.name(), percent);
                self.emit(BatchEvent::Progress {
                    file_name: file.name().to_string(),
                    percent,
                });
            }
        }
    }

    fn record_failure(&mut self, file: &SelectedFile, run: &mut FileRun, err: UploadError) {
        warn!(file = file.name(), error = %err, "File failed");
        self.emit(BatchEvent::FileFailed {
            file_name: file.name().to_string(),
            message: err.to_string(),
        });
        run.errors.push(err);
    }

    fn emit(&self, event: BatchEvent) {
        // No subscriber is fine
        let _ = self.event_sender.send(event);
    }
}

fn build_result(file: &SelectedFile, done: CompletedEvent) -> Result<CompressionResult, EncodingError> {
    let compressed_image_base64 = encoder::encode_payload(done.compressed_image.as_ref())?;
    Ok(CompressionResult {
        source_file: file.clone(),
        original_size: done.original_size,
        compressed_size: done.compressed_size,
        compression_ratio: done.compression_ratio,
        compressed_image_base64,
        image_analysis: done.image_analysis.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use bytes::Bytes;
    use std::cell::RefCell;
    use std::collections::HashMap;

    enum Reply {
        Chunks(Vec<&'static str>),
        Refused(u16),
        BrokenBody(Vec<&'static str>),
    }

    /// Answers uploads from a script keyed by file name and logs every call
    #[derive(Default)]
    struct ScriptedTransport {
        replies: HashMap<String, Vec<String>>,
        refused: HashMap<String, u16>,
        broken: HashMap<String, Vec<String>>,
        calls: RefCell<Vec<(String, u8)>>,
    }

    impl ScriptedTransport {
        fn with(mut self, name: &str, reply: Reply) -> Self {
            match reply {
                Reply::Chunks(chunks) => {
                    self.replies.insert(name.to_string(), owned(chunks));
                }
                Reply::Refused(status) => {
                    self.refused.insert(name.to_string(), status);
                }
                Reply::BrokenBody(chunks) => {
                    self.broken.insert(name.to_string(), owned(chunks));
                }
            }
            self
        }
    }

    fn owned(chunks: Vec<&str>) -> Vec<String> {
        chunks.into_iter().map(String::from).collect()
    }

    impl Transport for ScriptedTransport {
        async fn upload(&self, file: &SelectedFile, quality: u8) -> Result<ChunkStream, UploadError> {
            self.calls.borrow_mut().push((file.name().to_string(), quality));

            if let Some(status) = self.refused.get(file.name()) {
                return Err(UploadError::HttpStatus {
                    status: *status,
                    body: "Internal Server Error".to_string(),
                });
            }
            if let Some(chunks) = self.broken.get(file.name()) {
                let mut items: Vec<Result<Bytes, UploadError>> =
                    chunks.iter().map(|c| Ok(Bytes::from(c.clone()))).collect();
                items.push(Err(UploadError::Transport("connection reset".to_string())));
                return Ok(Box::pin(tokio_stream::iter(items)));
            }
            let chunks = self.replies.get(file.name()).cloned().unwrap_or_default();
            let items: Vec<Result<Bytes, UploadError>> =
                chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
            Ok(Box::pin(tokio_stream::iter(items)))
        }
    }

    fn file(name: &str) -> SelectedFile {
        SelectedFile::from_bytes(name, "image/png", vec![0u8; 16])
    }

    fn batch(names: &[&str]) -> PendingBatch {
        let mut batch = PendingBatch::new();
        batch
            .add_files(names.iter().map(|n| file(n)).collect())
            .unwrap();
        batch
    }

    const COMPLETED: &str = "{\"status\":\"completed\",\"original_size\":1000,\"compressed_size\":250,\
        \"compression_ratio\":4.0,\"compressed_image\":{\"data\":[255,216,255]},\
        \"image_analysis\":{\"color_mode\":\"RGB\"}}\n";

    #[test]
    fn tracker_follows_progress_then_drops_file_on_completion() {
        let mut orchestrator = Orchestrator::new(ScriptedTransport::default());
        let photo = file("photo.png");
        let mut run = FileRun::default();

        orchestrator.handle_record(&photo, r#"{"status":"progress","progress":10}"#, &mut run);
        assert_eq!(orchestrator.progress().get("photo.png"), Some(10));

        orchestrator.handle_record(&photo, r#"{"status":"progress","progress":55}"#, &mut run);
        assert_eq!(orchestrator.progress().get("photo.png"), Some(55));

        orchestrator.handle_record(&photo, COMPLETED.trim_end(), &mut run);
        assert_eq!(orchestrator.progress().get("photo.png"), None);
        assert!(orchestrator.progress().snapshot().is_empty());

        let result = run.result.unwrap();
        assert_eq!(result.compressed_image_base64, "/9j/");
        assert_eq!(result.image_analysis.color_mode.as_deref(), Some("RGB"));
        assert!(run.errors.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_isolated_to_its_file() {
        let transport = ScriptedTransport::default()
            .with("one.png", Reply::Chunks(vec![COMPLETED]))
            .with("two.png", Reply::Refused(500))
            .with("three.png", Reply::Chunks(vec![COMPLETED]));
        let mut orchestrator = Orchestrator::new(transport);

        let outcome = orchestrator.run(&batch(&["one.png", "two.png", "three.png"]), 10).await;

        let names: Vec<_> = outcome.results.iter().map(|r| r.source_file.name()).collect();
        assert_eq!(names, ["one.png", "three.png"]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].file_name, "two.png");
        assert_eq!(outcome.errors[0].kind(), ErrorKind::Transport);
        assert_eq!(outcome.error_messages(), ["two.png: HTTP error! status: 500"]);

        let calls = orchestrator.transport().calls.borrow().clone();
        assert_eq!(
            calls,
            [
                ("one.png".to_string(), 10),
                ("two.png".to_string(), 10),
                ("three.png".to_string(), 10)
            ]
        );
    }

    #[tokio::test]
    async fn records_split_across_chunks_are_reassembled() {
        let transport = ScriptedTransport::default().with(
            "a.png",
            Reply::Chunks(vec![
                "{\"status\":\"progr",
                "ess\",\"progress\":10}\n{\"status\":\"processing\",\"progress\":55}\n{\"status\":\"comp",
                &COMPLETED[15..],
            ]),
        );
        let mut orchestrator = Orchestrator::new(transport);
        let mut events = orchestrator.subscribe();

        let outcome = orchestrator.run(&batch(&["a.png"]), 25).await;
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.errors.is_empty());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                BatchEvent::FileStarted {
                    file_name: "a.png".to_string(),
                    index: 0,
                    total: 1
                },
                BatchEvent::Progress {
                    file_name: "a.png".to_string(),
                    percent: 10
                },
                BatchEvent::Progress {
                    file_name: "a.png".to_string(),
                    percent: 55
                },
                BatchEvent::FileCompleted {
                    file_name: "a.png".to_string(),
                    original_size: 1000,
                    compressed_size: 250,
                    compression_ratio: 4.0
                },
                BatchEvent::BatchFinished {
                    succeeded: 1,
                    failed: 0
                },
            ]
        );
    }

    #[tokio::test]
    async fn malformed_record_does_not_halt_the_stream() {
        let transport = ScriptedTransport::default().with(
            "a.png",
            Reply::Chunks(vec![
                "{\"status\":\"progress\",\"progress\":10}\n",
                "{\"status\":\"progress\",\"progr\n",
                "{\"status\":\"progress\",\"progress\":70}\n",
                COMPLETED,
            ]),
        );
        let mut orchestrator = Orchestrator::new(transport);

        let outcome = orchestrator.run(&batch(&["a.png"]), 10).await;
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].file_name, "a.png");
        assert_eq!(outcome.errors[0].kind(), ErrorKind::MalformedEvent);
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn service_error_is_terminal_for_the_file() {
        let mut orchestrator = Orchestrator::new(ScriptedTransport::default());
        let photo = file("bad.png");
        let mut run = FileRun::default();

        orchestrator.handle_record(&photo, r#"{"status":"progress","progress":20}"#, &mut run);
        assert_eq!(orchestrator.progress().get("bad.png"), Some(20));

        orchestrator.handle_record(
            &photo,
            r#"{"status":"error","message":"cannot identify image file"}"#,
            &mut run,
        );
        assert_eq!(orchestrator.progress().get("bad.png"), None);

        orchestrator.handle_record(&photo, r#"{"status":"progress","progress":30}"#, &mut run);
        assert_eq!(orchestrator.progress().get("bad.png"), None);

        orchestrator.handle_record(&photo, r#"{"status":"progress","progr"#, &mut run);
        orchestrator.handle_record(&photo, COMPLETED.trim_end(), &mut run);
        assert_eq!(orchestrator.progress().get("bad.png"), None);
        assert!(run.result.is_none());

        let kinds: Vec<_> = run.errors.iter().map(UploadError::kind).collect();
        assert_eq!(kinds, [ErrorKind::ServiceReported, ErrorKind::MalformedEvent]);
    }

    #[tokio::test]
    async fn service_error_is_reported_and_decoding_continues() {
        let transport = ScriptedTransport::default()
            .with(
                "bad.png",
                Reply::Chunks(vec![
                    "{\"status\":\"progress\",\"progress\":20}\n{\"status\":\"error\",\"message\":\"cannot identify image file\"}\n",
                    "{\"status\":\"progress\",\"progress\":30}\n",
                    COMPLETED,
                ]),
            )
            .with("good.png", Reply::Chunks(vec![COMPLETED]));
        let mut orchestrator = Orchestrator::new(transport);
        let mut events = orchestrator.subscribe();

        let outcome = orchestrator.run(&batch(&["bad.png", "good.png"]), 10).await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].source_file.name(), "good.png");
        assert_eq!(
            outcome.error_messages(),
            ["bad.png: cannot identify image file"]
        );
        assert_eq!(outcome.errors[0].kind(), ErrorKind::ServiceReported);
        assert!(orchestrator.progress().snapshot().is_empty());

        let mut bad_progress = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let BatchEvent::Progress { file_name, percent } = event {
                if file_name == "bad.png" {
                    bad_progress.push(percent);
                }
            }
        }
        assert_eq!(bad_progress, [20]);
    }

    #[tokio::test]
    async fn finished_counts_each_file_once() {
        let transport = ScriptedTransport::default()
            .with(
                "noisy.png",
                Reply::Chunks(vec!["{\"status\":\"progress\",\"progr\n", COMPLETED]),
            )
            .with("down.png", Reply::Refused(503));
        let mut orchestrator = Orchestrator::new(transport);
        let mut events = orchestrator.subscribe();

        let outcome = orchestrator.run(&batch(&["noisy.png", "down.png"]), 10).await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.failed_files(), ["noisy.png", "down.png"]);

        let mut finished = None;
        while let Ok(event) = events.try_recv() {
            if let BatchEvent::BatchFinished { succeeded, failed } = event {
                finished = Some((succeeded, failed));
            }
        }
        assert_eq!(finished, Some((1, 1)));
    }

    #[tokio::test]
    async fn bad_payload_is_an_encoding_error_for_that_file() {
        let transport = ScriptedTransport::default().with(
            "a.png",
            Reply::Chunks(vec![
                "{\"status\":\"completed\",\"original_size\":3,\"compressed_size\":2,\"compression_ratio\":1.5,\"compressed_image\":{\"data\":\"AAAA\"}}\n",
            ]),
        );
        let mut orchestrator = Orchestrator::new(transport);

        let outcome = orchestrator.run(&batch(&["a.png"]), 10).await;
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind(), ErrorKind::Encoding);
    }

    #[tokio::test]
    async fn completion_without_progress_and_trailing_records() {
        let transport = ScriptedTransport::default().with(
            "a.png",
            Reply::Chunks(vec![COMPLETED, "{\"status\":\"progress\",\"progress\":99}"]),
        );
        let mut orchestrator = Orchestrator::new(transport);
        let mut events = orchestrator.subscribe();

        let outcome = orchestrator.run(&batch(&["a.png"]), 10).await;
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.errors.is_empty());

        let mut progress_events = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, BatchEvent::Progress { .. }) {
                progress_events += 1;
            }
        }
        assert_eq!(progress_events, 0);
    }

    #[tokio::test]
    async fn stream_without_terminal_record_is_reported() {
        let transport = ScriptedTransport::default()
            .with("a.png", Reply::Chunks(vec!["{\"status\":\"progress\",\"progress\":40}\n"]))
            .with("b.png", Reply::BrokenBody(vec!["{\"status\":\"progress\",\"progress\":5}\n"]));
        let mut orchestrator = Orchestrator::new(transport);

        let outcome = orchestrator.run(&batch(&["a.png", "b.png"]), 10).await;
        assert!(outcome.results.is_empty());
        assert_eq!(
            outcome.error_messages(),
            [
                "a.png: transport error: stream ended before a terminal record",
                "b.png: transport error: connection reset"
            ]
        );
        assert_eq!(outcome.failed_files(), ["a.png", "b.png"]);
        assert!(orchestrator.progress().snapshot().is_empty());
    }

    #[tokio::test]
    async fn rerunning_a_batch_uploads_again() {
        let transport = ScriptedTransport::default().with("a.png", Reply::Chunks(vec![COMPLETED]));
        let mut orchestrator = Orchestrator::new(transport);
        let pending = batch(&["a.png"]);

        let first = orchestrator.run(&pending, 10).await;
        let second = orchestrator.run(&pending, 30).await;

        assert_eq!(first.results, second.results);
        assert_eq!(orchestrator.transport().calls.borrow().len(), 2);
        assert_eq!(orchestrator.transport().calls.borrow()[1].1, 30);
    }
}
