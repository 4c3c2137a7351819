//! Orchestration tests: the supervisor and worker driven through fake
//! collaborators.
//!
//! Nothing here touches the network. Uploads live in an in-memory "disk"
//! shared by the fake store and the fake extractor, and the retry clock is
//! replaced by a recorder so exhausted retries cost no wall-clock time.
//!
//! Run with:
//!   cargo test --test orchestration
//!   RUST_LOG=edgequake_docbatch=debug cargo test --test orchestration -- --nocapture

use async_trait::async_trait;
use edgequake_docbatch::{
    ArtifactRef, BatchConfig, BatchConfigBuilder, DocBatchError, DocumentBuilder,
    DocumentExtractor, InputItem, ItemError, Pipeline, Sleeper, TaskId, TaskRegistry,
    TaskSnapshot, TaskStatus, TaskSupervisor, TextTransform, TransformError, TransformMode,
    Upload, UploadStore,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

// ── Fakes ────────────────────────────────────────────────────────────────────

type Disk = Arc<Mutex<HashMap<PathBuf, String>>>;

/// Keeps uploads in memory; accepts `.txt`, `.md` and `.docx`.
struct MemStore {
    disk: Disk,
}

#[async_trait]
impl UploadStore for MemStore {
    fn accepts(&self, file_name: &str) -> bool {
        [".txt", ".md", ".docx"]
            .iter()
            .any(|ext| file_name.to_ascii_lowercase().ends_with(ext))
    }

    async fn store(&self, upload: &Upload) -> Result<InputItem, DocBatchError> {
        let path = PathBuf::from(format!("mem/{}", upload.file_name));
        self.disk.lock().unwrap().insert(
            path.clone(),
            String::from_utf8_lossy(&upload.bytes).into_owned(),
        );
        Ok(InputItem {
            original_name: upload.file_name.clone(),
            path,
        })
    }
}

/// Reads from the shared disk. Names containing `corrupt` fail, names
/// containing `panic` panic.
struct FakeExtractor {
    disk: Disk,
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentExtractor for FakeExtractor {
    async fn extract_text(&self, item: &InputItem) -> Result<String, ItemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if item.original_name.contains("panic") {
            panic!("extractor blew up on {}", item.original_name);
        }
        if item.original_name.contains("corrupt") {
            return Err(ItemError::ExtractionFailed {
                name: item.original_name.clone(),
                detail: "not a zip archive".into(),
            });
        }
        self.disk
            .lock()
            .unwrap()
            .get(&item.path)
            .cloned()
            .ok_or_else(|| ItemError::ExtractionFailed {
                name: item.original_name.clone(),
                detail: "missing".into(),
            })
    }
}

/// Tags its input with the mode. Optionally always fails, sleeps, or waits
/// on a gate before answering.
#[derive(Default)]
struct FakeTransform {
    always_fail: bool,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<(TransformMode, usize)>>,
}

#[async_trait]
impl TextTransform for FakeTransform {
    async fn transform(&self, text: &str, mode: TransformMode) -> Result<String, TransformError> {
        self.calls
            .lock()
            .unwrap()
            .push((mode, text.chars().count()));
        if let Some(ref gate) = self.gate {
            let _permit = gate.acquire().await.map_err(|e| TransformError::Api {
                message: e.to_string(),
            })?;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.always_fail {
            return Err(TransformError::Api {
                message: "503 Service Unavailable".into(),
            });
        }
        Ok(match mode {
            TransformMode::Correct => format!("{text} (corrected)"),
            TransformMode::Translate => format!("{text} (translated)"),
        })
    }
}

/// Records what it was asked to render and compile.
#[derive(Default)]
struct FakeBuilder {
    fail_compile: bool,
    rendered: Mutex<Vec<(String, String, String)>>,
    compiled: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl DocumentBuilder for FakeBuilder {
    async fn render(
        &self,
        title: &str,
        source_text: &str,
        target_text: &str,
    ) -> Result<ArtifactRef, ItemError> {
        if title.contains("unrenderable") {
            return Err(ItemError::RenderFailed {
                name: title.to_string(),
                detail: "disk full".into(),
            });
        }
        self.rendered.lock().unwrap().push((
            title.to_string(),
            source_text.to_string(),
            target_text.to_string(),
        ));
        let name = format!("processed_{title}.md");
        Ok(ArtifactRef::new(&name, title, PathBuf::from(&name)))
    }

    async fn compile(&self, artifacts: &[ArtifactRef]) -> Result<ArtifactRef, ItemError> {
        self.compiled
            .lock()
            .unwrap()
            .push(artifacts.iter().map(|a| a.label.clone()).collect());
        if self.fail_compile {
            return Err(ItemError::CompileFailed {
                detail: "disk full".into(),
            });
        }
        Ok(ArtifactRef::new(
            "compiled.md",
            "compiled",
            PathBuf::from("compiled.md"),
        ))
    }
}

#[derive(Default)]
struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    sup: TaskSupervisor,
    extractor: Arc<FakeExtractor>,
    transform: Arc<FakeTransform>,
    builder: Arc<FakeBuilder>,
    sleeper: Arc<RecordingSleeper>,
}

/// Route worker logs through the test harness; filter with `RUST_LOG`.
fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness_with(
    configure: impl FnOnce(BatchConfigBuilder) -> BatchConfigBuilder,
    transform: FakeTransform,
    builder: FakeBuilder,
) -> Harness {
    init_logs();
    let config = configure(BatchConfig::builder()).build().unwrap();
    let disk: Disk = Arc::default();
    let extractor = Arc::new(FakeExtractor {
        disk: Arc::clone(&disk),
        calls: AtomicUsize::new(0),
    });
    let transform = Arc::new(transform);
    let builder = Arc::new(builder);
    let sleeper = Arc::new(RecordingSleeper::default());

    let pipeline = Pipeline::new(
        Arc::new(config),
        extractor.clone(),
        transform.clone(),
        builder.clone(),
    )
    .with_sleeper(sleeper.clone());
    let sup = TaskSupervisor::new(
        Arc::new(TaskRegistry::new()),
        Arc::new(MemStore { disk }),
        pipeline,
    );

    Harness {
        sup,
        extractor,
        transform,
        builder,
        sleeper,
    }
}

fn harness() -> Harness {
    harness_with(|b| b, FakeTransform::default(), FakeBuilder::default())
}

fn uploads(names: &[&str]) -> Vec<Upload> {
    names
        .iter()
        .map(|n| Upload::new(*n, format!("text of {n}").into_bytes()))
        .collect()
}

async fn run_to_end(h: &Harness, names: &[&str]) -> TaskSnapshot {
    let id = h.sup.submit_batch(uploads(names)).await.unwrap();
    h.sup.start_processing(&id).unwrap();
    finish(h, &id).await
}

async fn finish(h: &Harness, id: &TaskId) -> TaskSnapshot {
    tokio::time::timeout(
        Duration::from_secs(10),
        h.sup.wait_for_terminal(id, Duration::from_millis(2)),
    )
    .await
    .expect("task did not finish in time")
    .unwrap()
}

/// Wait until `cond` holds, polling every few milliseconds.
async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out: {what}");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn submitted_batch_starts_uploaded() {
    let h = harness();
    let id = h.sup.submit_batch(uploads(&["a.txt", "b.md"])).await.unwrap();
    let snap = h.sup.get_status(&id).unwrap();
    assert_eq!(snap.status, TaskStatus::Uploaded);
    assert_eq!(snap.progress, 0);
    assert_eq!(snap.message, "Files uploaded");
    assert_eq!(snap.item_count, 2);
    assert!(snap.results.is_empty());
}

#[tokio::test]
async fn every_item_gets_exactly_one_result_in_order() {
    let h = harness();
    let snap = run_to_end(&h, &["one.txt", "two.txt", "three.txt"]).await;

    assert_eq!(snap.status, TaskStatus::Completed);
    assert_eq!(snap.progress, 100);
    assert_eq!(snap.message, "Processing completed");
    let names: Vec<&str> = snap.results.iter().map(|r| r.original_name.as_str()).collect();
    assert_eq!(names, vec!["one.txt", "two.txt", "three.txt"]);
    assert!(snap.results.iter().all(|r| r.is_success()));
    assert!(snap.finished_at.is_some());
}

#[tokio::test]
async fn correction_output_is_translated_and_rendered() {
    let h = harness();
    run_to_end(&h, &["letter.txt"]).await;

    let rendered = h.builder.rendered.lock().unwrap();
    assert_eq!(
        rendered[0],
        (
            "letter".to_string(),
            "text of letter.txt (corrected)".to_string(),
            "text of letter.txt (corrected) (translated)".to_string()
        )
    );
}

#[tokio::test]
async fn three_successes_compile_in_input_order() {
    let h = harness();
    let snap = run_to_end(&h, &["c.txt", "a.txt", "b.txt"]).await;

    assert_eq!(
        *h.builder.compiled.lock().unwrap(),
        vec![vec!["c".to_string(), "a".to_string(), "b".to_string()]]
    );
    assert_eq!(snap.compiled.unwrap().name, "compiled.md");
}

#[tokio::test]
async fn single_success_is_not_compiled() {
    let h = harness();
    let snap = run_to_end(&h, &["only.txt"]).await;

    assert_eq!(snap.status, TaskStatus::Completed);
    assert!(snap.compiled.is_none());
    assert!(h.builder.compiled.lock().unwrap().is_empty());
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn sole_item_failing_extraction_still_completes() {
    let h = harness();
    let snap = run_to_end(&h, &["corrupt.docx"]).await;

    assert_eq!(snap.status, TaskStatus::Completed);
    assert_eq!(snap.progress, 100);
    assert_eq!(snap.results.len(), 1);
    assert!(snap.results[0].artifact().is_none());
    assert_eq!(
        snap.results[0].error_detail(),
        Some("corrupt.docx: text extraction failed: not a zip archive")
    );
    assert!(snap.compiled.is_none());
}

#[tokio::test]
async fn failed_items_are_left_out_of_the_compile() {
    let h = harness();
    let snap = run_to_end(
        &h,
        &["a.txt", "corrupt.docx", "unrenderable.txt", "d.txt"],
    )
    .await;

    assert_eq!(snap.results.len(), 4);
    assert_eq!(snap.succeeded_items(), 2);
    assert!(snap.results[2]
        .error_detail()
        .unwrap()
        .contains("rendering failed"));
    assert_eq!(
        *h.builder.compiled.lock().unwrap(),
        vec![vec!["a".to_string(), "d".to_string()]]
    );
}

#[tokio::test]
async fn exhausted_retries_degrade_to_fallback_content() {
    let h = harness_with(
        |b| b,
        FakeTransform {
            always_fail: true,
            ..Default::default()
        },
        FakeBuilder::default(),
    );
    let snap = run_to_end(&h, &["letter.txt"]).await;

    assert_eq!(snap.status, TaskStatus::Completed);
    assert!(snap.results[0].is_success());

    let rendered = h.builder.rendered.lock().unwrap();
    let (_, source, target) = &rendered[0];
    assert_eq!(source, "text of letter.txt");
    assert_eq!(target, "[TRANSLATION ERROR FOR: text of letter.txt...]");

    // One chunk per mode, three attempts each, backoff 1 s then 2 s.
    assert_eq!(h.transform.calls.lock().unwrap().len(), 6);
    assert_eq!(
        *h.sleeper.slept.lock().unwrap(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(1),
            Duration::from_secs(2)
        ]
    );
}

#[tokio::test]
async fn compile_failure_leaves_batch_completed() {
    let h = harness_with(
        |b| b,
        FakeTransform::default(),
        FakeBuilder {
            fail_compile: true,
            ..Default::default()
        },
    );
    let snap = run_to_end(&h, &["a.txt", "b.txt"]).await;

    assert_eq!(snap.status, TaskStatus::Completed);
    assert_eq!(snap.progress, 100);
    assert!(snap.compiled.is_none());
    assert_eq!(h.builder.compiled.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn panicking_worker_ends_in_error() {
    let h = harness();
    let snap = run_to_end(&h, &["a.txt", "panic.txt"]).await;

    assert_eq!(snap.status, TaskStatus::Error);
    assert_eq!(snap.message, "Error: worker panicked");
    assert!(snap.progress < 100);
    assert!(snap.compiled.is_none());
}

// ── Chunking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn long_text_is_chunked_per_mode() {
    let h = harness();
    let text = "x".repeat(9000);
    let id = h
        .sup
        .submit_batch(vec![Upload::new("long.txt", text.into_bytes())])
        .await
        .unwrap();
    h.sup.start_processing(&id).unwrap();
    finish(&h, &id).await;

    let calls = h.transform.calls.lock().unwrap();
    let correct: Vec<usize> = calls
        .iter()
        .filter(|(m, _)| *m == TransformMode::Correct)
        .map(|(_, n)| *n)
        .collect();
    let translate: Vec<usize> = calls
        .iter()
        .filter(|(m, _)| *m == TransformMode::Translate)
        .map(|(_, n)| *n)
        .collect();

    assert_eq!(correct, vec![4000, 4000, 1000]);
    // Corrected chunks gain " (corrected)" and are joined with "\n".
    let corrected_len = 9000 + 3 * " (corrected)".len() + 2;
    assert_eq!(translate.iter().sum::<usize>(), corrected_len);
    assert!(translate.iter().all(|n| *n <= 3000));
    assert_eq!(translate.len(), corrected_len.div_ceil(3000));
}

// ── Start semantics ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_task_is_not_found() {
    let h = harness();
    let id = TaskId::new();
    assert!(matches!(
        h.sup.get_status(&id),
        Err(DocBatchError::TaskNotFound { .. })
    ));
    assert!(matches!(
        h.sup.start_processing(&id),
        Err(DocBatchError::TaskNotFound { .. })
    ));
}

#[tokio::test]
async fn batch_without_accepted_files_is_rejected() {
    let h = harness();
    let err = h
        .sup
        .submit_batch(uploads(&["scan.pdf", "setup.exe"]))
        .await
        .unwrap_err();
    assert!(matches!(err, DocBatchError::NoValidInput { ref rejected } if rejected.len() == 2));
    assert!(h.sup.registry().is_empty());
}

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness_with(
        |b| b,
        FakeTransform {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        },
        FakeBuilder::default(),
    );
    let id = h.sup.submit_batch(uploads(&["a.txt"])).await.unwrap();

    h.sup.start_processing(&id).unwrap();
    let err = h.sup.start_processing(&id).unwrap_err();
    assert!(matches!(err, DocBatchError::AlreadyProcessing { .. }));
    assert_eq!(h.sup.get_status(&id).unwrap().status, TaskStatus::Processing);

    gate.add_permits(1);
    let snap = finish(&h, &id).await;
    assert_eq!(snap.status, TaskStatus::Completed);
    assert_eq!(snap.results.len(), 1);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn finished_task_cannot_be_restarted() {
    let h = harness();
    let id = h.sup.submit_batch(uploads(&["a.txt"])).await.unwrap();
    h.sup.start_processing(&id).unwrap();
    finish(&h, &id).await;

    let err = h.sup.start_processing(&id).unwrap_err();
    assert!(matches!(
        err,
        DocBatchError::AlreadyFinished {
            status: TaskStatus::Completed,
            ..
        }
    ));
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrency_ceiling_queues_extra_batches() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness_with(
        |b| b.max_concurrent_batches(1),
        FakeTransform {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        },
        FakeBuilder::default(),
    );
    let first = h.sup.submit_batch(uploads(&["a.txt"])).await.unwrap();
    let second = h.sup.submit_batch(uploads(&["b.txt"])).await.unwrap();
    h.sup.start_processing(&first).unwrap();
    h.sup.start_processing(&second).unwrap();

    eventually("first batch reaches the transform", || {
        !h.transform.calls.lock().unwrap().is_empty()
    })
    .await;
    // Let the second batch's outer task run far enough to block on the permit.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let snaps = [
        h.sup.get_status(&first).unwrap(),
        h.sup.get_status(&second).unwrap(),
    ];
    let waiting: Vec<&TaskSnapshot> = snaps
        .iter()
        .filter(|s| s.message == "Waiting for a free worker...")
        .collect();
    assert_eq!(waiting.len(), 1, "exactly one batch should be queued");
    assert_eq!(waiting[0].status, TaskStatus::Processing);
    assert_eq!(waiting[0].progress, 0);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);

    gate.add_permits(1);
    assert_eq!(finish(&h, &first).await.status, TaskStatus::Completed);
    assert_eq!(finish(&h, &second).await.status, TaskStatus::Completed);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 2);
}

// ── Observed consistency ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pollers_never_see_torn_or_regressing_state() {
    let h = harness_with(
        |b| b,
        FakeTransform {
            delay: Some(Duration::from_millis(1)),
            ..Default::default()
        },
        FakeBuilder::default(),
    );
    let names = ["a.txt", "corrupt.docx", "c.txt", "d.txt", "e.txt"];
    let id = h.sup.submit_batch(uploads(&names)).await.unwrap();
    h.sup.start_processing(&id).unwrap();

    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let snap = h.sup.get_status(&id).unwrap();
        let done = snap.is_terminal();
        seen.push(snap);
        if done {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "task did not finish");
        tokio::task::yield_now().await;
    }

    for pair in seen.windows(2) {
        assert!(pair[1].progress >= pair[0].progress, "progress went backwards");
        assert!(pair[1].results.len() >= pair[0].results.len());
    }
    for snap in &seen {
        assert!(snap.results.len() <= names.len());
        match snap.status {
            TaskStatus::Completed => {
                assert_eq!(snap.progress, 100);
                assert_eq!(snap.results.len(), names.len());
                assert_eq!(snap.message, "Processing completed");
                assert!(snap.compiled.is_some());
            }
            TaskStatus::Processing => {
                assert!(snap.progress <= 90);
                assert!(snap.compiled.is_none());
            }
            other => panic!("unexpected status {other}"),
        }
    }
    let last = seen.last().unwrap();
    assert_eq!(last.status, TaskStatus::Completed);
    assert_eq!(last.succeeded_items(), 4);
}

// ── Retention ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_tasks_are_evicted_but_pending_ones_stay() {
    let h = harness_with(
        |b| b.retention_secs(0),
        FakeTransform::default(),
        FakeBuilder::default(),
    );
    let done = h.sup.submit_batch(uploads(&["a.txt"])).await.unwrap();
    h.sup.start_processing(&done).unwrap();
    finish(&h, &done).await;
    let pending = h.sup.submit_batch(uploads(&["b.txt"])).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(h.sup.evict_expired(), 1);

    assert!(matches!(
        h.sup.get_status(&done),
        Err(DocBatchError::TaskNotFound { .. })
    ));
    assert_eq!(h.sup.get_status(&pending).unwrap().status, TaskStatus::Uploaded);
}
