//! Orchestrator - UI 操作1回分のタスク実行を組み立てる
//!
//! # フロー
//! 1. StyleResolver でボードのスタイルをパラメータへ反映
//! 2. 対象ページ（またはノート）を loading にする
//! 3. TaskClient::submit()
//! 4. PollLoop::run()
//! 5. ResultReconciler::reconcile()
//!
//! 途中でエラーになったら loading を下ろしてエラー文言を残し、呼び出し元へ返します。
//! 同じページへの同時投入は重複排除しません。

use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span, warn};

use crate::config::QuillConfig;
use crate::domain::{
    AnnotationSource, BoardId, DomainEvent, PageRef, PdfPath, ResultShape, RunId, TaskDescriptor,
    TaskError, TaskHandle, TaskKind, WindowId,
};
use crate::impls::TracingEventSink;
use crate::ports::{Clock, EventSink, IdGenerator, SystemClock, Transport, UlidGenerator};

use super::client::TaskClient;
use super::monitor::ConcurrentStatusMonitor;
use super::poll_loop::PollLoop;
use super::reconciler::{ReconcileOutcome, ResultReconciler};
use super::retry::WindowSaver;
use super::store::DocumentStore;
use super::style::StyleResolver;

pub struct Orchestrator<T> {
    client: TaskClient<T>,
    store: Arc<DocumentStore>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: QuillConfig,
}

impl<T: Transport> Orchestrator<T> {
    /// Wire with an empty tree, the system clock and tracing output.
    pub fn new(transport: T, config: QuillConfig) -> Self {
        Self {
            client: TaskClient::new(transport),
            store: Arc::new(DocumentStore::default()),
            events: Arc::new(TracingEventSink),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            config,
        }
    }

    pub fn with_store(mut self, store: Arc<DocumentStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn config(&self) -> &QuillConfig {
        &self.config
    }

    pub fn monitor(&self) -> ConcurrentStatusMonitor<'_, T> {
        ConcurrentStatusMonitor::new(self.client.transport(), self.events.as_ref())
            .with_refresh_interval(self.config.monitor_refresh_interval())
    }

    /// Board the PDF's file is attached to, if any.
    pub fn board_for(&self, path: &PdfPath) -> Option<BoardId> {
        self.store
            .snapshot()
            .file(&path.course, &path.file)
            .and_then(|file| file.board_id.clone())
    }

    /// Generate, improve or vision-annotate one page.
    pub async fn annotate_page(
        &self,
        target: &PageRef,
        kind: TaskKind,
        extra_params: impl IntoIterator<Item = (String, Value)>,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, TaskError> {
        if kind.result_shape() != ResultShape::Annotation {
            return Err(TaskError::Submission(format!("{kind} is not an annotation task")));
        }
        let descriptor = extra_params
            .into_iter()
            .fold(self.descriptor(kind, target), |d, (k, v)| d.with_param(k, v))
            .with_default_param("page_number", json!(target.page));
        self.execute(descriptor, target, cancel).await
    }

    /// Generate or improve the PDF note. Segmented kinds start at
    /// `target.page` unless `params` says otherwise.
    pub async fn generate_note(
        &self,
        target: &PageRef,
        kind: TaskKind,
        params: impl IntoIterator<Item = (String, Value)>,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, TaskError> {
        let mut descriptor = params
            .into_iter()
            .fold(self.descriptor(kind, target), |d, (k, v)| d.with_param(k, v));
        match kind.result_shape() {
            ResultShape::Note => {}
            ResultShape::SegmentedNote => {
                descriptor = descriptor.with_default_param("start_page", json!(target.page));
            }
            _ => return Err(TaskError::Submission(format!("{kind} is not a note task"))),
        }
        self.execute(descriptor, target, cancel).await
    }

    pub async fn answer_question(
        &self,
        target: &PageRef,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, TaskError> {
        let descriptor = self
            .descriptor(TaskKind::AnswerQuestion, target)
            .with_param("question", json!(question))
            .with_param("page_number", json!(target.page));
        self.execute(descriptor, target, cancel).await
    }

    pub async fn save_window(
        &self,
        board_id: &BoardId,
        window_id: &WindowId,
        window: &Value,
    ) -> Result<(), TaskError> {
        let policy = self.config.retry_policy();
        WindowSaver::new(self.client.transport(), &policy, self.events.as_ref())
            .save(board_id, window_id, window)
            .await
    }

    fn descriptor(&self, kind: TaskKind, target: &PageRef) -> TaskDescriptor {
        let mut descriptor = TaskDescriptor::new(kind).with_submitted_at_page(target.page);
        if let Some(board_id) = self.board_for(&target.pdf) {
            descriptor = descriptor.with_board(board_id);
        }
        if let Some(pdf) = self.store.snapshot().pdf(&target.pdf) {
            descriptor = descriptor.with_param("filename", json!(pdf.filename));
        }
        descriptor
    }

    async fn execute(
        &self,
        descriptor: TaskDescriptor,
        target: &PageRef,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, TaskError> {
        let kind = descriptor.kind();
        let run_id = self.ids.generate_run_id();
        let span = info_span!("task_run", %run_id, %kind, page = target.page);

        async {
            let reconciler = ResultReconciler::new(&self.store, self.events.as_ref());
            match self.submit_and_poll(&run_id, descriptor, target, cancel).await {
                Ok((handle, payload)) => Ok(reconciler.reconcile(&handle, target, &payload)),
                Err(err) => {
                    warn!(error = %err, "task run failed");
                    reconciler.mark_failed(kind, target, &err.user_message());
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn submit_and_poll(
        &self,
        run_id: &RunId,
        descriptor: TaskDescriptor,
        target: &PageRef,
        cancel: &CancellationToken,
    ) -> Result<(TaskHandle, Value), TaskError> {
        let kind = descriptor.kind();
        let descriptor = StyleResolver::new(self.client.transport(), self.events.as_ref())
            .apply(descriptor)
            .await;

        match kind.result_shape() {
            ResultShape::Annotation => {
                let source = if kind == TaskKind::VisionAnnotation {
                    AnnotationSource::Vision
                } else {
                    AnnotationSource::Llm
                };
                self.store.mark_page_loading(target, source);
            }
            ResultShape::Note | ResultShape::SegmentedNote => {
                self.store.mark_note_loading(&target.pdf);
            }
            ResultShape::Answer => {}
        }

        let handle = self.client.submit(descriptor).await?;
        if let Some(board_id) = handle.descriptor.board_id() {
            self.events.emit(&DomainEvent::TaskSubmitted {
                run_id: *run_id,
                task_id: handle.task_id.clone(),
                kind,
                board_id: board_id.clone(),
            });
        }

        let payload = PollLoop::new(&self.client, self.events.as_ref(), self.clock.as_ref())
            .run(&handle, self.config.poll_policy(kind), cancel)
            .await?;
        Ok((handle, payload))
    }
}
