//! ResultReconciler - 完了したタスクの結果をドキュメントツリーへ反映する
//!
//! # ルール
//! - ページ単位の AnnotationEntry には必ず書き込む
//! - 「現在表示中」の注釈は、完了時点の表示ページが生成対象ページと同じときだけ更新する
//! - loading フラグは完了したページのものだけを下ろす（同じ PDF の他ページは触らない）
//! - 構造化結果のパースに失敗しても例外にせず、生テキスト + error で保存する

use serde::Deserialize;
use serde_json::Value;

use crate::domain::{
    AnnotationSource, AnswerEntry, DomainEvent, NoteSegment, PageRef, ParseError, ResultShape,
    ShownAnnotation, TaskHandle, TaskKind,
};
use crate::ports::EventSink;

use super::store::DocumentStore;

/// What a merge did to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Written as intended. `promoted` is true when the displayed annotation
    /// was replaced too.
    Applied { promoted: bool },
    /// A structured payload could not be parsed; the raw text was stored with
    /// an error marker.
    Degraded { reason: String },
    /// The target PDF no longer exists; nothing was written.
    Orphaned,
}

/// Structured result of segmented note generation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct SegmentedNote {
    note: String,
    #[serde(default)]
    start_page: Option<u32>,
    #[serde(default)]
    end_page: Option<u32>,
    #[serde(default)]
    next_start_page: Option<u32>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    total_pages: Option<u32>,
}

pub struct ResultReconciler<'a> {
    store: &'a DocumentStore,
    events: &'a dyn EventSink,
}

impl<'a> ResultReconciler<'a> {
    pub fn new(store: &'a DocumentStore, events: &'a dyn EventSink) -> Self {
        Self { store, events }
    }

    /// Merge a completed payload for `handle` into the tree at `target`.
    ///
    /// Annotations land on the page recorded in the descriptor at submit
    /// time, falling back to `target.page`.
    pub fn reconcile(&self, handle: &TaskHandle, target: &PageRef, payload: &Value) -> ReconcileOutcome {
        let kind = handle.descriptor.kind();
        let requested = handle
            .descriptor
            .submitted_at_page()
            .map(|page| target.pdf.page(page));
        let target = requested.as_ref().unwrap_or(target);
        let outcome = match kind.result_shape() {
            ResultShape::Annotation => self.merge_annotation(kind, target, payload),
            ResultShape::Note => self.merge_note(target, payload),
            ResultShape::SegmentedNote => self.merge_segmented_note(kind, target, payload),
            ResultShape::Answer => {
                let question = handle.descriptor.param_str("question").unwrap_or_default();
                self.merge_answer(target, question, payload)
            }
        };

        let task_id = handle.task_id.clone();
        match &outcome {
            ReconcileOutcome::Applied { promoted } => {
                self.events.emit(&DomainEvent::ResultReconciled {
                    task_id,
                    kind,
                    page: Some(target.page),
                    promoted: *promoted,
                });
            }
            ReconcileOutcome::Degraded { reason } => {
                self.events.emit(&DomainEvent::ResultDegraded {
                    task_id,
                    reason: reason.clone(),
                });
            }
            ReconcileOutcome::Orphaned => {
                self.events.emit(&DomainEvent::ResultOrphaned { task_id });
            }
        }
        outcome
    }

    /// The task ended without a result: clear the loading flag of its exact
    /// target and keep the error text for display.
    pub fn mark_failed(&self, kind: TaskKind, target: &PageRef, message: &str) -> bool {
        match kind.result_shape() {
            ResultShape::Annotation => self
                .store
                .update_page(target, |entry| {
                    entry.loading = false;
                    entry.error = Some(message.to_string());
                })
                .is_some(),
            ResultShape::Note | ResultShape::SegmentedNote => self
                .store
                .update_pdf(&target.pdf, |pdf| {
                    let note = pdf.note_mut();
                    note.loading = false;
                    note.error = Some(message.to_string());
                })
                .is_some(),
            ResultShape::Answer => false,
        }
    }

    fn merge_annotation(&self, kind: TaskKind, target: &PageRef, payload: &Value) -> ReconcileOutcome {
        let source = match kind {
            TaskKind::VisionAnnotation => AnnotationSource::Vision,
            _ => AnnotationSource::Llm,
        };
        let (content, parse_error) = match text_field(payload, &["annotation", "improved_annotation", "content", "text"]) {
            Ok(text) => (text, None),
            Err(e) => (raw_text(payload), Some(e)),
        };

        let merged = self.store.update_pdf(&target.pdf, |pdf| {
            let entry = pdf.page_mut(target.page);
            entry.content = content.clone();
            entry.source = source;
            entry.loading = false;
            entry.error = parse_error.as_ref().map(ToString::to_string);

            // staleness: only the page the user is still looking at is promoted
            let promoted = pdf.current_page == target.page;
            if promoted {
                pdf.shown_annotation = Some(ShownAnnotation {
                    page: target.page,
                    content,
                    source,
                });
            }
            promoted
        });

        match (merged, parse_error) {
            (None, _) => ReconcileOutcome::Orphaned,
            (Some(_), Some(e)) => ReconcileOutcome::Degraded { reason: e.to_string() },
            (Some(promoted), None) => ReconcileOutcome::Applied { promoted },
        }
    }

    fn merge_note(&self, target: &PageRef, payload: &Value) -> ReconcileOutcome {
        let (content, parse_error) = match text_field(payload, &["note", "improved_note", "content", "text"]) {
            Ok(text) => (text, None),
            Err(e) => (raw_text(payload), Some(e)),
        };

        let merged = self.store.update_pdf(&target.pdf, |pdf| {
            let note = pdf.note_mut();
            note.content = content;
            note.loading = false;
            note.error = parse_error.as_ref().map(ToString::to_string);
        });

        match (merged, parse_error) {
            (None, _) => ReconcileOutcome::Orphaned,
            (Some(()), Some(e)) => ReconcileOutcome::Degraded { reason: e.to_string() },
            (Some(()), None) => ReconcileOutcome::Applied { promoted: false },
        }
    }

    fn merge_segmented_note(&self, kind: TaskKind, target: &PageRef, payload: &Value) -> ReconcileOutcome {
        let append = kind == TaskKind::ContinueSegmentedNote;
        let parsed = parse_segmented(payload, 0);

        let merged = self.store.update_pdf(&target.pdf, |pdf| {
            if let Ok(SegmentedNote { total_pages: Some(total), .. }) = &parsed {
                pdf.total_pages = Some(*total);
            }
            let note = pdf.note_mut();
            let (text, error, segment) = match &parsed {
                Ok(seg) => {
                    let start_page = seg.start_page.unwrap_or(target.page);
                    let segment = NoteSegment {
                        start_page,
                        end_page: seg.end_page.unwrap_or(start_page),
                        next_start_page: seg.next_start_page,
                        has_more: seg.has_more,
                        total_pages: seg.total_pages,
                    };
                    (seg.note.clone(), None, Some(segment))
                }
                Err(e) => (raw_text(payload), Some(e.to_string()), note.segment.clone()),
            };

            if append && !note.content.is_empty() {
                note.content.push_str("\n\n");
                note.content.push_str(&text);
            } else {
                note.content = text;
            }
            note.segment = segment;
            note.error = error;
            note.loading = false;
        });

        match (merged, parsed) {
            (None, _) => ReconcileOutcome::Orphaned,
            (Some(()), Err(e)) => ReconcileOutcome::Degraded { reason: e.to_string() },
            (Some(()), Ok(_)) => ReconcileOutcome::Applied { promoted: false },
        }
    }

    fn merge_answer(&self, target: &PageRef, question: &str, payload: &Value) -> ReconcileOutcome {
        let (answer, parse_error) = match text_field(payload, &["answer", "content", "text"]) {
            Ok(text) => (text, None),
            Err(e) => (raw_text(payload), Some(e)),
        };

        let merged = self.store.update_pdf(&target.pdf, |pdf| {
            pdf.answers.push(
                AnswerEntry {
                    question: question.to_string(),
                    answer,
                }
                .into(),
            );
        });

        match (merged, parse_error) {
            (None, _) => ReconcileOutcome::Orphaned,
            (Some(()), Some(e)) => ReconcileOutcome::Degraded { reason: e.to_string() },
            (Some(()), None) => ReconcileOutcome::Applied { promoted: false },
        }
    }
}

/// Plain string payloads are the text itself; objects carry it in one of
/// `keys`, or in a `result` wrapper.
fn text_field(payload: &Value, keys: &[&str]) -> Result<String, ParseError> {
    match payload {
        Value::String(s) => Ok(s.clone()),
        Value::Object(map) => {
            if let Some(text) = keys.iter().find_map(|k| map.get(*k).and_then(Value::as_str)) {
                return Ok(text.to_string());
            }
            match map.get("result") {
                Some(inner @ (Value::String(_) | Value::Object(_))) => text_field(inner, keys),
                _ => Err(ParseError {
                    what: "task result",
                    reason: format!("none of {keys:?} present"),
                }),
            }
        }
        other => Err(ParseError {
            what: "task result",
            reason: format!("unexpected payload {other}"),
        }),
    }
}

/// The structured note may arrive as an object, as a JSON string, or wrapped
/// in a `result` field holding either.
fn parse_segmented(payload: &Value, depth: u8) -> Result<SegmentedNote, ParseError> {
    const MAX_DEPTH: u8 = 3;
    let fail = |reason: String| ParseError {
        what: "segmented note",
        reason,
    };
    if depth > MAX_DEPTH {
        return Err(fail("nested too deeply".into()));
    }

    match payload {
        Value::String(s) => {
            let inner: Value = serde_json::from_str(s).map_err(|e| fail(e.to_string()))?;
            parse_segmented(&inner, depth + 1)
        }
        Value::Object(map) if map.get("note").is_some_and(Value::is_string) => {
            SegmentedNote::deserialize(payload).map_err(|e| fail(e.to_string()))
        }
        Value::Object(map) => match map.get("result") {
            Some(inner) => parse_segmented(inner, depth + 1),
            None => Err(fail("missing note field".into())),
        },
        other => Err(fail(format!("unexpected payload {other}"))),
    }
}

fn raw_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
