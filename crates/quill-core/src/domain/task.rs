//! Task model: kinds, descriptors and handles.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ids::{BoardId, TaskId};

/// Kind of AI-generation work the backend knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GenerateAnnotation,
    ImproveAnnotation,
    VisionAnnotation,
    GeneratePdfNote,
    GenerateSegmentedNote,
    ContinueSegmentedNote,
    ImprovePdfNote,
    AnswerQuestion,
}

/// Where a kind is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRoute {
    /// `POST /api/expert/dynamic/submit` with a `task_info` envelope.
    Generic,
    /// A task-specific endpoint taking `{ board_id, ...params }`.
    Dedicated(&'static str),
}

/// What a completed payload updates in the document tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Annotation,
    Note,
    SegmentedNote,
    Answer,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        TaskKind::GenerateAnnotation,
        TaskKind::ImproveAnnotation,
        TaskKind::VisionAnnotation,
        TaskKind::GeneratePdfNote,
        TaskKind::GenerateSegmentedNote,
        TaskKind::ContinueSegmentedNote,
        TaskKind::ImprovePdfNote,
        TaskKind::AnswerQuestion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::GenerateAnnotation => "generate_annotation",
            TaskKind::ImproveAnnotation => "improve_annotation",
            TaskKind::VisionAnnotation => "vision_annotation",
            TaskKind::GeneratePdfNote => "generate_pdf_note",
            TaskKind::GenerateSegmentedNote => "generate_segmented_note",
            TaskKind::ContinueSegmentedNote => "continue_segmented_note",
            TaskKind::ImprovePdfNote => "improve_pdf_note",
            TaskKind::AnswerQuestion => "answer_question",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Interactive kinds are polled every second, note generation every two.
    pub fn is_interactive(self) -> bool {
        matches!(
            self,
            TaskKind::GenerateAnnotation
                | TaskKind::ImproveAnnotation
                | TaskKind::VisionAnnotation
                | TaskKind::AnswerQuestion
        )
    }

    pub fn submit_route(self) -> SubmitRoute {
        match self {
            TaskKind::GeneratePdfNote => SubmitRoute::Dedicated("generate-pdf-note"),
            TaskKind::GenerateSegmentedNote => SubmitRoute::Dedicated("generate-segmented-note"),
            TaskKind::ContinueSegmentedNote => SubmitRoute::Dedicated("continue-segmented-note"),
            _ => SubmitRoute::Generic,
        }
    }

    pub fn result_shape(self) -> ResultShape {
        match self {
            TaskKind::GenerateAnnotation
            | TaskKind::ImproveAnnotation
            | TaskKind::VisionAnnotation => ResultShape::Annotation,
            TaskKind::GeneratePdfNote | TaskKind::ImprovePdfNote => ResultShape::Note,
            TaskKind::GenerateSegmentedNote | TaskKind::ContinueSegmentedNote => {
                ResultShape::SegmentedNote
            }
            TaskKind::AnswerQuestion => ResultShape::Answer,
        }
    }

    /// Kinds whose prompt depends on the board's annotation style.
    pub fn uses_annotation_style(self) -> bool {
        matches!(
            self,
            TaskKind::GenerateAnnotation | TaskKind::VisionAnnotation
        )
    }

    /// Typical backend run time, used only for progress estimation.
    pub fn expected_duration(self) -> Duration {
        let secs = match self {
            TaskKind::GenerateAnnotation => 30,
            TaskKind::ImproveAnnotation => 20,
            TaskKind::VisionAnnotation => 45,
            TaskKind::GeneratePdfNote => 120,
            TaskKind::GenerateSegmentedNote | TaskKind::ContinueSegmentedNote => 90,
            TaskKind::ImprovePdfNote => 60,
            TaskKind::AnswerQuestion => 20,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to submit one task. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    kind: TaskKind,
    board_id: Option<BoardId>,
    params: BTreeMap<String, serde_json::Value>,
    submitted_at_page: Option<u32>,
}

impl TaskDescriptor {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            board_id: None,
            params: BTreeMap::new(),
            submitted_at_page: None,
        }
    }

    pub fn with_board(mut self, board_id: BoardId) -> Self {
        self.board_id = Some(board_id);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Adds the param only when the descriptor does not already carry it.
    pub fn with_default_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.entry(key.into()).or_insert(value);
        self
    }

    pub fn with_submitted_at_page(mut self, page: u32) -> Self {
        self.submitted_at_page = Some(page);
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn board_id(&self) -> Option<&BoardId> {
        self.board_id.as_ref()
    }

    pub fn params(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.params
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    pub fn submitted_at_page(&self) -> Option<u32> {
        self.submitted_at_page
    }
}

/// Returned by submit; the task id is the only correlation key for polls.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskHandle {
    pub task_id: TaskId,
    pub descriptor: TaskDescriptor,
}

/// Poll cadence and attempt budget for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

    /// 1s for interactive kinds, 2s for note generation; 60 attempts for all.
    pub fn for_kind(kind: TaskKind) -> Self {
        let interval = if kind.is_interactive() {
            Duration::from_millis(1000)
        } else {
            Duration::from_millis(2000)
        };
        Self {
            interval,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn kind_serializes_as_snake_case() {
        let s = serde_json::to_string(&TaskKind::GenerateSegmentedNote).unwrap();
        assert_eq!(s, "\"generate_segmented_note\"");
        for kind in TaskKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
            assert_eq!(TaskKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[rstest]
    #[case::annotation(TaskKind::GenerateAnnotation, 1000)]
    #[case::improve(TaskKind::ImproveAnnotation, 1000)]
    #[case::vision(TaskKind::VisionAnnotation, 1000)]
    #[case::answer(TaskKind::AnswerQuestion, 1000)]
    #[case::pdf_note(TaskKind::GeneratePdfNote, 2000)]
    #[case::segmented(TaskKind::GenerateSegmentedNote, 2000)]
    #[case::continue_segmented(TaskKind::ContinueSegmentedNote, 2000)]
    #[case::improve_note(TaskKind::ImprovePdfNote, 2000)]
    fn poll_policy_depends_on_kind(#[case] kind: TaskKind, #[case] interval_ms: u64) {
        let policy = PollPolicy::for_kind(kind);
        assert_eq!(policy.interval, Duration::from_millis(interval_ms));
        assert_eq!(policy.max_attempts, 60);
    }

    #[test]
    fn default_param_does_not_override_explicit() {
        let d = TaskDescriptor::new(TaskKind::GenerateAnnotation)
            .with_param("annotation_style", serde_json::json!("brief"))
            .with_default_param("annotation_style", serde_json::json!("detailed"))
            .with_default_param("custom_prompt", serde_json::json!(""));
        assert_eq!(d.param_str("annotation_style"), Some("brief"));
        assert_eq!(d.param_str("custom_prompt"), Some(""));
    }

    #[test]
    fn dedicated_routes_only_for_note_generation() {
        assert_eq!(
            TaskKind::GeneratePdfNote.submit_route(),
            SubmitRoute::Dedicated("generate-pdf-note")
        );
        assert_eq!(TaskKind::ImprovePdfNote.submit_route(), SubmitRoute::Generic);
        assert_eq!(TaskKind::AnswerQuestion.submit_route(), SubmitRoute::Generic);
    }
}
