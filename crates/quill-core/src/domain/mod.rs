//! Domain model (IDs, task descriptors, results, document tree, errors, events).
//!
//! このモジュールは I/O を一切含みません。HTTP や時刻は ports 経由で扱います。

pub mod document;
pub mod errors;
pub mod events;
pub mod ids;
pub mod result;
pub mod snapshot;
pub mod state;
pub mod task;

pub use document::{
    AnnotationEntry, AnnotationSource, AnswerEntry, Course, CourseFile, DocumentTree, NoteEntry,
    NoteSegment, PageRef, PdfDocument, PdfPath, ShownAnnotation,
};
pub use errors::{NetworkError, ParseError, TaskError};
pub use events::DomainEvent;
pub use ids::{BoardId, CourseId, FileId, PdfId, RunId, TaskId, WindowId};
pub use result::{TaskResult, TaskStatusResponse};
pub use snapshot::{ActiveTaskDetail, ConcurrentTaskSnapshot};
pub use state::{PollPhase, PollState};
pub use task::{PollPolicy, ResultShape, SubmitRoute, TaskDescriptor, TaskHandle, TaskKind};
