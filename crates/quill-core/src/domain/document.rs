//! Document tree: courses → files → PDFs → per-page annotations.
//!
//! Every node below the root is held in an `Arc`. Mutation goes through
//! `Arc::make_mut` along exactly one path, so the nodes on that path are
//! replaced and every sibling keeps its reference identity.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ids::{BoardId, CourseId, FileId, PdfId};

/// Generation source of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationSource {
    Llm,
    Vision,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTree {
    pub courses: BTreeMap<CourseId, Arc<Course>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub files: BTreeMap<FileId, Arc<CourseFile>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseFile {
    pub id: FileId,
    pub name: String,
    pub board_id: Option<BoardId>,
    pub pdfs: BTreeMap<PdfId, Arc<PdfDocument>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    pub id: PdfId,
    pub filename: String,
    /// Page the user is looking at right now (1-based).
    pub current_page: u32,
    pub total_pages: Option<u32>,
    /// What the annotation panel currently displays.
    pub shown_annotation: Option<ShownAnnotation>,
    pub pages: BTreeMap<u32, Arc<AnnotationEntry>>,
    pub note: Option<Arc<NoteEntry>>,
    pub answers: Vec<Arc<AnswerEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownAnnotation {
    pub page: u32,
    pub content: String,
    pub source: AnnotationSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationEntry {
    pub content: String,
    pub source: AnnotationSource,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for AnnotationEntry {
    fn default() -> Self {
        Self {
            content: String::new(),
            source: AnnotationSource::Llm,
            loading: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteEntry {
    pub content: String,
    pub loading: bool,
    pub error: Option<String>,
    pub segment: Option<NoteSegment>,
}

/// Progress of a segmented (page-range by page-range) note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSegment {
    pub start_page: u32,
    pub end_page: u32,
    pub next_start_page: Option<u32>,
    pub has_more: bool,
    pub total_pages: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerEntry {
    pub question: String,
    pub answer: String,
}

/// Address of one PDF in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfPath {
    pub course: CourseId,
    pub file: FileId,
    pub pdf: PdfId,
}

impl PdfPath {
    pub fn new(course: impl Into<CourseId>, file: impl Into<FileId>, pdf: impl Into<PdfId>) -> Self {
        Self {
            course: course.into(),
            file: file.into(),
            pdf: pdf.into(),
        }
    }

    pub fn page(&self, page: u32) -> PageRef {
        PageRef {
            pdf: self.clone(),
            page,
        }
    }
}

/// Address of one page of one PDF.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub pdf: PdfPath,
    pub page: u32,
}

impl DocumentTree {
    pub fn course(&self, id: &CourseId) -> Option<&Arc<Course>> {
        self.courses.get(id)
    }

    pub fn file(&self, course: &CourseId, file: &FileId) -> Option<&Arc<CourseFile>> {
        self.course(course)?.files.get(file)
    }

    pub fn pdf(&self, path: &PdfPath) -> Option<&Arc<PdfDocument>> {
        self.file(&path.course, &path.file)?.pdfs.get(&path.pdf)
    }

    pub fn page(&self, page: &PageRef) -> Option<&Arc<AnnotationEntry>> {
        self.pdf(&page.pdf)?.pages.get(&page.page)
    }

    /// Copy-on-write access to one PDF. Returns `None` without touching any
    /// node when the path does not exist.
    pub fn pdf_mut(&mut self, path: &PdfPath) -> Option<&mut PdfDocument> {
        self.pdf(path)?;
        let course = Arc::make_mut(self.courses.get_mut(&path.course)?);
        let file = Arc::make_mut(course.files.get_mut(&path.file)?);
        let pdf = file.pdfs.get_mut(&path.pdf)?;
        Some(Arc::make_mut(pdf))
    }
}

impl Course {
    pub fn new(id: impl Into<CourseId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, file: CourseFile) -> Self {
        self.files.insert(file.id.clone(), Arc::new(file));
        self
    }
}

impl CourseFile {
    pub fn new(id: impl Into<FileId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            board_id: None,
            pdfs: BTreeMap::new(),
        }
    }

    pub fn with_board(mut self, board_id: BoardId) -> Self {
        self.board_id = Some(board_id);
        self
    }

    pub fn with_pdf(mut self, pdf: PdfDocument) -> Self {
        self.pdfs.insert(pdf.id.clone(), Arc::new(pdf));
        self
    }
}

impl PdfDocument {
    pub fn new(id: impl Into<PdfId>, filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            current_page: 1,
            total_pages: None,
            shown_annotation: None,
            pages: BTreeMap::new(),
            note: None,
            answers: Vec::new(),
        }
    }

    /// Copy-on-write access to one page entry, created on first use.
    pub fn page_mut(&mut self, page: u32) -> &mut AnnotationEntry {
        Arc::make_mut(self.pages.entry(page).or_default())
    }

    pub fn note_mut(&mut self) -> &mut NoteEntry {
        Arc::make_mut(self.note.get_or_insert_with(Default::default))
    }
}
