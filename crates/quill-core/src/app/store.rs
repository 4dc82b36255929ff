//! DocumentStore - 共有ドキュメントツリーの唯一の書き込み口
//!
//! # 設計原則
//! - ツリーは `Arc<DocumentTree>` として watch チャネルに保持する
//! - 書き込みはパス単位の copy-on-write（兄弟ノードの参照は変わらない）
//! - 各更新は await を含まない同期処理なので、他の書き込みと交錯しない
//! - 購読者（UI）は参照が変わったことで再描画を判断できる

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::{
    AnnotationEntry, AnnotationSource, Course, DocumentTree, PageRef, PdfDocument, PdfPath,
    ShownAnnotation,
};

pub struct DocumentStore {
    tx: watch::Sender<Arc<DocumentTree>>,
}

impl DocumentStore {
    pub fn new(tree: DocumentTree) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(tree));
        Self { tx }
    }

    /// Current tree. Later updates never mutate the returned snapshot.
    pub fn snapshot(&self) -> Arc<DocumentTree> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DocumentTree>> {
        self.tx.subscribe()
    }

    /// Add or replace one course (CRUD sync from the course service).
    pub fn insert_course(&self, course: Course) {
        self.tx.send_modify(|root| {
            Arc::make_mut(root)
                .courses
                .insert(course.id.clone(), Arc::new(course));
        });
    }

    /// Atomically update one PDF. Returns `None`, and notifies nobody, when
    /// the path does not exist.
    pub fn update_pdf<R>(&self, path: &PdfPath, f: impl FnOnce(&mut PdfDocument) -> R) -> Option<R> {
        let mut out = None;
        self.tx.send_if_modified(|root| {
            if root.pdf(path).is_none() {
                return false;
            }
            match Arc::make_mut(root).pdf_mut(path) {
                Some(pdf) => {
                    out = Some(f(pdf));
                    true
                }
                None => false,
            }
        });
        out
    }

    /// Update one page entry, creating it if the page has none yet.
    pub fn update_page<R>(&self, page: &PageRef, f: impl FnOnce(&mut AnnotationEntry) -> R) -> Option<R> {
        self.update_pdf(&page.pdf, |pdf| f(pdf.page_mut(page.page)))
    }

    /// The user navigated: move the displayed page and show whatever is
    /// already stored for it.
    pub fn set_current_page(&self, path: &PdfPath, page: u32) -> bool {
        self.update_pdf(path, |pdf| {
            pdf.current_page = page;
            pdf.shown_annotation = pdf
                .pages
                .get(&page)
                .filter(|entry| !entry.content.is_empty())
                .map(|entry| ShownAnnotation {
                    page,
                    content: entry.content.clone(),
                    source: entry.source,
                });
        })
        .is_some()
    }

    /// Set `loading` on exactly one page when a generation is submitted.
    pub fn mark_page_loading(&self, page: &PageRef, source: AnnotationSource) -> bool {
        self.update_page(page, |entry| {
            entry.loading = true;
            entry.source = source;
            entry.error = None;
        })
        .is_some()
    }

    pub fn mark_note_loading(&self, path: &PdfPath) -> bool {
        self.update_pdf(path, |pdf| {
            let note = pdf.note_mut();
            note.loading = true;
            note.error = None;
        })
        .is_some()
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new(DocumentTree::default())
    }
}
