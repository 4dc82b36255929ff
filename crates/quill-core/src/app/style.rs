//! StyleResolver - 投入前にボードの注釈スタイルを取得する
//!
//! 取得に失敗しても既定値（"detailed", ""）で続行します。
//! スタイル解決の失敗がタスク投入を止めることはありません。

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::{BoardId, DomainEvent, TaskDescriptor};
use crate::ports::{EventSink, HttpRequest, Transport};

use super::client::routes;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationStyle {
    #[serde(rename = "annotation_style")]
    pub style: String,
    #[serde(default)]
    pub custom_prompt: String,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            style: "detailed".to_string(),
            custom_prompt: String::new(),
        }
    }
}

pub struct StyleResolver<'a, T> {
    transport: &'a T,
    events: &'a dyn EventSink,
}

impl<'a, T: Transport> StyleResolver<'a, T> {
    pub fn new(transport: &'a T, events: &'a dyn EventSink) -> Self {
        Self { transport, events }
    }

    /// Current style of the board, or the default when it cannot be read.
    pub async fn resolve(&self, board_id: &BoardId) -> AnnotationStyle {
        let fetched = self
            .transport
            .send(HttpRequest::get(routes::annotation_style(board_id)))
            .await
            .and_then(|resp| resp.decode::<AnnotationStyle>());

        match fetched {
            Ok(style) if !style.style.trim().is_empty() => style,
            Ok(style) => AnnotationStyle {
                custom_prompt: style.custom_prompt,
                ..AnnotationStyle::default()
            },
            Err(err) => {
                self.events.emit(&DomainEvent::StyleFallback {
                    board_id: board_id.clone(),
                    reason: err.to_string(),
                });
                AnnotationStyle::default()
            }
        }
    }

    /// Fold the board style into the params of kinds that use it, so the
    /// submitted task does not depend on later style changes. Explicit params
    /// already on the descriptor are kept.
    pub async fn apply(&self, descriptor: TaskDescriptor) -> TaskDescriptor {
        if !descriptor.kind().uses_annotation_style() {
            return descriptor;
        }
        let Some(board_id) = descriptor.board_id().cloned() else {
            // submit will reject it; nothing to resolve against
            return descriptor;
        };

        let style = self.resolve(&board_id).await;
        descriptor
            .with_default_param("annotation_style", json!(style.style))
            .with_default_param("custom_prompt", json!(style.custom_prompt))
    }
}
