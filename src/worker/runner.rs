//! Task execution
//!
//! Runs one descriptor to completion on the calling thread. Options are
//! validated before the document is loaded, so argument errors never cost
//! a parse.

use crate::document::{DocumentError, DocumentResult};
use crate::pdf::{annotations, loader::DocumentHandle, search, synthesizer, text};

use super::task::{ResultEnvelope, TaskDescriptor, TaskKind, TaskResult};

fn required_text<'a>(descriptor: &'a TaskDescriptor) -> DocumentResult<&'a str> {
    descriptor.options.text()?.ok_or_else(|| {
        DocumentError::InvalidArgument(format!("{} requires a text option", descriptor.kind))
    })
}

/// Execute a task and return its payload
pub fn run_task(descriptor: &TaskDescriptor) -> DocumentResult<TaskResult> {
    let options = &descriptor.options;
    let content = descriptor.content.as_slice();

    match descriptor.kind {
        TaskKind::Extract => {
            let handle = DocumentHandle::load(content)?;
            Ok(TaskResult::Text(text::extract_text(&handle)))
        }
        TaskKind::Search => {
            let query = options.search_text()?;
            let search_options = options.search_options()?;
            let matches = search::search_document(content, query, search_options)?;
            Ok(TaskResult::Matches(matches))
        }
        TaskKind::ExtractAnnotations => {
            let handle = DocumentHandle::load(content)?;
            Ok(TaskResult::Annotations(annotations::extract_annotations(
                &handle,
            )))
        }
        TaskKind::SaveAnnotations => {
            let list = options.annotations()?;
            let content = annotations::save_annotations(content, &list)?;
            Ok(TaskResult::Document { content })
        }
        TaskKind::Edit => {
            let text = required_text(descriptor)?;
            let page_number = options.page_number()?;
            let content = synthesizer::edit(content, text, page_number)?;
            Ok(TaskResult::Document { content })
        }
        TaskKind::Create => {
            let text = required_text(descriptor)?;
            Ok(TaskResult::Document {
                content: synthesizer::create(text),
            })
        }
    }
}

/// Execute a task and wrap the outcome in an envelope
pub fn execute(correlation_id: &str, descriptor: &TaskDescriptor) -> ResultEnvelope {
    tracing::debug!(
        "Task {} ({}): {} bytes",
        correlation_id,
        descriptor.kind,
        descriptor.content.len()
    );

    match run_task(descriptor) {
        Ok(result) => ResultEnvelope::success(correlation_id, result),
        Err(e) => {
            tracing::error!("Task {} ({}) failed: {}", correlation_id, descriptor.kind, e);
            ResultEnvelope::failure(correlation_id, &e)
        }
    }
}
