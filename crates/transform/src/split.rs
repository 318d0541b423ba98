//! Split generator - fan out array elements into the next depth
//!
//! ```text
//! depth N:   {"host": "a", "records": [r1, r2]} ──► [SplitGenerator("records")]
//!                                                         │
//! depth N+1:                                r1, r2 ◄──────┘ inject()
//! ```
//!
//! Without a field the event itself must be an array. With `keep_parent`
//! each element is wrapped as `{"parent": <event without the field>, "item": <element>}`.

use serde_json::{Map, Value};
use sluice_pipeline::{BoxFuture, Context, Event, Generator, Injector, ProcessingError};
use tracing::trace;

#[cfg(test)]
#[path = "split_test.rs"]
mod tests;

#[derive(Debug, Clone)]
pub struct SplitGenerator {
    id: String,
    field: Option<String>,
    keep_parent: bool,
    depth: usize,
}

impl SplitGenerator {
    /// Split the event itself, which must be an array
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field: None,
            keep_parent: false,
            depth: 0,
        }
    }

    /// Split the array stored under `field` (dot notation)
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Wrap each element together with the rest of the event
    pub fn with_keep_parent(mut self, keep_parent: bool) -> Self {
        self.keep_parent = keep_parent;
        self
    }

    /// Depth this generator runs at
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn split(&self, event: Event) -> Result<Vec<Event>, ProcessingError> {
        let Some(field) = &self.field else {
            return match event {
                Value::Array(items) => Ok(items),
                other => Err(ProcessingError::InvalidEvent(format!(
                    "'{}' expects an array event, got {other}",
                    self.id
                ))),
            };
        };

        let mut parent = event;
        let items = match take_field(&mut parent, field) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(ProcessingError::InvalidEvent(format!(
                    "field '{field}' is not an array: {other}"
                )));
            }
            None => {
                return Err(ProcessingError::InvalidEvent(format!(
                    "field '{field}' is missing"
                )));
            }
        };

        if !self.keep_parent {
            return Ok(items);
        }
        Ok(items
            .into_iter()
            .map(|item| {
                let mut wrapped = Map::with_capacity(2);
                wrapped.insert("parent".to_string(), parent.clone());
                wrapped.insert("item".to_string(), item);
                Value::Object(wrapped)
            })
            .collect())
    }
}

impl Generator for SplitGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    fn generate(
        &self,
        context: Context,
        event: Event,
        injector: Injector,
    ) -> BoxFuture<'static, Result<(), ProcessingError>> {
        let items = self.split(event);
        let id = self.id.clone();

        Box::pin(async move {
            let items = items?;
            trace!(generator = %id, count = items.len(), depth = injector.depth(), "splitting event");
            for item in items {
                injector.inject(Some(context.clone()), item)?;
            }
            Ok::<(), ProcessingError>(())
        })
    }
}

/// Remove and return the value at a dot-notation path
fn take_field(event: &mut Value, path: &str) -> Option<Value> {
    let (parents, last) = match path.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, path),
    };

    let mut current = event;
    if let Some(parents) = parents {
        for part in parents.split('.') {
            current = current.as_object_mut()?.get_mut(part)?;
        }
    }
    current.as_object_mut()?.remove(last)
}
