use mdr_types::{Identifier, RevisionKind};

use crate::error::SinkError;

/// A successful document mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataEvent {
    Created(Identifier),
    Updated(Identifier),
    Deleted(Identifier),
}

impl MetadataEvent {
    pub fn id(&self) -> &Identifier {
        match self {
            MetadataEvent::Created(id) | MetadataEvent::Updated(id) | MetadataEvent::Deleted(id) => {
                id
            }
        }
    }

    /// The revision kind the mutation recorded.
    pub fn kind(&self) -> RevisionKind {
        match self {
            MetadataEvent::Created(_) => RevisionKind::Created,
            MetadataEvent::Updated(_) => RevisionKind::Modified,
            MetadataEvent::Deleted(_) => RevisionKind::Deleted,
        }
    }
}

/// Receives an event after each successful mutation.
///
/// Called synchronously on the mutating thread. A failing sink never undoes
/// or fails the mutation; the manager logs the error and moves on.
pub trait MetadataEventSink: Send + Sync {
    fn notify(&self, event: &MetadataEvent) -> Result<(), SinkError>;
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpSink;

impl MetadataEventSink for NoOpSink {
    fn notify(&self, _event: &MetadataEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdr_types::Namespace;

    fn id() -> Identifier {
        Namespace::new("DocPortal", "document")
            .unwrap()
            .identifier(1)
            .unwrap()
    }

    #[test]
    fn noop_sink_accepts() {
        NoOpSink.notify(&MetadataEvent::Created(id())).unwrap();
    }

    #[test]
    fn event_kinds() {
        assert_eq!(MetadataEvent::Created(id()).kind(), RevisionKind::Created);
        assert_eq!(MetadataEvent::Updated(id()).kind(), RevisionKind::Modified);
        assert_eq!(MetadataEvent::Deleted(id()).id(), &id());
    }
}
