//! Source of the author recorded on each revision.

/// Supplies the actor name for revisions appended by a store.
///
/// The identity/session layer of the application implements this; stores
/// call it once per mutation.
pub trait AuthorProvider: Send + Sync {
    fn current_author(&self) -> String;
}

/// An [`AuthorProvider`] that always answers with the same name.
#[derive(Clone, Debug)]
pub struct StaticAuthor(String);

impl StaticAuthor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Default for StaticAuthor {
    fn default() -> Self {
        Self::new("system")
    }
}

impl AuthorProvider for StaticAuthor {
    fn current_author(&self) -> String {
        self.0.clone()
    }
}
