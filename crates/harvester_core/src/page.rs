use serde_json::Value;

/// Metadata a transport may attach to a loaded page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageMeta {
    /// Total result count declared by the source, when it reports one.
    pub declared_total: Option<u64>,
    /// Whether a link to the next page number was rendered.
    pub has_next_link: Option<bool>,
}

/// Unprocessed result of one fetch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPage {
    pub body: Value,
    pub meta: PageMeta,
}

impl RawPage {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            meta: PageMeta::default(),
        }
    }

    pub fn with_next_link(mut self, present: bool) -> Self {
        self.meta.has_next_link = Some(present);
        self
    }

    pub fn with_declared_total(mut self, total: u64) -> Self {
        self.meta.declared_total = Some(total);
        self
    }
}
