use crate::catalog::ScopeEntry;

const CONFIRM_TITLE: &str = "✓ Confirm Selection";
const CONFIRM_DESCRIPTION: &str = "Press Enter to confirm";
const CHOSEN_DESCRIPTION: &str = "Selected scope";

/// A row in the selector's list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionItem {
    /// A service; its children are the service's scopes
    Header {
        name: String,
        children: Vec<ScopeEntry>,
    },
    /// A selectable scope, keyed by its url
    Leaf(ScopeEntry),
    /// The synthetic action row closing the confirmation view
    Confirm,
}

impl SelectionItem {
    pub fn header(name: impl Into<String>, children: Vec<ScopeEntry>) -> Self {
        Self::Header {
            name: name.into(),
            children,
        }
    }

    pub fn leaf(url: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Leaf(ScopeEntry::new(url, description))
    }

    /// Row for an already-chosen scope in the confirmation view
    pub(crate) fn chosen(url: &str) -> Self {
        Self::leaf(url, CHOSEN_DESCRIPTION)
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Header { name, .. } => name,
            Self::Leaf(scope) => &scope.url,
            Self::Confirm => CONFIRM_TITLE,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Header { children, .. } => format!("{} scopes available", children.len()),
            Self::Leaf(scope) => scope.description.clone(),
            Self::Confirm => CONFIRM_DESCRIPTION.to_string(),
        }
    }

    /// Scope url for leaves
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Leaf(scope) => Some(&scope.url),
            _ => None,
        }
    }

    /// Case-insensitive match of the filter query against the title
    pub fn matches(&self, query: &str) -> bool {
        query.is_empty() || self.title().to_lowercase().contains(&query.to_lowercase())
    }
}
