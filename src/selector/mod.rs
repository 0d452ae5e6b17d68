//! Hierarchical scope selector
//!
//! [`Selector`] is the pure state machine behind the terminal UI: it walks
//! services → scopes → confirmation and collects the chosen scope urls.
//! [`ui::TerminalSelector`] drives it from key presses.

mod item;
pub mod ui;

use indexmap::IndexSet;
use tracing::debug;

pub use item::SelectionItem;
pub use ui::TerminalSelector;

pub const CONFIRM_LABEL: &str = "Confirm Selection";

/// Which list is live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Services,
    Scopes,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Unfiltered,
    /// The user is typing a query
    Filtering,
    /// A query has been applied to the live list
    Applied,
}

/// Input the state machine understands, decoupled from key bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    /// Open the highlighted service
    EnterService,
    /// Select or deselect the highlighted scope
    Toggle,
    /// Request confirmation, activate a confirmation row, or apply the filter
    Submit,
    /// Go back one level, or cancel filter input
    Back,
    Quit,
    StartFilter,
    FilterChar(char),
    FilterBackspace,
    ClearFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Exit,
}

/// Outcome of a selector run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionResult {
    /// Chosen scope urls in selection order; empty unless validated
    pub scopes: Vec<String>,
    pub validated: bool,
}

#[derive(Debug, Clone)]
struct Filter {
    state: FilterState,
    query: String,
}

impl Filter {
    fn new() -> Self {
        Self {
            state: FilterState::Unfiltered,
            query: String::new(),
        }
    }

    fn reset(&mut self) {
        self.state = FilterState::Unfiltered;
        self.query.clear();
    }

    fn query(&self) -> &str {
        match self.state {
            FilterState::Unfiltered => "",
            _ => &self.query,
        }
    }
}

/// Scope selection state machine
#[derive(Debug, Clone)]
pub struct Selector {
    view: ViewState,
    breadcrumb: Vec<String>,
    service_items: Vec<SelectionItem>,
    scope_items: Vec<SelectionItem>,
    confirm_items: Vec<SelectionItem>,
    /// View the confirmation was requested from, restored on back
    confirm_origin: ViewState,
    chosen: IndexSet<String>,
    filter: Filter,
    cursor: usize,
    service_cursor: usize,
    scope_cursor: usize,
    page_size: usize,
    finished: bool,
    validated: bool,
}

impl Selector {
    /// Start in the services view with `root` as the first breadcrumb.
    ///
    /// Only header items are kept for the services list.
    pub fn new(root: impl Into<String>, items: Vec<SelectionItem>) -> Self {
        let service_items = items
            .into_iter()
            .filter(|item| matches!(item, SelectionItem::Header { .. }))
            .collect();

        Self {
            view: ViewState::Services,
            breadcrumb: vec![root.into()],
            service_items,
            scope_items: Vec::new(),
            confirm_items: Vec::new(),
            confirm_origin: ViewState::Services,
            chosen: IndexSet::new(),
            filter: Filter::new(),
            cursor: 0,
            service_cursor: 0,
            scope_cursor: 0,
            page_size: 10,
            finished: false,
            validated: false,
        }
    }

    /// Rows moved by `PageUp`/`PageDown`
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn breadcrumb(&self) -> &[String] {
        &self.breadcrumb
    }

    pub fn title(&self) -> &str {
        self.breadcrumb.last().map(String::as_str).unwrap_or_default()
    }

    pub fn chosen(&self) -> Vec<&str> {
        self.chosen.iter().map(String::as_str).collect()
    }

    pub fn is_chosen(&self, url: &str) -> bool {
        self.chosen.contains(url)
    }

    pub fn filter_state(&self) -> FilterState {
        self.filter.state
    }

    pub fn filter_query(&self) -> &str {
        &self.filter.query
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn has_been_validated(&self) -> bool {
        self.validated
    }

    fn live_items(&self) -> &[SelectionItem] {
        match self.view {
            ViewState::Services => &self.service_items,
            ViewState::Scopes => &self.scope_items,
            ViewState::Confirm => &self.confirm_items,
        }
    }

    /// Live list narrowed by the filter overlay
    pub fn visible_items(&self) -> Vec<&SelectionItem> {
        let query = self.filter.query();
        self.live_items()
            .iter()
            .filter(|item| item.matches(query))
            .collect()
    }

    pub fn highlighted(&self) -> Option<&SelectionItem> {
        self.visible_items().get(self.cursor).copied()
    }

    /// Apply one action and report whether the selector is done
    pub fn apply(&mut self, action: Action) -> Control {
        if self.finished {
            return Control::Exit;
        }

        match action {
            Action::Up => self.move_cursor(-1),
            Action::Down => self.move_cursor(1),
            Action::PageUp => self.move_cursor(-(self.page_size as isize)),
            Action::PageDown => self.move_cursor(self.page_size as isize),
            Action::Home => self.cursor = 0,
            Action::End => self.cursor = self.visible_items().len().saturating_sub(1),
            Action::EnterService => self.enter_service(),
            Action::Toggle => self.toggle_highlighted(),
            Action::Submit => self.submit(),
            Action::Back => self.back(),
            Action::Quit => {
                debug!("Scope selection aborted");
                self.finished = true;
            }
            Action::StartFilter => {
                self.filter.state = FilterState::Filtering;
                self.filter.query.clear();
                self.clamp_cursor();
            }
            Action::FilterChar(c) => {
                if self.filter.state == FilterState::Filtering {
                    self.filter.query.push(c);
                    self.clamp_cursor();
                }
            }
            Action::FilterBackspace => {
                if self.filter.state == FilterState::Filtering {
                    self.filter.query.pop();
                    self.clamp_cursor();
                }
            }
            Action::ClearFilter => {
                self.filter.reset();
                self.clamp_cursor();
            }
        }

        if self.finished {
            Control::Exit
        } else {
            Control::Continue
        }
    }

    /// Final result; scopes are only reported when the user confirmed
    pub fn result(&self) -> SelectionResult {
        if self.validated {
            SelectionResult {
                scopes: self.chosen.iter().cloned().collect(),
                validated: true,
            }
        } else {
            SelectionResult::default()
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.visible_items().len();
        if len == 0 {
            self.cursor = 0;
            return;
        }
        let next = (self.cursor as isize + delta).clamp(0, len as isize - 1);
        self.cursor = next as usize;
    }

    fn clamp_cursor(&mut self) {
        let len = self.visible_items().len();
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }

    fn enter_service(&mut self) {
        if self.view != ViewState::Services || self.filter.state == FilterState::Filtering {
            return;
        }
        let Some(SelectionItem::Header { name, children }) = self.highlighted().cloned() else {
            return;
        };
        if children.is_empty() {
            return;
        }

        debug!("Entering service {} ({} scopes)", name, children.len());
        self.service_cursor = self.cursor;
        self.scope_items = children.into_iter().map(SelectionItem::Leaf).collect();
        self.breadcrumb.push(name);
        self.view = ViewState::Scopes;
        self.filter.reset();
        self.cursor = 0;
    }

    fn toggle_highlighted(&mut self) {
        if self.view != ViewState::Scopes {
            return;
        }
        let Some(url) = self.highlighted().and_then(SelectionItem::value) else {
            return;
        };
        let url = url.to_string();

        if self.chosen.shift_remove(&url) {
            debug!("Deselected scope {}", url);
        } else {
            debug!("Selected scope {}", url);
            self.chosen.insert(url);
        }
    }

    fn submit(&mut self) {
        if self.filter.state == FilterState::Filtering {
            self.filter.state = if self.filter.query.is_empty() {
                FilterState::Unfiltered
            } else {
                FilterState::Applied
            };
            self.clamp_cursor();
            return;
        }

        match self.view {
            ViewState::Services | ViewState::Scopes => self.request_confirmation(),
            ViewState::Confirm => {
                if matches!(self.highlighted(), Some(SelectionItem::Confirm)) {
                    debug!("Scope selection confirmed ({} scopes)", self.chosen.len());
                    self.validated = true;
                    self.finished = true;
                }
            }
        }
    }

    fn request_confirmation(&mut self) {
        if self.chosen.is_empty() {
            return;
        }

        if self.view == ViewState::Scopes {
            self.scope_cursor = self.cursor;
        } else {
            self.service_cursor = self.cursor;
        }
        self.confirm_origin = self.view;
        self.confirm_items = self
            .chosen
            .iter()
            .map(|url| SelectionItem::chosen(url))
            .chain(std::iter::once(SelectionItem::Confirm))
            .collect();
        self.breadcrumb.push(CONFIRM_LABEL.to_string());
        self.view = ViewState::Confirm;
        self.filter.reset();
        self.cursor = 0;
    }

    fn back(&mut self) {
        if self.filter.state == FilterState::Filtering {
            self.filter.reset();
            self.clamp_cursor();
            return;
        }
        self.filter.reset();

        match self.view {
            ViewState::Services => self.clamp_cursor(),
            ViewState::Scopes => {
                self.breadcrumb.pop();
                self.view = ViewState::Services;
                self.cursor = self.service_cursor;
                self.clamp_cursor();
            }
            ViewState::Confirm => {
                self.breadcrumb.pop();
                self.view = self.confirm_origin;
                self.cursor = match self.view {
                    ViewState::Scopes => self.scope_cursor,
                    _ => self.service_cursor,
                };
                self.clamp_cursor();
            }
        }
    }

    /// Help line shown under the list
    pub fn status_line(&self) -> String {
        if self.filter.state == FilterState::Filtering {
            return "Filtering... | Esc to cancel | Enter to apply".to_string();
        }

        match self.view {
            ViewState::Services if self.chosen.is_empty() => {
                "Tab to enter service | / to filter | q to quit".to_string()
            }
            ViewState::Services => format!(
                "Selected: {} scopes | Tab to enter service | Enter to confirm | / to filter | q to quit",
                self.chosen.len()
            ),
            ViewState::Scopes => format!(
                "Selected: {} scopes | Space to select/deselect | Enter to confirm | / to filter | Ctrl+L to clear filter | Esc to go back | q to quit",
                self.chosen.len()
            ),
            ViewState::Confirm => "Enter to confirm | Esc to go back | q to quit".to_string(),
        }
    }
}
