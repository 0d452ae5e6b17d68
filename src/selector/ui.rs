use std::io::{self, Stdout};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{List, ListItem, ListState, Paragraph};
use tracing::debug;

use super::{Action, Control, FilterState, SelectionItem, SelectionResult, Selector};
use crate::{Result, WizardError};

const DEFAULT_LIST_HEIGHT: u16 = 14;
const MAX_DESCRIPTION_WIDTH: usize = 60;
/// Each row renders as a title line and a description line
const ROW_HEIGHT: u16 = 2;

/// Full-screen terminal front-end for [`Selector`]
#[derive(Debug, Clone)]
pub struct TerminalSelector {
    list_height: u16,
    title_style: Style,
    item_style: Style,
    selected_item_style: Style,
}

impl Default for TerminalSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSelector {
    pub fn new() -> Self {
        Self {
            list_height: DEFAULT_LIST_HEIGHT,
            title_style: Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
            item_style: Style::default(),
            selected_item_style: Style::default()
                .fg(Color::Rgb(0x34, 0x98, 0xDB))
                .add_modifier(Modifier::BOLD),
        }
    }

    /// Number of terminal lines given to the list
    pub fn with_list_height(mut self, list_height: u16) -> Self {
        self.list_height = list_height.max(ROW_HEIGHT);
        self
    }

    /// Run the selector until the user confirms or quits
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::Terminal`] if the terminal cannot be set up or read
    pub fn run(&self, title: &str, items: Vec<SelectionItem>) -> Result<SelectionResult> {
        let page_size = usize::from(self.list_height / ROW_HEIGHT);
        let mut selector = Selector::new(title, items).with_page_size(page_size);

        let mut screen = Screen::init().map_err(terminal_error)?;
        loop {
            screen
                .terminal
                .draw(|frame| {
                    let [header, body, footer] = Layout::vertical([
                        Constraint::Length(2),
                        Constraint::Length(self.list_height),
                        Constraint::Length(2),
                    ])
                    .areas(frame.area());

                    frame.render_widget(
                        Paragraph::new(selector.breadcrumb().join(" > ")).style(self.title_style),
                        header,
                    );

                    let mut state = ListState::default();
                    state.select(selector.highlighted().map(|_| selector.cursor()));
                    frame.render_stateful_widget(self.render_list(&selector), body, &mut state);

                    frame.render_widget(Paragraph::new(footer_text(&selector)), footer);
                })
                .map_err(terminal_error)?;

            let Event::Key(key) = event::read().map_err(terminal_error)? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let Some(action) = action_for(key, selector.filter_state()) else {
                continue;
            };
            if selector.apply(action) == Control::Exit {
                break;
            }
        }
        drop(screen);

        let result = selector.result();
        debug!(
            "Selector finished (validated: {}, scopes: {})",
            result.validated,
            result.scopes.len()
        );
        Ok(result)
    }

    fn render_list<'a>(&self, selector: &'a Selector) -> List<'a> {
        let rows: Vec<ListItem> = selector
            .visible_items()
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let highlighted = index == selector.cursor();
                let style = if highlighted {
                    self.selected_item_style
                } else {
                    self.item_style
                };
                ListItem::new(row_text(selector, item, highlighted)).style(style)
            })
            .collect();
        List::new(rows)
    }
}

fn row_text<'a>(selector: &Selector, item: &'a SelectionItem, highlighted: bool) -> Text<'a> {
    let cursor = if highlighted { "> " } else { "  " };
    let mut title = vec![Span::raw(cursor)];

    match item {
        SelectionItem::Header { .. } => {
            title.push(Span::raw(item.title()));
        }
        SelectionItem::Leaf(scope) => {
            let marker = if selector.is_chosen(&scope.url) {
                "(•) "
            } else {
                "( ) "
            };
            title.push(Span::raw(marker));
            title.push(Span::raw(item.title()));
        }
        SelectionItem::Confirm => title.push(Span::raw(item.title())),
    }

    Text::from(vec![
        Line::from(title),
        Line::from(format!("      {}", truncate(&item.description()))),
    ])
}

fn truncate(description: &str) -> String {
    if description.chars().count() > MAX_DESCRIPTION_WIDTH {
        let head: String = description.chars().take(MAX_DESCRIPTION_WIDTH).collect();
        format!("{head}...")
    } else {
        description.to_string()
    }
}

fn footer_text(selector: &Selector) -> String {
    match selector.filter_state() {
        FilterState::Filtering => {
            format!("Filter: {}\n{}", selector.filter_query(), selector.status_line())
        }
        _ => selector.status_line(),
    }
}

/// Map a key press to a selector action
///
/// While a filter query is being typed, printable keys feed the query.
pub fn action_for(key: KeyEvent, filter: FilterState) -> Option<Action> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => Some(Action::Quit),
        KeyCode::Char('l') if ctrl => Some(Action::ClearFilter),
        KeyCode::Up => Some(Action::Up),
        KeyCode::Down => Some(Action::Down),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::Home => Some(Action::Home),
        KeyCode::End => Some(Action::End),
        KeyCode::Enter => Some(Action::Submit),
        KeyCode::Esc => Some(Action::Back),
        KeyCode::Backspace if filter == FilterState::Filtering => Some(Action::FilterBackspace),
        KeyCode::Char(c) if filter == FilterState::Filtering => Some(Action::FilterChar(c)),
        KeyCode::Tab => Some(Action::EnterService),
        KeyCode::Char(' ') => Some(Action::Toggle),
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('/') => Some(Action::StartFilter),
        KeyCode::Char('k') => Some(Action::Up),
        KeyCode::Char('j') => Some(Action::Down),
        _ => None,
    }
}

fn terminal_error(e: io::Error) -> WizardError {
    WizardError::Terminal(e.to_string())
}

/// Raw-mode alternate screen, restored when dropped
struct Screen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Screen {
    fn init() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = stdout.execute(EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}
