// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use almacen_app::model::Row as DataRow;
use almacen_app::{
    ACTIONS_KEY, AnchorSpec, AppCommand, AppMode, AppState, CREATED_AT_KEY, CellValue,
    ClickModifiers, ClientStore, ColumnDef, ColumnPlan, DataService, GridColumn, HighlightState,
    IntentOutcome, LinkForm, MIN_COLUMN_PX, NavigationIntent, OverlayKind, RecordForm, RowId,
    RowPage, RowRefForm, SearchStates, SelectionState, TableId, TableInfo, VisibilityOverrides,
    estimate, highlight_spans, resolve, resolve_intent,
};
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row as WidgetRow, Table, Tabs};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;

const STATUS_CLEAR_SECS: u64 = 4;
const WIDTH_DEBOUNCE_MS: u64 = 100;
const NARROW_VIEWPORT_COLS: u16 = 100;
const COLUMN_CELL_PX: u16 = 8;
const LINK_ARROW: &str = "→";
const SEARCH_MARK: &str = "▼";

/// One value wired into the grid: the data service plus the durable client
/// store, the way the CLI runtime composes them.
pub trait GridRuntime: DataService + ClientStore {}

impl<T: DataService + ClientStore> GridRuntime for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiOptions {
    pub page_size: usize,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

/// Events delivered through the internal channel and drained at the top of
/// every loop iteration. Timer events carry tokens so a newer status,
/// highlight, or measurement invalidates an older timer; row loads carry the
/// fetch generation so a stale response is discarded, never applied.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    ClearHighlight { token: u64 },
    WidthsDue { token: u64 },
    RowsLoaded {
        generation: u64,
        table_id: TableId,
        result: Result<RowPage, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct PickerUiState {
    cursor: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ColumnPickerUiState {
    cursor: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordFormUiState {
    form: RecordForm,
    cursor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkFormMode {
    Url,
    RowRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkFormUiState {
    column: String,
    row_id: RowId,
    mode: LinkFormMode,
    url: LinkForm,
    row_ref: RowRefForm,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewData {
    tables: Vec<TableInfo>,
    schema: Vec<ColumnDef>,
    overrides: VisibilityOverrides,
    plan: ColumnPlan,
    widths: BTreeMap<String, u16>,
    rows: Vec<DataRow>,
    total: usize,
    page: usize,
    page_size: usize,
    cursor_row: usize,
    cursor_col: usize,
    selection: SelectionState,
    expanded: BTreeSet<RowId>,
    highlight: Option<HighlightState>,
    searches: SearchStates,
    search_input: String,
    table_picker: PickerUiState,
    column_picker: ColumnPickerUiState,
    record_form: Option<RecordFormUiState>,
    link_form: Option<LinkFormUiState>,
    delete_in_flight: bool,
    fetch_generation: u64,
    status_token: u64,
    highlight_token: u64,
    width_token: u64,
    narrow: bool,
}

impl ViewData {
    fn new(options: UiOptions) -> Self {
        Self {
            page: 1,
            page_size: options.page_size.max(1),
            ..Self::default()
        }
    }

    fn page_count(&self) -> usize {
        if self.total == 0 {
            1
        } else {
            self.total.div_ceil(self.page_size)
        }
    }

    /// Row indices the grid currently shows, in page order, after the active
    /// search filter.
    fn visible_row_indices(&self, table_id: Option<TableId>) -> Vec<usize> {
        let matched = table_id
            .and_then(|table| self.searches.active(table))
            .map(|search| search.matched.clone());
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| match &matched {
                Some(ids) => ids.contains(&row.id),
                None => true,
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn visible_row_ids(&self, table_id: Option<TableId>) -> Vec<RowId> {
        self.visible_row_indices(table_id)
            .into_iter()
            .map(|index| self.rows[index].id)
            .collect()
    }

    fn cursor_data_row(&self, table_id: Option<TableId>) -> Option<&DataRow> {
        let indices = self.visible_row_indices(table_id);
        indices.get(self.cursor_row).map(|index| &self.rows[*index])
    }

    fn cursor_column(&self) -> Option<&GridColumn> {
        self.plan.inline.get(self.cursor_col)
    }

    fn clamp_cursor(&mut self, table_id: Option<TableId>) {
        let visible = self.visible_row_indices(table_id).len();
        self.cursor_row = self.cursor_row.min(visible.saturating_sub(1));
        self.cursor_col = self
            .cursor_col
            .min(self.plan.inline.len().saturating_sub(1));
    }

    fn active_pattern(&self, table_id: Option<TableId>) -> Option<String> {
        table_id
            .and_then(|table| self.searches.active(table))
            .map(|search| search.pattern.clone())
    }
}

pub fn run_app<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    options: UiOptions,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(options);
    let (internal_tx, internal_rx) = mpsc::channel();

    if let Ok(size) = terminal.size() {
        view_data.narrow = size.width < NARROW_VIEWPORT_COLS;
    }

    if let Err(error) = reload_all(state, runtime, &mut view_data, &internal_tx) {
        state.dispatch(AppCommand::SetStatus(format!("load failed: {error:#}")));
    }

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(columns, _) => {
                    let narrow = columns < NARROW_VIEWPORT_COLS;
                    if narrow != view_data.narrow {
                        view_data.narrow = narrow;
                        rebuild_plan(&mut view_data, &internal_tx);
                    } else {
                        schedule_widths_due(&internal_tx, &mut view_data);
                    }
                }
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::ClearHighlight { token } => {
                if token == view_data.highlight_token {
                    view_data.highlight = None;
                }
            }
            InternalEvent::WidthsDue { token } => {
                if token == view_data.width_token {
                    view_data.widths = estimate(&view_data.plan.inline, &view_data.rows);
                }
            }
            InternalEvent::RowsLoaded {
                generation,
                table_id,
                result,
            } => {
                apply_rows_loaded(state, runtime, view_data, tx, generation, table_id, result);
            }
        }
    }
}

/// Apply a completed fetch, unless it is stale. A result is stale when a
/// newer fetch was issued after it, or when the active table changed while it
/// was queued; both are discarded, never merged.
fn apply_rows_loaded<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    generation: u64,
    table_id: TableId,
    result: Result<RowPage, String>,
) {
    if generation != view_data.fetch_generation || state.active_table != Some(table_id) {
        return;
    }

    match result {
        Ok(page) => apply_row_page(state, runtime, view_data, tx, table_id, page),
        Err(error) => emit_status(state, view_data, tx, format!("load failed: {error}")),
    }
}

/// Replace the row page: selection resets, the search recomputes, the column
/// plan and widths re-derive, and any pending navigation intent is consumed
/// exactly once against the freshly loaded rows.
fn apply_row_page<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    table_id: TableId,
    page: RowPage,
) {
    view_data.total = page.total;
    view_data.rows = page.items;
    view_data.selection.reset();
    view_data.highlight = None;
    view_data.searches.refresh(table_id, &view_data.rows);
    rebuild_plan(view_data, tx);
    view_data.clamp_cursor(Some(table_id));

    consume_intent(state, runtime, view_data, tx, table_id);
}

fn consume_intent<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    table_id: TableId,
) {
    let intent = match runtime.take_intent() {
        Ok(Some(intent)) => intent,
        Ok(None) => return,
        Err(error) => {
            emit_status(state, view_data, tx, format!("intent read failed: {error:#}"));
            return;
        }
    };

    let page_rows: Vec<RowId> = view_data.rows.iter().map(|row| row.id).collect();
    match resolve_intent(intent, table_id, &page_rows) {
        IntentOutcome::Found(row_id) => {
            view_data.expanded.insert(row_id);
            let now = OffsetDateTime::now_utc();
            view_data.highlight = Some(HighlightState::begin(row_id, now));
            view_data.highlight_token = view_data.highlight_token.wrapping_add(1);
            schedule_highlight_clear(tx, view_data.highlight_token);

            let indices = view_data.visible_row_indices(Some(table_id));
            if let Some(position) = indices
                .iter()
                .position(|index| view_data.rows[*index].id == row_id)
            {
                view_data.cursor_row = position;
            }
        }
        IntentOutcome::Missing => {}
    }
}

fn rebuild_plan(view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    view_data.plan = resolve(&view_data.schema, &view_data.overrides, view_data.narrow);
    schedule_widths_due(tx, view_data);
}

fn request_rows<R: GridRuntime>(
    state: &AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let Some(table_id) = state.active_table else {
        return;
    };
    view_data.fetch_generation = view_data.fetch_generation.wrapping_add(1);
    let generation = view_data.fetch_generation;
    let result = runtime
        .fetch_rows(table_id, view_data.page, view_data.page_size)
        .map_err(|error| format!("{error:#}"));
    let _ = tx.send(InternalEvent::RowsLoaded {
        generation,
        table_id,
        result,
    });
}

/// Bring the whole view up for the active table: schema, overrides, restored
/// search text, and a fresh row fetch.
fn reload_table<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) -> Result<()> {
    let Some(table_id) = state.active_table else {
        return Ok(());
    };

    view_data.schema = runtime.fetch_schema(table_id)?;
    view_data.overrides = runtime.load_overrides(table_id)?;
    view_data.expanded.clear();
    view_data.highlight = None;
    view_data.cursor_row = 0;
    view_data.cursor_col = 0;

    view_data.search_input = runtime.load_search_text(table_id)?.unwrap_or_default();
    if !view_data.search_input.is_empty() {
        let search = view_data.searches.state_mut(table_id);
        if search.pattern.is_empty() {
            search.pattern = view_data.search_input.clone();
            search.active = true;
        }
    }

    rebuild_plan(view_data, tx);
    request_rows(state, runtime, view_data, tx);
    Ok(())
}

fn reload_all<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) -> Result<()> {
    view_data.tables = runtime.fetch_table_list()?;
    if state.active_table.is_none()
        || state
            .active_table
            .is_some_and(|id| !view_data.tables.iter().any(|table| table.id == id))
    {
        if let Some(first) = view_data.tables.first() {
            state.dispatch(AppCommand::ActivateTable(first.id));
        }
    }
    reload_table(state, runtime, view_data, tx)
}

fn schedule_status_clear(tx: &Sender<InternalEvent>, token: u64) {
    let sender = tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(STATUS_CLEAR_SECS));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn schedule_highlight_clear(tx: &Sender<InternalEvent>, token: u64) {
    let sender = tx.clone();
    let duration = Duration::from_secs(almacen_app::HIGHLIGHT_DURATION.whole_seconds() as u64);
    thread::spawn(move || {
        thread::sleep(duration);
        let _ = sender.send(InternalEvent::ClearHighlight { token });
    });
}

/// Debounce width measurement: only the latest token recomputes, so a resize
/// burst settles into a single estimate pass.
fn schedule_widths_due(tx: &Sender<InternalEvent>, view_data: &mut ViewData) {
    view_data.width_token = view_data.width_token.wrapping_add(1);
    let token = view_data.width_token;
    let sender = tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(WIDTH_DEBOUNCE_MS));
        let _ = sender.send(InternalEvent::WidthsDue { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.wrapping_add(1);
    schedule_status_clear(tx, view_data.status_token);
}

fn handle_key_event<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    match state.mode {
        AppMode::Nav => handle_nav_key(state, runtime, view_data, tx, key),
        AppMode::Search => {
            handle_search_key(state, runtime, view_data, tx, key);
            false
        }
        AppMode::Overlay(kind) => {
            handle_overlay_key(state, runtime, view_data, tx, kind, key);
            false
        }
    }
}

fn handle_nav_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('j') | KeyCode::Down => move_cursor_row(state, view_data, 1),
        KeyCode::Char('k') | KeyCode::Up => move_cursor_row(state, view_data, -1),
        KeyCode::Char('h') | KeyCode::Left => move_cursor_col(view_data, -1),
        KeyCode::Char('l') | KeyCode::Right => move_cursor_col(view_data, 1),
        KeyCode::Char('g') => view_data.cursor_row = 0,
        KeyCode::Char('G') => {
            let visible = view_data.visible_row_indices(state.active_table).len();
            view_data.cursor_row = visible.saturating_sub(1);
        }
        KeyCode::Char(' ') => click_cursor_row(state, view_data, modifiers_for(key)),
        KeyCode::Char('a') => {
            let page = view_data.visible_row_ids(state.active_table);
            view_data.selection.select_all(&page);
        }
        KeyCode::Char('n') => change_page(state, runtime, view_data, tx, 1),
        KeyCode::Char('p') => change_page(state, runtime, view_data, tx, -1),
        KeyCode::Tab => toggle_expanded(state, view_data),
        KeyCode::Enter => activate_cursor_cell(state, runtime, view_data, tx),
        KeyCode::Char('e') => open_record_form(state, view_data, tx, true),
        KeyCode::Char('i') => open_record_form(state, view_data, tx, false),
        KeyCode::Char('L') => open_link_form(state, view_data, tx),
        KeyCode::Char('U') => unlink_cursor_cell(state, runtime, view_data, tx),
        KeyCode::Char('x') | KeyCode::Delete => {
            if view_data.selection.is_empty() {
                emit_status(state, view_data, tx, "select rows to delete first");
            } else {
                state.dispatch(AppCommand::OpenOverlay(OverlayKind::DeleteConfirm));
            }
        }
        KeyCode::Char('t') => {
            view_data.table_picker = PickerUiState::default();
            state.dispatch(AppCommand::OpenOverlay(OverlayKind::TablePicker));
        }
        KeyCode::Char('c') => {
            view_data.column_picker = ColumnPickerUiState::default();
            state.dispatch(AppCommand::OpenOverlay(OverlayKind::ColumnPicker));
        }
        KeyCode::Char('/') => {
            state.dispatch(AppCommand::EnterSearch);
        }
        KeyCode::Char('C') => clear_search(state, runtime, view_data, tx),
        KeyCode::Char('r') => request_rows(state, runtime, view_data, tx),
        KeyCode::Esc => {
            state.dispatch(AppCommand::ClearStatus);
        }
        _ => {}
    }
    false
}

fn modifiers_for(key: KeyEvent) -> ClickModifiers {
    if key.modifiers.contains(KeyModifiers::SHIFT) {
        ClickModifiers::Shift
    } else if key.modifiers.contains(KeyModifiers::CONTROL) {
        ClickModifiers::Ctrl
    } else {
        ClickModifiers::Plain
    }
}

fn move_cursor_row(state: &AppState, view_data: &mut ViewData, delta: isize) {
    let visible = view_data.visible_row_indices(state.active_table).len();
    if visible == 0 {
        view_data.cursor_row = 0;
        return;
    }
    let current = view_data.cursor_row as isize;
    let next = (current + delta).clamp(0, visible as isize - 1);
    view_data.cursor_row = next as usize;
}

fn move_cursor_col(view_data: &mut ViewData, delta: isize) {
    let columns = view_data.plan.inline.len();
    if columns == 0 {
        view_data.cursor_col = 0;
        return;
    }
    let current = view_data.cursor_col as isize;
    let next = (current + delta).clamp(0, columns as isize - 1);
    view_data.cursor_col = next as usize;
}

fn click_cursor_row(state: &AppState, view_data: &mut ViewData, modifiers: ClickModifiers) {
    let page = view_data.visible_row_ids(state.active_table);
    let index = view_data.cursor_row;
    let Some(row_id) = page.get(index).copied() else {
        return;
    };
    view_data.selection.click(&page, row_id, index, modifiers);
}

fn change_page<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    delta: isize,
) {
    let pages = view_data.page_count() as isize;
    let next = (view_data.page as isize + delta).clamp(1, pages);
    if next == view_data.page as isize {
        return;
    }
    view_data.page = next as usize;
    request_rows(state, runtime, view_data, tx);
}

fn toggle_expanded(state: &AppState, view_data: &mut ViewData) {
    let Some(row) = view_data.cursor_data_row(state.active_table) else {
        return;
    };
    let row_id = row.id;
    if !view_data.expanded.remove(&row_id) {
        view_data.expanded.insert(row_id);
    }
}

/// Enter on a cell resolves its anchor. An external URL is surfaced for the
/// surrounding environment to open; a row reference starts the two-phase
/// navigation handshake.
fn activate_cursor_cell<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let Some(column) = view_data.cursor_column().cloned() else {
        return;
    };
    let GridColumn::Data(def) = column else {
        emit_status(state, view_data, tx, "press e to edit");
        return;
    };
    let Some(row) = view_data.cursor_data_row(state.active_table) else {
        return;
    };
    let Some(cell) = row.fields.get(&def.name) else {
        emit_status(state, view_data, tx, "nothing to follow");
        return;
    };

    match cell.resolve_for_display().anchor {
        None => emit_status(state, view_data, tx, "nothing to follow"),
        Some(AnchorSpec::OpenExternal(url)) => {
            emit_status(state, view_data, tx, format!("open {url}"));
        }
        Some(AnchorSpec::ActivateRowRef { table_id, row_id }) => {
            activate_row_ref(state, runtime, view_data, tx, table_id, row_id);
        }
    }
}

/// Emit phase of the navigation protocol: persist the intent, switch the
/// active table, and run a full reload. The consume phase happens when the
/// new table's row page finishes loading.
fn activate_row_ref<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    table_id: TableId,
    row_id: RowId,
) {
    let intent = NavigationIntent { table_id, row_id };
    if let Err(error) = runtime.store_intent(&intent) {
        emit_status(state, view_data, tx, format!("follow failed: {error:#}"));
        return;
    }

    state.dispatch(AppCommand::ActivateTable(table_id));
    view_data.page = 1;
    if let Err(error) = reload_table(state, runtime, view_data, tx) {
        emit_status(state, view_data, tx, format!("follow load failed: {error:#}"));
        return;
    }

    let table_name = table_label(&view_data.tables, table_id);
    emit_status(state, view_data, tx, format!("follow -> {table_name}"));
}

fn table_label(tables: &[TableInfo], table_id: TableId) -> String {
    tables
        .iter()
        .find(|table| table.id == table_id)
        .map(|table| table.name.clone())
        .unwrap_or_else(|| format!("table {}", table_id.get()))
}

fn open_record_form(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    edit: bool,
) {
    let Some(table_id) = state.active_table else {
        return;
    };
    let form = if edit {
        let Some(row) = view_data.cursor_data_row(Some(table_id)) else {
            emit_status(state, view_data, tx, "no row under cursor");
            return;
        };
        RecordForm::for_edit(table_id, &view_data.schema, row)
    } else {
        RecordForm::for_new(table_id, &view_data.schema)
    };

    if form.fields.is_empty() {
        emit_status(state, view_data, tx, "table has no editable columns");
        return;
    }
    view_data.record_form = Some(RecordFormUiState { form, cursor: 0 });
    state.dispatch(AppCommand::OpenOverlay(OverlayKind::RecordForm));
}

fn open_link_form(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    let Some(GridColumn::Data(def)) = view_data.cursor_column().cloned() else {
        emit_status(state, view_data, tx, "move to a data column to link");
        return;
    };
    let Some(row_id) = view_data
        .cursor_data_row(state.active_table)
        .map(|row| row.id)
    else {
        emit_status(state, view_data, tx, "no row under cursor");
        return;
    };
    view_data.link_form = Some(LinkFormUiState {
        column: def.name,
        row_id,
        mode: LinkFormMode::Url,
        url: LinkForm::default(),
        row_ref: RowRefForm::default(),
    });
    state.dispatch(AppCommand::OpenOverlay(OverlayKind::LinkForm));
}

fn unlink_cursor_cell<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let Some(table_id) = state.active_table else {
        return;
    };
    let Some(GridColumn::Data(def)) = view_data.cursor_column().cloned() else {
        emit_status(state, view_data, tx, "move to a data column to unlink");
        return;
    };
    let Some(row) = view_data.cursor_data_row(Some(table_id)) else {
        return;
    };
    let Some(cell) = row.fields.get(&def.name) else {
        return;
    };
    if !cell.has_link() {
        emit_status(state, view_data, tx, "cell has no link");
        return;
    }

    let row_id = row.id;
    let fields = BTreeMap::from([(def.name.clone(), cell.clone().unlink())]);
    match runtime.update_cell(table_id, row_id, &fields) {
        Ok(_) => {
            emit_status(state, view_data, tx, format!("unlinked {}", def.name));
            request_rows(state, runtime, view_data, tx);
        }
        Err(error) => emit_status(state, view_data, tx, format!("unlink failed: {error:#}")),
    }
}

/// Batch delete behind an in-flight guard: a second request while one is
/// pending is ignored, not queued. Success clears the selection and refetches
/// the page; failure preserves it so the user can retry.
fn perform_delete<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    if view_data.delete_in_flight {
        return;
    }
    let Some(table_id) = state.active_table else {
        return;
    };
    let ids = view_data.selection.ids();
    if ids.is_empty() {
        return;
    }

    view_data.delete_in_flight = true;
    let outcome = runtime.delete_rows(table_id, &ids);
    view_data.delete_in_flight = false;

    match outcome {
        Ok(()) => {
            view_data.selection.reset();
            emit_status(state, view_data, tx, format!("{} rows deleted", ids.len()));
            request_rows(state, runtime, view_data, tx);
        }
        Err(error) => {
            emit_status(state, view_data, tx, format!("delete failed: {error:#}"));
        }
    }
}

fn handle_search_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => {
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Enter => apply_search(state, runtime, view_data, tx),
        KeyCode::Backspace => {
            view_data.search_input.pop();
        }
        KeyCode::Char(character) => view_data.search_input.push(character),
        _ => {}
    }
}

fn apply_search<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let Some(table_id) = state.active_table else {
        return;
    };
    let pattern = view_data.search_input.trim().to_owned();
    if pattern.is_empty() {
        emit_status(state, view_data, tx, "enter a search pattern first");
        return;
    }

    match view_data
        .searches
        .apply(table_id, &pattern, &view_data.rows)
    {
        Ok(count) => {
            if let Err(error) = runtime.save_search_text(table_id, &pattern) {
                emit_status(state, view_data, tx, format!("search save failed: {error:#}"));
            } else {
                emit_status(state, view_data, tx, format!("{count} rows match"));
            }
            view_data.cursor_row = 0;
            if view_data.page != 1 {
                view_data.page = 1;
                request_rows(state, runtime, view_data, tx);
            }
            state.dispatch(AppCommand::ExitToNav);
        }
        Err(error) => {
            // Previous result set is retained; only the status reports it.
            emit_status(state, view_data, tx, format!("{error:#}"));
        }
    }
}

fn clear_search<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let Some(table_id) = state.active_table else {
        return;
    };
    view_data.searches.clear(table_id);
    view_data.search_input.clear();
    if let Err(error) = runtime.save_search_text(table_id, "") {
        emit_status(state, view_data, tx, format!("search save failed: {error:#}"));
    } else {
        emit_status(state, view_data, tx, "search cleared");
    }
    view_data.clamp_cursor(Some(table_id));
}

fn handle_overlay_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    kind: OverlayKind,
    key: KeyEvent,
) {
    match kind {
        OverlayKind::TablePicker => handle_table_picker_key(state, runtime, view_data, tx, key),
        OverlayKind::ColumnPicker => handle_column_picker_key(state, runtime, view_data, tx, key),
        OverlayKind::RecordForm => handle_record_form_key(state, runtime, view_data, tx, key),
        OverlayKind::LinkForm => handle_link_form_key(state, runtime, view_data, tx, key),
        OverlayKind::DeleteConfirm => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                state.dispatch(AppCommand::ExitToNav);
                perform_delete(state, runtime, view_data, tx);
            }
            KeyCode::Char('n') | KeyCode::Esc => {
                state.dispatch(AppCommand::ExitToNav);
            }
            _ => {}
        },
    }
}

fn handle_table_picker_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let count = view_data.tables.len();
    match key.code {
        KeyCode::Esc => {
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Char('j') | KeyCode::Down => {
            if count > 0 {
                view_data.table_picker.cursor = (view_data.table_picker.cursor + 1) % count;
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            if count > 0 {
                view_data.table_picker.cursor =
                    view_data.table_picker.cursor.checked_sub(1).unwrap_or(count - 1);
            }
        }
        KeyCode::Enter => {
            let Some(table) = view_data.tables.get(view_data.table_picker.cursor) else {
                return;
            };
            let table_id = table.id;
            state.dispatch(AppCommand::ExitToNav);
            switch_table(state, runtime, view_data, tx, table_id);
        }
        _ => {}
    }
}

fn switch_table<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    table_id: TableId,
) {
    if state.active_table == Some(table_id) {
        return;
    }
    state.dispatch(AppCommand::ActivateTable(table_id));
    view_data.page = 1;
    if let Err(error) = reload_table(state, runtime, view_data, tx) {
        emit_status(state, view_data, tx, format!("load failed: {error:#}"));
    }
}

fn column_picker_entries(view_data: &ViewData) -> Vec<(String, bool, bool)> {
    let mut entries = Vec::new();
    for column in &view_data.schema {
        entries.push((
            column.name.clone(),
            view_data.overrides.effective_visible(column),
            column.auxiliary,
        ));
    }
    entries.push((
        CREATED_AT_KEY.to_owned(),
        view_data.overrides.visible(CREATED_AT_KEY, true),
        false,
    ));
    entries.push((
        ACTIONS_KEY.to_owned(),
        view_data.overrides.visible(ACTIONS_KEY, true),
        false,
    ));
    entries
}

fn handle_column_picker_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let entries = column_picker_entries(view_data);
    match key.code {
        KeyCode::Esc => {
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Char('j') | KeyCode::Down => {
            if !entries.is_empty() {
                view_data.column_picker.cursor =
                    (view_data.column_picker.cursor + 1) % entries.len();
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            if !entries.is_empty() {
                view_data.column_picker.cursor = view_data
                    .column_picker
                    .cursor
                    .checked_sub(1)
                    .unwrap_or(entries.len() - 1);
            }
        }
        KeyCode::Char(' ') | KeyCode::Enter => {
            let Some(table_id) = state.active_table else {
                return;
            };
            let Some((key_name, _, _)) = entries.get(view_data.column_picker.cursor) else {
                return;
            };
            let default = view_data
                .schema
                .iter()
                .find(|column| &column.name == key_name)
                .map(|column| !column.auxiliary)
                .unwrap_or(true);
            view_data.overrides.toggle(key_name, default);
            if let Err(error) = runtime.save_overrides(table_id, &view_data.overrides) {
                emit_status(state, view_data, tx, format!("save failed: {error:#}"));
            }
            rebuild_plan(view_data, tx);
            view_data.clamp_cursor(Some(table_id));
        }
        _ => {}
    }
}

fn handle_record_form_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(mut ui) = view_data.record_form.take() else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };

    match key.code {
        KeyCode::Esc => {
            state.dispatch(AppCommand::ExitToNav);
            return;
        }
        KeyCode::Down | KeyCode::Tab => {
            ui.cursor = (ui.cursor + 1) % ui.form.fields.len();
        }
        KeyCode::Up => {
            ui.cursor = ui.cursor.checked_sub(1).unwrap_or(ui.form.fields.len() - 1);
        }
        KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let field = &mut ui.form.fields[ui.cursor];
            if field.had_link {
                field.keep_link = !field.keep_link;
            } else {
                emit_status(state, view_data, tx, "field has no link to keep");
            }
        }
        KeyCode::Backspace => {
            let field = &mut ui.form.fields[ui.cursor];
            if !field.auto_increment {
                field.value.pop();
            }
        }
        KeyCode::Char(character) => {
            let field = &mut ui.form.fields[ui.cursor];
            if field.auto_increment {
                emit_status(state, view_data, tx, "auto-increment values are generated");
            } else {
                field.value.push(character);
            }
        }
        KeyCode::Enter => {
            submit_record_form(state, runtime, view_data, tx, ui);
            return;
        }
        _ => {}
    }

    view_data.record_form = Some(ui);
}

fn submit_record_form<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    ui: RecordFormUiState,
) {
    if let Err(error) = ui.form.validate() {
        emit_status(state, view_data, tx, format!("{error:#}"));
        view_data.record_form = Some(ui);
        return;
    }

    let table_id = ui.form.table_id;
    let row_id = ui.form.row_id;
    let original = row_id.and_then(|id| view_data.rows.iter().find(|row| row.id == id).cloned());
    let fields = ui.form.clone().into_fields(original.as_ref());

    let outcome = match row_id {
        Some(id) => runtime.update_cell(table_id, id, &fields).map(|_| "saved"),
        None => runtime.insert_row(table_id, &fields).map(|_| "row added"),
    };

    match outcome {
        Ok(message) => {
            state.dispatch(AppCommand::ExitToNav);
            emit_status(state, view_data, tx, message);
            request_rows(state, runtime, view_data, tx);
        }
        Err(error) => {
            // Keep the form open with the user's input so they can retry.
            emit_status(state, view_data, tx, format!("save failed: {error:#}"));
            view_data.record_form = Some(ui);
        }
    }
}

fn handle_link_form_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(mut ui) = view_data.link_form.take() else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };

    match key.code {
        KeyCode::Esc => {
            state.dispatch(AppCommand::ExitToNav);
            return;
        }
        KeyCode::Tab => {
            ui.mode = match ui.mode {
                LinkFormMode::Url => LinkFormMode::RowRef,
                LinkFormMode::RowRef => LinkFormMode::Url,
            };
        }
        KeyCode::Left | KeyCode::Right if ui.mode == LinkFormMode::RowRef => {
            ui.row_ref.table_id =
                cycle_table(&view_data.tables, ui.row_ref.table_id, key.code == KeyCode::Right);
        }
        KeyCode::Backspace => match ui.mode {
            LinkFormMode::Url => {
                ui.url.url.pop();
            }
            LinkFormMode::RowRef => {
                ui.row_ref.row_id.pop();
            }
        },
        KeyCode::Char(character) => match ui.mode {
            LinkFormMode::Url => ui.url.url.push(character),
            LinkFormMode::RowRef => {
                if character.is_ascii_digit() {
                    ui.row_ref.row_id.push(character);
                }
            }
        },
        KeyCode::Enter => {
            submit_link_form(state, runtime, view_data, tx, ui);
            return;
        }
        _ => {}
    }

    view_data.link_form = Some(ui);
}

fn cycle_table(
    tables: &[TableInfo],
    current: Option<TableId>,
    forward: bool,
) -> Option<TableId> {
    if tables.is_empty() {
        return None;
    }
    let position = current
        .and_then(|id| tables.iter().position(|table| table.id == id))
        .unwrap_or(0);
    let next = if current.is_none() {
        0
    } else if forward {
        (position + 1) % tables.len()
    } else {
        position.checked_sub(1).unwrap_or(tables.len() - 1)
    };
    Some(tables[next].id)
}

fn submit_link_form<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    ui: LinkFormUiState,
) {
    let Some(table_id) = state.active_table else {
        return;
    };
    let Some(cell) = view_data
        .rows
        .iter()
        .find(|row| row.id == ui.row_id)
        .and_then(|row| row.fields.get(&ui.column))
        .cloned()
    else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };

    // Invalid input never reaches the network; the form stays open.
    let linked = match ui.mode {
        LinkFormMode::Url => match ui.url.validate() {
            Ok(url) => cell.with_link(url.as_str()),
            Err(error) => {
                emit_status(state, view_data, tx, format!("{error:#}"));
                view_data.link_form = Some(ui);
                return;
            }
        },
        LinkFormMode::RowRef => match ui.row_ref.validate() {
            Ok((target_table, target_row)) => cell.with_row_ref(target_table, target_row),
            Err(error) => {
                emit_status(state, view_data, tx, format!("{error:#}"));
                view_data.link_form = Some(ui);
                return;
            }
        },
    };

    let fields = BTreeMap::from([(ui.column.clone(), linked)]);
    match runtime.update_cell(table_id, ui.row_id, &fields) {
        Ok(_) => {
            state.dispatch(AppCommand::ExitToNav);
            emit_status(state, view_data, tx, format!("linked {}", ui.column));
            request_rows(state, runtime, view_data, tx);
        }
        Err(error) => {
            emit_status(state, view_data, tx, format!("link failed: {error:#}"));
            view_data.link_form = Some(ui);
        }
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(detail_panel_height(state, view_data)),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_tabs(frame, layout[0], state, view_data);
    render_grid(frame, layout[1], state, view_data);
    render_detail_panel(frame, layout[2], state, view_data);
    render_status_bar(frame, layout[3], state, view_data);

    match state.mode {
        AppMode::Overlay(OverlayKind::TablePicker) => render_table_picker(frame, view_data),
        AppMode::Overlay(OverlayKind::ColumnPicker) => render_column_picker(frame, view_data),
        AppMode::Overlay(OverlayKind::RecordForm) => render_record_form(frame, view_data),
        AppMode::Overlay(OverlayKind::LinkForm) => render_link_form(frame, view_data),
        AppMode::Overlay(OverlayKind::DeleteConfirm) => {
            render_delete_confirm(frame, view_data);
        }
        AppMode::Nav | AppMode::Search => {}
    }
}

fn render_tabs(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &ViewData) {
    let titles: Vec<Line<'_>> = view_data
        .tables
        .iter()
        .map(|table| {
            let mut label = format!(" {} ", table.name);
            if view_data.searches.active(table.id).is_some() {
                label = format!(" {} {SEARCH_MARK} ", table.name);
            }
            Line::from(label)
        })
        .collect();
    let selected = state
        .active_table
        .and_then(|id| view_data.tables.iter().position(|table| table.id == id))
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED));
    frame.render_widget(tabs, area);
}

fn column_constraint(view_data: &ViewData, column: &GridColumn) -> Constraint {
    let px = column
        .fixed_width_px()
        .or_else(|| view_data.widths.get(column.key()).copied())
        .unwrap_or(MIN_COLUMN_PX);
    Constraint::Length((px / COLUMN_CELL_PX).max(3))
}

fn render_grid(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &ViewData) {
    let pattern = view_data.active_pattern(state.active_table);
    let now = OffsetDateTime::now_utc();

    let header = WidgetRow::new(
        view_data
            .plan
            .inline
            .iter()
            .map(|column| Cell::from(header_label(view_data, column)))
            .collect::<Vec<_>>(),
    )
    .style(Style::default().add_modifier(Modifier::BOLD));

    let indices = view_data.visible_row_indices(state.active_table);
    let rows: Vec<WidgetRow<'_>> = indices
        .iter()
        .enumerate()
        .map(|(position, index)| {
            let row = &view_data.rows[*index];
            let cells: Vec<Cell<'_>> = view_data
                .plan
                .inline
                .iter()
                .map(|column| grid_cell(view_data, row, column, pattern.as_deref()))
                .collect();
            WidgetRow::new(cells).style(row_style(view_data, row, position, now))
        })
        .collect();

    let constraints: Vec<Constraint> = view_data
        .plan
        .inline
        .iter()
        .map(|column| column_constraint(view_data, column))
        .collect();

    let table = Table::new(rows, constraints).header(header).block(
        Block::default()
            .borders(Borders::ALL)
            .title(grid_title(state, view_data)),
    );
    frame.render_widget(table, area);
}

fn grid_title(state: &AppState, view_data: &ViewData) -> String {
    let name = state
        .active_table
        .map(|id| table_label(&view_data.tables, id))
        .unwrap_or_else(|| "no table".to_owned());
    format!(
        " {} · page {}/{} · {} rows ",
        name,
        view_data.page,
        view_data.page_count(),
        view_data.total
    )
}

fn header_label(view_data: &ViewData, column: &GridColumn) -> String {
    match column {
        GridColumn::Selection { .. } => sel_header(view_data),
        GridColumn::Data(def) => {
            let mut label = def.name.clone();
            if view_data.rows.iter().any(|row| {
                row.fields
                    .get(&def.name)
                    .is_some_and(CellValue::has_link)
            }) {
                label.push(' ');
                label.push_str(LINK_ARROW);
            }
            label
        }
        GridColumn::CreatedAt => "created".to_owned(),
        GridColumn::Actions { .. } => "actions".to_owned(),
    }
}

fn sel_header(view_data: &ViewData) -> String {
    if view_data.selection.is_empty() {
        "[ ]".to_owned()
    } else {
        format!("[{}]", view_data.selection.len())
    }
}

fn grid_cell<'a>(
    view_data: &ViewData,
    row: &'a DataRow,
    column: &GridColumn,
    pattern: Option<&str>,
) -> Cell<'a> {
    match column {
        GridColumn::Selection { .. } => {
            let mark = if view_data.selection.is_selected(row.id) {
                "[x]"
            } else {
                "[ ]"
            };
            Cell::from(mark)
        }
        GridColumn::CreatedAt => Cell::from(row.created_at_date()),
        GridColumn::Data(def) => {
            let display = row
                .fields
                .get(&def.name)
                .map(CellValue::resolve_for_display);
            let text = display.as_ref().map(|cell| cell.text.clone()).unwrap_or_default();
            let has_anchor = display.is_some_and(|cell| cell.anchor.is_some());
            let mut line = match pattern {
                Some(pattern) => highlighted_line(pattern, text),
                None => Line::from(text),
            };
            if has_anchor {
                line.spans.push(Span::styled(
                    format!(" {LINK_ARROW}"),
                    Style::default().fg(Color::Cyan),
                ));
            }
            Cell::from(line)
        }
        GridColumn::Actions { .. } => Cell::from("edit · del"),
    }
}

/// Wrap live-pattern matches in an emphasis style. Only the rendered text is
/// decorated; the stored value is untouched.
fn highlighted_line(pattern: &str, text: String) -> Line<'static> {
    let spans = highlight_spans(pattern, &text);
    if spans.is_empty() {
        return Line::from(text);
    }

    let mut pieces = Vec::new();
    let mut position = 0;
    for (start, end) in spans {
        if start > position {
            pieces.push(Span::raw(text[position..start].to_owned()));
        }
        pieces.push(Span::styled(
            text[start..end].to_owned(),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ));
        position = end;
    }
    if position < text.len() {
        pieces.push(Span::raw(text[position..].to_owned()));
    }
    Line::from(pieces)
}

fn row_style(view_data: &ViewData, row: &DataRow, position: usize, now: OffsetDateTime) -> Style {
    if let Some(highlight) = view_data.highlight
        && highlight.row_id == row.id
        && !highlight.expired(now)
        && highlight_flash_on(now)
    {
        return Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::REVERSED);
    }
    if view_data.selection.is_selected(row.id) {
        return Style::default().bg(Color::DarkGray);
    }
    if position == view_data.cursor_row {
        return Style::default().add_modifier(Modifier::BOLD);
    }
    Style::default()
}

/// The flash alternates on wall-clock seconds; rendering happens every poll
/// tick, so the border appears to blink until the highlight expires.
fn highlight_flash_on(now: OffsetDateTime) -> bool {
    now.unix_timestamp() % 2 == 0
}

fn detail_panel_height(state: &AppState, view_data: &ViewData) -> u16 {
    let expanded = view_data
        .cursor_data_row(state.active_table)
        .is_some_and(|row| view_data.expanded.contains(&row.id));
    if expanded {
        (view_data.plan.auxiliary.len() as u16 + 2).min(10)
    } else {
        0
    }
}

fn render_detail_panel(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    if area.height == 0 {
        return;
    }
    let Some(row) = view_data.cursor_data_row(state.active_table) else {
        return;
    };
    if !view_data.expanded.contains(&row.id) {
        return;
    }

    let mut lines = Vec::new();
    for column in &view_data.plan.auxiliary {
        let value = match column {
            GridColumn::CreatedAt => row.created_at_date(),
            GridColumn::Data(def) => row.display_field(&def.name),
            GridColumn::Selection { .. } | GridColumn::Actions { .. } => continue,
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!("{}: ", column.title()),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(value),
        ]));
    }
    if lines.is_empty() {
        lines.push(Line::from("no auxiliary columns"));
    }

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" row {} ", row.id.get())),
    );
    frame.render_widget(panel, area);
}

fn render_status_bar(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let text = status_text(state, view_data);
    frame.render_widget(Paragraph::new(text), area);
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if state.mode == AppMode::Search {
        return format!("search: {}_", view_data.search_input);
    }

    let mut parts = vec![mode_label(state.mode).to_owned()];
    if !view_data.selection.is_empty() {
        parts.push(format!("{} selected", view_data.selection.len()));
    }
    if let Some(search) = state
        .active_table
        .and_then(|table| view_data.searches.active(table))
    {
        parts.push(format!("search {:?}: {} rows", search.pattern, search.match_count()));
    }
    if let Some(status) = &state.status_line {
        parts.push(status.clone());
    }
    parts.join(" | ")
}

fn mode_label(mode: AppMode) -> &'static str {
    match mode {
        AppMode::Nav => "nav",
        AppMode::Search => "search",
        AppMode::Overlay(OverlayKind::TablePicker) => "tables",
        AppMode::Overlay(OverlayKind::ColumnPicker) => "columns",
        AppMode::Overlay(OverlayKind::RecordForm) => "form",
        AppMode::Overlay(OverlayKind::LinkForm) => "link",
        AppMode::Overlay(OverlayKind::DeleteConfirm) => "confirm",
    }
}

fn render_table_picker(frame: &mut ratatui::Frame<'_>, view_data: &ViewData) {
    let area = centered_rect(50, 50, frame.area());
    let lines: Vec<Line<'_>> = view_data
        .tables
        .iter()
        .enumerate()
        .map(|(index, table)| {
            let marker = if index == view_data.table_picker.cursor {
                "> "
            } else {
                "  "
            };
            Line::from(format!("{marker}{} — {}", table.name, table.description))
        })
        .collect();
    render_popup(frame, area, " tables ", lines);
}

fn render_column_picker(frame: &mut ratatui::Frame<'_>, view_data: &ViewData) {
    let area = centered_rect(50, 60, frame.area());
    let lines: Vec<Line<'_>> = column_picker_entries(view_data)
        .into_iter()
        .enumerate()
        .map(|(index, (name, visible, auxiliary))| {
            let marker = if index == view_data.column_picker.cursor {
                "> "
            } else {
                "  "
            };
            let check = if visible { "[x]" } else { "[ ]" };
            let tag = if auxiliary { " (panel)" } else { "" };
            Line::from(format!("{marker}{check} {name}{tag}"))
        })
        .collect();
    render_popup(frame, area, " columns ", lines);
}

fn render_record_form(frame: &mut ratatui::Frame<'_>, view_data: &ViewData) {
    let Some(ui) = &view_data.record_form else {
        return;
    };
    let area = centered_rect(60, 60, frame.area());
    let mut lines = Vec::new();
    for (index, field) in ui.form.fields.iter().enumerate() {
        let marker = if index == ui.cursor { "> " } else { "  " };
        let mut label = format!("{marker}{}: {}", field.column, field.value);
        if field.auto_increment {
            label.push_str(" (generated)");
        } else if field.had_link {
            label.push_str(if field.keep_link {
                " [link kept]"
            } else {
                " [link dropped]"
            });
        }
        lines.push(Line::from(label));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(
        "enter save · esc cancel · ctrl-l toggle keep-link",
    ));
    let title = if ui.form.is_edit() { " edit row " } else { " new row " };
    render_popup(frame, area, title, lines);
}

fn render_link_form(frame: &mut ratatui::Frame<'_>, view_data: &ViewData) {
    let Some(ui) = &view_data.link_form else {
        return;
    };
    let area = centered_rect(60, 25, frame.area());
    let target = match ui.mode {
        LinkFormMode::Url => format!("url: {}_", ui.url.url),
        LinkFormMode::RowRef => {
            let table = ui
                .row_ref
                .table_id
                .map(|id| table_label(&view_data.tables, id))
                .unwrap_or_else(|| "choose with ←/→".to_owned());
            format!("table: {table} · row id: {}_", ui.row_ref.row_id)
        }
    };
    let lines = vec![
        Line::from(format!("link {} to:", ui.column)),
        Line::from(target),
        Line::from(""),
        Line::from("tab url/row · enter save · esc cancel"),
    ];
    render_popup(frame, area, " set link ", lines);
}

fn render_delete_confirm(frame: &mut ratatui::Frame<'_>, view_data: &ViewData) {
    let area = centered_rect(50, 20, frame.area());
    let lines = vec![
        Line::from(format!(
            "delete {} selected rows? this cannot be undone.",
            view_data.selection.len()
        )),
        Line::from(""),
        Line::from("y confirm · n cancel"),
    ];
    render_popup(frame, area, " confirm delete ", lines);
}

fn render_popup(frame: &mut ratatui::Frame<'_>, area: Rect, title: &str, lines: Vec<Line<'_>>) {
    frame.render_widget(Clear, area);
    let popup = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title.to_owned()));
    frame.render_widget(popup, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}

#[cfg(test)]
mod tests {
    use super::{
        InternalEvent, LinkFormMode, LinkFormUiState, UiOptions, ViewData, activate_row_ref,
        apply_rows_loaded, apply_search, clear_search, click_cursor_row, highlighted_line,
        perform_delete, process_internal_events, reload_all, request_rows, status_text,
        submit_link_form, switch_table, unlink_cursor_cell,
    };
    use almacen_app::{
        AppCommand, AppState, CellValue, ClickModifiers, ClientStore, ColumnDef, DataService,
        LinkForm, LinkTarget, RowId, RowPage, RowRefForm, TableId,
    };
    use almacen_testkit::MemoryRuntime;
    use anyhow::Result;
    use std::collections::BTreeMap;
    use std::sync::mpsc::{self, Receiver, Sender};

    struct Harness {
        state: AppState,
        runtime: MemoryRuntime,
        view_data: ViewData,
        tx: Sender<InternalEvent>,
        rx: Receiver<InternalEvent>,
    }

    impl Harness {
        fn demo() -> Result<Self> {
            let (tx, rx) = mpsc::channel();
            let mut harness = Self {
                state: AppState::default(),
                runtime: MemoryRuntime::with_demo_data(),
                view_data: ViewData::new(UiOptions { page_size: 10 }),
                tx,
                rx,
            };
            reload_all(
                &mut harness.state,
                &mut harness.runtime,
                &mut harness.view_data,
                &harness.tx,
            )?;
            harness.drain();
            Ok(harness)
        }

        /// Apply every queued internal event, like one loop iteration does.
        fn drain(&mut self) {
            process_internal_events(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                &self.rx,
            );
        }

        fn active_table(&self) -> TableId {
            self.state.active_table.expect("active table")
        }

        fn table(&mut self, name: &str) -> TableId {
            self.runtime
                .service
                .table_named(name)
                .expect("known table")
        }

        fn visible_ids(&self) -> Vec<RowId> {
            self.view_data.visible_row_ids(self.state.active_table)
        }
    }

    #[test]
    fn reload_populates_tables_schema_and_rows() -> Result<()> {
        let mut harness = Harness::demo()?;
        assert_eq!(harness.view_data.tables.len(), 2);
        assert_eq!(harness.active_table(), harness.table("suppliers"));
        assert!(!harness.view_data.rows.is_empty());
        assert!(!harness.view_data.plan.inline.is_empty());
        Ok(())
    }

    #[test]
    fn stale_generation_is_discarded() -> Result<()> {
        let mut harness = Harness::demo()?;
        let table_id = harness.active_table();
        let before = harness.view_data.rows.clone();

        let stale_generation = harness.view_data.fetch_generation;
        // A newer fetch was issued after the stale one.
        request_rows(
            &harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        apply_rows_loaded(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            stale_generation,
            table_id,
            Ok(RowPage {
                items: Vec::new(),
                total: 0,
            }),
        );
        assert_eq!(harness.view_data.rows, before, "stale page must not apply");

        harness.drain();
        assert_eq!(harness.view_data.rows.len(), before.len());
        Ok(())
    }

    #[test]
    fn rows_for_another_table_are_discarded() -> Result<()> {
        let mut harness = Harness::demo()?;
        let other = harness.table("hardware");
        let generation = harness.view_data.fetch_generation;
        let before = harness.view_data.rows.clone();

        apply_rows_loaded(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            generation,
            other,
            Ok(RowPage {
                items: Vec::new(),
                total: 0,
            }),
        );
        assert_eq!(harness.view_data.rows, before);
        Ok(())
    }

    #[test]
    fn page_replacement_resets_selection() -> Result<()> {
        let mut harness = Harness::demo()?;
        click_cursor_row(
            &harness.state,
            &mut harness.view_data,
            ClickModifiers::Plain,
        );
        assert_eq!(harness.view_data.selection.len(), 1);

        request_rows(
            &harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        harness.drain();
        assert!(harness.view_data.selection.is_empty());
        Ok(())
    }

    #[test]
    fn fetch_failure_keeps_prior_rows_and_reports() -> Result<()> {
        let mut harness = Harness::demo()?;
        let before = harness.view_data.rows.clone();

        harness.runtime.service.fail_fetches = true;
        request_rows(
            &harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        harness.drain();

        assert_eq!(harness.view_data.rows, before);
        assert!(
            harness
                .state
                .status_line
                .as_deref()
                .is_some_and(|status| status.contains("load failed"))
        );
        Ok(())
    }

    #[test]
    fn row_ref_activation_follows_and_highlights() -> Result<()> {
        let mut harness = Harness::demo()?;
        let hardware = harness.table("hardware");
        let suppliers = harness.table("suppliers");
        switch_table(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            hardware,
        );
        harness.drain();

        let supplier_cell = harness.view_data.rows[0].fields["supplier"].clone();
        let Some(almacen_app::AnchorSpec::ActivateRowRef { table_id, row_id }) =
            supplier_cell.resolve_for_display().anchor
        else {
            panic!("expected row-ref anchor");
        };
        assert_eq!(table_id, suppliers);

        activate_row_ref(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            table_id,
            row_id,
        );
        harness.drain();

        assert_eq!(harness.active_table(), suppliers);
        assert!(harness.view_data.expanded.contains(&row_id));
        let highlight = harness.view_data.highlight.expect("highlight set");
        assert_eq!(highlight.row_id, row_id);
        assert!(
            harness
                .state
                .status_line
                .as_deref()
                .is_some_and(|status| status.contains("follow -> suppliers"))
        );
        Ok(())
    }

    #[test]
    fn consumed_intent_never_retriggers() -> Result<()> {
        let mut harness = Harness::demo()?;
        let suppliers = harness.table("suppliers");
        let target = harness.view_data.rows[0].id;

        activate_row_ref(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            suppliers,
            target,
        );
        harness.drain();
        assert!(harness.view_data.highlight.is_some());

        // An unrelated reload of the same table must not re-highlight.
        harness.view_data.highlight = None;
        harness.view_data.expanded.clear();
        request_rows(
            &harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        harness.drain();
        assert_eq!(harness.view_data.highlight, None);
        assert!(harness.view_data.expanded.is_empty());
        Ok(())
    }

    #[test]
    fn intent_for_a_missing_row_is_silently_consumed() -> Result<()> {
        let mut harness = Harness::demo()?;
        let suppliers = harness.table("suppliers");

        activate_row_ref(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            suppliers,
            RowId::new(9999),
        );
        harness.drain();

        assert_eq!(harness.view_data.highlight, None);
        assert!(harness.view_data.expanded.is_empty());
        assert_eq!(harness.runtime.store.pending_intent(), None, "intent gone");
        Ok(())
    }

    #[test]
    fn delete_success_clears_selection_and_refetches() -> Result<()> {
        let mut harness = Harness::demo()?;
        let before = harness.view_data.total;
        click_cursor_row(
            &harness.state,
            &mut harness.view_data,
            ClickModifiers::Plain,
        );

        perform_delete(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        harness.drain();

        assert!(harness.view_data.selection.is_empty());
        assert_eq!(harness.view_data.total, before - 1);
        Ok(())
    }

    #[test]
    fn delete_failure_preserves_selection_for_retry() -> Result<()> {
        let mut harness = Harness::demo()?;
        click_cursor_row(
            &harness.state,
            &mut harness.view_data,
            ClickModifiers::Plain,
        );
        let selected = harness.view_data.selection.ids();

        harness.runtime.service.fail_deletes = true;
        perform_delete(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        harness.drain();

        assert_eq!(harness.view_data.selection.ids(), selected);
        assert!(
            harness
                .state
                .status_line
                .as_deref()
                .is_some_and(|status| status.contains("delete failed"))
        );
        Ok(())
    }

    #[test]
    fn second_delete_while_one_is_pending_is_ignored() -> Result<()> {
        let mut harness = Harness::demo()?;
        let before = harness.view_data.total;
        click_cursor_row(
            &harness.state,
            &mut harness.view_data,
            ClickModifiers::Plain,
        );

        harness.view_data.delete_in_flight = true;
        perform_delete(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        harness.drain();

        assert_eq!(harness.view_data.total, before, "guarded delete is a no-op");
        assert_eq!(harness.view_data.selection.len(), 1);
        Ok(())
    }

    #[test]
    fn search_filters_rows_and_persists_pattern() -> Result<()> {
        let mut harness = Harness::demo()?;
        let table_id = harness.active_table();

        harness.view_data.search_input = "acme".to_owned();
        apply_search(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );

        assert_eq!(harness.visible_ids().len(), 1);
        assert_eq!(
            harness.runtime.store.load_search_text(table_id)?,
            Some("acme".to_owned())
        );
        Ok(())
    }

    #[test]
    fn invalid_search_keeps_previous_results() -> Result<()> {
        let mut harness = Harness::demo()?;

        harness.view_data.search_input = "acme".to_owned();
        apply_search(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        let matched = harness.visible_ids();

        harness.view_data.search_input = "acme(".to_owned();
        apply_search(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );

        assert_eq!(harness.visible_ids(), matched);
        assert!(
            harness
                .state
                .status_line
                .as_deref()
                .is_some_and(|status| status.contains("invalid search pattern"))
        );
        Ok(())
    }

    #[test]
    fn searches_stay_isolated_when_switching_tables() -> Result<()> {
        let mut harness = Harness::demo()?;
        let suppliers = harness.active_table();
        let hardware = harness.table("hardware");

        harness.view_data.search_input = "acme".to_owned();
        apply_search(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        let supplier_matches = harness.view_data.searches.active(suppliers).cloned();

        switch_table(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            hardware,
        );
        harness.drain();
        harness.view_data.search_input = "wrench".to_owned();
        apply_search(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );

        assert_eq!(
            harness.view_data.searches.active(suppliers).cloned(),
            supplier_matches,
            "table A search untouched by table B"
        );

        switch_table(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            suppliers,
        );
        harness.drain();
        assert_eq!(harness.visible_ids().len(), 1);
        Ok(())
    }

    #[test]
    fn clearing_a_search_restores_the_full_page() -> Result<()> {
        let mut harness = Harness::demo()?;
        harness.view_data.search_input = "acme".to_owned();
        apply_search(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        assert_eq!(harness.visible_ids().len(), 1);

        clear_search(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        assert_eq!(harness.visible_ids().len(), harness.view_data.rows.len());
        Ok(())
    }

    #[test]
    fn select_all_covers_only_the_visible_page() -> Result<()> {
        let mut harness = Harness::demo()?;
        harness.view_data.search_input = "acme".to_owned();
        apply_search(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );

        let page = harness.visible_ids();
        harness.view_data.selection.select_all(&page);
        assert_eq!(harness.view_data.selection.len(), 1);
        Ok(())
    }

    #[test]
    fn widths_recompute_only_for_the_latest_token() -> Result<()> {
        let mut harness = Harness::demo()?;
        harness.view_data.widths.clear();

        let stale = harness.view_data.width_token;
        harness.view_data.width_token += 1;
        let current = harness.view_data.width_token;

        harness.tx.send(InternalEvent::WidthsDue { token: stale })?;
        harness.drain();
        assert!(harness.view_data.widths.is_empty(), "stale token ignored");

        harness.tx.send(InternalEvent::WidthsDue { token: current })?;
        harness.drain();
        assert!(!harness.view_data.widths.is_empty());
        Ok(())
    }

    #[test]
    fn highlight_clear_respects_its_token() -> Result<()> {
        let mut harness = Harness::demo()?;
        let target = harness.view_data.rows[0].id;
        let suppliers = harness.active_table();
        activate_row_ref(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            suppliers,
            target,
        );
        harness.drain();
        assert!(harness.view_data.highlight.is_some());

        let stale = harness.view_data.highlight_token.wrapping_sub(1);
        harness
            .tx
            .send(InternalEvent::ClearHighlight { token: stale })?;
        harness.drain();
        assert!(harness.view_data.highlight.is_some(), "stale clear ignored");

        let current = harness.view_data.highlight_token;
        harness
            .tx
            .send(InternalEvent::ClearHighlight { token: current })?;
        harness.drain();
        assert_eq!(harness.view_data.highlight, None);
        Ok(())
    }

    #[test]
    fn column_picker_toggle_persists_overrides() -> Result<()> {
        let mut harness = Harness::demo()?;
        let table_id = harness.active_table();

        harness.view_data.overrides.toggle("name", true);
        harness
            .runtime
            .store
            .save_overrides(table_id, &harness.view_data.overrides)?;

        let stored = harness.runtime.store.load_overrides(table_id)?;
        assert!(!stored.effective_visible(&ColumnDef::named("name")));
        Ok(())
    }

    #[test]
    fn restored_search_text_reactivates_after_reload() -> Result<()> {
        let mut harness = Harness::demo()?;
        let table_id = harness.active_table();
        harness.runtime.store.save_search_text(table_id, "acme")?;
        harness.view_data.searches.clear(table_id);

        super::reload_table(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        )?;
        harness.drain();

        assert_eq!(harness.view_data.search_input, "acme");
        assert_eq!(harness.visible_ids().len(), 1);
        Ok(())
    }

    #[test]
    fn highlighted_line_wraps_only_matches() {
        let line = highlighted_line("o", "tool".to_owned());
        let rendered: Vec<String> = line
            .spans
            .iter()
            .map(|span| span.content.clone().into_owned())
            .collect();
        assert_eq!(rendered, vec!["t", "o", "o", "l"]);

        let untouched = highlighted_line("zzz", "tool".to_owned());
        assert_eq!(untouched.spans.len(), 1);
    }

    #[test]
    fn status_text_reports_selection_and_search() -> Result<()> {
        let mut harness = Harness::demo()?;
        click_cursor_row(
            &harness.state,
            &mut harness.view_data,
            ClickModifiers::Plain,
        );
        harness.view_data.search_input = "acme".to_owned();
        apply_search(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );

        harness
            .state
            .dispatch(AppCommand::SetStatus("saved".to_owned()));
        let text = status_text(&harness.state, &harness.view_data);
        assert!(text.contains("1 selected"));
        assert!(text.contains("1 rows"));
        assert!(text.contains("saved"));
        Ok(())
    }

    fn link_form(harness: &Harness, column: &str) -> LinkFormUiState {
        LinkFormUiState {
            column: column.to_owned(),
            row_id: harness.view_data.rows[0].id,
            mode: LinkFormMode::Url,
            url: LinkForm::default(),
            row_ref: RowRefForm::default(),
        }
    }

    #[test]
    fn url_link_preserves_the_display_text() -> Result<()> {
        let mut harness = Harness::demo()?;
        let table_id = harness.active_table();
        let row_id = harness.view_data.rows[0].id;
        let before = harness.view_data.rows[0].fields["contact"].display();

        let mut ui = link_form(&harness, "contact");
        ui.url.url = "https://directory.example/people".to_owned();
        submit_link_form(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            ui,
        );
        harness.drain();

        let cell = harness
            .runtime
            .service
            .row(table_id, row_id)
            .expect("row kept")
            .fields["contact"]
            .clone();
        assert_eq!(cell.display(), before);
        assert_eq!(
            cell.target(),
            Some(&LinkTarget::External(
                "https://directory.example/people".to_owned()
            ))
        );
        Ok(())
    }

    #[test]
    fn row_ref_link_goes_through_the_same_update_call() -> Result<()> {
        let mut harness = Harness::demo()?;
        let table_id = harness.active_table();
        let hardware = harness.table("hardware");
        let row_id = harness.view_data.rows[0].id;

        let mut ui = link_form(&harness, "contact");
        ui.mode = LinkFormMode::RowRef;
        ui.row_ref.table_id = Some(hardware);
        ui.row_ref.row_id = "4".to_owned();
        submit_link_form(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            ui,
        );
        harness.drain();

        let cell = harness
            .runtime
            .service
            .row(table_id, row_id)
            .expect("row kept")
            .fields["contact"]
            .clone();
        assert_eq!(
            cell.target(),
            Some(&LinkTarget::RowRef {
                table_id: hardware,
                row_id: RowId::new(4),
            })
        );
        Ok(())
    }

    #[test]
    fn invalid_link_url_keeps_the_form_open_and_sends_nothing() -> Result<()> {
        let mut harness = Harness::demo()?;
        let table_id = harness.active_table();
        let row_id = harness.view_data.rows[0].id;

        let mut ui = link_form(&harness, "contact");
        ui.url.url = "not a url".to_owned();
        submit_link_form(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            ui,
        );

        assert!(harness.view_data.link_form.is_some(), "form stays open");
        let cell = harness
            .runtime
            .service
            .row(table_id, row_id)
            .expect("row kept")
            .fields["contact"]
            .clone();
        assert!(!cell.has_link(), "nothing was persisted");
        Ok(())
    }

    #[test]
    fn unlink_collapses_the_cell_back_to_text() -> Result<()> {
        let mut harness = Harness::demo()?;
        let table_id = harness.active_table();
        let row_id = harness.view_data.rows[0].id;

        // suppliers inline columns: selection, name, contact, site, created, actions
        let site_col = harness
            .view_data
            .plan
            .inline
            .iter()
            .position(|column| column.key() == "site")
            .expect("site column inline");
        harness.view_data.cursor_col = site_col;
        harness.view_data.cursor_row = 0;
        let before = harness.view_data.rows[0].fields["site"].display();

        unlink_cursor_cell(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        harness.drain();

        let cell = harness
            .runtime
            .service
            .row(table_id, row_id)
            .expect("row kept")
            .fields["site"]
            .clone();
        assert_eq!(cell, CellValue::text(before));
        Ok(())
    }

    #[test]
    fn record_form_stays_open_when_the_save_fails() -> Result<()> {
        use super::{RecordFormUiState, submit_record_form};
        use almacen_app::RecordForm;

        let mut harness = Harness::demo()?;
        let table_id = harness.active_table();
        let row = harness.view_data.rows[0].clone();
        let mut form = RecordForm::for_edit(table_id, &harness.view_data.schema, &row);
        for field in &mut form.fields {
            if field.value.trim().is_empty() {
                field.value = "filled".to_owned();
            }
        }

        harness.runtime.service.fail_updates = true;
        submit_record_form(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            RecordFormUiState { form, cursor: 0 },
        );

        assert!(
            harness.view_data.record_form.is_some(),
            "form kept open for retry"
        );
        assert!(
            harness
                .state
                .status_line
                .as_deref()
                .is_some_and(|status| status.contains("save failed"))
        );
        Ok(())
    }

    #[test]
    fn update_round_trip_through_the_service() -> Result<()> {
        let mut harness = Harness::demo()?;
        let table_id = harness.active_table();
        let row_id = harness.view_data.rows[0].id;

        let fields = BTreeMap::from([(
            "contact".to_owned(),
            CellValue::text("Robin Price"),
        )]);
        harness.runtime.update_cell(table_id, row_id, &fields)?;
        request_rows(
            &harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        harness.drain();

        assert_eq!(
            harness.view_data.rows[0].fields["contact"],
            CellValue::text("Robin Price")
        );
        Ok(())
    }
}
