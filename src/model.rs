use arboard::Clipboard;
use chrono::{NaiveDate, Utc};
use ratatui::crossterm::event::KeyEvent;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::auth::{GateDecision, LOGIN_PATH, Session, gate};
use crate::dashboard::{MonthlyTotal, chart_source, chart_title, monthly_totals};
use crate::datatable::{Activation, Column, DataTable};
use crate::dates::{DateRange, is_upcoming, parse_excel_date};
use crate::domain::{AppConfig, CMDMode, ClientField, CrmError, HELP_TEXT, Message, Page};
use crate::excel;
use crate::inputter::{InputResult, Inputter};
use crate::loader;
use crate::record::Record;
use crate::reports::{
    CARTERA_INSURERS, COBRANZA_INSURERS, DASHBOARD_INSURERS, Insurer, Ramo, cartera_columns,
    cartera_search_columns, clientes_columns, cobranza_columns, export_file_name,
    generic_columns, renovaciones_columns,
};
use crate::services::{Backend, Cliente};
use crate::ui::{CMDLINE_HEIGH, PAGE_HEADER_HEIGHT, TABLE_HEADER_HEIGHT};

pub const RENEWAL_WINDOWS: [u32; 3] = [30, 60, 90];
pub const DUE_SOON_DAYS: u64 = 7;
const RENEWAL_DATE_FIELD: &str = "fechaRenovacion";
const LOGIN_FAILED: &str = "Credenciales inválidas. Por favor intente de nuevo.";

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    CMDINPUT,
}

// Where the records of a tab come from.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Source {
    Cobranza,
    Renewals,
    Cartera,
    Clients,
    Dashboard,
    Search,
    File,
}

pub struct Tab {
    pub label: String,
    ramo: Ramo,
    source: Source,
    export_prefix: String,
    generic: bool, // Columns follow whatever fields the records carry
    pub records: Vec<Record>,
    pub columns: Vec<Column>,
    pub table: DataTable,
    rows: Vec<usize>, // View row -> index into records
    pub curser_row: usize,
    pub curser_column: usize,
    pub offset_row: usize,
}

impl Tab {
    fn new(
        label: impl Into<String>,
        ramo: Ramo,
        source: Source,
        export_prefix: impl Into<String>,
        columns: Vec<Column>,
    ) -> Self {
        Tab {
            label: label.into(),
            ramo,
            source,
            export_prefix: export_prefix.into(),
            generic: columns.is_empty() && matches!(source, Source::Dashboard | Source::File),
            records: Vec::new(),
            columns,
            table: DataTable::new(),
            rows: Vec::new(),
            curser_row: 0,
            curser_column: 0,
            offset_row: 0,
        }
    }

    fn set_records(&mut self, records: Vec<Record>) {
        if self.generic {
            self.columns = generic_columns(&records);
        }
        self.records = records;
        self.refresh();
    }

    /// Recompute the view after records, filters or sort changed.
    fn refresh(&mut self) {
        self.rows = self.table.view(&self.records, &self.columns);
        self.curser_row = self.curser_row.min(self.rows.len().saturating_sub(1));
        self.curser_column = self
            .curser_column
            .min(self.columns.len().saturating_sub(1));
        self.offset_row = self.offset_row.min(self.curser_row);
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn current_record(&self) -> Option<&Record> {
        self.rows.get(self.curser_row).map(|&idx| &self.records[idx])
    }

    pub fn current_column(&self) -> Option<&Column> {
        self.columns.get(self.curser_column)
    }

    fn scroll_into_view(&mut self, height: usize) {
        let height = height.max(1);
        if self.curser_row < self.offset_row {
            self.offset_row = self.curser_row;
        } else if self.curser_row >= self.offset_row + height {
            self.offset_row = self.curser_row + 1 - height;
        }
    }

    fn move_up(&mut self, size: usize, height: usize) {
        self.curser_row = self.curser_row.saturating_sub(size);
        self.scroll_into_view(height);
    }

    fn move_down(&mut self, size: usize, height: usize) {
        if self.rows.is_empty() {
            return;
        }
        self.curser_row = std::cmp::min(self.curser_row + size, self.rows.len() - 1);
        self.scroll_into_view(height);
    }

    fn move_beginning(&mut self) {
        self.curser_row = 0;
        self.offset_row = 0;
    }

    fn move_end(&mut self, height: usize) {
        self.curser_row = self.rows.len().saturating_sub(1);
        self.scroll_into_view(height);
    }

    fn move_left(&mut self) {
        self.curser_column = self.curser_column.saturating_sub(1);
    }

    fn move_right(&mut self) {
        if self.curser_column + 1 < self.columns.len() {
            self.curser_column += 1;
        }
    }
}

pub struct PageState {
    pub tabs: Vec<Tab>,
    pub active_tab: usize,
    insurer: usize,
    insurers: &'static [Insurer],
    pub range: DateRange,
    pub days: u32,
    loaded: bool,
}

impl PageState {
    fn new(page: Page, today: NaiveDate) -> Self {
        let insurers: &'static [Insurer] = match page {
            Page::Cobranza => &COBRANZA_INSURERS,
            Page::Renovaciones => &[Insurer::Metlife],
            Page::Cartera => &CARTERA_INSURERS,
            Page::Dashboards => &DASHBOARD_INSURERS,
            _ => &[],
        };
        let range = match page {
            Page::Dashboards => DateRange::default_around(today),
            _ => DateRange::default(),
        };
        let mut state = PageState {
            tabs: Vec::new(),
            active_tab: 0,
            insurer: 0,
            insurers,
            range,
            days: RENEWAL_WINDOWS[0],
            loaded: false,
        };
        state.tabs = build_tabs(page, state.insurer());
        state
    }

    pub fn insurer(&self) -> Insurer {
        self.insurers
            .get(self.insurer)
            .copied()
            .unwrap_or(Insurer::Metlife)
    }

    pub fn insurers(&self) -> &'static [Insurer] {
        self.insurers
    }

    pub fn active(&self) -> Option<&Tab> {
        self.tabs.get(self.active_tab)
    }
}

fn ramo_tabs(source: Source, prefix: &str, columns: impl Fn(Ramo) -> Vec<Column>) -> Vec<Tab> {
    crate::reports::RAMOS
        .iter()
        .map(|&ramo| {
            Tab::new(
                ramo.label(),
                ramo,
                source,
                format!("{prefix}_{}", ramo.code()),
                columns(ramo),
            )
        })
        .collect()
}

/// Tabs a page shows for `insurer`.
fn build_tabs(page: Page, insurer: Insurer) -> Vec<Tab> {
    match page {
        Page::Cobranza if insurer.has_ramos() => {
            ramo_tabs(Source::Cobranza, "Cobranza_Metlife", |r| cobranza_columns(insurer, r))
        }
        Page::Cobranza => vec![Tab::new(
            insurer.label(),
            Ramo::Vida,
            Source::Cobranza,
            format!("Cobranza_{}", insurer.api_name()),
            cobranza_columns(insurer, Ramo::Vida),
        )],
        Page::Renovaciones => ramo_tabs(Source::Renewals, "Renovaciones", renovaciones_columns),
        Page::Cartera if insurer.has_ramos() => {
            ramo_tabs(Source::Cartera, "Cartera_Metlife", |r| cartera_columns(insurer, r))
        }
        Page::Cartera => vec![Tab::new(
            insurer.label(),
            Ramo::Vida,
            Source::Cartera,
            format!("Cartera_{}", insurer.api_name()),
            cartera_columns(insurer, Ramo::Vida),
        )],
        Page::Clientes => vec![Tab::new(
            "Clientes",
            Ramo::Vida,
            Source::Clients,
            "Clientes",
            clientes_columns(),
        )],
        Page::Dashboards if insurer.has_ramos() => {
            ramo_tabs(Source::Dashboard, "Dashboard_Metlife", |_| Vec::new())
        }
        Page::Dashboards => vec![Tab::new(
            insurer.label(),
            Ramo::Vida,
            Source::Dashboard,
            format!("Dashboard_{}", insurer.api_name()),
            Vec::new(),
        )],
        Page::Archivo => vec![Tab::new("Archivo", Ramo::Vida, Source::File, "Archivo", Vec::new())],
        Page::Inicio | Page::Login => Vec::new(),
    }
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let table_height = ui_height
            .saturating_sub(CMDLINE_HEIGH)
            .saturating_sub(TABLE_HEADER_HEIGHT)
            .saturating_sub(PAGE_HEADER_HEIGHT);
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_height,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model {
    config: AppConfig,
    backend: Box<dyn Backend>,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    page: Page,
    history: Vec<Page>,
    pending: Option<Page>,
    pages: HashMap<Page, PageState>,
    clients: Vec<Cliente>,
    quick_search: String,
    session: Option<Session>,
    file: Option<(PathBuf, Option<String>)>,
    today: NaiveDate,
    uilayout: UILayout,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    popup_message: String,
    status_message: String,
    last_status_message_update: Instant,
}

impl Model {
    pub fn init(
        config: &AppConfig,
        backend: Box<dyn Backend>,
        today: NaiveDate,
        ui_width: usize,
        ui_height: usize,
    ) -> Result<Self, CrmError> {
        let clipboard = Clipboard::new()
            .map_err(|e| warn!("Clipboard not available: {e}"))
            .ok();
        let pages = [
            Page::Cobranza,
            Page::Renovaciones,
            Page::Cartera,
            Page::Clientes,
            Page::Dashboards,
            Page::Archivo,
        ]
        .into_iter()
        .map(|p| (p, PageState::new(p, today)))
        .collect();

        let mut model = Self {
            config: config.clone(),
            backend,
            status: Status::READY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            page: Page::Inicio,
            history: Vec::new(),
            pending: None,
            pages,
            clients: Vec::new(),
            quick_search: String::new(),
            session: Session::load(&config.session_file, Utc::now()),
            file: None,
            today,
            uilayout: UILayout::from_values(ui_width, ui_height),
            clipboard,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            popup_message: String::new(),
            status_message: "Bienvenido a crmtv".to_string(),
            last_status_message_update: Instant::now(),
        };
        model.go_to(Page::Inicio, false);
        Ok(model)
    }

    // ------------------------------ Accessors ------------------------------ //

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn page_state(&self) -> Option<&PageState> {
        self.pages.get(&self.page)
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.page_state().and_then(|s| s.active())
    }

    fn active_tab_mut(&mut self) -> Option<&mut Tab> {
        self.pages
            .get_mut(&self.page)
            .and_then(|s| s.tabs.get_mut(s.active_tab))
    }

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::CMDINPUT
    }

    pub fn cmdinput(&self) -> Option<&InputResult> {
        self.raw_keyevents().then_some(&self.last_input)
    }

    pub fn popup(&self) -> Option<&str> {
        (self.modus == Modus::POPUP).then_some(self.popup_message.as_str())
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn last_status_message_update(&self) -> Instant {
        self.last_status_message_update
    }

    pub fn user(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.auth_token.as_str())
    }

    pub fn quick_search(&self) -> &str {
        &self.quick_search
    }

    pub fn max_column_width(&self) -> usize {
        self.config.max_column_width
    }

    /// Renewal rows due within a week get highlighted.
    pub fn is_due_soon(&self, record: &Record) -> bool {
        self.page == Page::Renovaciones
            && parse_excel_date(record.value(RENEWAL_DATE_FIELD))
                .is_some_and(|d| is_upcoming(d, DUE_SOON_DAYS, self.today))
    }

    /// Title and monthly commission totals for the dashboard tab on screen.
    pub fn chart(&self) -> Option<(String, Vec<MonthlyTotal>)> {
        if self.page != Page::Dashboards {
            return None;
        }
        let state = self.page_state()?;
        let tab = state.active()?;
        let insurer = state.insurer();
        let (date_key, value_key) = chart_source(insurer, tab.ramo)?;
        Some((
            chart_title(insurer, tab.ramo),
            monthly_totals(&tab.records, date_key, value_key),
        ))
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
        debug!("Status: {}", self.status_message);
    }

    fn report_error(&mut self, err: impl std::fmt::Display) {
        error!("{err}");
        self.set_status_message(err.to_string());
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
        let table_height = self.uilayout.table_height;
        if let Some(tab) = self.active_tab_mut() {
            tab.scroll_into_view(table_height);
        }
    }

    // ------------------------------ Update loop ---------------------------- //

    pub fn update(&mut self, message: Message) -> Result<(), CrmError> {
        trace!("Update: Modus {:?}, Message {:?}", self.modus, message);
        let height = self.uilayout.table_height;
        match self.modus {
            Modus::TABLE => match message {
                Message::Quit => self.quit(),
                Message::Exit => self.back(),
                Message::MoveDown => self.with_tab(|t| t.move_down(1, height)),
                Message::MoveUp => self.with_tab(|t| t.move_up(1, height)),
                Message::MoveLeft => self.with_tab(Tab::move_left),
                Message::MoveRight => self.with_tab(Tab::move_right),
                Message::MovePageUp => self.with_tab(|t| t.move_up(height.max(1), height)),
                Message::MovePageDown => self.with_tab(|t| t.move_down(height.max(1), height)),
                Message::MoveBeginning => self.with_tab(Tab::move_beginning),
                Message::MoveEnd => self.with_tab(|t| t.move_end(height)),
                Message::Sort => self.sort_current_column(),
                Message::Filter => self.start_filter(),
                Message::ClearFilters => self.clear_filters(),
                Message::NextTab => self.switch_tab(1),
                Message::PrevTab => self.switch_tab(-1),
                Message::NextInsurer => self.switch_insurer(1),
                Message::PrevInsurer => self.switch_insurer(-1),
                Message::CycleWindow => self.cycle_window(),
                Message::DeleteClient => self.start_delete_client(),
                Message::EditDateRange => self.start_date_range(),
                Message::ResetDateRange => self.reset_date_range(),
                Message::Export => self.export(),
                Message::Reload => self.reload(),
                Message::NewClient => self.start_client_form(None),
                Message::SendEmail => self.start_send_email(),
                Message::Search => self.start_search(),
                Message::OpenFile => self.enter_cmd_mode(CMDMode::OpenFile, ""),
                Message::CopyCell => self.copy_table_cell(),
                Message::Enter => self.enter(),
                Message::GoTo(page) => self.go_to(page, true),
                Message::Logout => self.logout(),
                Message::Help => self.show_help(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::RawKey(_) => (),
            },
            Modus::POPUP => match message {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit | Message::Enter | Message::Help => self.close_popup(),
                _ => (),
            },
            Modus::CMDINPUT => match message {
                Message::RawKey(key) => self.raw_input(key),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
        }
        Ok(())
    }

    fn with_tab(&mut self, f: impl FnOnce(&mut Tab)) {
        if let Some(tab) = self.active_tab_mut() {
            f(tab);
        }
    }

    // ------------------------------ Navigation ----------------------------- //

    /// Every page change passes the auth gate.
    fn go_to(&mut self, target: Page, remember: bool) {
        let now = Utc::now();
        self.session = self.session.take().filter(|s| !s.is_expired(now));
        let token = self.session.as_ref().map(|s| s.auth_token.as_str());

        let destination = match gate(target.path(), token) {
            GateDecision::Next => target,
            GateDecision::Redirect(path) => {
                debug!("Gate redirects {} to {path}", target.path());
                if path == LOGIN_PATH {
                    self.pending = Some(target);
                }
                Page::from_path(path).unwrap_or(Page::Inicio)
            }
        };

        if remember && destination != self.page && ![destination, self.page].contains(&Page::Login)
        {
            self.history.push(self.page);
        }
        self.page = destination;
        info!("Showing {}", destination.title());

        if destination != Page::Login
            && matches!(self.cmd_mode, Some(CMDMode::Username | CMDMode::Password { .. }))
        {
            self.cmd_mode = None;
            self.modus = Modus::TABLE;
        }

        match destination {
            Page::Login => self.start_login(),
            page => {
                let needs_load = self.pages.get(&page).is_some_and(|s| !s.loaded);
                if needs_load {
                    self.load_page(page);
                }
            }
        }
    }

    fn back(&mut self) {
        match self.history.pop() {
            Some(page) => self.go_to(page, false),
            None => trace!("Nothing to go back to"),
        }
    }

    fn switch_tab(&mut self, step: isize) {
        if let Some(state) = self.pages.get_mut(&self.page) {
            let n = state.tabs.len() as isize;
            if n > 1 {
                state.active_tab = (state.active_tab as isize + step).rem_euclid(n) as usize;
            }
        }
    }

    fn switch_insurer(&mut self, step: isize) {
        let page = self.page;
        let Some(state) = self.pages.get_mut(&page) else {
            return;
        };
        let n = state.insurers.len() as isize;
        if n < 2 {
            return;
        }
        state.insurer = (state.insurer as isize + step).rem_euclid(n) as usize;
        state.tabs = build_tabs(page, state.insurer());
        state.active_tab = 0;
        let label = state.insurer().label();
        self.set_status_message(format!("Aseguradora: {label}"));
        self.load_page(page);
    }

    fn cycle_window(&mut self) {
        if self.page != Page::Renovaciones {
            return;
        }
        if let Some(state) = self.pages.get_mut(&Page::Renovaciones) {
            let pos = RENEWAL_WINDOWS
                .iter()
                .position(|d| *d == state.days)
                .unwrap_or(0);
            state.days = RENEWAL_WINDOWS[(pos + 1) % RENEWAL_WINDOWS.len()];
        }
        self.load_page(Page::Renovaciones);
    }

    fn reset_date_range(&mut self) {
        let today = self.today;
        let page = self.page;
        let Some(state) = self.pages.get_mut(&page) else {
            return;
        };
        state.range = match page {
            Page::Dashboards => DateRange::default_around(today),
            Page::Cobranza => DateRange::default(),
            _ => return,
        };
        self.load_page(page);
    }

    fn reload(&mut self) {
        let page = self.page;
        if self.pages.contains_key(&page) {
            self.load_page(page);
        }
    }

    fn logout(&mut self) {
        if let Err(e) = Session::clear(&self.config.session_file) {
            self.report_error(e);
        }
        self.session = None;
        self.history.clear();
        self.set_status_message("Sesión cerrada");
        self.go_to(Page::Inicio, false);
    }

    // ------------------------------ Data loading --------------------------- //

    fn filtered_clients(&self) -> Vec<Record> {
        let term = self.quick_search.to_lowercase();
        self.clients
            .iter()
            .filter(|c| {
                term.is_empty()
                    || c.nombre.to_lowercase().contains(&term)
                    || c.correo
                        .as_deref()
                        .is_some_and(|m| m.to_lowercase().contains(&term))
            })
            .map(Cliente::to_record)
            .collect()
    }

    /// Fresh records for a tab, `None` when the source can not be refetched.
    fn fetch(
        &mut self,
        source: Source,
        ramo: Ramo,
        insurer: Insurer,
        range: DateRange,
        days: u32,
    ) -> Result<Option<Vec<Record>>, CrmError> {
        let records = match source {
            Source::Cobranza | Source::Dashboard => self.backend.cobranza(ramo, insurer, range)?,
            Source::Renewals => self.backend.upcoming_renewals(days, Some(ramo), insurer)?,
            Source::Cartera => self.backend.cartera(insurer, ramo)?,
            Source::Clients => {
                self.clients = self.backend.clients()?;
                self.filtered_clients()
            }
            Source::File => match &self.file {
                Some((path, sheet)) => loader::load_file(path.clone(), sheet.as_deref())?.records,
                None => return Ok(None),
            },
            Source::Search => return Ok(None),
        };
        Ok(Some(records))
    }

    fn load_page(&mut self, page: Page) {
        let Some(state) = self.pages.get(&page) else {
            return;
        };
        let insurer = state.insurer();
        let range = state.range;
        let days = state.days;
        let requests: Vec<(Source, Ramo)> = state.tabs.iter().map(|t| (t.source, t.ramo)).collect();

        let start_time = Instant::now();
        let results: Vec<Result<Option<Vec<Record>>, CrmError>> = requests
            .into_iter()
            .map(|(source, ramo)| self.fetch(source, ramo, insurer, range, days))
            .collect();

        let mut failure = None;
        let mut total = 0;
        if let Some(state) = self.pages.get_mut(&page) {
            for (tab, result) in state.tabs.iter_mut().zip(results) {
                match result {
                    Ok(Some(records)) => {
                        total += records.len();
                        tab.set_records(records);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("Loading {} failed: {e}", tab.label);
                        failure = Some(e);
                    }
                }
            }
            state.loaded = true;
        }
        info!(
            "Loaded {} records for {} in {}ms",
            total,
            page.title(),
            start_time.elapsed().as_millis()
        );

        match failure {
            Some(e) => self.set_status_message(e.to_string()),
            None => self.set_status_message(format!("{}: {total} registros", page.title())),
        }
    }

    fn show_clients(&mut self) {
        let records = self.filtered_clients();
        if let Some(tab) = self
            .pages
            .get_mut(&Page::Clientes)
            .and_then(|s| s.tabs.first_mut())
        {
            tab.set_records(records);
        }
    }

    fn open_file(&mut self, spec: &str) {
        // `path#sheet` picks a workbook sheet.
        let (path, sheet) = match spec.rsplit_once('#') {
            Some((p, s)) if !s.is_empty() => (p, Some(s.to_string())),
            _ => (spec, None),
        };
        let path = match shellexpand::full(path.trim()) {
            Ok(p) => PathBuf::from(p.as_ref()),
            Err(e) => {
                self.report_error(e);
                return;
            }
        };
        match loader::load_file(path.clone(), sheet.as_deref()) {
            Ok(loaded) => {
                let count = loaded.records.len();
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("Archivo")
                    .to_string();
                if let Some(state) = self.pages.get_mut(&Page::Archivo) {
                    let mut tab =
                        Tab::new(loaded.name.clone(), Ramo::Vida, Source::File, stem, Vec::new());
                    tab.set_records(loaded.records);
                    state.tabs = vec![tab];
                    state.active_tab = 0;
                    state.loaded = true;
                }
                self.file = Some((path, sheet));
                self.set_status_message(format!("{}: {count} registros", loaded.name));
                self.go_to(Page::Archivo, true);
            }
            Err(e) => self.report_error(e),
        }
    }

    /// Open a local report at startup.
    pub fn load_data_file(&mut self, spec: &str) {
        self.open_file(spec);
    }

    // ------------------------------ Table actions -------------------------- //

    fn sort_current_column(&mut self) {
        let Some(tab) = self.active_tab_mut() else {
            return;
        };
        let Some(column) = tab.columns.get(tab.curser_column) else {
            return;
        };
        let message = if tab.table.toggle_sort(column) {
            let label = tab.table.header_label(column);
            tab.refresh();
            format!("Orden: {label}")
        } else {
            format!("La columna {} no se puede ordenar", column.header)
        };
        self.set_status_message(message);
    }

    fn start_filter(&mut self) {
        let Some(tab) = self.active_tab() else {
            return;
        };
        let Some(column) = tab.current_column() else {
            return;
        };
        let key = column.key().to_string();
        let current = tab.table.filter(&key).to_string();
        self.enter_cmd_mode(CMDMode::Filter { key }, &current);
    }

    fn clear_filters(&mut self) {
        self.with_tab(|t| {
            t.table.clear_filters();
            t.refresh();
        });
        self.set_status_message("Filtros eliminados");
    }

    fn copy_to_clipboard(&mut self, text: String) {
        let result = match self.clipboard.as_mut() {
            Some(clipboard) => clipboard.set_text(text.clone()).map_err(|e| e.to_string()),
            None => Err("Portapapeles no disponible".to_string()),
        };
        match result {
            Ok(_) => {
                trace!("Copied to clipboard.");
                self.set_status_message(format!("Copiado: {text}"));
            }
            Err(e) => {
                warn!("Error copying to clipboard: {e}");
                self.set_status_message(format!("{e} ({text})"));
            }
        }
    }

    fn copy_table_cell(&mut self) {
        let cell = self.active_tab().and_then(|tab| {
            let record = tab.current_record()?;
            Some(tab.current_column()?.display(record).label())
        });
        if let Some(text) = cell {
            self.copy_to_clipboard(text);
        }
    }

    fn enter(&mut self) {
        if self.page == Page::Login {
            self.start_login();
            return;
        }
        let Some(tab) = self.active_tab() else {
            return;
        };
        let mut selected: Option<Record> = None;
        let on_select: &mut dyn FnMut(&Record) = &mut |r: &Record| selected = Some(r.clone());
        let activation = tab.table.activate(
            &tab.records,
            &tab.columns,
            tab.curser_row,
            tab.curser_column,
            Some(on_select),
        );
        match activation {
            Activation::Link(target) => self.copy_to_clipboard(target),
            Activation::Row(index) => {
                trace!("Selected record {index}");
                if let Some(record) = selected {
                    self.select_row(record);
                }
            }
            Activation::Nothing => {}
        }
    }

    fn select_row(&mut self, record: Record) {
        match self.page {
            Page::Renovaciones => {
                let poliza = record.text("poliza");
                self.enter_cmd_mode(CMDMode::EditStatus { poliza }, &record.text("estatus"));
            }
            Page::Clientes => self.start_client_form(Some(Cliente::from_record(&record))),
            _ => {
                let width = record.keys().map(|k| k.chars().count()).max().unwrap_or(0);
                let lines: Vec<String> = record
                    .iter()
                    .map(|(k, v)| format!("{k:<width$}  {}", v.to_text()))
                    .collect();
                self.show_popup(lines.join("\n"));
            }
        }
    }

    fn export(&mut self) {
        let Some(tab) = self.active_tab() else {
            self.set_status_message("Nada que exportar");
            return;
        };
        // Exports ignore the table filters.
        let records: Vec<Record> = if tab.source == Source::Clients {
            self.clients.iter().map(Cliente::to_record).collect()
        } else {
            tab.records.clone()
        };
        let name = export_file_name(&tab.export_prefix, self.today);
        match excel::export_records(&self.config.export_dir, &name, &records) {
            Ok(path) => self.set_status_message(format!("Exportado: {}", path.display())),
            Err(e) => self.report_error(e),
        }
    }

    // ------------------------------ Popups & prompts ----------------------- //

    fn show_popup(&mut self, message: impl Into<String>) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.popup_message = message.into();
    }

    fn show_help(&mut self) {
        self.show_popup(HELP_TEXT);
    }

    fn close_popup(&mut self) {
        trace!("Close popup ...");
        self.modus = self.previous_modus;
        self.previous_modus = Modus::POPUP;
        self.popup_message.clear();
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode, prefill: &str) {
        trace!("Entering command mode {:?}", mode);
        self.previous_modus = Modus::TABLE;
        self.modus = Modus::CMDINPUT;
        self.input.start(mode.prompt(), prefill, mode.is_secret());
        self.last_input = self.input.get();
        self.cmd_mode = Some(mode);
    }

    fn raw_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.modus = self.previous_modus;
            self.previous_modus = Modus::CMDINPUT;
            let mode = self.cmd_mode.take();
            if self.last_input.canceled {
                trace!("Canceled {:?}", mode);
                self.set_status_message("Cancelado");
            } else if let Some(mode) = mode {
                let input = self.last_input.input.clone();
                self.handle_cmd_input(mode, input);
            }
        }
    }

    fn handle_cmd_input(&mut self, mode: CMDMode, input: String) {
        trace!("Handle cmd input {:?}", mode);
        match mode {
            CMDMode::Filter { key } => {
                self.with_tab(|t| {
                    match input.trim() {
                        "" => t.table.clear_filter(&key),
                        text => t.table.set_filter(key, text),
                    }
                    t.curser_row = 0;
                    t.offset_row = 0;
                    t.refresh();
                });
            }
            CMDMode::DateRange => match DateRange::parse(&input) {
                Some(range) => {
                    let page = self.page;
                    if let Some(state) = self.pages.get_mut(&page) {
                        state.range = range;
                    }
                    self.load_page(page);
                }
                None => self.set_status_message(format!("Rango inválido: {input}")),
            },
            CMDMode::Search => self.search(input.trim()),
            CMDMode::EditStatus { poliza } => self.update_status(&poliza, input.trim()),
            CMDMode::SendEmail { poliza, contratante } => {
                self.send_email(&poliza, &contratante, input.trim())
            }
            CMDMode::ClientForm {
                original,
                field,
                mut values,
            } => {
                values.push(input.trim().to_string());
                self.continue_client_form(original, field, values);
            }
            CMDMode::ConfirmDelete { nombre } => {
                if matches!(input.trim().to_lowercase().as_str(), "s" | "si" | "sí" | "y") {
                    self.delete_client(&nombre);
                } else {
                    self.set_status_message("Cancelado");
                }
            }
            CMDMode::Username => {
                let username = input.trim().to_string();
                self.enter_cmd_mode(CMDMode::Password { username }, "");
            }
            CMDMode::Password { username } => self.login(&username, &input),
            CMDMode::OpenFile => self.open_file(input.trim()),
        }
    }

    fn start_login(&mut self) {
        if !self.raw_keyevents() {
            self.enter_cmd_mode(CMDMode::Username, "");
        }
    }

    fn login(&mut self, username: &str, password: &str) {
        match self.backend.login(username, password) {
            Ok(()) => {
                let session = Session::start(username, Utc::now());
                if let Err(e) = session.save(&self.config.session_file) {
                    warn!("Session not persisted: {e}");
                }
                self.session = Some(session);
                info!("Logged in as {username}");
                self.set_status_message(format!("Bienvenido, {username}"));
                let target = self.pending.take().unwrap_or(Page::Inicio);
                self.go_to(target, false);
            }
            Err(e) => {
                warn!("Login failed: {e}");
                self.set_status_message(LOGIN_FAILED);
                self.start_login();
            }
        }
    }

    fn start_date_range(&mut self) {
        if let Some(state) = self.page_state() {
            if matches!(self.page, Page::Cobranza | Page::Dashboards) {
                let current = state.range.label();
                self.enter_cmd_mode(CMDMode::DateRange, &current);
            }
        }
    }

    fn start_search(&mut self) {
        match self.page {
            Page::Clientes => {
                let current = self.quick_search.clone();
                self.enter_cmd_mode(CMDMode::Search, &current);
            }
            Page::Cartera => self.enter_cmd_mode(CMDMode::Search, ""),
            _ => {}
        }
    }

    fn search(&mut self, query: &str) {
        match self.page {
            Page::Clientes => {
                self.quick_search = query.to_string();
                self.show_clients();
            }
            Page::Cartera => match self.backend.search_cartera(query) {
                Ok(profiles) => {
                    let records: Vec<Record> =
                        profiles.iter().flat_map(|p| p.to_records()).collect();
                    let count = records.len();
                    if let Some(state) = self.pages.get_mut(&Page::Cartera) {
                        state.tabs.retain(|t| t.source != Source::Search);
                        let mut tab = Tab::new(
                            "Búsqueda",
                            Ramo::Vida,
                            Source::Search,
                            "Cartera_Busqueda",
                            cartera_search_columns(),
                        );
                        tab.set_records(records);
                        state.tabs.push(tab);
                        state.active_tab = state.tabs.len() - 1;
                    }
                    self.set_status_message(format!("{count} resultados para \"{query}\""));
                }
                Err(e) => self.report_error(e),
            },
            _ => {}
        }
    }

    fn update_status(&mut self, poliza: &str, estatus: &str) {
        let insurer = self
            .pages
            .get(&Page::Renovaciones)
            .map(|s| s.insurer())
            .unwrap_or(Insurer::Metlife);
        match self.backend.update_renewal_status(poliza, insurer, estatus) {
            Ok(()) => {
                self.load_page(Page::Renovaciones);
                self.set_status_message(format!("Estatus de {poliza} actualizado"));
            }
            Err(e) => self.report_error(e),
        }
    }

    fn start_send_email(&mut self) {
        if self.page != Page::Renovaciones {
            return;
        }
        let Some(record) = self.active_tab().and_then(|t| t.current_record()) else {
            return;
        };
        let poliza = record.text("poliza");
        let contratante = record.text("contratante");
        let correo = match self.backend.client_email(&contratante) {
            Ok(email) => email.unwrap_or_default(),
            Err(e) => {
                warn!("Email lookup failed: {e}");
                String::new()
            }
        };
        self.enter_cmd_mode(CMDMode::SendEmail { poliza, contratante }, &correo);
    }

    fn send_email(&mut self, poliza: &str, contratante: &str, correo: &str) {
        if correo.is_empty() {
            self.set_status_message("Se requiere un correo");
            return;
        }
        match self.backend.send_renewal_email(poliza, contratante, correo) {
            Ok(()) => self.set_status_message(format!("Correo enviado a {correo}")),
            Err(e) => self.report_error(e),
        }
    }

    fn client_value(client: Option<&Cliente>, field: ClientField) -> String {
        let Some(client) = client else {
            return String::new();
        };
        match field {
            ClientField::Nombre => client.nombre.clone(),
            ClientField::Correo => client.correo.clone().unwrap_or_default(),
            ClientField::Telefono => client.telefono.clone().unwrap_or_default(),
        }
    }

    fn start_client_form(&mut self, client: Option<Cliente>) {
        if self.page != Page::Clientes {
            return;
        }
        let prefill = Self::client_value(client.as_ref(), ClientField::Nombre);
        let mode = CMDMode::ClientForm {
            original: client.map(|c| c.nombre),
            field: ClientField::Nombre,
            values: Vec::new(),
        };
        self.enter_cmd_mode(mode, &prefill);
    }

    fn continue_client_form(
        &mut self,
        original: Option<String>,
        field: ClientField,
        values: Vec<String>,
    ) {
        if field == ClientField::Nombre && values.first().is_none_or(|n| n.is_empty()) {
            self.set_status_message("El nombre es obligatorio");
            return;
        }
        if let Some(next) = field.next() {
            let existing = original
                .as_deref()
                .and_then(|o| self.clients.iter().find(|c| c.nombre == o));
            let prefill = Self::client_value(existing, next);
            self.enter_cmd_mode(
                CMDMode::ClientForm {
                    original,
                    field: next,
                    values,
                },
                &prefill,
            );
            return;
        }

        let optional = |i: usize| values.get(i).filter(|v| !v.is_empty()).cloned();
        let client = Cliente {
            nombre: values[0].clone(),
            correo: optional(1),
            telefono: optional(2),
        };
        let result = match &original {
            Some(name) => self.backend.update_client(name, &client),
            None => self.backend.add_client(&client).map(|_| ()),
        };
        match result {
            Ok(()) => {
                self.load_page(Page::Clientes);
                let verb = if original.is_some() { "actualizado" } else { "agregado" };
                self.set_status_message(format!("Cliente {} {verb}", client.nombre));
            }
            Err(e) => self.report_error(e),
        }
    }

    fn start_delete_client(&mut self) {
        if self.page != Page::Clientes {
            return;
        }
        if let Some(nombre) = self
            .active_tab()
            .and_then(|t| t.current_record())
            .map(|r| r.text("nombre"))
        {
            self.enter_cmd_mode(CMDMode::ConfirmDelete { nombre }, "");
        }
    }

    fn delete_client(&mut self, nombre: &str) {
        match self.backend.delete_client(nombre) {
            Ok(()) => {
                self.load_page(Page::Clientes);
                self.set_status_message(format!("Cliente {nombre} eliminado"));
            }
            Err(e) => self.report_error(e),
        }
    }
}
