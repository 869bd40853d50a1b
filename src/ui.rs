use std::ops::Range;
use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{
        Bar, BarChart, BarGroup, Block, Cell, Clear, Paragraph, Row, Scrollbar,
        ScrollbarOrientation, ScrollbarState, Table, Tabs, Wrap,
    },
};

use crate::dashboard::{NO_CHART_DATA, thousands_label};
use crate::datatable::{Cell as GridCell, TableBody};
use crate::domain::{AppConfig, MENU, Page};
use crate::format::money_mxn;
use crate::model::{Model, PageState, Tab};

pub const CMDLINE_HEIGH: usize = 1;
pub const PAGE_HEADER_HEIGHT: usize = 2; // Title and tab bar
pub const TABLE_HEADER_HEIGHT: usize = 2; // Column names and active filters
pub const SCROLLBAR_WIDTH: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;

const ELLIPSIS: char = '…';
const STATUS_FADE: Duration = Duration::from_secs(8);

pub struct CrmUI {
    max_column_width: usize,
}

impl CrmUI {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            max_column_width: cfg.max_column_width,
        }
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let [title_area, tabs_area, body_area, cmd_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(CMDLINE_HEIGH as u16),
        ])
        .areas(frame.area());

        self.draw_title(model, frame, title_area);
        match model.page() {
            Page::Inicio => self.draw_home(model, frame, body_area),
            Page::Login => self.draw_login(frame, body_area),
            Page::Dashboards => {
                self.draw_tabs(model, frame, tabs_area);
                let [chart_area, table_area] =
                    Layout::vertical([Constraint::Percentage(60), Constraint::Percentage(40)])
                        .areas(body_area);
                self.draw_chart(model, frame, chart_area);
                self.draw_table(model, frame, table_area);
            }
            _ => {
                self.draw_tabs(model, frame, tabs_area);
                self.draw_table(model, frame, body_area);
            }
        }
        self.draw_cmdline(model, frame, cmd_area);

        if let Some(message) = model.popup() {
            self.draw_popup(message, frame);
        }
    }

    fn draw_title(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let user = match model.user() {
            Some(user) => format!(" {user} "),
            None => " sin sesión ".to_string(),
        };
        let [left, right] = Layout::horizontal([
            Constraint::Min(0),
            Constraint::Length(user.chars().count() as u16),
        ])
        .areas(area);
        let title = Line::from(vec![
            " crmtv ".bold().reversed(),
            " ".into(),
            model.page().title().bold(),
        ]);
        frame.render_widget(Paragraph::new(title), left);
        frame.render_widget(Paragraph::new(user.yellow()), right);
    }

    fn draw_tabs(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let Some(state) = model.page_state() else {
            return;
        };
        let context = page_context(model.page(), state);
        let [tabs_area, context_area] = Layout::horizontal([
            Constraint::Min(0),
            Constraint::Length(context.chars().count() as u16),
        ])
        .areas(area);

        let titles: Vec<Line> = state.tabs.iter().map(|t| Line::from(t.label.clone())).collect();
        let tabs = Tabs::new(titles)
            .select(state.active_tab)
            .highlight_style(Style::default().fg(Color::Cyan).bold().underlined())
            .divider("|");
        frame.render_widget(tabs, tabs_area);
        frame.render_widget(Paragraph::new(context.blue()), context_area);
    }

    fn draw_home(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let mut lines = vec![
            Line::from("Bienvenido".bold()),
            Line::from(""),
        ];
        lines.extend(MENU.iter().enumerate().skip(1).map(|(i, page)| {
            Line::from(vec![
                format!(" {} ", i + 1).blue().bold(),
                format!(" {}", page.title()).into(),
            ])
        }));
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            " o ".blue().bold(),
            " abrir archivo local   ".into(),
            " ? ".blue().bold(),
            " ayuda".into(),
        ]));
        let block = Block::bordered()
            .title(Line::from(" Inicio ".bold()).centered())
            .border_set(border::THICK);
        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
    }

    fn draw_login(&self, frame: &mut Frame, area: Rect) {
        let block = Block::bordered()
            .title(Line::from(" Iniciar sesión ".bold()).centered())
            .border_set(border::THICK);
        let text = Text::from(vec![
            Line::from(""),
            Line::from("Ingrese su usuario y contraseña en la línea de comandos."),
            Line::from(vec![
                "Esc".blue().bold(),
                " para volver a intentar con ".into(),
                "Enter".blue().bold(),
            ]),
        ]);
        frame.render_widget(Paragraph::new(text).centered().block(block), area);
    }

    fn draw_chart(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let Some((title, totals)) = model.chart() else {
            return;
        };
        let mut block = Block::bordered().title(Line::from(format!(" {title} ").bold()));
        if totals.is_empty() {
            frame.render_widget(
                Paragraph::new(NO_CHART_DATA).centered().block(block),
                area,
            );
            return;
        }

        let sum: f64 = totals.iter().map(|t| t.total).sum();
        let max = totals.iter().map(|t| t.total).fold(0.0_f64, f64::max);
        block = block.title_bottom(
            Line::from(format!(
                " total {}  máx {} ",
                money_mxn(sum),
                thousands_label(max)
            ))
            .right_aligned(),
        );

        let bars: Vec<Bar> = totals
            .iter()
            .map(|t| {
                Bar::default()
                    .value(t.total.max(0.0).round() as u64)
                    .label(Line::from(t.month.clone()))
                    .text_value(thousands_label(t.total))
            })
            .collect();
        let inner_width = area.width.saturating_sub(2) as usize;
        let bar_width = (inner_width / totals.len().max(1)).saturating_sub(1).clamp(3, 12) as u16;
        let chart = BarChart::default()
            .block(block)
            .bar_width(bar_width)
            .bar_gap(1)
            .bar_style(Style::default().fg(Color::Cyan))
            .value_style(Style::default().fg(Color::Black).bg(Color::Cyan))
            .data(BarGroup::default().bars(&bars));
        frame.render_widget(chart, area);
    }

    fn draw_table(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let Some(tab) = model.active_tab() else {
            return;
        };
        let height = area.height.saturating_sub(TABLE_HEADER_HEIGHT as u16) as usize;
        let available = (area.width as usize).saturating_sub(SCROLLBAR_WIDTH);

        let visible_rows = visible_row_range(tab, height);
        let widths = column_widths(tab, visible_rows.clone(), self.max_column_width);
        let columns = visible_columns(&widths, tab.curser_column, available);

        let header = Row::new(columns.clone().map(|c| {
            let label = tab.table.header_label(&tab.columns[c]);
            let style = if c == tab.curser_column {
                Style::default().bold().underlined()
            } else {
                Style::default().bold()
            };
            Cell::from(fit(&label, widths[c])).style(style)
        }));
        let filters = Row::new(columns.clone().map(|c| {
            let text = tab.table.filter(tab.columns[c].key());
            let text = if text.is_empty() { String::new() } else { format!("/{text}") };
            Cell::from(fit(&text, widths[c]).dim().italic())
        }));

        if tab.rows().is_empty() {
            let message = match tab.table.body(&tab.records, &tab.columns) {
                TableBody::Empty { message, .. } => message,
                TableBody::Rows(_) => "",
            };
            let [head_area, empty_area] = Layout::vertical([
                Constraint::Length(TABLE_HEADER_HEIGHT as u16),
                Constraint::Min(0),
            ])
            .areas(area);
            let constraints: Vec<Constraint> =
                columns.map(|c| Constraint::Length(widths[c] as u16)).collect();
            frame.render_widget(Table::new(vec![filters], constraints).header(header), head_area);
            frame.render_widget(Paragraph::new(message.dim()).centered(), empty_area);
            return;
        }

        let rows: Vec<Row> = visible_rows
            .clone()
            .map(|view_row| {
                let record = &tab.records[tab.rows()[view_row]];
                let selected = view_row == tab.curser_row;
                let row_style = if model.is_due_soon(record) {
                    Style::default().fg(Color::Yellow)
                } else {
                    Style::default()
                };
                let cells = columns.clone().map(|c| {
                    let cell = tab.columns[c].display(record);
                    let mut style = match cell {
                        GridCell::Link { .. } => Style::default().fg(Color::Blue).underlined(),
                        GridCell::Number(_) => Style::default(),
                        GridCell::Text(_) => Style::default(),
                    };
                    if selected && c == tab.curser_column {
                        style = style.add_modifier(Modifier::REVERSED);
                    } else if selected {
                        style = style.add_modifier(Modifier::BOLD);
                    }
                    let text = fit(&cell.label(), widths[c]);
                    let cell = if matches!(cell, GridCell::Number(_)) {
                        Cell::from(Line::from(text).right_aligned())
                    } else {
                        Cell::from(text)
                    };
                    cell.style(style)
                });
                Row::new(cells).style(row_style)
            })
            .collect();

        let mut table_rows = vec![filters];
        table_rows.extend(rows);
        let constraints: Vec<Constraint> =
            columns.map(|c| Constraint::Length(widths[c] as u16)).collect();
        let table = Table::new(table_rows, constraints)
            .header(header)
            .column_spacing(0);
        frame.render_widget(table, area);

        let mut scrollbar_state = ScrollbarState::new(tab.rows().len())
            .position(tab.curser_row)
            .viewport_content_length(height);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area,
            &mut scrollbar_state,
        );
    }

    fn draw_cmdline(&self, model: &Model, frame: &mut Frame, area: Rect) {
        if let Some(input) = model.cmdinput() {
            let visible = input.visible_input();
            let line = Line::from(vec![input.prompt.clone().bold(), Span::raw(visible)]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x + (input.prompt.chars().count() + input.curser_pos) as u16;
            frame.set_cursor_position(Position::new(x.min(area.right().saturating_sub(1)), area.y));
            return;
        }

        let status = model.status_message().to_string();
        let mut left = if model.last_status_message_update().elapsed() > STATUS_FADE {
            vec![status.dim()]
        } else {
            vec![Span::raw(status)]
        };
        if model.page() == Page::Clientes && !model.quick_search().is_empty() {
            left.push(format!("  [buscar: {}]", model.quick_search()).yellow());
        }
        let hint = position_hint(model);
        let [status_area, hint_area] = Layout::horizontal([
            Constraint::Min(0),
            Constraint::Length(hint.chars().count() as u16),
        ])
        .areas(area);
        frame.render_widget(Paragraph::new(Line::from(left)), status_area);
        frame.render_widget(Paragraph::new(hint.dim()), hint_area);
    }

    fn draw_popup(&self, message: &str, frame: &mut Frame) {
        let area = popup_area(frame.area(), 70, 70);
        let block = Block::bordered()
            .title(Line::from(" crmtv ".bold()).centered())
            .title_bottom(Line::from(vec![" Cerrar ".into(), "<Esc> ".blue().bold()]).centered())
            .border_set(border::THICK);
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(message.to_string())
                .wrap(Wrap { trim: false })
                .block(block),
            area,
        );
    }
}

fn page_context(page: Page, state: &PageState) -> String {
    let mut parts = Vec::new();
    if state.insurers().len() > 1 {
        parts.push(format!("[{}]", state.insurer().label()));
    }
    match page {
        Page::Renovaciones => parts.push(format!("{} días", state.days)),
        Page::Cobranza | Page::Dashboards if state.range != Default::default() => {
            parts.push(state.range.label())
        }
        _ => {}
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" {} ", parts.join("  "))
    }
}

fn position_hint(model: &Model) -> String {
    match model.active_tab() {
        Some(tab) if !tab.rows().is_empty() => {
            let filtered = if tab.table.has_filters() { " filtrado" } else { "" };
            format!(
                " {}/{} ({}{filtered})  ? ayuda ",
                tab.curser_row + 1,
                tab.rows().len(),
                tab.records.len()
            )
        }
        _ => " ? ayuda ".to_string(),
    }
}

fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let [area] = Layout::vertical([Constraint::Percentage(percent_y)])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::horizontal([Constraint::Percentage(percent_x)])
        .flex(Flex::Center)
        .areas(area);
    area
}

fn visible_row_range(tab: &Tab, height: usize) -> Range<usize> {
    let start = tab.offset_row.min(tab.rows().len());
    start..(start + height).min(tab.rows().len())
}

/// Width of every column, sized to the header and the rows on screen.
fn column_widths(tab: &Tab, rows: Range<usize>, max_column_width: usize) -> Vec<usize> {
    tab.columns
        .iter()
        .map(|column| {
            let header = tab.table.header_label(column).chars().count();
            let filter = tab.table.filter(column.key()).chars().count() + 1;
            let content = rows
                .clone()
                .map(|r| {
                    column
                        .display(&tab.records[tab.rows()[r]])
                        .label()
                        .chars()
                        .count()
                })
                .max()
                .unwrap_or(0);
            (header.max(filter).max(content) + COLUMN_WIDTH_MARGIN).min(max_column_width.max(1))
        })
        .collect()
}

/// Columns that fit into `available`, always including `cursor`.
fn visible_columns(widths: &[usize], cursor: usize, available: usize) -> Range<usize> {
    if widths.is_empty() {
        return 0..0;
    }
    let cursor = cursor.min(widths.len() - 1);
    let mut start = cursor;
    let mut used = widths[cursor];
    while start > 0 && used + widths[start - 1] <= available {
        start -= 1;
        used += widths[start];
    }
    let mut end = cursor + 1;
    while end < widths.len() && used + widths[end] <= available {
        used += widths[end];
        end += 1;
    }
    start..end
}

// Truncate to `width` characters leaving room for the margin.
fn fit(text: &str, width: usize) -> String {
    let room = width.saturating_sub(COLUMN_WIDTH_MARGIN);
    if text.chars().count() <= room {
        return text.to_string();
    }
    let mut out: String = text.chars().take(room.saturating_sub(1)).collect();
    out.push(ELLIPSIS);
    out
}
