//! Generic sortable and filterable table state.
//!
//! A [`DataTable`] never owns the records it shows. Callers hand in the
//! record slice and the column set on every call and get back a derived view
//! (row indices into their slice), so the source order is never touched.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::record::{Record, Value};

pub const NO_DATA_MESSAGE: &str = "No hay datos disponibles";

/// What a cell shows after the accessor (or renderer) ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    /// Interactive element nested in a cell. Not usable as filter text.
    Link { label: String, target: String },
}

impl Cell {
    /// Filterable text, `None` for composite cells.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(crate::record::format_number(*n)),
            Cell::Link { .. } => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Cell::Link { label, .. } => label.clone(),
            other => other.as_text().unwrap_or_default(),
        }
    }
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) => Cell::Number(*n),
            other => Cell::Text(other.to_text()),
        }
    }
}

pub type Derivation = Arc<dyn Fn(&Record) -> Cell + Send + Sync>;

#[derive(Clone)]
pub enum Accessor {
    Field(String),
    Derive(Derivation),
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Field(name) => write!(f, "Field({name:?})"),
            Accessor::Derive(_) => f.write_str("Derive(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Column {
    pub header: String,
    pub accessor: Accessor,
    sortable: bool,
    renderer: Option<Accessor>,
}

impl Column {
    pub fn field(header: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            accessor: Accessor::Field(name.into()),
            sortable: true,
            renderer: None,
        }
    }

    pub fn derived<F>(header: impl Into<String>, derive: F) -> Self
    where
        F: Fn(&Record) -> Cell + Send + Sync + 'static,
    {
        Self {
            header: header.into(),
            accessor: Accessor::Derive(Arc::new(derive)),
            sortable: false,
            renderer: None,
        }
    }

    pub fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    /// Custom display for the cell. Filtering still uses the accessor.
    pub fn with_renderer<F>(mut self, render: F) -> Self
    where
        F: Fn(&Record) -> Cell + Send + Sync + 'static,
    {
        self.renderer = Some(Accessor::Derive(Arc::new(render)));
        self
    }

    /// Key under which filter and sort state is stored.
    pub fn key(&self) -> &str {
        match &self.accessor {
            Accessor::Field(name) => name,
            Accessor::Derive(_) => &self.header,
        }
    }

    pub fn is_sortable(&self) -> bool {
        self.sortable && matches!(self.accessor, Accessor::Field(_))
    }

    /// Value produced by the accessor, what filters see.
    pub fn value(&self, record: &Record) -> Cell {
        match &self.accessor {
            Accessor::Field(name) => Cell::from(record.value(name)),
            Accessor::Derive(derive) => derive(record),
        }
    }

    /// Value shown on screen.
    pub fn display(&self, record: &Record) -> Cell {
        match &self.renderer {
            Some(Accessor::Derive(render)) => render(record),
            _ => self.value(record),
        }
    }

    fn raw<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        match &self.accessor {
            Accessor::Field(name) => record.get(name).filter(|v| !v.is_null()),
            Accessor::Derive(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    Descending,
    #[default]
    Unsorted,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortState {
    key: Option<String>,
    direction: SortDirection,
}

impl SortState {
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    pub fn direction_of(&self, key: &str) -> SortDirection {
        match &self.key {
            Some(k) if k == key => self.direction,
            _ => SortDirection::Unsorted,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRow {
    /// Position of the record in the caller's slice.
    pub index: usize,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableBody {
    Empty { message: &'static str, span: usize },
    Rows(Vec<RenderedRow>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    Nothing,
    Link(String),
    Row(usize),
}

/// Transient filter and sort state of one table instance.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    filters: HashMap<String, String>,
    sort: SortState,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_filter(&mut self, key: impl Into<String>, text: impl Into<String>) {
        let key = key.into();
        let text = text.into();
        trace!("Filter {key:?} = {text:?}");
        if text.is_empty() {
            self.filters.remove(&key);
        } else {
            self.filters.insert(key, text);
        }
    }

    pub fn clear_filter(&mut self, key: &str) {
        self.filters.remove(key);
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    pub fn filter(&self, key: &str) -> &str {
        self.filters.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn has_filters(&self) -> bool {
        self.filters.values().any(|f| !f.is_empty())
    }

    pub fn sort_state(&self) -> &SortState {
        &self.sort
    }

    /// Cycle the sort of `column`. Returns false when the column can not be sorted.
    pub fn toggle_sort(&mut self, column: &Column) -> bool {
        if !column.is_sortable() {
            trace!("Column {:?} is not sortable", column.header);
            return false;
        }
        let key = column.key();
        let direction = match self.sort.direction_of(key) {
            SortDirection::Unsorted => SortDirection::Ascending,
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Unsorted,
        };
        self.sort = SortState {
            key: (direction != SortDirection::Unsorted).then(|| key.to_string()),
            direction,
        };
        trace!("Sort state {:?}", self.sort);
        true
    }

    pub fn header_label(&self, column: &Column) -> String {
        if !column.is_sortable() {
            return column.header.clone();
        }
        let indicator = match self.sort.direction_of(column.key()) {
            SortDirection::Ascending => "↑",
            SortDirection::Descending => "↓",
            SortDirection::Unsorted => "↕",
        };
        format!("{} {}", column.header, indicator)
    }

    fn matches(&self, record: &Record, columns: &[Column]) -> bool {
        self.filters.iter().all(|(key, term)| {
            if term.is_empty() {
                return true;
            }
            let Some(column) = columns.iter().find(|c| c.key() == key) else {
                return true;
            };
            match column.value(record).as_text() {
                Some(text) => text.to_lowercase().contains(&term.to_lowercase()),
                None => true,
            }
        })
    }

    /// Filtered, then sorted, row indices into `records`.
    pub fn view(&self, records: &[Record], columns: &[Column]) -> Vec<usize> {
        let mut rows: Vec<usize> = (0..records.len())
            .filter(|&idx| self.matches(&records[idx], columns))
            .collect();

        let sort_column = self
            .sort
            .key()
            .and_then(|key| columns.iter().find(|c| c.key() == key && c.is_sortable()));

        if let Some(column) = sort_column {
            let direction = self.sort.direction();
            // Vec::sort_by is stable, ties keep the filtered order.
            rows.sort_by(|&a, &b| {
                compare(column.raw(&records[a]), column.raw(&records[b]), direction)
            });
        }
        rows
    }

    pub fn body(&self, records: &[Record], columns: &[Column]) -> TableBody {
        let rows = self.view(records, columns);
        if rows.is_empty() {
            return TableBody::Empty {
                message: NO_DATA_MESSAGE,
                span: columns.len(),
            };
        }
        TableBody::Rows(
            rows.into_iter()
                .map(|index| RenderedRow {
                    index,
                    cells: columns.iter().map(|c| c.display(&records[index])).collect(),
                })
                .collect(),
        )
    }

    /// Activate the cell at (`view_row`, `column`). Links win over the row handler.
    pub fn activate(
        &self,
        records: &[Record],
        columns: &[Column],
        view_row: usize,
        column: usize,
        on_row_select: Option<&mut dyn FnMut(&Record)>,
    ) -> Activation {
        let rows = self.view(records, columns);
        let Some(&index) = rows.get(view_row) else {
            return Activation::Nothing;
        };
        let record = &records[index];

        if let Some(Cell::Link { target, .. }) = columns.get(column).map(|c| c.display(record)) {
            return Activation::Link(target);
        }

        match on_row_select {
            Some(handler) => {
                handler(record);
                Activation::Row(index)
            }
            None => Activation::Nothing,
        }
    }
}

// Missing values go last whatever the direction.
fn compare(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match direction {
            SortDirection::Descending => b.total_cmp(a),
            _ => a.total_cmp(b),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polizas() -> Vec<Record> {
        vec![
            Record::new().with("poliza", "100").with("prima", 500i64),
            Record::new().with("poliza", "099").with("prima", 900i64),
        ]
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::field("Póliza", "poliza"),
            Column::field("Prima", "prima"),
        ]
    }

    fn polizas_of(records: &[Record], rows: &[usize]) -> Vec<String> {
        rows.iter().map(|&i| records[i].text("poliza")).collect()
    }

    #[test]
    fn one_click_sorts_ascending() {
        let records = polizas();
        let columns = columns();
        let mut table = DataTable::new();
        assert!(table.toggle_sort(&columns[0]));
        let rows = table.view(&records, &columns);
        assert_eq!(polizas_of(&records, &rows), vec!["099", "100"]);
        // source untouched
        assert_eq!(records[0].text("poliza"), "100");
    }

    #[test]
    fn sort_cycle_has_length_three() {
        let records = vec![
            Record::new().with("n", 2i64),
            Record::new().with("n", 3i64),
            Record::new().with("n", 1i64),
        ];
        let columns = vec![Column::field("N", "n")];
        let mut table = DataTable::new();

        table.toggle_sort(&columns[0]);
        assert_eq!(table.view(&records, &columns), vec![2, 0, 1]);
        table.toggle_sort(&columns[0]);
        assert_eq!(table.sort_state().direction(), SortDirection::Descending);
        assert_eq!(table.view(&records, &columns), vec![1, 0, 2]);
        table.toggle_sort(&columns[0]);
        assert_eq!(table.sort_state().key(), None);
        assert_eq!(table.view(&records, &columns), vec![0, 1, 2]);
        table.toggle_sort(&columns[0]);
        assert_eq!(table.sort_state().direction(), SortDirection::Ascending);
    }

    #[test]
    fn other_column_resets_to_ascending() {
        let columns = columns();
        let mut table = DataTable::new();
        table.toggle_sort(&columns[0]);
        table.toggle_sort(&columns[0]);
        table.toggle_sort(&columns[1]);
        assert_eq!(table.sort_state().key(), Some("prima"));
        assert_eq!(table.sort_state().direction(), SortDirection::Ascending);
        assert_eq!(table.sort_state().direction_of("poliza"), SortDirection::Unsorted);
    }

    #[test]
    fn derived_columns_do_not_sort() {
        let column = Column::derived("Prima", |r| Cell::Text(r.text("prima")));
        let mut table = DataTable::new();
        assert!(!table.toggle_sort(&column));
        assert_eq!(table.sort_state(), &SortState::default());
        assert!(!table.toggle_sort(&Column::field("X", "x").unsortable()));
        assert_eq!(table.header_label(&column), "Prima");
    }

    #[test]
    fn filter_scenario() {
        let records = polizas();
        let columns = columns();
        let mut table = DataTable::new();
        table.set_filter("poliza", "09");
        let rows = table.view(&records, &columns);
        assert_eq!(rows, vec![1]);
        assert_eq!(records[rows[0]].value("prima"), &Value::Number(900.0));
    }

    #[test]
    fn empty_filter_is_identity() {
        let records = polizas();
        let columns = columns();
        let mut table = DataTable::new();
        table.set_filter("poliza", "");
        assert_eq!(table.view(&records, &columns), vec![0, 1]);
        assert!(!table.has_filters());
    }

    #[test]
    fn filters_ignore_case_and_compose() {
        let records = vec![
            Record::new().with("nombre", "Ana López").with("ramo", "VIDA"),
            Record::new().with("nombre", "ANA Pérez").with("ramo", "GMM"),
            Record::new().with("nombre", "Luis").with("ramo", "vida"),
        ];
        let columns = vec![Column::field("Nombre", "nombre"), Column::field("Ramo", "ramo")];

        let mut first = DataTable::new();
        first.set_filter("nombre", "ana");
        first.set_filter("ramo", "Vida");
        let mut second = DataTable::new();
        second.set_filter("ramo", "Vida");
        second.set_filter("nombre", "ana");

        assert_eq!(first.view(&records, &columns), vec![0]);
        assert_eq!(first.view(&records, &columns), second.view(&records, &columns));
    }

    #[test]
    fn derived_filters_use_rendered_text() {
        let records = polizas();
        let columns = vec![Column::derived("Prima", |r| {
            Cell::Text(crate::format::money_mxn(r.value("prima").as_f64().unwrap_or(0.0)))
        })];
        let mut table = DataTable::new();
        table.set_filter("Prima", "$9");
        assert_eq!(table.view(&records, &columns), vec![1]);
    }

    #[test]
    fn composite_cells_always_pass_filters() {
        let records = polizas();
        let columns = vec![Column::derived("Link", |r| Cell::Link {
            label: r.text("poliza"),
            target: format!("poliza:{}", r.text("poliza")),
        })];
        let mut table = DataTable::new();
        table.set_filter("Link", "zzz");
        assert_eq!(table.view(&records, &columns), vec![0, 1]);
    }

    #[test]
    fn unknown_filter_key_imposes_nothing() {
        let records = polizas();
        let mut table = DataTable::new();
        table.set_filter("nope", "x");
        assert_eq!(table.view(&records, &columns()), vec![0, 1]);
    }

    #[test]
    fn sort_is_stable_on_ties() {
        let records = vec![
            Record::new().with("ramo", "VIDA").with("id", 1i64),
            Record::new().with("ramo", "GMM").with("id", 2i64),
            Record::new().with("ramo", "VIDA").with("id", 3i64),
            Record::new().with("ramo", "GMM").with("id", 4i64),
        ];
        let columns = vec![Column::field("Ramo", "ramo")];
        let mut table = DataTable::new();
        table.toggle_sort(&columns[0]);
        assert_eq!(table.view(&records, &columns), vec![1, 3, 0, 2]);
        table.toggle_sort(&columns[0]);
        assert_eq!(table.view(&records, &columns), vec![0, 2, 1, 3]);
    }

    #[test]
    fn nulls_sort_last_in_both_directions() {
        let records = vec![
            Record::new().with("prima", Value::Null),
            Record::new().with("prima", 10i64),
            Record::new(),
            Record::new().with("prima", 5i64),
        ];
        let columns = vec![Column::field("Prima", "prima")];
        let mut table = DataTable::new();
        table.toggle_sort(&columns[0]);
        assert_eq!(table.view(&records, &columns), vec![3, 1, 0, 2]);
        table.toggle_sort(&columns[0]);
        assert_eq!(table.view(&records, &columns), vec![1, 3, 0, 2]);
    }

    #[test]
    fn empty_input_renders_single_no_data_row() {
        let table = DataTable::new();
        let columns = columns();
        assert_eq!(
            table.body(&[], &columns),
            TableBody::Empty {
                message: "No hay datos disponibles",
                span: 2
            }
        );
    }

    #[test]
    fn body_uses_renderer_for_display() {
        let records = vec![Record::new().with("pct", 0.25)];
        let columns = vec![
            Column::field("Porcentaje", "pct").with_renderer(|r| {
                let pct = r.value("pct").as_f64().unwrap_or(0.0);
                Cell::Text(crate::format::percent(pct, 0))
            }),
        ];
        let mut table = DataTable::new();
        match table.body(&records, &columns) {
            TableBody::Rows(rows) => assert_eq!(rows[0].cells, vec![Cell::Text("25%".into())]),
            other => panic!("unexpected body {other:?}"),
        }
        // filtering still looks at the raw value
        table.set_filter("pct", "0.25");
        assert_eq!(table.view(&records, &columns), vec![0]);
    }

    #[test]
    fn row_select_receives_original_record() {
        let records = polizas();
        let columns = columns();
        let mut table = DataTable::new();
        table.toggle_sort(&columns[0]);

        let mut selected: Vec<Record> = Vec::new();
        let mut handler = |r: &Record| selected.push(r.clone());
        let activation = table.activate(&records, &columns, 0, 1, Some(&mut handler));
        assert_eq!(activation, Activation::Row(1));
        assert_eq!(selected, vec![records[1].clone()]);
    }

    #[test]
    fn links_do_not_trigger_row_select() {
        let records = vec![Record::new().with("correo", "ana@example.com")];
        let columns = vec![Column::field("Correo", "correo").with_renderer(|r| Cell::Link {
            label: r.text("correo"),
            target: format!("mailto:{}", r.text("correo")),
        })];
        let table = DataTable::new();
        let mut calls = 0;
        let mut handler = |_: &Record| calls += 1;
        let activation = table.activate(&records, &columns, 0, 0, Some(&mut handler));
        assert_eq!(activation, Activation::Link("mailto:ana@example.com".into()));
        assert_eq!(calls, 0);
    }

    #[test]
    fn activation_without_handler_or_rows() {
        let records = polizas();
        let columns = columns();
        let table = DataTable::new();
        assert_eq!(table.activate(&records, &columns, 0, 0, None), Activation::Nothing);
        assert_eq!(table.activate(&[], &columns, 0, 0, None), Activation::Nothing);
    }

    #[test]
    fn header_labels_show_sort_direction() {
        let columns = columns();
        let mut table = DataTable::new();
        assert_eq!(table.header_label(&columns[0]), "Póliza ↕");
        table.toggle_sort(&columns[0]);
        assert_eq!(table.header_label(&columns[0]), "Póliza ↑");
        table.toggle_sort(&columns[0]);
        assert_eq!(table.header_label(&columns[0]), "Póliza ↓");
    }
}
