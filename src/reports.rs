use chrono::NaiveDate;

use crate::datatable::{Cell, Column};
use crate::dates::iso;
use crate::format::{money_cell, percent_cell, ratio_or_raw};
use crate::record::field_names;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insurer {
    Metlife,
    Sura,
    Axa,
    Aarco,
    /// Combined AARCO and AXA commissions, dashboards only.
    AarcoAxa,
}

pub const COBRANZA_INSURERS: [Insurer; 2] = [Insurer::Metlife, Insurer::Sura];
pub const CARTERA_INSURERS: [Insurer; 4] =
    [Insurer::Metlife, Insurer::Sura, Insurer::Axa, Insurer::Aarco];
pub const DASHBOARD_INSURERS: [Insurer; 3] = [Insurer::Metlife, Insurer::Sura, Insurer::AarcoAxa];

impl Insurer {
    /// Value of the `insurer` query parameter.
    pub fn api_name(&self) -> &'static str {
        match self {
            Insurer::Metlife => "Metlife",
            Insurer::Sura => "SURA",
            Insurer::Axa => "Axa",
            Insurer::Aarco => "AARCO",
            Insurer::AarcoAxa => "AARCO_AXA",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Insurer::AarcoAxa => "AARCO & AXA",
            other => other.api_name(),
        }
    }

    /// Only Metlife splits its reports into VIDA and GMM.
    pub fn has_ramos(&self) -> bool {
        matches!(self, Insurer::Metlife)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ramo {
    Vida,
    Gmm,
}

pub const RAMOS: [Ramo; 2] = [Ramo::Vida, Ramo::Gmm];

impl Ramo {
    pub fn code(&self) -> &'static str {
        match self {
            Ramo::Vida => "VIDA",
            Ramo::Gmm => "GMM",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Ramo::Vida => "Vida",
            Ramo::Gmm => "GMM",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Ramo::Vida => "vida",
            Ramo::Gmm => "gmm",
        }
    }
}

fn money(header: &str, field: &'static str) -> Column {
    Column::derived(header, move |r| money_cell(r, field))
}

fn pct(header: &str, field: &'static str, decimals: usize) -> Column {
    Column::derived(header, move |r| percent_cell(r, field, decimals))
}

pub fn renovaciones_columns(ramo: Ramo) -> Vec<Column> {
    let mut columns = vec![
        Column::field("Póliza", "poliza"),
        Column::field("Contratante", "contratante"),
        Column::field("Fecha Renovación", "fechaRenovacion"),
        Column::field("Ramo", "ramo"),
        Column::field("Agente", "agente"),
        Column::field("Estatus", "estatus"),
        money("Prima", "prima"),
    ];
    if ramo == Ramo::Gmm {
        columns.push(pct("Coaseguro", "coaseguro", 0));
    }
    columns
}

fn cobranza_metlife_columns(ramo: Ramo) -> Vec<Column> {
    let mut columns = vec![
        Column::field("# Póliza", "# de Póliza"),
        Column::field("Producto", "Producto"),
        Column::field("Conducto", "Conducto de Cobro"),
        Column::field("Fecha Pago", "Fecha de Pago del Recibo"),
        Column::field("Año Póliza", "Año de Vida Póliza"),
    ];
    if ramo == Ramo::Gmm {
        columns.push(Column::field("Estado", "Estado"));
    }
    columns.extend([
        money("Prima Pagada", "Prima Pagada"),
        money("Comisión Bruto", "Comisión Bruto"),
        money("Comisión Neta", "Comisión Neta"),
    ]);
    if ramo == Ramo::Gmm {
        columns.push(money("IVA Causado", "IVA Causado"));
    }
    columns
}

fn cobranza_sura_columns() -> Vec<Column> {
    vec![
        Column::field("Póliza", "Póliza"),
        Column::field("Contratante", "Contratante"),
        Column::field("Ramo", "Ramo"),
        money("Prima Total", "Prima Total"),
        money("Prima Neta", "Prima Neta"),
        pct("% Comisión", "% Comisión pagado", 2),
        money("Monto Comisión", "Monto Comisión Neta"),
        money("Total Comisión", "Total Comisión pagado"),
        Column::field("Fecha Aplicación", "Fecha aplicación de la póliza"),
    ]
}

pub fn cobranza_columns(insurer: Insurer, ramo: Ramo) -> Vec<Column> {
    match insurer {
        Insurer::Sura => cobranza_sura_columns(),
        _ => cobranza_metlife_columns(ramo),
    }
}

fn percentage(header: &str, field: &'static str) -> Column {
    Column::field(header, field).with_renderer(move |r| ratio_or_raw(r, field))
}

// Keys mirror the carrier sheets verbatim, trailing blanks included.
pub fn cartera_columns(insurer: Insurer, ramo: Ramo) -> Vec<Column> {
    match (insurer, ramo) {
        (Insurer::Metlife, Ramo::Vida) => vec![
            Column::field("Póliza", "Poliza"),
            Column::field("Contratante", "Contratante"),
            Column::field("Prospectador", "PROSPECTADOR "),
            percentage("Porcentaje", "PORCENTAJE "),
        ],
        (Insurer::Metlife, Ramo::Gmm) => vec![
            Column::field("Póliza", "POLIZA "),
            Column::field("Póliza Actual", "Poliza actual"),
            Column::field("Contratante", "Contratante"),
            Column::field("Prospectador", "PROSPECTADOR "),
            percentage("Porcentaje", "PORCENTAJE"),
        ],
        (Insurer::Sura, _) => vec![
            Column::field("Póliza", "PÓLIZA"),
            Column::field("Prospectador", "PROSPECTADOR"),
            percentage("Porcentaje", "PORCENTAJE"),
        ],
        _ => Vec::new(),
    }
}

pub fn cartera_search_columns() -> Vec<Column> {
    vec![
        Column::field("Cliente", "nombre"),
        Column::field("Póliza", "poliza"),
        Column::field("Ramo", "ramo"),
        Column::field("Estatus", "estatus"),
        Column::field("Prospectador", "prospectador"),
    ]
}

pub fn clientes_columns() -> Vec<Column> {
    vec![
        Column::field("Nombre", "nombre"),
        Column::field("Correo", "correo").with_renderer(|r| {
            let correo = r.text("correo");
            if correo.is_empty() {
                Cell::Text(correo)
            } else {
                Cell::Link {
                    label: correo.clone(),
                    target: format!("mailto:{correo}"),
                }
            }
        }),
        Column::field("Teléfono", "telefono"),
    ]
}

/// One plain column per field, for files opened from disk.
pub fn generic_columns(records: &[Record]) -> Vec<Column> {
    field_names(records)
        .into_iter()
        .map(|name| Column::field(name.clone(), name))
        .collect()
}

pub fn export_file_name(prefix: &str, today: NaiveDate) -> String {
    format!("{prefix}_{}.xlsx", iso(today))
}
