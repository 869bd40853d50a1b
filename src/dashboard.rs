use std::collections::BTreeMap;

use crate::dates::{month_key, parse_excel_date};
use crate::record::{Record, Value};
use crate::reports::{Insurer, Ramo};

pub const NO_CHART_DATA: &str = "No hay datos para mostrar en este periodo.";

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTotal {
    pub month: String,
    pub total: f64,
}

/// Date and amount fields that feed the commission chart of a carrier.
pub fn chart_source(insurer: Insurer, ramo: Ramo) -> Option<(&'static str, &'static str)> {
    match (insurer, ramo) {
        (Insurer::Metlife, Ramo::Vida) | (Insurer::Metlife, Ramo::Gmm) => {
            Some(("Fecha de Pago del Recibo", "Comisión Neta"))
        }
        (Insurer::Sura, _) => Some(("Fecha aplicación de la póliza", "Total Comisión pagado")),
        (Insurer::AarcoAxa, _) => Some(("F_COBRO", "COM_APL_MN")),
        _ => None,
    }
}

pub fn chart_title(insurer: Insurer, ramo: Ramo) -> String {
    match insurer {
        Insurer::Metlife => format!("{} - {}", insurer.label(), ramo.code()),
        _ => format!("{} - Comisiones", insurer.label()),
    }
}

/// Sum `value_key` per `YYYY-MM` of `date_key`, oldest month first.
pub fn monthly_totals(records: &[Record], date_key: &str, value_key: &str) -> Vec<MonthlyTotal> {
    let mut months: BTreeMap<String, f64> = BTreeMap::new();
    for record in records {
        let Value::Number(amount) = record.value(value_key) else {
            continue;
        };
        if let Some(date) = parse_excel_date(record.value(date_key)) {
            *months.entry(month_key(date)).or_insert(0.0) += amount;
        }
    }
    months
        .into_iter()
        .map(|(month, total)| MonthlyTotal { month, total })
        .collect()
}

/// Axis label in thousands, `$12k`.
pub fn thousands_label(value: f64) -> String {
    format!("${:.0}k", value / 1000.0)
}
