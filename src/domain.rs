use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use std::fmt;
use std::io::Error;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::ApiError;

#[derive(Debug)]
pub enum CrmError {
    IoError(Error),
    PolarsError(PolarsError),
    ExcelError(calamine::Error),
    Spreadsheet(String),
    Api(ApiError),
    Json(serde_json::Error),
    LoadingFailed(String),
    FileNotFound(PathBuf),
    SheetNotFound {
        path: PathBuf,
        sheet: String,
        available: Vec<String>,
    },
    PermissionDenied,
    UnknownFileType,
}

impl fmt::Display for CrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrmError::IoError(e) => write!(f, "I/O error: {e}"),
            CrmError::PolarsError(e) => write!(f, "Polars error: {e}"),
            CrmError::ExcelError(e) => write!(f, "Excel error: {e}"),
            CrmError::Spreadsheet(e) => write!(f, "Spreadsheet error: {e}"),
            CrmError::Api(e) => write!(f, "{e}"),
            CrmError::Json(e) => write!(f, "Invalid JSON: {e}"),
            CrmError::LoadingFailed(e) => write!(f, "Loading failed: {e}"),
            CrmError::FileNotFound(path) => write!(f, "File not found: {}", path.display()),
            CrmError::SheetNotFound {
                path,
                sheet,
                available,
            } => write!(
                f,
                "Sheet \"{sheet}\" not found in {} (available: {})",
                path.display(),
                available.join(", ")
            ),
            CrmError::PermissionDenied => write!(f, "Permission denied"),
            CrmError::UnknownFileType => write!(f, "Unknown file type"),
        }
    }
}

impl std::error::Error for CrmError {}

impl From<Error> for CrmError {
    fn from(err: Error) -> Self {
        CrmError::IoError(err)
    }
}

impl From<PolarsError> for CrmError {
    fn from(err: PolarsError) -> Self {
        CrmError::PolarsError(err)
    }
}

impl From<calamine::Error> for CrmError {
    fn from(err: calamine::Error) -> Self {
        CrmError::ExcelError(err)
    }
}

impl From<umya_spreadsheet::XlsxError> for CrmError {
    fn from(err: umya_spreadsheet::XlsxError) -> Self {
        CrmError::Spreadsheet(err.to_string())
    }
}

impl From<ApiError> for CrmError {
    fn from(err: ApiError) -> Self {
        CrmError::Api(err)
    }
}

impl From<reqwest::Error> for CrmError {
    fn from(err: reqwest::Error) -> Self {
        CrmError::Api(ApiError::Network(err))
    }
}

impl From<serde_json::Error> for CrmError {
    fn from(err: serde_json::Error) -> Self {
        CrmError::Json(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Inicio,
    Cobranza,
    Renovaciones,
    Cartera,
    Clientes,
    Dashboards,
    Login,
    Archivo,
}

/// Pages reachable with the number keys, in order.
pub const MENU: [Page; 6] = [
    Page::Inicio,
    Page::Cobranza,
    Page::Renovaciones,
    Page::Cartera,
    Page::Clientes,
    Page::Dashboards,
];

impl Page {
    pub fn path(&self) -> &'static str {
        match self {
            Page::Inicio => "/",
            Page::Cobranza => "/cobranza",
            Page::Renovaciones => "/renovaciones",
            Page::Cartera => "/cartera",
            Page::Clientes => "/clientes",
            Page::Dashboards => "/dashboards",
            Page::Login => "/login",
            Page::Archivo => "/archivo",
        }
    }

    pub fn from_path(path: &str) -> Option<Page> {
        MENU.iter()
            .chain([Page::Login, Page::Archivo].iter())
            .find(|p| p.path() == path)
            .copied()
    }

    pub fn title(&self) -> &'static str {
        match self {
            Page::Inicio => "Inicio",
            Page::Cobranza => "Cobranza",
            Page::Renovaciones => "Renovaciones",
            Page::Cartera => "Cartera",
            Page::Clientes => "Clientes",
            Page::Dashboards => "Dashboards",
            Page::Login => "Iniciar sesión",
            Page::Archivo => "Archivo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientField {
    Nombre,
    Correo,
    Telefono,
}

impl ClientField {
    pub fn next(&self) -> Option<ClientField> {
        match self {
            ClientField::Nombre => Some(ClientField::Correo),
            ClientField::Correo => Some(ClientField::Telefono),
            ClientField::Telefono => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClientField::Nombre => "Nombre",
            ClientField::Correo => "Correo",
            ClientField::Telefono => "Teléfono",
        }
    }
}

/// What the command line is currently collecting.
#[derive(Debug, Clone, PartialEq)]
pub enum CMDMode {
    Filter { key: String },
    DateRange,
    Search,
    EditStatus { poliza: String },
    SendEmail { poliza: String, contratante: String },
    ClientForm {
        original: Option<String>,
        field: ClientField,
        values: Vec<String>,
    },
    ConfirmDelete { nombre: String },
    Username,
    Password { username: String },
    OpenFile,
}

impl CMDMode {
    pub fn prompt(&self) -> String {
        match self {
            CMDMode::Filter { key } => format!("Filtrar {}: ", key.trim()),
            CMDMode::DateRange => "Rango (AAAA-MM-DD..AAAA-MM-DD): ".into(),
            CMDMode::Search => "Buscar: ".into(),
            CMDMode::EditStatus { poliza } => format!("Estatus de {poliza}: "),
            CMDMode::SendEmail { contratante, .. } => format!("Correo de {contratante}: "),
            CMDMode::ClientForm { field, .. } => format!("{}: ", field.label()),
            CMDMode::ConfirmDelete { nombre } => format!("¿Eliminar a {nombre}? (s/n): "),
            CMDMode::Username => "Usuario: ".into(),
            CMDMode::Password { .. } => "Contraseña: ".into(),
            CMDMode::OpenFile => "Archivo: ".into(),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, CMDMode::Password { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    Exit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    Sort,
    Filter,
    ClearFilters,
    NextTab,
    PrevTab,
    NextInsurer,
    PrevInsurer,
    CycleWindow,
    DeleteClient,
    EditDateRange,
    ResetDateRange,
    Export,
    Reload,
    NewClient,
    SendEmail,
    Search,
    OpenFile,
    CopyCell,
    Enter,
    GoTo(Page),
    Logout,
    Help,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
Navegación
  ←↓↑→ / hjkl     mover selección
  PgUp PgDn       página arriba / abajo
  Home End        primera / última fila
  1-6             Inicio, Cobranza, Renovaciones, Cartera, Clientes, Dashboards
  Tab / S-Tab     siguiente / anterior pestaña
  [ ]             aseguradora anterior / siguiente
Tabla
  s               ordenar columna actual
  /               filtrar columna actual
  c               limpiar filtros
  Enter           abrir enlace o editar fila
  y               copiar celda
  x               exportar a Excel
  r               recargar
Páginas
  t / T           editar / restablecer rango de fechas
  d               días de renovación (30/60/90) o eliminar cliente
  m               enviar correo de renovación
  n               nuevo cliente
  f               buscar
  o               abrir archivo local
General
  L               cerrar sesión
  ?               esta ayuda
  Esc             cerrar / regresar
  q               salir";

pub const DEFAULT_API_URL: &str = "http://localhost:7777";

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct AppConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub export_dir: PathBuf,
    pub session_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            event_poll_time: 100,
            max_column_width: 40,
            export_dir: PathBuf::from("."),
            session_file: PathBuf::from(".crmtv-session.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_round_trip_through_paths() {
        for page in MENU.iter().chain([Page::Login, Page::Archivo].iter()) {
            assert_eq!(Page::from_path(page.path()), Some(*page));
        }
        assert_eq!(Page::from_path("/nope"), None);
    }

    #[test]
    fn client_form_walks_all_fields() {
        let mut field = Some(ClientField::Nombre);
        let mut seen = Vec::new();
        while let Some(f) = field {
            seen.push(f.label());
            field = f.next();
        }
        assert_eq!(seen, vec!["Nombre", "Correo", "Teléfono"]);
    }

    #[test]
    fn config_setters_chain() {
        let cfg = AppConfig::default()
            .with_api_base_url("http://api:9000".to_string())
            .with_event_poll_time(50);
        assert_eq!(cfg.api_base_url, "http://api:9000");
        assert_eq!(cfg.event_poll_time, 50);
        assert_eq!(cfg.max_column_width, 40);
    }

    #[test]
    fn sheet_errors_list_alternatives() {
        let err = CrmError::SheetNotFound {
            path: PathBuf::from("x.xlsx"),
            sheet: "GMM".into(),
            available: vec!["Vida".into(), "Hoja2".into()],
        };
        assert_eq!(
            err.to_string(),
            "Sheet \"GMM\" not found in x.xlsx (available: Vida, Hoja2)"
        );
    }
}
