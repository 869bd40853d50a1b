use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::api::{ApiClient, ApiError};
use crate::dates::{DateRange, iso};
use crate::record::{Record, Value};
use crate::reports::{Insurer, Ramo};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cliente {
    pub nombre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
}

impl Cliente {
    pub fn to_record(&self) -> Record {
        let optional = |v: &Option<String>| v.clone().map(Value::Text).unwrap_or(Value::Null);
        Record::new()
            .with("nombre", self.nombre.as_str())
            .with("correo", optional(&self.correo))
            .with("telefono", optional(&self.telefono))
    }

    pub fn from_record(record: &Record) -> Self {
        let optional = |name: &str| Some(record.text(name)).filter(|s| !s.is_empty());
        Self {
            nombre: record.text("nombre"),
            correo: optional("correo"),
            telefono: optional("telefono"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub numero: String,
    pub ramo: String,
    pub estatus: String,
}

/// One portfolio search hit, a client with the matching policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientProfile {
    pub id: String,
    pub nombre: String,
    pub prospectador: String,
    pub polizas: Vec<Policy>,
}

// First field holding something other than null or blank text.
fn first_present<'a>(record: &'a Record, names: &[&str]) -> &'a Value {
    names
        .iter()
        .map(|n| record.value(n))
        .find(|v| !v.is_null() && !v.to_text().is_empty())
        .unwrap_or(&Value::Null)
}

impl ClientProfile {
    pub fn from_search_hit(hit: &Record) -> Self {
        let tipo = hit.text("Tipo");
        let numero = first_present(hit, &["Póliza", "# de Póliza"]).to_text();
        Self {
            id: format!("{tipo}-{numero}"),
            nombre: first_present(hit, &["Nombre", "Contratante"]).to_text(),
            prospectador: hit.text("Prospectador"),
            polizas: vec![Policy {
                numero,
                ramo: tipo,
                estatus: first_present(hit, &["Estatus", "Estatus Póliza"]).to_text(),
            }],
        }
    }

    /// Flatten to one row per policy for the grid.
    pub fn to_records(&self) -> Vec<Record> {
        self.polizas
            .iter()
            .map(|p| {
                Record::new()
                    .with("nombre", self.nombre.as_str())
                    .with("poliza", p.numero.as_str())
                    .with("ramo", p.ramo.as_str())
                    .with("estatus", p.estatus.as_str())
                    .with("prospectador", self.prospectador.as_str())
            })
            .collect()
    }
}

/// Everything the pages need from the backend.
pub trait Backend {
    fn cobranza(&self, ramo: Ramo, insurer: Insurer, range: DateRange)
    -> Result<Vec<Record>, ApiError>;
    /// `ramo` of `None` asks for both lines of business.
    fn upcoming_renewals(
        &self,
        days: u32,
        ramo: Option<Ramo>,
        insurer: Insurer,
    ) -> Result<Vec<Record>, ApiError>;
    fn update_renewal_status(&self, poliza: &str, insurer: Insurer, estatus: &str)
    -> Result<(), ApiError>;
    fn send_renewal_email(&self, poliza: &str, contratante: &str, correo: &str)
    -> Result<(), ApiError>;
    fn cartera(&self, insurer: Insurer, ramo: Ramo) -> Result<Vec<Record>, ApiError>;
    fn search_cartera(&self, query: &str) -> Result<Vec<ClientProfile>, ApiError>;
    fn clients(&self) -> Result<Vec<Cliente>, ApiError>;
    fn add_client(&self, client: &Cliente) -> Result<Cliente, ApiError>;
    fn update_client(&self, original_nombre: &str, client: &Cliente) -> Result<(), ApiError>;
    fn delete_client(&self, nombre: &str) -> Result<(), ApiError>;
    fn client_email(&self, name: &str) -> Result<Option<String>, ApiError>;
    fn login(&self, username: &str, password: &str) -> Result<(), ApiError>;
}

#[derive(Deserialize)]
struct EmailLookup {
    email: Option<String>,
}

impl Backend for ApiClient {
    #[instrument(skip(self))]
    fn cobranza(
        &self,
        ramo: Ramo,
        insurer: Insurer,
        range: DateRange,
    ) -> Result<Vec<Record>, ApiError> {
        let mut params = vec![("insurer", insurer.api_name().to_string())];
        if let Some(start) = range.start {
            params.push(("start_date", iso(start)));
        }
        if let Some(end) = range.end {
            params.push(("end_date", iso(end)));
        }
        let rows: Vec<Record> = self.get_json(&format!("/cobranza/{}", ramo.path()), &params)?;
        info!("Loaded {} cobranza rows", rows.len());
        Ok(rows)
    }

    #[instrument(skip(self))]
    fn upcoming_renewals(
        &self,
        days: u32,
        ramo: Option<Ramo>,
        insurer: Insurer,
    ) -> Result<Vec<Record>, ApiError> {
        let kind = ramo.map(|r| r.code()).unwrap_or("ALL");
        let params = [
            ("days", days.to_string()),
            ("type", kind.to_string()),
            ("insurer", insurer.api_name().to_string()),
        ];
        self.get_json("/renovaciones/upcoming", &params)
    }

    #[instrument(skip(self))]
    fn update_renewal_status(
        &self,
        poliza: &str,
        insurer: Insurer,
        estatus: &str,
    ) -> Result<(), ApiError> {
        let body = json!({"poliza": poliza, "insurer": insurer.api_name(), "estatus": estatus});
        self.post_json::<_, serde_json::Value>("/renovaciones/update-status", &body)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn send_renewal_email(
        &self,
        poliza: &str,
        contratante: &str,
        correo: &str,
    ) -> Result<(), ApiError> {
        let body = json!({"poliza": poliza, "contratante": contratante, "correo": correo});
        self.post_json::<_, serde_json::Value>("/renovaciones/send-email", &body)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn cartera(&self, insurer: Insurer, ramo: Ramo) -> Result<Vec<Record>, ApiError> {
        let kind = if insurer.has_ramos() { ramo.code() } else { "ALL" };
        let params = [
            ("insurer", insurer.api_name().to_string()),
            ("type", kind.to_string()),
        ];
        self.get_json("/cartera", &params)
    }

    #[instrument(skip(self))]
    fn search_cartera(&self, query: &str) -> Result<Vec<ClientProfile>, ApiError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let hits: Vec<Record> = self.get_json("/cartera/search", &[("query", query.to_string())])?;
        Ok(hits.iter().map(ClientProfile::from_search_hit).collect())
    }

    #[instrument(skip(self))]
    fn clients(&self) -> Result<Vec<Cliente>, ApiError> {
        self.get_json("/clientes/", &[])
    }

    #[instrument(skip(self))]
    fn add_client(&self, client: &Cliente) -> Result<Cliente, ApiError> {
        self.post_json("/clientes/", client)
    }

    #[instrument(skip(self))]
    fn update_client(&self, original_nombre: &str, client: &Cliente) -> Result<(), ApiError> {
        let body = json!({"original_nombre": original_nombre, "client": client});
        self.post_json::<_, serde_json::Value>("/clientes/update", &body)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_client(&self, nombre: &str) -> Result<(), ApiError> {
        self.post_json::<_, serde_json::Value>("/clientes/delete", &json!({"nombre": nombre}))?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn client_email(&self, name: &str) -> Result<Option<String>, ApiError> {
        let lookup: EmailLookup =
            self.get_json("/clientes/search", &[("name", name.to_string())])?;
        Ok(lookup.email.filter(|e| !e.is_empty()))
    }

    #[instrument(skip(self, password))]
    fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let body = json!({"username": username, "password": password});
        self.post_json::<_, serde_json::Value>("/login", &body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{blocking, client};
    use chrono::NaiveDate;
    use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn empty_list() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!([]))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cobranza_sends_optional_dates() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cobranza/gmm"))
            .and(query_param("insurer", "Metlife"))
            .and(query_param("start_date", "2025-01-01"))
            .and(query_param_is_missing("end_date"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"# de Póliza": 7, "Comisión Neta": 10.5}])),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cobranza/vida"))
            .and(query_param("insurer", "SURA"))
            .and(query_param_is_missing("start_date"))
            .and(query_param_is_missing("end_date"))
            .respond_with(empty_list())
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let (gmm, vida) = blocking(move || {
            let api = client(&base);
            let range = DateRange {
                start: NaiveDate::from_ymd_opt(2025, 1, 1),
                end: None,
            };
            let gmm = api.cobranza(Ramo::Gmm, Insurer::Metlife, range).unwrap();
            let vida = api.cobranza(Ramo::Vida, Insurer::Sura, DateRange::default()).unwrap();
            (gmm, vida)
        })
        .await;

        assert_eq!(gmm[0].value("Comisión Neta"), &Value::Number(10.5));
        assert_eq!(gmm[0].value("# de Póliza"), &Value::Number(7.0));
        assert!(vida.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn renewals_and_cartera_parameters() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/renovaciones/upcoming"))
            .and(query_param("days", "60"))
            .and(query_param("type", "GMM"))
            .and(query_param("insurer", "Metlife"))
            .respond_with(empty_list())
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cartera"))
            .and(query_param("insurer", "Metlife"))
            .and(query_param("type", "GMM"))
            .respond_with(empty_list())
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cartera"))
            .and(query_param("insurer", "SURA"))
            .and(query_param("type", "ALL"))
            .respond_with(empty_list())
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        blocking(move || {
            let api = client(&base);
            api.upcoming_renewals(60, Some(Ramo::Gmm), Insurer::Metlife)
                .unwrap();
            api.cartera(Insurer::Metlife, Ramo::Gmm).unwrap();
            api.cartera(Insurer::Sura, Ramo::Gmm).unwrap();
        })
        .await;
    }

    #[test]
    fn empty_search_skips_the_request() {
        let api = ApiClient::new("http://127.0.0.1:9", std::time::Duration::from_secs(1)).unwrap();
        assert!(api.search_cartera("").unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn search_hits_become_profiles() {
        let hits = json!([
            {
                "Tipo": "VIDA",
                "# de Póliza": 12345,
                "Contratante": "ANA LOPEZ",
                "Estatus Póliza": "VIGENTE"
            },
            {
                "Tipo": "GMM",
                "Póliza": "G-9",
                "Nombre": "LUIS",
                "Prospectador": "EVA",
                "Estatus": "CANCELADA"
            }
        ]);
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cartera/search"))
            .and(query_param("query", "lo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hits))
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let profiles = blocking(move || client(&base).search_cartera("lo").unwrap()).await;

        assert_eq!(profiles[0].id, "VIDA-12345");
        assert_eq!(profiles[0].nombre, "ANA LOPEZ");
        assert_eq!(profiles[0].prospectador, "");
        assert_eq!(profiles[0].polizas[0].estatus, "VIGENTE");
        assert_eq!(profiles[1].id, "GMM-G-9");
        let rows = profiles[1].to_records();
        assert_eq!(rows[0].text("prospectador"), "EVA");
        assert_eq!(rows[0].text("poliza"), "G-9");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_mutations_post_expected_bodies() {
        let ana_json = json!({"nombre": "Ana", "correo": "ana@x.mx"});
        let success = || ResponseTemplate::new(200).set_body_json(json!({"success": true}));

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/clientes/"))
            .and(body_json(&ana_json))
            .respond_with(ResponseTemplate::new(200).set_body_json(&ana_json))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/clientes/update"))
            .and(body_json(json!({"original_nombre": "Ana", "client": ana_json})))
            .respond_with(success())
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/clientes/delete"))
            .and(body_json(json!({"nombre": "Ana"})))
            .respond_with(success())
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clientes/search"))
            .and(query_param("name", "Ana"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": null})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        blocking(move || {
            let api = client(&base);
            let ana = Cliente {
                nombre: "Ana".into(),
                correo: Some("ana@x.mx".into()),
                telefono: None,
            };
            assert_eq!(api.add_client(&ana).unwrap(), ana);
            api.update_client("Ana", &ana).unwrap();
            api.delete_client("Ana").unwrap();
            assert_eq!(api.client_email("Ana").unwrap(), None);
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_login_surfaces_detail() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(json!({"username": "ana", "password": "bad"})))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid credentials"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let err = blocking(move || client(&base).login("ana", "bad").unwrap_err()).await;
        assert_eq!(err.to_string(), "API Error: Invalid credentials");
    }

    #[test]
    fn clients_map_to_records_and_back() {
        let c = Cliente {
            nombre: "Luis".into(),
            correo: None,
            telefono: Some("5512345678".into()),
        };
        let record = c.to_record();
        assert!(record.value("correo").is_null());
        assert_eq!(Cliente::from_record(&record), c);
    }
}
