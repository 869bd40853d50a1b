use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::domain::CrmError;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub auth_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session that lasts one day from `now`.
    pub fn start(auth_token: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            auth_token: auth_token.into(),
            expires_at: now + TimeDelta::days(1),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The stored session, if there is one that is still valid at `now`.
    pub fn load(path: &Path, now: DateTime<Utc>) -> Option<Session> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Could not read session {:?}: {e}", path);
                }
                return None;
            }
        };
        match serde_json::from_str::<Session>(&content) {
            Ok(session) if session.is_expired(now) => {
                debug!("Session expired at {}", session.expires_at);
                None
            }
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Ignoring unreadable session {:?}: {e}", path);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CrmError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Session stored in {:?}", path);
        Ok(())
    }

    pub fn clear(path: &Path) -> Result<(), CrmError> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!("Session removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Next,
    Redirect(&'static str),
}

pub fn is_public(path: &str) -> bool {
    path == LOGIN_PATH
        || path.starts_with("/_next")
        || path.starts_with("/static")
        || path == "/logo.png"
        || path == "/archivo"
}

/// Decide whether navigation to `path` may proceed.
pub fn gate(path: &str, token: Option<&str>) -> GateDecision {
    let token = token.filter(|t| !t.is_empty());
    if is_public(path) {
        if path == LOGIN_PATH && token.is_some() {
            return GateDecision::Redirect(HOME_PATH);
        }
        return GateDecision::Next;
    }
    match token {
        Some(_) => GateDecision::Next,
        None => GateDecision::Redirect(LOGIN_PATH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn gate_rules() {
        assert_eq!(gate("/cobranza", None), GateDecision::Redirect("/login"));
        assert_eq!(gate("/cobranza", Some("ana")), GateDecision::Next);
        assert_eq!(gate("/login", Some("ana")), GateDecision::Redirect("/"));
        assert_eq!(gate("/login", None), GateDecision::Next);
        assert_eq!(gate("/_next/static/app.js", None), GateDecision::Next);
        assert_eq!(gate("/static/x.css", None), GateDecision::Next);
        assert_eq!(gate("/logo.png", None), GateDecision::Next);
        assert_eq!(gate("/archivo", None), GateDecision::Next);
        assert_eq!(gate("/", None), GateDecision::Redirect("/login"));
        assert_eq!(gate("/", Some("")), GateDecision::Redirect("/login"));
    }

    #[test]
    fn sessions_last_a_day() {
        let path = std::env::temp_dir().join(format!("crmtv-session-{}.json", std::process::id()));
        let session = Session::start("ana", noon());
        session.save(&path).unwrap();

        assert_eq!(Session::load(&path, noon()), Some(session.clone()));
        let later = noon() + TimeDelta::hours(23);
        assert!(Session::load(&path, later).is_some());
        let expired = noon() + TimeDelta::days(1);
        assert_eq!(Session::load(&path, expired), None);

        Session::clear(&path).unwrap();
        assert_eq!(Session::load(&path, noon()), None);
        Session::clear(&path).unwrap();
    }

    #[test]
    fn garbage_sessions_count_as_absent() {
        let path = std::env::temp_dir().join(format!("crmtv-garbage-{}.json", std::process::id()));
        fs::write(&path, "{not json").unwrap();
        assert_eq!(Session::load(&path, noon()), None);
        let _ = fs::remove_file(path);
    }
}
