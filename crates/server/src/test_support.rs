//! Fixtures shared by handler tests.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use dentalcare_api::db;
use dentalcare_api::db::patients::PatientValues;
use dentalcare_api::{SubscriptionStatus, format_datetime};

use crate::config::AppConfig;
use crate::mailer::testing::MemoryMailer;
use crate::payments::Gateways;
use crate::routes::auth::{ActiveDentist, AuthDentist};
use crate::storage::{init_db, sq_execute};
use crate::AppState;

pub struct TestApp {
    pub state: AppState,
    pub mailer: Arc<MemoryMailer>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let mailer = Arc::new(MemoryMailer::default());
        let state = AppState {
            db,
            config: AppConfig::for_tests(dir.path()),
            mailer: mailer.clone(),
            gateways: Gateways::new(None, None),
        };
        Self {
            state,
            mailer,
            _dir: dir,
        }
    }

    /// Insert a verified dentist on a running trial, skipping password hashing.
    pub fn dentist(&self, id: &str) -> AuthDentist {
        let expires = format_datetime(Utc::now() + Duration::days(30));
        {
            let conn = self.state.db.conn();
            sq_execute(
                &conn,
                db::dentists::insert(id, &format!("{id}@clinic.test"), "00", "00", "Dr", id, None, &expires),
            )
            .unwrap();
            sq_execute(&conn, db::dentists::mark_email_verified(id)).unwrap();
        }
        AuthDentist::load(&self.state.db, id).unwrap()
    }

    pub fn active(&self, id: &str) -> ActiveDentist {
        ActiveDentist(self.dentist(id))
    }

    /// Move the dentist's window into the past without touching the stored status.
    pub fn lapse(&self, id: &str) {
        let past = format_datetime(Utc::now() - Duration::days(1));
        let conn = self.state.db.conn();
        sq_execute(
            &conn,
            db::dentists::set_subscription(id, SubscriptionStatus::Active, &past),
        )
        .unwrap();
    }

    pub fn patient(&self, dentist_id: &str, id: &str, first: &str, last: &str) -> String {
        let values = PatientValues {
            first_name: first.into(),
            last_name: last.into(),
            ..Default::default()
        };
        let conn = self.state.db.conn();
        sq_execute(&conn, db::patients::insert(id, dentist_id, &values)).unwrap();
        id.to_string()
    }
}
