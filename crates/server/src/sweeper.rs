use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use dentalcare_api::db;
use dentalcare_api::format_datetime;

use crate::storage::{Db, sq_execute};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deactivated: usize,
    pub purged_refresh_tokens: usize,
}

/// Persist expiry of lapsed subscriptions and drop dead refresh tokens.
pub fn sweep_once(db: &Db, now: DateTime<Utc>) -> rusqlite::Result<SweepReport> {
    let now = format_datetime(now);
    let conn = db.conn();
    let deactivated = sq_execute(&conn, db::dentists::deactivate_expired(&now))?;
    let purged_refresh_tokens = sq_execute(&conn, db::tokens::purge_expired_refresh_tokens(&now))?;
    Ok(SweepReport {
        deactivated,
        purged_refresh_tokens,
    })
}

/// Run the subscription sweeper every `interval_secs` until shutdown.
pub async fn run_subscription_sweeper(
    db: Db,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    if interval_secs == 0 {
        info!("subscription sweeper disabled (interval=0)");
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match sweep_once(&db, Utc::now()) {
                    Ok(report) if report.deactivated > 0 => {
                        info!(deactivated = report.deactivated, "expired subscriptions deactivated");
                    }
                    Ok(report) => {
                        debug!(purged = report.purged_refresh_tokens, "subscription sweep: nothing expired");
                    }
                    Err(e) => warn!("subscription sweep failed: {e}"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("subscription sweeper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{init_db, sq_query_row, subscription_from_row};
    use chrono::TimeZone;
    use dentalcare_api::SubscriptionStatus;

    #[test]
    fn only_lapsed_windows_are_deactivated() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        {
            let conn = db.conn();
            for (id, expires) in [("lapsed", "2025-03-01 00:00:00"), ("running", "2025-04-01 00:00:00")] {
                sq_execute(
                    &conn,
                    db::dentists::insert(id, &format!("{id}@clinic.test"), "h", "s", "A", "B", None, expires),
                )
                .unwrap();
            }
        }

        let now = Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap();
        let report = sweep_once(&db, now).unwrap();
        assert_eq!(report.deactivated, 1);

        let conn = db.conn();
        let lapsed = sq_query_row(&conn, db::dentists::get_subscription("lapsed"), |r| {
            subscription_from_row(r, 0)
        })
        .unwrap();
        assert_eq!(lapsed.status, SubscriptionStatus::Expired);
        let running = sq_query_row(&conn, db::dentists::get_subscription("running"), |r| {
            subscription_from_row(r, 0)
        })
        .unwrap();
        assert_eq!(running.status, SubscriptionStatus::Trial);
        drop(conn);

        // Already expired rows are not counted twice.
        assert_eq!(sweep_once(&db, now).unwrap().deactivated, 0);
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_subscription_sweeper(db, 3600, rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
