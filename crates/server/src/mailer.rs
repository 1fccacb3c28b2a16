//! Outgoing email seam.
//!
//! Delivery is pluggable through [`Mailer`]; the default [`LogMailer`] only
//! records the message in the log. Mail failures never fail a request.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub reply_to: Option<String>,
    pub attachment: Option<PathBuf>,
}

pub trait Mailer: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()>;
}

/// Writes every message to the tracing log instead of sending it.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "outgoing mail");
        tracing::debug!("{}", mail.body);
        Ok(())
    }
}

/// Send, logging instead of propagating failures.
pub fn deliver(mailer: &dyn Mailer, mail: OutgoingMail) {
    if let Err(e) = mailer.send(&mail) {
        tracing::warn!(to = %mail.to, "mail delivery failed: {e:#}");
    }
}

pub fn verification_mail(to: &str, link: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Confirm your dentalcare account".into(),
        body: format!(
            "Welcome to dentalcare.\n\nConfirm your email address within 24 hours:\n{link}\n"
        ),
        reply_to: None,
        attachment: None,
    }
}

pub fn password_reset_mail(to: &str, link: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Reset your dentalcare password".into(),
        body: format!(
            "A password reset was requested for this address.\n\n\
             The link below is valid for one hour:\n{link}\n\n\
             Ignore this message if you did not ask for it.\n"
        ),
        reply_to: None,
        attachment: None,
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps sent mail in memory for assertions.
    #[derive(Default)]
    pub struct MemoryMailer {
        pub sent: Mutex<Vec<OutgoingMail>>,
    }

    impl MemoryMailer {
        pub fn take(&self) -> Vec<OutgoingMail> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl Mailer for MemoryMailer {
        fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }
}
