//! Public contact form with an optional file attachment.

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use uuid::Uuid;

use dentalcare_api::db::contact::ContactValues;
use dentalcare_api::{OkResponse, db, service};

use crate::AppState;
use crate::error::ApiErr;
use crate::mailer::{OutgoingMail, deliver};
use crate::storage::sq_execute;

const SUBJECT_MAX: usize = 200;
const MESSAGE_MAX: usize = 5000;
const FILE_NAME_MAX: usize = 100;

const ALLOWED_CONTENT_TYPES: &[&str] = &["application/pdf", "image/png", "image/jpeg", "text/plain"];

#[derive(Debug, Default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub attachment: Option<Attachment>,
}

#[derive(Debug)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

fn form_error(e: MultipartError) -> ApiErr {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiErr::payload_too_large("attachment is too large")
    } else {
        ApiErr::bad_request(format!("invalid form data: {}", e.body_text()))
    }
}

async fn read_form(multipart: &mut Multipart) -> Result<ContactForm, ApiErr> {
    let mut form = ContactForm::default();
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "attachment" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(form_error)?;
                // Browsers send an empty part when no file was picked.
                if !file_name.is_empty() || !bytes.is_empty() {
                    form.attachment = Some(Attachment {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
            }
            "name" | "email" | "subject" | "message" => {
                let text = field.text().await.map_err(form_error)?;
                match name.as_str() {
                    "name" => form.name = text,
                    "email" => form.email = text,
                    "subject" => form.subject = Some(text),
                    _ => form.message = text,
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown contact form field"),
        }
    }
    Ok(form)
}

/// Reduce a client-supplied file name to a safe basename.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let truncated: String = cleaned.chars().take(FILE_NAME_MAX).collect();
    if truncated.is_empty() {
        "attachment".into()
    } else {
        truncated
    }
}

/// Media type without parameters, lowercased, if it is one we accept.
pub fn allowed_content_type(content_type: &str) -> Option<String> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ALLOWED_CONTENT_TYPES
        .contains(&essence.as_str())
        .then_some(essence)
}

/// Validate, store, and forward a contact message.
pub fn accept(state: &AppState, form: ContactForm) -> Result<(), ApiErr> {
    let name = service::validate_name("name", &form.name)?;
    let email = service::validate_email(&form.email)?;
    let subject = service::validate_text("subject", form.subject.as_deref(), SUBJECT_MAX)?;
    let message = service::validate_text("message", Some(&form.message), MESSAGE_MAX)?
        .ok_or_else(|| ApiErr::bad_request("message is required"))?;

    let stored = match form.attachment {
        Some(attachment) => {
            let max = state.config.contact_max_attachment_bytes;
            if attachment.bytes.len() > max {
                return Err(ApiErr::payload_too_large(format!(
                    "attachment exceeds {max} bytes"
                )));
            }
            if allowed_content_type(&attachment.content_type).is_none() {
                return Err(ApiErr::bad_request(
                    "attachment must be a PDF, PNG, JPEG or plain text file",
                ));
            }
            let file_name = sanitize_file_name(&attachment.file_name);
            let path = state
                .db
                .write_attachment(&file_name, &attachment.bytes)
                .map_err(ApiErr::from_db("store attachment"))?;
            Some((file_name, path))
        }
        None => None,
    };

    let id = Uuid::new_v4().to_string();
    let attachment_path = stored
        .as_ref()
        .map(|(_, path)| path.to_string_lossy().into_owned());
    let inserted = {
        let conn = state.db.conn();
        sq_execute(
            &conn,
            db::contact::insert(
                &id,
                &ContactValues {
                    name: &name,
                    email: &email,
                    subject: subject.as_deref(),
                    message: &message,
                    attachment_name: stored.as_ref().map(|(n, _)| n.as_str()),
                    attachment_path: attachment_path.as_deref(),
                },
            ),
        )
    };
    if let Err(e) = inserted {
        // No row points at the file, so nothing would ever clean it up.
        if let Some((_, path)) = &stored {
            if let Err(rm) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), "failed to remove orphaned attachment: {rm}");
            }
        }
        return Err(ApiErr::from_db("insert contact message")(e));
    }

    let mail_subject = match subject {
        Some(ref s) => format!("[contact] {s}"),
        None => format!("[contact] message from {name}"),
    };
    deliver(
        state.mailer.as_ref(),
        OutgoingMail {
            to: state.config.contact_inbox.clone(),
            subject: mail_subject,
            body: format!("From: {name} <{email}>\n\n{message}\n"),
            reply_to: Some(email),
            attachment: stored.map(|(_, path)| path),
        },
    );
    tracing::info!(contact_id = %id, "contact message received");
    Ok(())
}

/// POST /api/contact (multipart/form-data)
pub async fn submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<OkResponse>), ApiErr> {
    let form = read_form(&mut multipart).await?;
    accept(&state, form)?;
    Ok((StatusCode::CREATED, Json(OkResponse { ok: true })))
}
