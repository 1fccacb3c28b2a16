//! Contact form submissions.

use sea_query::{Query, SqliteQueryBuilder};

use super::Built;
use super::tables::ContactMessages;

pub struct ContactValues<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub subject: Option<&'a str>,
    pub message: &'a str,
    pub attachment_name: Option<&'a str>,
    pub attachment_path: Option<&'a str>,
}

pub fn insert(id: &str, v: &ContactValues<'_>) -> Built {
    Query::insert()
        .into_table(ContactMessages::Table)
        .columns([
            ContactMessages::Id,
            ContactMessages::Name,
            ContactMessages::Email,
            ContactMessages::Subject,
            ContactMessages::Message,
            ContactMessages::AttachmentName,
            ContactMessages::AttachmentPath,
        ])
        .values_panic([
            id.into(),
            v.name.into(),
            v.email.into(),
            v.subject.map(str::to_string).into(),
            v.message.into(),
            v.attachment_name.map(str::to_string).into(),
            v.attachment_path.map(str::to_string).into(),
        ])
        .build(SqliteQueryBuilder)
}
