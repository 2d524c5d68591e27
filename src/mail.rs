use std::path::Path;

use chrono::{DateTime, FixedOffset};
use mailparse::{MailHeaderMap, ParsedMail};

use crate::error::ExtractError;

/// The two things the parser needs from an alert email.
#[derive(Debug, Clone)]
pub struct RawEmail {
    pub html: String,
    pub date: DateTime<FixedOffset>,
}

pub fn read_eml(path: &Path) -> Result<RawEmail, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_eml(&bytes)
}

pub fn parse_eml(bytes: &[u8]) -> Result<RawEmail, ExtractError> {
    let mail = mailparse::parse_mail(bytes)?;
    let date = mail
        .headers
        .get_first_value("Date")
        .ok_or(ExtractError::MissingDate)?;
    let date = parse_date(&date)?;
    let html = html_part(&mail).ok_or(ExtractError::NoHtmlBody)?.get_body()?;
    Ok(RawEmail { html, date })
}

/// Depth-first search for the first `text/html` part.
fn html_part<'m, 'a>(mail: &'m ParsedMail<'a>) -> Option<&'m ParsedMail<'a>> {
    if mail.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        return Some(mail);
    }
    mail.subparts.iter().find_map(html_part)
}

/// RFC 2822 date, keeping the sender's offset.
pub fn parse_date(value: &str) -> Result<DateTime<FixedOffset>, ExtractError> {
    let value = value.trim();
    // "Tue, 1 Jul 2024 10:52:37 +0000 (UTC)": chrono rejects the trailing comment
    let without_comment = match value.rfind('(') {
        Some(i) if value.ends_with(')') => value[..i].trim_end(),
        _ => value,
    };
    if let Ok(date) = DateTime::parse_from_rfc2822(without_comment) {
        return Ok(date);
    }
    mailparse::dateparse(value)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|utc| utc.fixed_offset())
        .ok_or_else(|| ExtractError::BadDate(value.to_string()))
}
