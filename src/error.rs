use std::path::PathBuf;

use thiserror::Error;

/// The alert body does not follow the `Citation*, Query` layout.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no citation heading found in alert body")]
    MissingAnchor,

    #[error("unexpected alert structure: expected {expected}, found {found}")]
    Structure { expected: &'static str, found: String },
}

/// Failure while unwrapping a tracking URL.
///
/// Everything except `TooManyRedirects` is a redirect protocol violation.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HEAD {url} timed out")]
    Timeout { url: String },

    #[error("HEAD {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HEAD {url} returned {status}, expected 302 Found")]
    UnexpectedStatus {
        url: String,
        status: u16,
        headers: Vec<(String, String)>,
    },

    #[error("302 from {url} carried no Location header")]
    MissingLocation { url: String },

    #[error("{url} has no `{param}` query parameter")]
    MissingTarget { url: String, param: String },

    #[error("gave up after {hops} redirects, last URL {url}")]
    TooManyRedirects { hops: usize, url: String },
}

impl ResolveError {
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, ResolveError::TooManyRedirects { .. })
    }
}

/// Failure pulling the HTML body and date out of an `.eml` container.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed MIME message: {0}")]
    Mime(#[from] mailparse::MailParseError),

    #[error("message has no text/html part")]
    NoHtmlBody,

    #[error("message has no Date header")]
    MissingDate,

    #[error("unparseable Date header {0:?}")]
    BadDate(String),
}

/// Anything that abandons a single email. Only the batch loop handles these.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl EmailError {
    /// Stable label for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EmailError::Extract(_) => "extract",
            EmailError::Parse(ParseError::MissingAnchor) => "missing_anchor",
            EmailError::Parse(ParseError::Structure { .. }) => "structure",
            EmailError::Resolve(e) if e.is_protocol_error() => "redirect_protocol",
            EmailError::Resolve(_) => "too_many_redirects",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let timeout = EmailError::from(ResolveError::Timeout { url: "u".into() });
        assert_eq!(timeout.kind(), "redirect_protocol");
        let hops = EmailError::from(ResolveError::TooManyRedirects { hops: 10, url: "u".into() });
        assert_eq!(hops.kind(), "too_many_redirects");
        assert_eq!(EmailError::from(ParseError::MissingAnchor).kind(), "missing_anchor");
        assert_eq!(EmailError::from(ExtractError::NoHtmlBody).kind(), "extract");
    }

    #[test]
    fn structure_message_names_both_sides() {
        let e = ParseError::Structure {
            expected: "blurb container after authors",
            found: "end of content".into(),
        };
        assert_eq!(
            e.to_string(),
            "unexpected alert structure: expected blurb container after authors, found end of content"
        );
    }
}
