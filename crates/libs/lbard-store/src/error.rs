use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rhizome request to {url} failed: {detail}")]
    Http { url: String, detail: String },

    #[error("rhizome returned unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to read response body from {url}: {source}")]
    Body { url: String, source: std::io::Error },

    #[error("malformed bundle listing row: {0}")]
    MalformedRow(String),
}

pub(crate) fn format_http_error(url: &str, err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, _) => StoreError::Status { url: url.to_owned(), status },
        ureq::Error::Transport(transport) => {
            StoreError::Http { url: url.to_owned(), detail: transport.to_string() }
        }
    }
}
