use polars::frame::DataFrame;

/// A provider response as produced by a fetcher.
///
/// The core never looks inside; only the normalizer registered for the same
/// provider knows how to read it.
#[derive(Debug, Clone)]
pub enum RawPayload {
    /// Nested JSON document (Open-Meteo ensemble API).
    Json(serde_json::Value),
    /// Tabular response, parsed into a frame (Meteomatics CSV).
    Table(DataFrame),
}

impl RawPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            RawPayload::Json(_) => "json",
            RawPayload::Table(_) => "table",
        }
    }
}
