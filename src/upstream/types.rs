use crate::pointer::UpstreamPointer;

/// A read operation that can be served locally or by the authority.
///
/// Paths and query parameters mirror the local read endpoints exactly, so an
/// authority receiving a forwarded request handles it as if it came from a
/// direct caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRequest {
    /// Fetch one cell's content
    Cell {
        session_id: String,
        cell_id: String,
        timestamp: String,
    },
    /// List cell ids, for one session or across every session
    CellIds { session_id: Option<String> },
}

impl ReadRequest {
    pub fn cell(
        session_id: impl Into<String>,
        cell_id: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self::Cell {
            session_id: session_id.into(),
            cell_id: cell_id.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn cell_ids(session_id: Option<&str>) -> Self {
        Self::CellIds {
            session_id: session_id.map(str::to_string),
        }
    }

    /// Path relative to the upstream base address.
    pub fn path(&self) -> String {
        match self {
            Self::Cell { session_id, .. } => format!("/code_stream/{}/get-cell/", session_id),
            Self::CellIds {
                session_id: Some(session_id),
            } => format!("/code_stream/{}/get-all-cell-ids/", session_id),
            Self::CellIds { session_id: None } => "/code_stream/get-all-cell-ids/".to_string(),
        }
    }

    /// Query parameters, unencoded.
    pub fn query(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Cell {
                cell_id, timestamp, ..
            } => vec![("cell_id", cell_id.as_str()), ("cell_timestamp", timestamp.as_str())],
            Self::CellIds { .. } => Vec::new(),
        }
    }

    /// Short operation name for logs
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Cell { .. } => "get_cell",
            Self::CellIds { session_id: Some(_) } => "list_session_cell_ids",
            Self::CellIds { session_id: None } => "list_cell_ids",
        }
    }
}

/// Where a forwarded request goes and what it authenticates with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub address: String,
    pub credential: Option<String>,
}

impl UpstreamTarget {
    pub fn new(address: impl Into<String>, credential: Option<String>) -> Self {
        Self {
            address: address.into(),
            credential,
        }
    }
}

impl From<&UpstreamPointer> for UpstreamTarget {
    fn from(pointer: &UpstreamPointer) -> Self {
        Self::new(
            pointer.upstream_address.clone(),
            pointer.credential.clone(),
        )
    }
}
