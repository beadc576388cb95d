//! Resolver output types.

use serde::{Deserialize, Serialize};

/// Where a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Answered by the document store; no request was made.
    Canonical,
    /// Observed through a HEAD redirect walk.
    Http,
    /// External link with redirect following disabled.
    ExternalSkipped,
}

/// Final destination of one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectResolution {
    /// Site-relative for destinations on the site origin, absolute otherwise.
    pub final_url: String,
    /// Status of the last hop observed; 0 when nothing was requested.
    pub status_code: u16,
    pub status_message: String,
    /// Status of the first hop. Synthetic 301 for canonical results.
    pub first_hop_code: Option<u16>,
    pub is_permanent: bool,
    pub origin: Origin,
}

impl RedirectResolution {
    /// First hop in the 3xx range.
    pub fn is_redirect(&self) -> bool {
        matches!(self.first_hop_code, Some(code) if (300..400).contains(&code))
    }
}
