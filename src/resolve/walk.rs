//! Bounded HEAD redirect walk.
//!
//! Follows redirects manually, one request per hop, so the first hop's status
//! and every intermediate target are observed.

use std::time::Duration;

use url::Url;

use super::probe::HeadProbe;
use crate::error_handling::ResolveError;

/// Where a walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    pub final_url: Url,
    pub status_code: u16,
    pub status_message: String,
    pub first_hop_code: Option<u16>,
}

fn is_redirect(code: u16) -> bool {
    (300..400).contains(&code)
}

/// Walks the redirect chain from `start`, issuing at most `max_hops` requests.
///
/// With `max_hops == 0` a single request reports the first hop and nothing is
/// followed. A non-3xx status or a 3xx without a usable `Location` ends the
/// walk at that hop. Running out of hops settles nothing: the final URL stays
/// `start` and the status is 0, so loops and long chains are never treated as
/// fixable.
///
/// # Errors
///
/// Any failed request aborts the walk; there is no partial result.
pub async fn walk_redirects(
    probe: &dyn HeadProbe,
    start: &Url,
    max_hops: usize,
    timeout: Duration,
) -> Result<WalkOutcome, ResolveError> {
    if max_hops == 0 {
        let response = probe.head(start, timeout).await?;
        return Ok(WalkOutcome {
            final_url: start.clone(),
            status_code: response.status,
            status_message: response.reason,
            first_hop_code: Some(response.status),
        });
    }

    let mut current = start.clone();
    let mut first_hop_code = None;
    let mut status_message = String::new();

    for _ in 0..max_hops {
        let response = probe.head(&current, timeout).await?;
        first_hop_code.get_or_insert(response.status);
        status_message = response.reason;

        if !is_redirect(response.status) {
            return Ok(WalkOutcome {
                final_url: current,
                status_code: response.status,
                status_message,
                first_hop_code,
            });
        }
        let Some(location) = response.location else {
            log::debug!("Redirect {} from {} without Location", response.status, current);
            return Ok(WalkOutcome {
                final_url: current,
                status_code: response.status,
                status_message,
                first_hop_code,
            });
        };
        // Relative targets resolve against the current hop
        match current.join(&location) {
            Ok(next) => current = next,
            Err(e) => {
                log::debug!("Unusable Location {:?} from {}: {}", location, current, e);
                return Ok(WalkOutcome {
                    final_url: current,
                    status_code: response.status,
                    status_message,
                    first_hop_code,
                });
            }
        }
    }

    log::debug!("Hop limit {} reached walking {} (stopped at {})", max_hops, start, current);
    Ok(WalkOutcome {
        final_url: start.clone(),
        status_code: 0,
        status_message,
        first_hop_code,
    })
}
