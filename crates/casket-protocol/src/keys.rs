//! Remote TACT key list

use casket_crypto::Keyring;
use tracing::{info, warn};

use crate::error::{ProtocolError, Result};
use crate::transport::HttpClient;

/// Merge the key list at `url` into `keyring`, returning the keys added
///
/// A non-success status is logged and yields 0; transport failures are
/// returned.
pub async fn refresh_keys(http: &HttpClient, url: &str, keyring: &Keyring) -> Result<usize> {
    let content = match http.get_text(url).await {
        Ok(content) => content,
        Err(ProtocolError::HttpStatus { status, .. }) => {
            warn!(%url, status, "unable to update tact keys");
            return Ok(0);
        }
        Err(e) => return Err(e),
    };

    let added = keyring.merge_key_list(&content);
    info!(added, total = keyring.len(), "added tact keys from remote list");
    Ok(added)
}
