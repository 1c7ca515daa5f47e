//! `register` subcommand (§6 "register", §10.4).
//!
//! Grounded in `examples/original_source/src/blockperf/commands/register.py`
//! and `calidus.py`: request a challenge, sign it with a Calidus secret key,
//! submit the signature, receive an API key. The signing step itself is out
//! of scope (spec.md §1: "the credential-issuance/registration flow") — this
//! is the inert placeholder the CLI surface still needs per §6's exit codes.

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("calidus signing key file not found: {0}")]
    KeyFileNotFound(String),
    #[error("challenge/response registration is not implemented in this agent")]
    NotImplemented,
}

/// Request a challenge, sign it, and exchange it for an API key.
///
/// Always returns `RegistrationError::NotImplemented` once the key file is
/// confirmed to exist — the actual Calidus CBOR signing
/// (`extract_signing_key_from_cbor` in the original) is not implemented.
pub async fn register(
    pool_id: &str,
    calidus_skey: &Path,
    api_base_url: &str,
) -> Result<String, RegistrationError> {
    if !calidus_skey.exists() {
        return Err(RegistrationError::KeyFileNotFound(calidus_skey.display().to_string()));
    }
    tracing::info!(
        pool_id,
        calidus_skey = %calidus_skey.display(),
        api_base_url,
        "registration requested (challenge/response flow not implemented)"
    );
    Err(RegistrationError::NotImplemented)
}
