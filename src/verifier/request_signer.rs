use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{config::VerifierConfig, core::presentation::RequestObjectRetrieved};

/// Produces the signed request object (JAR) served to the wallet.
#[async_trait]
pub trait RequestObjectSigner: Debug {
    /// Signs the request object of `presentation` as of `at`, returning the
    /// compact JWT.
    ///
    /// Implementations typically sign with [VerifierConfig::signing] and
    /// embed the ephemeral public key in the client metadata.
    async fn sign_request_object(
        &self,
        config: &VerifierConfig,
        at: DateTime<Utc>,
        presentation: &RequestObjectRetrieved,
    ) -> Result<String>;
}
