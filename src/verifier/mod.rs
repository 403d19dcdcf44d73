use std::sync::Arc;

use anyhow::bail;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::VerifierConfig,
    core::{
        identifiers::{
            EphemeralEcdhPrivateJwk, EphemeralEcdhPublicJwk, IdentifierError, Nonce, RequestId,
            ResponseCode, TransactionId,
        },
        jarm::{verify_jarm_response, JarmError},
        jwe::KeyManagementAlgorithm,
        keys::generate_ephemeral_key_pair,
        parameters::{EmbedOption, GetWalletResponseMethod, RedirectUriError, ResponseModeOption},
        presentation::{OrderingError, Presentation, Requested},
        presentation_definition::PresentationDefinition,
        presentation_type::PresentationType,
        response::{AuthorizationResponse, ResponseValidationError, WalletResponse},
    },
};

use request_signer::RequestObjectSigner;
use store::{PresentationStore, StoreConflict};

pub mod request_signer;
pub mod store;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no presentation found for {0}")]
    NotFound(String),
    #[error("presentation is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("response was posted with {received}, expected {expected}")]
    ResponseModeMismatch {
        expected: ResponseModeOption,
        received: ResponseModeOption,
    },
    #[error("response does not carry a state")]
    MissingState,
    #[error("state of the response does not match the request")]
    StateMismatch,
    #[error("response code does not match")]
    InvalidResponseCode,
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    #[error(transparent)]
    Ordering(#[from] OrderingError),
    #[error(transparent)]
    Jarm(#[from] JarmError),
    #[error(transparent)]
    Response(#[from] ResponseValidationError),
    #[error(transparent)]
    RedirectUri(#[from] RedirectUriError),
    #[error("reference URL could not be built: {0}")]
    ReferenceUrl(#[from] url::ParseError),
    #[error("ephemeral key could not be generated: {0}")]
    KeyGeneration(#[source] josekit::JoseError),
    #[error("presentation store failed: {0:#}")]
    Store(#[source] anyhow::Error),
    #[error("request object could not be signed: {0:#}")]
    Signing(#[source] anyhow::Error),
}

fn invalid_state(presentation: &Presentation, expected: &'static str) -> Error {
    Error::InvalidState {
        expected,
        actual: presentation.kind(),
    }
}

/// What the verifier's front end asks for when starting a transaction.
#[derive(Debug, Clone)]
pub struct InitTransaction {
    pub presentation_type: PresentationType,
    pub nonce: Nonce,
    /// Overrides [VerifierConfig::response_mode].
    pub response_mode: Option<ResponseModeOption>,
    /// Overrides [VerifierConfig::presentation_definition_mode].
    pub presentation_definition_mode: Option<EmbedOption<RequestId>>,
    pub get_wallet_response_method: GetWalletResponseMethod,
}

impl InitTransaction {
    /// A polled transaction using the configured modes.
    pub fn new(presentation_type: PresentationType, nonce: Nonce) -> Self {
        Self {
            presentation_type,
            nonce,
            response_mode: None,
            presentation_definition_mode: None,
            get_wallet_response_method: GetWalletResponseMethod::Poll,
        }
    }

    pub fn with_response_mode(mut self, response_mode: ResponseModeOption) -> Self {
        self.response_mode = Some(response_mode);
        self
    }

    pub fn with_presentation_definition_mode(mut self, mode: EmbedOption<RequestId>) -> Self {
        self.presentation_definition_mode = Some(mode);
        self
    }

    pub fn with_get_wallet_response_method(mut self, method: GetWalletResponseMethod) -> Self {
        self.get_wallet_response_method = method;
        self
    }
}

/// Handed back to the front end once a transaction is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionInitiated {
    pub transaction_id: TransactionId,
    pub client_id: String,
    pub request_id: RequestId,
    /// Where the wallet fetches the request object, when passed by reference.
    pub request_uri: Option<Url>,
    /// Where the wallet fetches the presentation definition, when passed by
    /// reference.
    pub presentation_definition_uri: Option<Url>,
    /// Key the wallet must encrypt its `direct_post.jwt` response to.
    pub ephemeral_ecdh_public_jwk: Option<EphemeralEcdhPublicJwk>,
}

/// An OpenID4VP verifier, driving presentations from request to submission.
///
/// Every operation takes the current instant explicitly; the verifier never
/// reads the clock itself.
#[derive(Debug, Clone)]
pub struct Verifier {
    config: VerifierConfig,
    store: Arc<dyn PresentationStore + Send + Sync>,
    request_signer: Arc<dyn RequestObjectSigner + Send + Sync>,
}

impl Verifier {
    /// Build a new verifier.
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::default()
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Starts a transaction and stores it as requested.
    ///
    /// With `direct_post.jwt` and an encrypting JARM option, a fresh
    /// ephemeral key pair is generated; only its public half leaves the
    /// verifier.
    pub async fn init_transaction(
        &self,
        request: InitTransaction,
        at: DateTime<Utc>,
    ) -> Result<TransactionInitiated, Error> {
        let InitTransaction {
            presentation_type,
            nonce,
            response_mode,
            presentation_definition_mode,
            get_wallet_response_method,
        } = request;

        let response_mode = response_mode.unwrap_or(self.config.response_mode);
        let presentation_definition_mode = presentation_definition_mode
            .unwrap_or_else(|| self.config.presentation_definition_mode.clone());

        // A template without the placeholder must fail now, not once the
        // wallet has already answered.
        get_wallet_response_method
            .redirect_uri(&ResponseCode::generate())
            .transpose()?;

        let (private_jwk, public_jwk) = match self.ephemeral_key(response_mode)? {
            Some((private_jwk, public_jwk)) => (Some(private_jwk), Some(public_jwk)),
            None => (None, None),
        };

        let request_id = RequestId::generate();
        let request_uri = self
            .config
            .request_jar_mode
            .reference_url(&request_id)
            .transpose()?;
        let presentation_definition_uri = match presentation_type.presentation_definition() {
            Some(_) => presentation_definition_mode
                .reference_url(&request_id)
                .transpose()?,
            None => None,
        };

        let requested = Requested {
            id: TransactionId::generate(),
            initiated_at: at,
            presentation_type,
            request_id,
            nonce,
            ephemeral_ecdh_private_jwk: private_jwk,
            ephemeral_ecdh_public_jwk: public_jwk.clone(),
            response_mode,
            presentation_definition_mode,
            get_wallet_response_method,
        };
        self.store(&requested.clone().into()).await?;

        info!(
            transaction_id = %requested.id,
            request_id = %requested.request_id,
            response_mode = %response_mode,
            "transaction initiated"
        );

        Ok(TransactionInitiated {
            transaction_id: requested.id,
            client_id: self.config.client_id().to_owned(),
            request_id: requested.request_id,
            request_uri,
            presentation_definition_uri,
            ephemeral_ecdh_public_jwk: public_jwk,
        })
    }

    fn ephemeral_key(
        &self,
        response_mode: ResponseModeOption,
    ) -> Result<Option<(EphemeralEcdhPrivateJwk, EphemeralEcdhPublicJwk)>, Error> {
        if response_mode != ResponseModeOption::DirectPostJwt {
            return Ok(None);
        }
        let metadata = &self.config.client_metadata;
        let Some(encryption) = metadata.jarm_option.encryption() else {
            return Ok(None);
        };
        let alg: KeyManagementAlgorithm = encryption
            .alg
            .parse()
            .map_err(|_| JarmError::UnsupportedAlgorithm(encryption.alg.clone()))?;
        debug!("generating ephemeral {alg} key");
        generate_ephemeral_key_pair(metadata.ephemeral_key_curve, alg)
            .map(Some)
            .map_err(Error::KeyGeneration)
    }

    /// Serves the signed request object to the wallet and records that it
    /// was fetched.
    ///
    /// ## Returns
    /// The signed request object as a JWT.
    pub async fn retrieve_request_object(
        &self,
        request_id: &RequestId,
        at: DateTime<Utc>,
    ) -> Result<String, Error> {
        let requested = match self.load_by_request_id(request_id).await? {
            Presentation::Requested(requested) => requested,
            other => return Err(invalid_state(&other, "Requested")),
        };
        let retrieved = requested.retrieve_request_object(at)?;

        let jwt = self
            .request_signer
            .sign_request_object(&self.config, at, &retrieved)
            .await
            .map_err(Error::Signing)?;
        self.store(&retrieved.into()).await?;

        debug!(%request_id, "request object retrieved");
        Ok(jwt)
    }

    /// Serves the presentation definition of a pending request that passes
    /// it by reference.
    pub async fn presentation_definition(
        &self,
        request_id: &RequestId,
    ) -> Result<PresentationDefinition, Error> {
        let presentation = self.load_by_request_id(request_id).await?;
        let mode = match &presentation {
            Presentation::Requested(p) => &p.presentation_definition_mode,
            Presentation::RequestObjectRetrieved(p) => p.presentation_definition_mode(),
            other => return Err(invalid_state(other, "RequestObjectRetrieved")),
        };
        match (mode, presentation.presentation_type().presentation_definition()) {
            (EmbedOption::ByReference(_), Some(definition)) => Ok(definition.clone()),
            _ => Err(Error::NotFound(format!(
                "presentation definition of {request_id}"
            ))),
        }
    }

    /// Accepts the wallet's authorization response.
    ///
    /// The response is matched to its transaction through `state`, which
    /// must also be echoed inside a JARM response.
    ///
    /// ## Returns
    /// The URI the wallet should redirect the user agent to, when the front
    /// end asked to be redirected.
    pub async fn post_wallet_response(
        &self,
        response: AuthorizationResponse,
        at: DateTime<Utc>,
    ) -> Result<Option<Url>, Error> {
        let request_id = RequestId::new(response.state().ok_or(Error::MissingState)?)?;
        let retrieved = match self.load_by_request_id(&request_id).await? {
            Presentation::RequestObjectRetrieved(retrieved) => retrieved,
            other => {
                warn!(%request_id, state = other.kind(), "response for a presentation not awaiting one");
                return Err(invalid_state(&other, "RequestObjectRetrieved"));
            }
        };

        let expected = retrieved.response_mode();
        let received = response.response_mode();
        if expected != received {
            warn!(%request_id, %expected, %received, "response mode mismatch");
            return Err(Error::ResponseModeMismatch { expected, received });
        }

        let data = match response {
            AuthorizationResponse::DirectPost(data) => data,
            AuthorizationResponse::DirectPostJwt { response, .. } => {
                let data = verify_jarm_response(
                    &self.config.client_metadata.jarm_option,
                    retrieved.ephemeral_ecdh_private_jwk(),
                    &response,
                )
                .inspect_err(|e| warn!(%request_id, kind = e.kind(), "JARM response rejected"))?;
                if data.state.as_deref() != Some(request_id.as_str()) {
                    warn!(%request_id, "JARM response carries another state");
                    return Err(Error::StateMismatch);
                }
                data
            }
        };

        let wallet_response =
            WalletResponse::from_response_data(retrieved.presentation_type(), data)
                .inspect_err(|e| warn!(%request_id, "wallet response rejected: {e}"))?;

        let method = retrieved.get_wallet_response_method();
        let response_code = match method {
            GetWalletResponseMethod::Poll => None,
            GetWalletResponseMethod::Redirect { .. } => Some(ResponseCode::generate()),
        };
        let redirect_uri = match &response_code {
            Some(code) => method.redirect_uri(code).transpose()?,
            None => None,
        };

        let submitted = retrieved.submit(at, wallet_response, response_code)?;
        self.store(&submitted.clone().into()).await?;

        info!(transaction_id = %submitted.id(), %request_id, "wallet response submitted");
        Ok(redirect_uri)
    }

    /// Hands the submitted wallet response to the front end.
    ///
    /// A transaction that redirected the front end also requires the
    /// response code it was given; one that polls must not pass any.
    pub async fn wallet_response(
        &self,
        transaction_id: &TransactionId,
        response_code: Option<&ResponseCode>,
    ) -> Result<WalletResponse, Error> {
        let presentation = self
            .store
            .load_by_id(transaction_id)
            .await
            .map_err(Error::Store)?
            .ok_or_else(|| Error::NotFound(format!("transaction {transaction_id}")))?;
        let submitted = match presentation {
            Presentation::Submitted(submitted) => submitted,
            other => return Err(invalid_state(&other, "Submitted")),
        };

        let code_matches = match (submitted.response_code(), response_code) {
            (Some(expected), Some(presented)) => expected.matches(presented),
            (None, None) => true,
            _ => false,
        };
        if !code_matches {
            warn!(%transaction_id, "wallet response requested with a wrong response code");
            return Err(Error::InvalidResponseCode);
        }
        Ok(submitted.wallet_response().clone())
    }

    /// Times out every pending presentation that has waited longer than
    /// [VerifierConfig::max_age] as of `at`.
    ///
    /// ## Returns
    /// The ids of the presentations that were timed out.
    pub async fn timeout_presentations(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Vec<TransactionId>, Error> {
        let max_age = self.config.max_age();
        let mut timed_out = Vec::new();
        for presentation in self.store.load_incomplete().await.map_err(Error::Store)? {
            if !presentation.is_expired(at, max_age) {
                continue;
            }
            let Some(result) = presentation.time_out(at) else {
                continue;
            };
            match self.store(&result?.into()).await {
                Ok(()) => {}
                Err(Error::Store(e)) if e.is::<StoreConflict>() => {
                    debug!(transaction_id = %presentation.id(), "completed before it timed out");
                    continue;
                }
                Err(e) => return Err(e),
            }
            info!(transaction_id = %presentation.id(), "presentation timed out");
            timed_out.push(presentation.id().clone());
        }
        Ok(timed_out)
    }

    async fn load_by_request_id(&self, request_id: &RequestId) -> Result<Presentation, Error> {
        self.store
            .load_by_request_id(request_id)
            .await
            .map_err(Error::Store)?
            .ok_or_else(|| Error::NotFound(format!("request {request_id}")))
    }

    async fn store(&self, presentation: &Presentation) -> Result<(), Error> {
        debug!(
            transaction_id = %presentation.id(),
            state = presentation.kind(),
            "storing presentation"
        );
        self.store.store(presentation).await.map_err(Error::Store)
    }
}

/// Builder struct for [Verifier].
#[derive(Debug, Clone, Default)]
pub struct VerifierBuilder {
    config: Option<VerifierConfig>,
    store: Option<Arc<dyn PresentationStore + Send + Sync>>,
    request_signer: Option<Arc<dyn RequestObjectSigner + Send + Sync>>,
}

impl VerifierBuilder {
    /// Build the verifier.
    pub fn build(self) -> anyhow::Result<Verifier> {
        let Self {
            config,
            store,
            request_signer,
        } = self;

        let Some(config) = config else {
            bail!("config is required, see `with_config`")
        };

        let Some(store) = store else {
            bail!("presentation store is required, see `with_store`")
        };

        let Some(request_signer) = request_signer else {
            bail!("request signer is required, see `with_request_signer`")
        };

        Ok(Verifier {
            config,
            store,
            request_signer,
        })
    }

    pub fn with_config(mut self, config: VerifierConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the [PresentationStore] that the [Verifier] will use to maintain
    /// presentations across requests.
    pub fn with_store(mut self, store: Arc<dyn PresentationStore + Send + Sync>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the [RequestObjectSigner] that signs the request objects served
    /// to wallets.
    pub fn with_request_signer(
        mut self,
        request_signer: Arc<dyn RequestObjectSigner + Send + Sync>,
    ) -> Self {
        self.request_signer = Some(request_signer);
        self
    }
}
