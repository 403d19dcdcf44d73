//! Lifecycle of a presentation transaction.
//!
//! ```text
//! Requested --retrieve_request_object--> RequestObjectRetrieved --submit--> Submitted
//!     |                                          |
//!     +--------------timed_out-------------------+--------timed_out-------> TimedOut
//! ```
//!
//! Transitions borrow their source state and return a new value, so a
//! rejected transition leaves the caller with the state it started from.

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use super::{
    identifiers::{EphemeralEcdhPrivateJwk, EphemeralEcdhPublicJwk, Nonce, RequestId, ResponseCode, TransactionId},
    parameters::{EmbedOption, GetWalletResponseMethod, ResponseModeOption},
    presentation_type::PresentationType,
    response::WalletResponse,
};

pub const INITIATED_AT: &str = "initiated_at";
pub const REQUEST_OBJECT_RETRIEVED_AT: &str = "request_object_retrieved_at";
pub const SUBMITTED_AT: &str = "submitted_at";
pub const TIMED_OUT_AT: &str = "timed_out_at";

/// Two timestamps of a presentation are out of order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("{earlier} must be earlier than {later}")]
    NotEarlier {
        earlier: &'static str,
        later: &'static str,
    },
    #[error("{earlier} must not be after {later}")]
    After {
        earlier: &'static str,
        later: &'static str,
    },
}

fn not_after(
    (earlier, earlier_at): (&'static str, DateTime<Utc>),
    (later, later_at): (&'static str, DateTime<Utc>),
) -> Result<(), OrderingError> {
    if earlier_at > later_at {
        return Err(OrderingError::After { earlier, later });
    }
    Ok(())
}

fn strictly_before(
    (earlier, earlier_at): (&'static str, DateTime<Utc>),
    (later, later_at): (&'static str, DateTime<Utc>),
) -> Result<(), OrderingError> {
    if earlier_at >= later_at {
        return Err(OrderingError::NotEarlier { earlier, later });
    }
    Ok(())
}

/// `at` is strictly past `since + timeout`. A deadline beyond the
/// representable range never passes.
fn deadline_passed(since: DateTime<Utc>, timeout: TimeDelta, at: DateTime<Utc>) -> bool {
    since
        .checked_add_signed(timeout)
        .is_some_and(|deadline| at > deadline)
}

/// A request has been issued and waits for the wallet to fetch it.
#[derive(Debug, Clone, PartialEq)]
pub struct Requested {
    pub id: TransactionId,
    pub initiated_at: DateTime<Utc>,
    pub presentation_type: PresentationType,
    pub request_id: RequestId,
    pub nonce: Nonce,
    /// Private half of the key the wallet encrypts its response to, when
    /// the response is expected as an encrypted JARM JWT.
    pub ephemeral_ecdh_private_jwk: Option<EphemeralEcdhPrivateJwk>,
    /// Public half of the same key, as handed to the wallet.
    pub ephemeral_ecdh_public_jwk: Option<EphemeralEcdhPublicJwk>,
    pub response_mode: ResponseModeOption,
    pub presentation_definition_mode: EmbedOption<RequestId>,
    pub get_wallet_response_method: GetWalletResponseMethod,
}

impl Requested {
    pub fn is_expired(&self, at: DateTime<Utc>, timeout: TimeDelta) -> bool {
        deadline_passed(self.initiated_at, timeout, at)
    }

    pub fn retrieve_request_object(
        &self,
        at: DateTime<Utc>,
    ) -> Result<RequestObjectRetrieved, OrderingError> {
        RequestObjectRetrieved::new(self.clone(), at)
    }

    pub fn timed_out(&self, at: DateTime<Utc>) -> Result<TimedOut, OrderingError> {
        TimedOut::new(
            self.id.clone(),
            self.initiated_at,
            self.presentation_type.clone(),
            None,
            None,
            at,
        )
    }
}

/// The wallet has fetched the request object and the verifier waits for
/// its response.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestObjectRetrieved {
    requested: Requested,
    request_object_retrieved_at: DateTime<Utc>,
}

impl RequestObjectRetrieved {
    /// Fails if `request_object_retrieved_at` precedes the request.
    pub fn new(
        requested: Requested,
        request_object_retrieved_at: DateTime<Utc>,
    ) -> Result<Self, OrderingError> {
        not_after(
            (INITIATED_AT, requested.initiated_at),
            (REQUEST_OBJECT_RETRIEVED_AT, request_object_retrieved_at),
        )?;
        Ok(Self {
            requested,
            request_object_retrieved_at,
        })
    }

    pub fn id(&self) -> &TransactionId {
        &self.requested.id
    }

    pub fn initiated_at(&self) -> DateTime<Utc> {
        self.requested.initiated_at
    }

    pub fn presentation_type(&self) -> &PresentationType {
        &self.requested.presentation_type
    }

    pub fn request_id(&self) -> &RequestId {
        &self.requested.request_id
    }

    pub fn nonce(&self) -> &Nonce {
        &self.requested.nonce
    }

    pub fn ephemeral_ecdh_private_jwk(&self) -> Option<&EphemeralEcdhPrivateJwk> {
        self.requested.ephemeral_ecdh_private_jwk.as_ref()
    }

    pub fn ephemeral_ecdh_public_jwk(&self) -> Option<&EphemeralEcdhPublicJwk> {
        self.requested.ephemeral_ecdh_public_jwk.as_ref()
    }

    pub fn response_mode(&self) -> ResponseModeOption {
        self.requested.response_mode
    }

    pub fn presentation_definition_mode(&self) -> &EmbedOption<RequestId> {
        &self.requested.presentation_definition_mode
    }

    pub fn get_wallet_response_method(&self) -> &GetWalletResponseMethod {
        &self.requested.get_wallet_response_method
    }

    pub fn request_object_retrieved_at(&self) -> DateTime<Utc> {
        self.request_object_retrieved_at
    }

    pub fn is_expired(&self, at: DateTime<Utc>, timeout: TimeDelta) -> bool {
        deadline_passed(self.request_object_retrieved_at, timeout, at)
    }

    /// Records the wallet response. The ephemeral key is not carried over.
    pub fn submit(
        &self,
        at: DateTime<Utc>,
        wallet_response: WalletResponse,
        response_code: Option<ResponseCode>,
    ) -> Result<Submitted, OrderingError> {
        let requested = &self.requested;
        Submitted::new(
            requested.id.clone(),
            requested.initiated_at,
            requested.presentation_type.clone(),
            requested.request_id.clone(),
            requested.nonce.clone(),
            self.request_object_retrieved_at,
            at,
            wallet_response,
            response_code,
        )
    }

    pub fn timed_out(&self, at: DateTime<Utc>) -> Result<TimedOut, OrderingError> {
        TimedOut::new(
            self.requested.id.clone(),
            self.requested.initiated_at,
            self.requested.presentation_type.clone(),
            Some(self.request_object_retrieved_at),
            None,
            at,
        )
    }
}

/// The wallet has responded. Terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    id: TransactionId,
    initiated_at: DateTime<Utc>,
    presentation_type: PresentationType,
    request_id: RequestId,
    nonce: Nonce,
    request_object_retrieved_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    wallet_response: WalletResponse,
    response_code: Option<ResponseCode>,
}

impl Submitted {
    /// Fails unless `initiated_at <= request_object_retrieved_at <= submitted_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TransactionId,
        initiated_at: DateTime<Utc>,
        presentation_type: PresentationType,
        request_id: RequestId,
        nonce: Nonce,
        request_object_retrieved_at: DateTime<Utc>,
        submitted_at: DateTime<Utc>,
        wallet_response: WalletResponse,
        response_code: Option<ResponseCode>,
    ) -> Result<Self, OrderingError> {
        not_after(
            (INITIATED_AT, initiated_at),
            (REQUEST_OBJECT_RETRIEVED_AT, request_object_retrieved_at),
        )?;
        not_after(
            (REQUEST_OBJECT_RETRIEVED_AT, request_object_retrieved_at),
            (SUBMITTED_AT, submitted_at),
        )?;
        Ok(Self {
            id,
            initiated_at,
            presentation_type,
            request_id,
            nonce,
            request_object_retrieved_at,
            submitted_at,
            wallet_response,
            response_code,
        })
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn initiated_at(&self) -> DateTime<Utc> {
        self.initiated_at
    }

    pub fn presentation_type(&self) -> &PresentationType {
        &self.presentation_type
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    pub fn request_object_retrieved_at(&self) -> DateTime<Utc> {
        self.request_object_retrieved_at
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn wallet_response(&self) -> &WalletResponse {
        &self.wallet_response
    }

    /// Present when the front end is redirected and must prove it holds
    /// the code before reading the wallet response.
    pub fn response_code(&self) -> Option<&ResponseCode> {
        self.response_code.as_ref()
    }
}

/// The transaction expired before it completed. Terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedOut {
    id: TransactionId,
    initiated_at: DateTime<Utc>,
    presentation_type: PresentationType,
    request_object_retrieved_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    timed_out_at: DateTime<Utc>,
}

impl TimedOut {
    /// Fails if `timed_out_at` is not strictly after `initiated_at`, or if a
    /// carried-over timestamp precedes the one before it.
    pub fn new(
        id: TransactionId,
        initiated_at: DateTime<Utc>,
        presentation_type: PresentationType,
        request_object_retrieved_at: Option<DateTime<Utc>>,
        submitted_at: Option<DateTime<Utc>>,
        timed_out_at: DateTime<Utc>,
    ) -> Result<Self, OrderingError> {
        strictly_before((INITIATED_AT, initiated_at), (TIMED_OUT_AT, timed_out_at))?;
        if let Some(retrieved_at) = request_object_retrieved_at {
            not_after(
                (INITIATED_AT, initiated_at),
                (REQUEST_OBJECT_RETRIEVED_AT, retrieved_at),
            )?;
        }
        if let Some(submitted_at) = submitted_at {
            let previous = match request_object_retrieved_at {
                Some(retrieved_at) => (REQUEST_OBJECT_RETRIEVED_AT, retrieved_at),
                None => (INITIATED_AT, initiated_at),
            };
            not_after(previous, (SUBMITTED_AT, submitted_at))?;
        }
        Ok(Self {
            id,
            initiated_at,
            presentation_type,
            request_object_retrieved_at,
            submitted_at,
            timed_out_at,
        })
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn initiated_at(&self) -> DateTime<Utc> {
        self.initiated_at
    }

    pub fn presentation_type(&self) -> &PresentationType {
        &self.presentation_type
    }

    pub fn request_object_retrieved_at(&self) -> Option<DateTime<Utc>> {
        self.request_object_retrieved_at
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn timed_out_at(&self) -> DateTime<Utc> {
        self.timed_out_at
    }
}

/// A presentation transaction in any of its states.
#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    Requested(Requested),
    RequestObjectRetrieved(RequestObjectRetrieved),
    Submitted(Submitted),
    TimedOut(TimedOut),
}

impl Presentation {
    /// Name of the current state, as used by the `__type` wire discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Presentation::Requested(_) => "Requested",
            Presentation::RequestObjectRetrieved(_) => "RequestObjectRetrieved",
            Presentation::Submitted(_) => "Submitted",
            Presentation::TimedOut(_) => "TimedOut",
        }
    }

    pub fn id(&self) -> &TransactionId {
        match self {
            Presentation::Requested(p) => &p.id,
            Presentation::RequestObjectRetrieved(p) => p.id(),
            Presentation::Submitted(p) => p.id(),
            Presentation::TimedOut(p) => p.id(),
        }
    }

    pub fn initiated_at(&self) -> DateTime<Utc> {
        match self {
            Presentation::Requested(p) => p.initiated_at,
            Presentation::RequestObjectRetrieved(p) => p.initiated_at(),
            Presentation::Submitted(p) => p.initiated_at(),
            Presentation::TimedOut(p) => p.initiated_at(),
        }
    }

    pub fn presentation_type(&self) -> &PresentationType {
        match self {
            Presentation::Requested(p) => &p.presentation_type,
            Presentation::RequestObjectRetrieved(p) => p.presentation_type(),
            Presentation::Submitted(p) => p.presentation_type(),
            Presentation::TimedOut(p) => p.presentation_type(),
        }
    }

    /// `None` once timed out: the request id is no longer served to wallets.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Presentation::Requested(p) => Some(&p.request_id),
            Presentation::RequestObjectRetrieved(p) => Some(p.request_id()),
            Presentation::Submitted(p) => Some(p.request_id()),
            Presentation::TimedOut(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Presentation::Submitted(_) | Presentation::TimedOut(_))
    }

    /// Terminal presentations never expire.
    pub fn is_expired(&self, at: DateTime<Utc>, timeout: TimeDelta) -> bool {
        match self {
            Presentation::Requested(p) => p.is_expired(at, timeout),
            Presentation::RequestObjectRetrieved(p) => p.is_expired(at, timeout),
            Presentation::Submitted(_) | Presentation::TimedOut(_) => false,
        }
    }

    /// Times out a pending presentation; `None` if it is already terminal.
    pub fn time_out(&self, at: DateTime<Utc>) -> Option<Result<TimedOut, OrderingError>> {
        match self {
            Presentation::Requested(p) => Some(p.timed_out(at)),
            Presentation::RequestObjectRetrieved(p) => Some(p.timed_out(at)),
            Presentation::Submitted(_) | Presentation::TimedOut(_) => None,
        }
    }
}

impl From<Requested> for Presentation {
    fn from(value: Requested) -> Self {
        Self::Requested(value)
    }
}

impl From<RequestObjectRetrieved> for Presentation {
    fn from(value: RequestObjectRetrieved) -> Self {
        Self::RequestObjectRetrieved(value)
    }
}

impl From<Submitted> for Presentation {
    fn from(value: Submitted) -> Self {
        Self::Submitted(value)
    }
}

impl From<TimedOut> for Presentation {
    fn from(value: TimedOut) -> Self {
        Self::TimedOut(value)
    }
}
