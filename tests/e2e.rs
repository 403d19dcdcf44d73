use std::{
    sync::{Arc, Mutex},
    time::SystemTime,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use josekit::{
    jwk::{
        alg::ec::{EcCurve, EcKeyPair},
        Jwk,
    },
    jws::{JwsHeader, ES256},
    jwt::{self, JwtPayload},
};
use openid4vp_verifier::{
    config::VerifierConfig,
    core::{
        identifiers::{EphemeralEcdhPublicJwk, Nonce, RequestId, ResponseCode, TransactionId},
        jarm::JarmError,
        jwe::JweBuilder,
        object::UntypedObject,
        parameters::{GetWalletResponseMethod, IdTokenType, ResponseModeOption},
        presentation::{Presentation, RequestObjectRetrieved},
        credential_format::{ClaimFormatDesignation, ClaimFormatMap, ClaimFormatPayload},
        presentation_definition::{
            InputDescriptor, PresentationDefinition, SubmissionRequirement,
            SubmissionRequirementBase, SubmissionRequirementPick,
        },
        presentation_submission::{DescriptorMap, PresentationSubmission},
        presentation_type::PresentationType,
        response::{AuthorizationResponse, ResponseValidationError, WalletResponse},
    },
    verifier::{
        request_signer::RequestObjectSigner,
        store::{MemoryStore, PresentationStore},
        Error, InitTransaction, Verifier,
    },
};
use openid4vp_verifier::JsonPath;
use serde_json::{json, Value as Json};

const REDIRECT_TEMPLATE: &str = "https://frontend.example.com/done#response_code={RESPONSE_CODE}";

/// Signs a minimal request object with the configured static key.
#[derive(Debug)]
struct JwsRequestSigner;

#[async_trait]
impl RequestObjectSigner for JwsRequestSigner {
    async fn sign_request_object(
        &self,
        config: &VerifierConfig,
        at: DateTime<Utc>,
        presentation: &RequestObjectRetrieved,
    ) -> anyhow::Result<String> {
        let mut payload = JwtPayload::new();
        payload.set_issuer(config.client_id());
        payload.set_audience(vec!["https://self-issued.me/v2"]);
        payload.set_issued_at(&SystemTime::from(at));
        payload.set_claim("state", Some(json!(presentation.request_id().as_str())))?;
        payload.set_claim("nonce", Some(json!(presentation.nonce().as_str())))?;
        payload.set_claim(
            "response_mode",
            Some(json!(presentation.response_mode().as_str())),
        )?;
        payload.set_claim(
            "response_type",
            Some(json!(presentation.presentation_type().response_type())),
        )?;

        let mut header = JwsHeader::new();
        header.set_token_type("oauth-authz-req+jwt");
        let signer = config.signing.signer()?;
        Ok(jwt::encode_with_signer(&payload, &header, &*signer)?)
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

struct TestVerifier {
    verifier: Verifier,
    signing_public_key: Jwk,
}

fn verifier() -> TestVerifier {
    verifier_with_store(Arc::new(MemoryStore::default()))
}

fn verifier_with_store(store: Arc<dyn PresentationStore + Send + Sync>) -> TestVerifier {
    let signing_key = EcKeyPair::generate(EcCurve::P256).unwrap();
    let config = json!({
        "client_id_scheme": { "scheme": "x509_san_dns", "client_id": "verifier.example.com" },
        "signing": {
            "static_signing_private_jwk": signing_key.to_jwk_key_pair().to_string(),
            "algorithm": "ES256"
        },
        "public_url": "https://verifier.example.com",
        "request_jar_mode": {
            "type": "by_reference",
            "location": "https://verifier.example.com/wallet/request.jwt"
        },
        "presentation_definition_mode": {
            "type": "by_reference",
            "location": "https://verifier.example.com/wallet/pd"
        },
        "max_age_secs": 60,
        "client_metadata": {
            "jarm_option": { "encrypted": { "alg": "ECDH-ES", "enc": "A128CBC-HS256" } },
            "vp_formats": { "jwt_vp_json": { "alg": ["ES256"] } }
        }
    });
    let config = VerifierConfig::from_json_str(&config.to_string()).unwrap();

    let verifier = Verifier::builder()
        .with_config(config)
        .with_store(store)
        .with_request_signer(Arc::new(JwsRequestSigner))
        .build()
        .unwrap();

    TestVerifier {
        verifier,
        signing_public_key: signing_key.to_jwk_public_key(),
    }
}

fn presentation_definition() -> PresentationDefinition {
    let format = ClaimFormatMap::from([(
        ClaimFormatDesignation::JwtVcJson,
        ClaimFormatPayload::ProofType(vec!["JsonWebSignature2020".into()]),
    )]);
    let descriptor = |id: &str| {
        InputDescriptor::new(id.into(), Default::default())
            .set_format(format.clone())
            .set_group(vec!["A".into()])
    };
    PresentationDefinition::new(
        "0b4dd017-efa6-4a05-a269-9790fa3c22c2".into(),
        descriptor("064255a8-a0fa-4108-9ded-429f83003350"),
    )
    .add_input_descriptors(descriptor("1d1f7c1b-5f28-4b8e-b0a5-2d4e1d3f7f10"))
    .add_submission_requirement(SubmissionRequirement::Pick(SubmissionRequirementPick {
        submission_requirement: SubmissionRequirementBase::from_group("A"),
        count: Some(1),
        min: None,
        max: None,
    }))
}

fn vp_token_request() -> PresentationType {
    PresentationType::VpTokenRequest {
        presentation_definition: presentation_definition(),
    }
}

fn id_token_request() -> PresentationType {
    PresentationType::IdTokenRequest {
        id_token_types: vec![IdTokenType::SubjectSigned],
    }
}

fn submission() -> Json {
    let submission = PresentationSubmission::new(
        "39881a3e-b7d0-4b6f-99f8-bd8bb7f8b1f5".into(),
        "0b4dd017-efa6-4a05-a269-9790fa3c22c2".into(),
        vec![DescriptorMap::new(
            "064255a8-a0fa-4108-9ded-429f83003350",
            ClaimFormatDesignation::JwtVpJson,
            JsonPath::parse("$").unwrap(),
        )
        .set_path_nested(DescriptorMap::new(
            "064255a8-a0fa-4108-9ded-429f83003350",
            ClaimFormatDesignation::JwtVcJson,
            JsonPath::parse("$.vp.verifiableCredential[0]").unwrap(),
        ))],
    );
    Json::try_from(submission).unwrap()
}

fn form(value: Json) -> UntypedObject {
    serde_json::from_value(value).unwrap()
}

/// What a wallet does with the key handed out at initiation.
fn encrypt_for(public: &EphemeralEcdhPublicJwk, claims: Json) -> String {
    JweBuilder::new()
        .payload(claims)
        .recipient_key(public.to_jwk().unwrap())
        .alg("ECDH-ES")
        .enc("A128CBC-HS256")
        .build()
        .unwrap()
}

fn response_code(redirect: &url::Url) -> ResponseCode {
    let code = redirect
        .fragment()
        .and_then(|f| f.strip_prefix("response_code="))
        .unwrap();
    ResponseCode::new(code).unwrap()
}

#[tokio::test]
async fn encrypted_vp_token_with_redirect() {
    let TestVerifier {
        verifier,
        signing_public_key,
    } = verifier();

    let request = InitTransaction::new(vp_token_request(), Nonce::new("nonce-1").unwrap())
        .with_get_wallet_response_method(GetWalletResponseMethod::Redirect {
            redirect_uri_template: REDIRECT_TEMPLATE.into(),
        });
    let initiated = verifier.init_transaction(request, at(0)).await.unwrap();

    assert_eq!(initiated.client_id, "verifier.example.com");
    assert_eq!(
        initiated.request_uri.as_ref().unwrap().as_str(),
        format!(
            "https://verifier.example.com/wallet/request.jwt/{}",
            initiated.request_id
        )
    );
    assert_eq!(
        initiated.presentation_definition_uri.unwrap().as_str(),
        format!("https://verifier.example.com/wallet/pd/{}", initiated.request_id)
    );
    let public = initiated.ephemeral_ecdh_public_jwk.unwrap();
    assert!(public.to_jwk().unwrap().parameter("d").is_none());

    // The wallet fetches the definition and the signed request object.
    let served = verifier
        .presentation_definition(&initiated.request_id)
        .await
        .unwrap();
    assert_eq!(served, presentation_definition());
    assert_eq!(served.submission_requirements().map(<[_]>::len), Some(1));
    assert_eq!(served.input_descriptors()[1].group(), ["A"]);
    let request_object = verifier
        .retrieve_request_object(&initiated.request_id, at(5))
        .await
        .unwrap();
    let jws_verifier = ES256.verifier_from_jwk(&signing_public_key).unwrap();
    let (claims, _) = jwt::decode_with_verifier(&request_object, &jws_verifier).unwrap();
    assert_eq!(
        claims.claim("state"),
        Some(&json!(initiated.request_id.as_str()))
    );
    assert_eq!(claims.claim("nonce"), Some(&json!("nonce-1")));
    assert_eq!(claims.claim("response_mode"), Some(&json!("direct_post.jwt")));

    // A second fetch is refused.
    assert!(matches!(
        verifier
            .retrieve_request_object(&initiated.request_id, at(6))
            .await,
        Err(Error::InvalidState {
            actual: "RequestObjectRetrieved",
            ..
        })
    ));

    let jwe = encrypt_for(
        &public,
        json!({
            "state": initiated.request_id.as_str(),
            "vp_token": "eyJhbGciOiJFUzI1NiJ9.eyJ2cCI6e319.c2ln",
            "presentation_submission": submission()
        }),
    );
    let response = AuthorizationResponse::from_parameters(form(json!({
        "response": jwe,
        "state": initiated.request_id.as_str()
    })))
    .unwrap();
    let redirect = verifier
        .post_wallet_response(response.clone(), at(10))
        .await
        .unwrap()
        .unwrap();
    assert!(redirect
        .as_str()
        .starts_with("https://frontend.example.com/done#response_code="));
    let code = response_code(&redirect);

    // Replaying the response fails: the presentation is already submitted.
    assert!(matches!(
        verifier.post_wallet_response(response, at(11)).await,
        Err(Error::InvalidState {
            actual: "Submitted",
            ..
        })
    ));

    // The front end needs the code from the redirect.
    assert!(matches!(
        verifier
            .wallet_response(&initiated.transaction_id, None)
            .await,
        Err(Error::InvalidResponseCode)
    ));
    assert!(matches!(
        verifier
            .wallet_response(
                &initiated.transaction_id,
                Some(&ResponseCode::new("guess").unwrap())
            )
            .await,
        Err(Error::InvalidResponseCode)
    ));
    let wallet_response = verifier
        .wallet_response(&initiated.transaction_id, Some(&code))
        .await
        .unwrap();
    match wallet_response {
        WalletResponse::VpToken {
            vp_token,
            presentation_submission,
        } => {
            assert_eq!(vp_token, "eyJhbGciOiJFUzI1NiJ9.eyJ2cCI6e319.c2ln");
            assert_eq!(
                presentation_submission.definition_id(),
                "0b4dd017-efa6-4a05-a269-9790fa3c22c2"
            );
        }
        other => panic!("unexpected wallet response: {other:?}"),
    }
}

#[tokio::test]
async fn direct_post_id_token_with_polling() {
    let TestVerifier { verifier, .. } = verifier();

    let request = InitTransaction::new(id_token_request(), Nonce::new("nonce-2").unwrap())
        .with_response_mode(ResponseModeOption::DirectPost);
    let initiated = verifier.init_transaction(request, at(0)).await.unwrap();
    assert!(initiated.ephemeral_ecdh_public_jwk.is_none());
    assert!(initiated.presentation_definition_uri.is_none());

    // Responses are only accepted once the request object was fetched.
    let response = AuthorizationResponse::from_parameters(form(json!({
        "state": initiated.request_id.as_str(),
        "id_token": "eyJhbGciOiJFUzI1NiJ9.eyJzdWIiOiJ3YWxsZXQifQ.c2ln"
    })))
    .unwrap();
    assert!(matches!(
        verifier.post_wallet_response(response.clone(), at(1)).await,
        Err(Error::InvalidState {
            actual: "Requested",
            ..
        })
    ));

    verifier
        .retrieve_request_object(&initiated.request_id, at(2))
        .await
        .unwrap();
    assert_eq!(
        verifier.post_wallet_response(response, at(3)).await.unwrap(),
        None
    );

    assert_eq!(
        verifier
            .wallet_response(&initiated.transaction_id, None)
            .await
            .unwrap(),
        WalletResponse::IdToken {
            id_token: "eyJhbGciOiJFUzI1NiJ9.eyJzdWIiOiJ3YWxsZXQifQ.c2ln".into()
        }
    );
}

#[tokio::test]
async fn wallet_error_is_recorded() {
    let TestVerifier { verifier, .. } = verifier();

    let request = InitTransaction::new(vp_token_request(), Nonce::new("nonce-3").unwrap())
        .with_response_mode(ResponseModeOption::DirectPost);
    let initiated = verifier.init_transaction(request, at(0)).await.unwrap();
    verifier
        .retrieve_request_object(&initiated.request_id, at(1))
        .await
        .unwrap();

    let response = AuthorizationResponse::from_parameters(form(json!({
        "state": initiated.request_id.as_str(),
        "error": "access_denied",
        "error_description": "user declined"
    })))
    .unwrap();
    verifier.post_wallet_response(response, at(2)).await.unwrap();

    assert_eq!(
        verifier
            .wallet_response(&initiated.transaction_id, None)
            .await
            .unwrap(),
        WalletResponse::Error {
            value: "access_denied".into(),
            description: Some("user declined".into())
        }
    );
}

#[tokio::test]
async fn mismatched_responses_are_rejected() {
    let TestVerifier { verifier, .. } = verifier();

    let initiated = verifier
        .init_transaction(
            InitTransaction::new(vp_token_request(), Nonce::new("nonce-4").unwrap()),
            at(0),
        )
        .await
        .unwrap();
    verifier
        .retrieve_request_object(&initiated.request_id, at(1))
        .await
        .unwrap();
    let public = initiated.ephemeral_ecdh_public_jwk.unwrap();

    // Posted in clear although an encrypted response was requested.
    let clear = AuthorizationResponse::from_parameters(form(json!({
        "state": initiated.request_id.as_str(),
        "vp_token": "vp",
        "presentation_submission": submission().to_string()
    })))
    .unwrap();
    assert!(matches!(
        verifier.post_wallet_response(clear, at(2)).await,
        Err(Error::ResponseModeMismatch {
            expected: ResponseModeOption::DirectPostJwt,
            received: ResponseModeOption::DirectPost
        })
    ));

    // The encrypted claims name another transaction.
    let other_state = encrypt_for(
        &public,
        json!({ "state": "someone-else", "vp_token": "vp", "presentation_submission": submission() }),
    );
    assert!(matches!(
        verifier
            .post_wallet_response(
                AuthorizationResponse::DirectPostJwt {
                    state: Some(initiated.request_id.to_string()),
                    response: other_state,
                },
                at(3),
            )
            .await,
        Err(Error::StateMismatch)
    ));

    // Encrypted to a key of another transaction.
    let (_, stranger) = openid4vp_verifier::core::keys::generate_ephemeral_key_pair(
        Default::default(),
        "ECDH-ES".parse().unwrap(),
    )
    .unwrap();
    let foreign = encrypt_for(
        &stranger,
        json!({ "state": initiated.request_id.as_str(), "vp_token": "vp", "presentation_submission": submission() }),
    );
    assert!(matches!(
        verifier
            .post_wallet_response(
                AuthorizationResponse::DirectPostJwt {
                    state: Some(initiated.request_id.to_string()),
                    response: foreign,
                },
                at(4),
            )
            .await,
        Err(Error::Jarm(JarmError::Decryption(_)))
    ));

    // Decrypts fine but misses the submission.
    let incomplete = encrypt_for(
        &public,
        json!({ "state": initiated.request_id.as_str(), "vp_token": "vp" }),
    );
    assert!(matches!(
        verifier
            .post_wallet_response(
                AuthorizationResponse::DirectPostJwt {
                    state: Some(initiated.request_id.to_string()),
                    response: incomplete,
                },
                at(5),
            )
            .await,
        Err(Error::Response(ResponseValidationError::Missing(
            "presentation_submission"
        )))
    ));

    // None of the rejections consumed the transaction.
    let valid = encrypt_for(
        &public,
        json!({ "state": initiated.request_id.as_str(), "vp_token": "vp", "presentation_submission": submission() }),
    );
    verifier
        .post_wallet_response(
            AuthorizationResponse::DirectPostJwt {
                state: Some(initiated.request_id.to_string()),
                response: valid,
            },
            at(6),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_transactions_are_not_found() {
    let TestVerifier { verifier, .. } = verifier();

    let response = AuthorizationResponse::from_parameters(form(json!({
        "state": "unknown",
        "id_token": "token"
    })))
    .unwrap();
    assert!(matches!(
        verifier.post_wallet_response(response, at(0)).await,
        Err(Error::NotFound(_))
    ));

    let stateless = AuthorizationResponse::from_parameters(form(json!({ "id_token": "token" })))
        .unwrap();
    assert!(matches!(
        verifier.post_wallet_response(stateless, at(0)).await,
        Err(Error::MissingState)
    ));

    assert!(matches!(
        verifier
            .retrieve_request_object(&RequestId::new("unknown").unwrap(), at(0))
            .await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn expired_presentations_are_timed_out() {
    let TestVerifier { verifier, .. } = verifier();

    let waiting = verifier
        .init_transaction(
            InitTransaction::new(id_token_request(), Nonce::new("a").unwrap()),
            at(0),
        )
        .await
        .unwrap();
    let fetched = verifier
        .init_transaction(
            InitTransaction::new(id_token_request(), Nonce::new("b").unwrap()),
            at(0),
        )
        .await
        .unwrap();
    verifier
        .retrieve_request_object(&fetched.request_id, at(10))
        .await
        .unwrap();

    // Nothing has waited more than 60 seconds yet.
    assert!(verifier.timeout_presentations(at(60)).await.unwrap().is_empty());

    // The fetched one counts from its retrieval.
    assert_eq!(
        verifier.timeout_presentations(at(61)).await.unwrap(),
        vec![waiting.transaction_id.clone()]
    );
    assert!(matches!(
        verifier
            .retrieve_request_object(&waiting.request_id, at(62))
            .await,
        Err(Error::NotFound(_))
    ));

    assert_eq!(
        verifier.timeout_presentations(at(71)).await.unwrap(),
        vec![fetched.transaction_id.clone()]
    );
    assert!(verifier.timeout_presentations(at(1_000)).await.unwrap().is_empty());
    assert!(matches!(
        verifier.wallet_response(&fetched.transaction_id, None).await,
        Err(Error::InvalidState {
            actual: "TimedOut",
            ..
        })
    ));
}

#[tokio::test]
async fn redirect_template_is_checked_up_front() {
    let TestVerifier { verifier, .. } = verifier();

    let request = InitTransaction::new(id_token_request(), Nonce::new("n").unwrap())
        .with_get_wallet_response_method(GetWalletResponseMethod::Redirect {
            redirect_uri_template: "https://frontend.example.com/done".into(),
        });
    assert!(matches!(
        verifier.init_transaction(request, at(0)).await,
        Err(Error::RedirectUri(_))
    ));
}

#[test]
fn builder_requires_all_parts() {
    let err = Verifier::builder()
        .with_request_signer(Arc::new(JwsRequestSigner))
        .build()
        .unwrap_err();
    assert_eq!(err.to_string(), "config is required, see `with_config`");
}

/// Serves the pending presentations as they were when `snapshot` was taken,
/// like a sweep that loaded them just before a wallet answered.
#[derive(Debug, Default)]
struct SnapshotStore {
    inner: MemoryStore,
    incomplete: Mutex<Option<Vec<Presentation>>>,
}

impl SnapshotStore {
    async fn snapshot(&self) {
        let incomplete = self.inner.load_incomplete().await.unwrap();
        *self.incomplete.lock().unwrap() = Some(incomplete);
    }
}

#[async_trait]
impl PresentationStore for SnapshotStore {
    async fn load_by_id(&self, id: &TransactionId) -> anyhow::Result<Option<Presentation>> {
        self.inner.load_by_id(id).await
    }

    async fn load_by_request_id(
        &self,
        request_id: &RequestId,
    ) -> anyhow::Result<Option<Presentation>> {
        self.inner.load_by_request_id(request_id).await
    }

    async fn load_incomplete(&self) -> anyhow::Result<Vec<Presentation>> {
        let snapshot = self.incomplete.lock().unwrap().clone();
        match snapshot {
            Some(incomplete) => Ok(incomplete),
            None => self.inner.load_incomplete().await,
        }
    }

    async fn store(&self, presentation: &Presentation) -> anyhow::Result<()> {
        self.inner.store(presentation).await
    }
}

#[tokio::test]
async fn timeout_does_not_overwrite_a_late_submission() {
    let store = Arc::new(SnapshotStore::default());
    let TestVerifier { verifier, .. } = verifier_with_store(store.clone());

    let initiated = verifier
        .init_transaction(
            InitTransaction::new(id_token_request(), Nonce::new("nonce-9").unwrap())
                .with_response_mode(ResponseModeOption::DirectPost),
            at(0),
        )
        .await
        .unwrap();
    verifier
        .retrieve_request_object(&initiated.request_id, at(1))
        .await
        .unwrap();
    store.snapshot().await;

    let response = AuthorizationResponse::from_parameters(form(json!({
        "state": initiated.request_id.as_str(),
        "id_token": "eyJhbGciOiJFUzI1NiJ9.eyJzdWIiOiJ3YWxsZXQifQ.c2ln"
    })))
    .unwrap();
    verifier.post_wallet_response(response, at(30)).await.unwrap();

    // The sweep still sees the retrieved presentation as pending.
    assert!(verifier.timeout_presentations(at(100)).await.unwrap().is_empty());
    assert_eq!(
        verifier
            .wallet_response(&initiated.transaction_id, None)
            .await
            .unwrap(),
        WalletResponse::IdToken {
            id_token: "eyJhbGciOiJFUzI1NiJ9.eyJzdWIiOiJ3YWxsZXQifQ.c2ln".into()
        }
    );
}
