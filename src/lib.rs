//! Verifier side of [OID4VP 1.0]: the lifecycle of a presentation transaction
//! and the handling of JWT-secured (JARM) authorization responses.
//!
//! [OID4VP 1.0]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use openid4vp_verifier::config::VerifierConfig;
//! use openid4vp_verifier::verifier::{InitTransaction, Verifier, store::MemoryStore};
//!
//! let config = VerifierConfig::from_json_str(&config_json)?;
//! let verifier = Verifier::builder()
//!     .with_config(config)
//!     .with_store(Arc::new(MemoryStore::default()))
//!     .with_request_signer(signer)
//!     .build()?;
//!
//! // The front end starts a transaction and shows the request to the wallet.
//! let initiated = verifier.init_transaction(request, Utc::now()).await?;
//!
//! // The wallet fetches the request object, then posts its response.
//! let jwt = verifier.retrieve_request_object(&request_id, Utc::now()).await?;
//! let redirect = verifier.post_wallet_response(response, Utc::now()).await?;
//!
//! // The front end reads the wallet response.
//! let wallet_response = verifier.wallet_response(&transaction_id, None).await?;
//! ```
//!
//! # Presentation lifecycle
//!
//! A [`Presentation`] moves from `Requested` to `RequestObjectRetrieved` to
//! `Submitted`, or to `TimedOut` from either pending state. Transitions check
//! that timestamps never run backwards. Presentations are stored in their
//! [`wire`] form.
//!
//! [`Presentation`]: crate::core::presentation::Presentation
//! [`wire`]: crate::core::wire
//!
//! # JARM
//!
//! With the `direct_post.jwt` response mode the wallet encrypts its response
//! to an ephemeral key generated for the transaction. See [`core::jarm`].
//!
//! [`core::jarm`]: crate::core::jarm

pub mod config;
pub mod core;
pub mod utils;
pub mod verifier;
pub use serde_json_path::JsonPath;
