//! Cross-domain OAuth 2.0 client-credentials relay.
//!
//! A scheduler keeps a fresh access token parked in a durable slot so that outbound calls can
//! attach it, while the resource-server side validates inbound bearer tokens.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod caller;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod issuer;
pub mod oauth;
pub mod obs;
pub mod resource;
pub mod scheduler;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{DomainId, DomainPair},
		credentials::{ClientAuthMethod, ClientCredentials},
		http::ReqwestHttpClient,
		issuer::{DefaultIssuerStrategy, IssuerStrategy, TokenIssuer},
		oauth::ReqwestTransportErrorMapper,
	};

	/// Issuer type alias used by reqwest-backed integration tests.
	pub type ReqwestTestIssuer = TokenIssuer<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_client() -> ReqwestClient {
		ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.")
	}

	/// Wraps [`test_reqwest_client`] in the token transport.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		ReqwestHttpClient::with_client(test_reqwest_client())
	}

	/// Constructs a [`TokenIssuer`] that uses the insecure test transport and default strategy.
	pub fn build_test_issuer() -> ReqwestTestIssuer {
		let strategy: Arc<dyn IssuerStrategy> = Arc::new(DefaultIssuerStrategy);

		TokenIssuer::with_http_client(
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.with_strategy(strategy)
	}

	/// Builds client credentials pointing at `token_endpoint`.
	pub fn test_credentials(token_endpoint: &str, scope: &str) -> ClientCredentials {
		ClientCredentials::builder("car-orders-client", "car-orders-secret")
			.token_endpoint(Url::parse(token_endpoint).expect("Failed to parse test token endpoint."))
			.scope(scope)
			.auth_method(ClientAuthMethod::ClientSecretBasic)
			.build()
			.expect("Failed to build test client credentials.")
	}

	/// The car-orders → tire-orders pair used across tests.
	pub fn test_domain_pair() -> DomainPair {
		DomainPair::new(
			DomainId::new("car-orders").expect("Caller domain fixture should be valid."),
			DomainId::new("tire-orders").expect("Resource domain fixture should be valid."),
		)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {base64 as _, color_eyre as _, httpmock as _};
