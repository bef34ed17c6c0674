//! Runs the car-orders → tire-orders relay against mocked issuer and tires API endpoints: one
//! scheduler tick parks a token, then the caller places an order with it.

// std
use std::{collections::HashMap, sync::Arc};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use oauth2_token_relay::{
	caller::OutboundRequest,
	config::{
		ENV_AUTH_URL, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_RESOURCE_API, ENV_RESOURCE_API_KEY,
		ENV_SCOPE, RelayConfig,
	},
	http::ReqwestHttpClient,
	reqwest::Client,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let order_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/prod/orders")
				.header("authorization", "Bearer demo-access")
				.header("x-api-key", "demo-usage-plan");
			then.status(201)
				.header("content-type", "application/json")
				.body("{\"orderId\":\"demo-order\"}");
		})
		.await;
	let http = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()?;
	let env: HashMap<&str, String> = [
		(ENV_AUTH_URL, server.base_url()),
		(ENV_CLIENT_ID, "car-orders-client".into()),
		(ENV_CLIENT_SECRET, "car-orders-secret".into()),
		(ENV_SCOPE, "tires/create.order".into()),
		(ENV_RESOURCE_API, server.url("/prod")),
		(ENV_RESOURCE_API_KEY, "demo-usage-plan".into()),
	]
	.into_iter()
	.collect();
	let config = RelayConfig::from_env_with(|name| env.get(name).cloned())?;
	let cache = config.token_cache()?;
	let issuer = config.issuer(ReqwestHttpClient::with_client(http.clone()));
	let scheduler = config.scheduler(Arc::new(issuer), cache.clone())?;
	let token = scheduler.refresh_now().await?;

	println!("Parked a token for {} until {}.", config.domain_pair, token.expires_at());

	let caller = config.caller(http, cache)?;
	let response = caller
		.invoke(
			OutboundRequest::post("orders")
				.json(serde_json::json!({ "tireId": "demo-tire", "quantity": 4 })),
		)
		.await?;

	println!("Tires API answered {}: {}.", response.status, response.body);

	token_mock.assert_async().await;
	order_mock.assert_async().await;

	Ok(())
}
