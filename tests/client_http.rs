//! REST gateway tests against a local `wiremock` server.

use serde_json::json;
use tda_rs::client::TdaClient;
use tda_rs::config::{ConfigStore, Configuration, FileConfigStore, MemoryConfigStore};
use tda_rs::error::TdaError;
use tda_rs::token::{AccessTokenSource, TokenManager};
use tda_rs::types::auth::TokenGrant;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn authorized(server: &MockServer) -> TdaClient {
    TdaClient::with_base_url(server.uri()).with_token_source(AccessTokenSource::fixed("A1"))
}

fn principals_body() -> serde_json::Value {
    json!({
        "userId": "user1",
        "primaryAccountId": "123456789",
        "streamerInfo": {
            "streamerSocketUrl": "streamer-ws.tdameritrade.com",
            "token": "stream-token",
            "tokenTimestamp": "2020-05-22T02:12:48+0000",
            "userGroup": "ACCT",
            "accessLevel": "ACCT",
            "acl": "AKBPDTESF7",
            "appId": "APP1"
        },
        "streamerSubscriptionKeys": {"keys": [{"key": "sub-key-1"}]},
        "accounts": [{
            "accountId": "123456789",
            "company": "AMER",
            "segment": "AMER",
            "accountCdDomainId": "A000000031234567"
        }]
    })
}

// ---------------------------------------------------------------------------
// Token endpoint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn authorization_code_grant_is_form_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("access_type=offline"))
        .and(body_string_contains("code=a%2Fb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A1",
            "refresh_token": "R1",
            "token_type": "Bearer",
            "expires_in": 1800,
            "refresh_token_expires_in": 7776000,
            "scope": "PlaceTrades AccountAccess MoveMoney"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TdaClient::with_base_url(server.uri());
    let resp = client
        .request_token(&TokenGrant::authorization_code("a/b", "KEY", "https://127.0.0.1"))
        .await
        .unwrap();

    assert_eq!(resp.access_token, "A1");
    assert_eq!(resp.refresh_token.as_deref(), Some("R1"));
    assert_eq!(resp.refresh_token_expires_in, Some(7_776_000));
}

#[tokio::test]
async fn oauth_error_body_maps_to_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code expired"
        })))
        .mount(&server)
        .await;

    let err = TdaClient::with_base_url(server.uri())
        .request_token(&TokenGrant::refresh_token("R1", "KEY"))
        .await
        .unwrap_err();

    match err {
        TdaError::Api(body) => {
            assert_eq!(body.error.as_deref(), Some("invalid_grant"));
            assert_eq!(body.to_string(), "invalid_grant: code expired");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn unstructured_error_maps_to_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let err = TdaClient::with_base_url(server.uri())
        .request_token(&TokenGrant::refresh_token("R1", "KEY"))
        .await
        .unwrap_err();

    match err {
        TdaError::HttpStatus { status, body } => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(body, "Service Unavailable");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn token_manager_runs_against_the_http_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A1",
            "refresh_token": "R1",
            "expires_in": 1800,
            "refresh_token_expires_in": 7776000
        })))
        .mount(&server)
        .await;

    let store = MemoryConfigStore::new(Configuration::new("KEY", "https://127.0.0.1", "code"));
    let manager = TokenManager::new(TdaClient::with_base_url(server.uri()), store.clone()).unwrap();
    let tokens = manager.start().await.unwrap();

    assert_eq!(tokens.get(), "A1");
    assert_eq!(store.current().refresh_token.as_deref(), Some("R1"));

    // Authorized calls read the managed token.
    Mock::given(method("GET"))
        .and(path("/v1/accounts"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    let client = TdaClient::with_base_url(server.uri()).with_token_source(tokens);
    assert!(client.get_accounts().await.unwrap().is_empty());

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn token_manager_persists_through_the_file_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A1",
            "refresh_token": "R1",
            "expires_in": 1800,
            "refresh_token_expires_in": 7776000
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = FileConfigStore::new(dir.path().join(".tradingutility"));
    store
        .save(&Configuration::new("KEY", "https://127.0.0.1", "code"))
        .await
        .unwrap();

    let manager = TokenManager::new(TdaClient::with_base_url(server.uri()), store.clone()).unwrap();
    manager.start().await.unwrap();
    assert_eq!(store.load().unwrap().refresh_token.as_deref(), Some("R1"));

    manager.stop().await.unwrap();
    let persisted = store.load().unwrap();
    let current = manager.configuration();
    assert_eq!(persisted.refresh_token, current.refresh_token);
    assert_eq!(
        persisted.refresh_token_expiry.map(|t| t.timestamp_millis()),
        current.refresh_token_expiry.map(|t| t.timestamp_millis())
    );
}

// ---------------------------------------------------------------------------
// Authorized endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requests_carry_the_configured_default_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    assert!(authorized(&server).get_accounts().await.unwrap().is_empty());
}

#[tokio::test]
async fn authorized_call_without_token_source_is_rejected() {
    let server = MockServer::start().await;
    let err = TdaClient::with_base_url(server.uri())
        .get_accounts()
        .await
        .unwrap_err();
    assert!(matches!(err, TdaError::InvalidArgument(_)));
}

#[tokio::test]
async fn streamer_config_from_user_principals() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/userprincipals"))
        .and(query_param("fields", "streamerConnectionInfo,streamerSubscriptionKeys"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(principals_body()))
        .expect(1)
        .mount(&server)
        .await;

    let config = authorized(&server).get_streamer_config().await.unwrap();

    assert_eq!(config.account_id, "123456789");
    assert_eq!(config.app_id, "APP1");
    assert_eq!(config.token, "stream-token");
    assert_eq!(config.subscription_key, "sub-key-1");
    assert!(config.credential.starts_with("userid=123456789&token=stream-token&company=AMER"));
    assert!(config.credential.contains("&authorized=Y&timestamp=1590113568000&"));
    assert!(config.credential.ends_with("&appid=APP1&acl=AKBPDTESF7"));
}

#[tokio::test]
async fn cash_balances_per_account() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts"))
        .and(query_param("fields", "positions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"securitiesAccount": {
                "accountId": "111",
                "type": "CASH",
                "initialBalances": {"totalCash": 1500.25},
                "positions": [{
                    "longQuantity": 10.0,
                    "averagePrice": 12.5,
                    "marketValue": 130.0,
                    "instrument": {"symbol": "MSFT", "assetType": "EQUITY"}
                }]
            }},
            {"securitiesAccount": {"accountId": "222", "type": "MARGIN", "initialBalances": {"totalCash": 0.0}}},
            {"securitiesAccount": {"accountId": "333"}}
        ])))
        .mount(&server)
        .await;

    let client = authorized(&server);
    let accounts = client.get_accounts().await.unwrap();
    assert_eq!(accounts.len(), 3);
    assert_eq!(accounts[0].positions[0].instrument.symbol, "MSFT");

    let balances = client.get_available_cash_balances().await.unwrap();
    assert_eq!(balances.len(), 2);
    assert_eq!(balances["111"], 1500.25);
    assert_eq!(balances["222"], 0.0);
}

#[tokio::test]
async fn place_order_returns_id_from_location() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts/111/orders"))
        .and(body_partial_json(json!({
            "orderType": "LIMIT",
            "session": "NORMAL",
            "duration": "DAY",
            "orderStrategyType": "SINGLE",
            "orderLegCollection": [{
                "instruction": "BUY",
                "quantity": 5,
                "instrument": {"symbol": "MSFT", "assetType": "EQUITY"}
            }]
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Location", "https://api.tdameritrade.com/v1/accounts/111/orders/98765"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let order_id = authorized(&server)
        .place_equity_limit_buy("111", "MSFT", 101.5, 5)
        .await
        .unwrap();
    assert_eq!(order_id, "98765");
}

#[tokio::test]
async fn place_order_without_location_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts/111/orders"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let err = authorized(&server)
        .place_equity_limit_buy("111", "MSFT", 101.5, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, TdaError::MissingField("Location")));
}

#[tokio::test]
async fn replace_and_cancel_order() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/accounts/111/orders/98765"))
        .and(body_partial_json(json!({"price": "99.5"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/accounts/111/orders/98765"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = authorized(&server);
    let order = tda_rs::types::orders::OrderRequest::equity_limit_buy("MSFT", 99.5, 5);
    client.replace_order("111", "98765", &order).await.unwrap();
    client.cancel_order("111", "98765").await.unwrap();
}
