//! Common test utilities for coin-recharge integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

use coin_recharge_core::{PricingConfig, UserId};
use coin_recharge_service::auth::JwtClaims;
use coin_recharge_service::config::{MoMoConfig, VnPayConfig, ZaloPayConfig};
use coin_recharge_service::gateways::{
    CallbackPayload, Delivery, MoMoAdapter, VnPayAdapter, ZaloPayAdapter,
};
use coin_recharge_service::{create_router, AppState, ServiceConfig};
use coin_recharge_store::MemoryStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const SERVICE_API_KEY: &str = "test-service-key";
pub const ADMIN_API_KEY: &str = "test-admin-key";
pub const FRONTEND_URL: &str = "http://frontend.test";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server, for inspecting state directly.
    pub store: Arc<MemoryStore>,
    /// The service configuration (gateway secrets included).
    pub config: ServiceConfig,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a harness whose MoMo and ZaloPay endpoints point nowhere.
    pub fn new() -> Self {
        Self::with_gateway_endpoint("http://127.0.0.1:9")
    }

    /// Create a harness whose MoMo and ZaloPay adapters call `endpoint`.
    pub fn with_gateway_endpoint(endpoint: &str) -> Self {
        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            public_base_url: "http://api.test".into(),
            frontend_url: FRONTEND_URL.into(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            service_api_key: Some(SERVICE_API_KEY.into()),
            admin_api_key: Some(ADMIN_API_KEY.into()),
            pricing: PricingConfig::default(),
            vnpay: Some(VnPayConfig {
                tmn_code: "TESTTMN1".into(),
                hash_secret: "VNPAYTESTSECRET0123456789ABCDEF".into(),
                pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
            }),
            momo: Some(MoMoConfig {
                partner_code: "MOMOTEST0001".into(),
                access_key: "F8BBA842ECF85".into(),
                secret_key: "K951B6PE1waDMi640xX08PD3vg6EkVlz".into(),
                endpoint: endpoint.into(),
            }),
            zalopay: Some(ZaloPayConfig {
                app_id: "2553".into(),
                key1: "PcY4iZIKFCIdgZvA6ueMcMHHUbRLYjPL".into(),
                key2: "kLtgPl8HHhfvMuDHPwKfgfsY4Ydm9eIz".into(),
                endpoint: endpoint.into(),
            }),
            ..ServiceConfig::default()
        };

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config.clone());
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            config,
            test_user_id: UserId::generate(),
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        bearer_for(&self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        bearer_for(&UserId::generate())
    }

    /// Register the test user's account with the given role.
    pub async fn create_account(&self, role: &str) {
        self.server
            .post("/v1/accounts")
            .add_header("authorization", self.user_auth_header())
            .json(&json!({ "role": role }))
            .await
            .assert_status_ok();
    }

    /// Create an order for the test user and return the response body.
    pub async fn create_order(&self, credit_amount: i64, gateway: &str) -> serde_json::Value {
        let response = self
            .server
            .post("/v1/recharge/orders")
            .add_header("authorization", self.user_auth_header())
            .add_header("x-forwarded-for", "203.0.113.7")
            .json(&json!({ "credit_amount": credit_amount, "gateway": gateway }))
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Current coin balance of the test user.
    pub async fn balance(&self) -> i64 {
        let response = self
            .server
            .get("/v1/credits/balance")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["coin_balance"].as_i64().expect("balance")
    }

    // ------------------------------------------------------------------------
    // Gateway-side signing
    // ------------------------------------------------------------------------

    /// Signed VNPay return/IPN query string.
    pub fn vnpay_query(&self, order_code: &str, fiat_amount: i64, response_code: &str) -> String {
        let config = self.config.vnpay.clone().expect("vnpay configured");
        let adapter = VnPayAdapter::new(config.clone(), self.config.return_url("vnpay"));

        let mut params: BTreeMap<String, String> = [
            ("vnp_Amount", (fiat_amount * 100).to_string()),
            ("vnp_BankCode", "NCB".to_string()),
            ("vnp_OrderInfo", format!("Recharge order {order_code}")),
            ("vnp_PayDate", "20240306000500".to_string()),
            ("vnp_ResponseCode", response_code.to_string()),
            ("vnp_TmnCode", config.tmn_code),
            ("vnp_TransactionNo", "14300001".to_string()),
            ("vnp_TransactionStatus", response_code.to_string()),
            ("vnp_TxnRef", order_code.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let hash = adapter.sign(&params);
        params.insert("vnp_SecureHash".into(), hash);

        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&params)
            .finish()
    }

    /// Signed MoMo IPN body.
    pub fn momo_ipn(&self, order_code: &str, fiat_amount: i64, result_code: i64) -> serde_json::Value {
        let config = self.config.momo.clone().expect("momo configured");
        let fields = [
            ("partnerCode", config.partner_code.clone()),
            ("orderId", order_code.to_string()),
            ("requestId", order_code.to_string()),
            ("amount", fiat_amount.to_string()),
            ("orderInfo", "Recharge coins".to_string()),
            ("orderType", "momo_wallet".to_string()),
            ("transId", "4088878653".to_string()),
            ("resultCode", result_code.to_string()),
            ("message", "Successful.".to_string()),
            ("payType", "qr".to_string()),
            ("responseTime", "1709658309000".to_string()),
            ("extraData", String::new()),
        ];
        let adapter = MoMoAdapter::new(
            config,
            self.config.return_url("momo"),
            self.config.notify_url("momo"),
        )
        .expect("momo adapter");
        let signature =
            adapter.callback_signature(&CallbackPayload::new(Delivery::Notification, fields.clone()));

        let mut body: serde_json::Map<String, serde_json::Value> = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        // MoMo sends these as JSON numbers.
        body.insert("amount".into(), json!(fiat_amount));
        body.insert("resultCode".into(), json!(result_code));
        body.insert("transId".into(), json!(4_088_878_653_i64));
        body.insert("responseTime".into(), json!(1_709_658_309_000_i64));
        body.insert("signature".into(), json!(signature));
        serde_json::Value::Object(body)
    }

    /// Signed MoMo browser return query string. MoMo redirects with the same
    /// signed fields it posts to the IPN.
    pub fn momo_return_query(&self, order_code: &str, fiat_amount: i64, result_code: i64) -> String {
        let ipn = self.momo_ipn(order_code, fiat_amount, result_code);
        let params: BTreeMap<String, String> = ipn
            .as_object()
            .expect("ipn body is an object")
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();

        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&params)
            .finish()
    }

    /// Signed ZaloPay server callback body.
    pub fn zalopay_callback(&self, order_code: &str, fiat_amount: i64) -> serde_json::Value {
        let adapter = self.zalopay_adapter();
        let data = json!({
            "app_id": 2553,
            "app_trans_id": order_code,
            "app_time": 1_709_658_249_000_i64,
            "amount": fiat_amount,
            "zp_trans_id": 240_306_000_000_123_i64,
            "channel": 38,
        })
        .to_string();
        let mac = adapter.callback_mac(&data);
        json!({ "data": data, "mac": mac, "type": 1 })
    }

    /// Signed ZaloPay browser redirect query string.
    pub fn zalopay_redirect_query(&self, order_code: &str, fiat_amount: i64, status: &str) -> String {
        let adapter = self.zalopay_adapter();
        let mut params: BTreeMap<String, String> = [
            ("appid", "2553".to_string()),
            ("apptransid", order_code.to_string()),
            ("pmcid", "38".to_string()),
            ("bankcode", String::new()),
            ("amount", fiat_amount.to_string()),
            ("discountamount", "0".to_string()),
            ("status", status.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let checksum =
            adapter.redirect_checksum(&CallbackPayload::new(Delivery::Redirect, params.clone()));
        params.insert("checksum".into(), checksum);

        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&params)
            .finish()
    }

    fn zalopay_adapter(&self) -> ZaloPayAdapter {
        ZaloPayAdapter::new(
            self.config.zalopay.clone().expect("zalopay configured"),
            self.config.return_url("zalopay"),
            self.config.notify_url("zalopay"),
        )
        .expect("zalopay adapter")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A valid bearer header for `user_id`.
pub fn bearer_for(user_id: &UserId) -> String {
    let now = chrono::Utc::now().timestamp();
    let token = encode(
        &Header::new(Algorithm::HS256),
        &JwtClaims {
            sub: user_id.to_string(),
            exp: now + 3600,
            iat: Some(now),
        },
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign token");
    format!("Bearer {token}")
}
