//! Service configuration.

use serde::Deserialize;
use std::path::Path;

use coin_recharge_core::{PricingConfig, DEFAULT_CREDIT_RATE};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to the data directory (default: "/data/coin-recharge").
    pub data_dir: String,

    /// Public base URL of this service, used to build gateway return and
    /// notification URLs (default: `http://localhost:8080`).
    pub public_base_url: String,

    /// Frontend URL that browsers are sent back to after payment.
    pub frontend_url: String,

    /// HS256 secret for user JWTs.
    pub auth_jwt_secret: Option<String>,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Conversion rate and per-order bounds.
    pub pricing: PricingConfig,

    /// Age after which a pending order is failed by the reaper.
    pub order_timeout_seconds: u64,

    /// How often the reaper runs.
    pub reaper_interval_seconds: u64,

    /// VNPay merchant settings (optional).
    pub vnpay: Option<VnPayConfig>,

    /// MoMo partner settings (optional).
    pub momo: Option<MoMoConfig>,

    /// ZaloPay app settings (optional).
    pub zalopay: Option<ZaloPayConfig>,
}

/// VNPay merchant settings. Also the `.secrets/vnpay.json` file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct VnPayConfig {
    /// Terminal (merchant) code.
    pub tmn_code: String,
    /// HMAC-SHA512 secret.
    pub hash_secret: String,
    /// Payment page the browser is sent to.
    #[serde(default = "default_vnpay_pay_url")]
    pub pay_url: String,
}

/// MoMo partner settings. Also the `.secrets/momo.json` file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct MoMoConfig {
    /// Partner code.
    pub partner_code: String,
    /// Access key, part of every signed string.
    pub access_key: String,
    /// HMAC-SHA256 secret.
    pub secret_key: String,
    /// API base URL.
    #[serde(default = "default_momo_endpoint")]
    pub endpoint: String,
}

/// ZaloPay app settings. Also the `.secrets/zalopay.json` file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct ZaloPayConfig {
    /// Numeric app id, as issued.
    pub app_id: String,
    /// Key for signing order requests.
    pub key1: String,
    /// Key for verifying callbacks and redirects.
    pub key2: String,
    /// API base URL.
    #[serde(default = "default_zalopay_endpoint")]
    pub endpoint: String,
}

fn default_vnpay_pay_url() -> String {
    "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into()
}

fn default_momo_endpoint() -> String {
    "https://test-payment.momo.vn".into()
}

fn default_zalopay_endpoint() -> String {
    "https://sb-openapi.zalopay.vn".into()
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = PricingConfig::default();
        let pricing = PricingConfig {
            rate: env_parse("CREDIT_RATE").unwrap_or(DEFAULT_CREDIT_RATE),
            min_credits: env_parse("MIN_CREDITS").unwrap_or(defaults.min_credits),
            max_credits: env_parse("MAX_CREDITS").unwrap_or(defaults.max_credits),
        };

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/coin-recharge".into()),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into())
                .trim_end_matches('/')
                .to_string(),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            auth_jwt_secret: std::env::var("AUTH_JWT_SECRET").ok(),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS").unwrap_or(30),
            pricing,
            order_timeout_seconds: env_parse("ORDER_TIMEOUT_SECONDS").unwrap_or(15 * 60),
            reaper_interval_seconds: env_parse("REAPER_INTERVAL_SECONDS").unwrap_or(60),
            vnpay: load_vnpay_secrets(),
            momo: load_momo_secrets(),
            zalopay: load_zalopay_secrets(),
        }
    }

    /// Where a gateway sends the browser back to.
    #[must_use]
    pub fn return_url(&self, gateway: &str) -> String {
        format!("{}/callbacks/{gateway}/return", self.public_base_url)
    }

    /// Where a gateway posts its server-to-server notification.
    #[must_use]
    pub fn notify_url(&self, gateway: &str) -> String {
        let leaf = if gateway == "zalopay" { "callback" } else { "ipn" };
        format!("{}/callbacks/{gateway}/{leaf}", self.public_base_url)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Candidate locations for a secrets file.
fn secret_paths(file: &str) -> [String; 3] {
    [
        format!(".secrets/{file}"),
        format!("coin-recharge/.secrets/{file}"),
        format!("../.secrets/{file}"),
    ]
}

/// Try every secrets path for `file`, returning the first that parses.
fn load_from_files<T: serde::de::DeserializeOwned>(file: &str) -> Option<T> {
    for path in &secret_paths(file) {
        if let Ok(secrets) = load_secrets_file::<T>(path) {
            tracing::info!(path = %path, "Loaded gateway secrets from file");
            return Some(secrets);
        }
    }
    None
}

/// Load VNPay secrets from file or environment.
fn load_vnpay_secrets() -> Option<VnPayConfig> {
    load_from_files("vnpay.json").or_else(|| {
        tracing::debug!("VNPay secrets file not found, using environment variables");
        Some(VnPayConfig {
            tmn_code: std::env::var("VNPAY_TMN_CODE").ok()?,
            hash_secret: std::env::var("VNPAY_HASH_SECRET").ok()?,
            pay_url: std::env::var("VNPAY_PAY_URL").unwrap_or_else(|_| default_vnpay_pay_url()),
        })
    })
}

/// Load MoMo secrets from file or environment.
fn load_momo_secrets() -> Option<MoMoConfig> {
    load_from_files("momo.json").or_else(|| {
        tracing::debug!("MoMo secrets file not found, using environment variables");
        Some(MoMoConfig {
            partner_code: std::env::var("MOMO_PARTNER_CODE").ok()?,
            access_key: std::env::var("MOMO_ACCESS_KEY").ok()?,
            secret_key: std::env::var("MOMO_SECRET_KEY").ok()?,
            endpoint: std::env::var("MOMO_ENDPOINT").unwrap_or_else(|_| default_momo_endpoint()),
        })
    })
}

/// Load ZaloPay secrets from file or environment.
fn load_zalopay_secrets() -> Option<ZaloPayConfig> {
    load_from_files("zalopay.json").or_else(|| {
        tracing::debug!("ZaloPay secrets file not found, using environment variables");
        Some(ZaloPayConfig {
            app_id: std::env::var("ZALOPAY_APP_ID").ok()?,
            key1: std::env::var("ZALOPAY_KEY1").ok()?,
            key2: std::env::var("ZALOPAY_KEY2").ok()?,
            endpoint: std::env::var("ZALOPAY_ENDPOINT")
                .unwrap_or_else(|_| default_zalopay_endpoint()),
        })
    })
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/coin-recharge".into(),
            public_base_url: "http://localhost:8080".into(),
            frontend_url: "http://localhost:3000".into(),
            auth_jwt_secret: None,
            service_api_key: None,
            admin_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            pricing: PricingConfig::default(),
            order_timeout_seconds: 15 * 60,
            reaper_interval_seconds: 60,
            vnpay: None,
            momo: None,
            zalopay: None,
        }
    }
}
