use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Where the processor sends the buyer after a completed checkout.
    /// The session id is appended so the client can fire the eager sync call.
    pub success_page_url: String,
    pub cancel_page_url: String,
    /// Credits granted per purchased pack.
    pub credits_per_pack: i64,
    /// Processor price id for the credit pack (e.g. "price_1ABC...").
    pub pack_price_id: String,
    pub processor_secret_key: String,
    pub processor_webhook_secret: String,
    pub rate_limit: RateLimitConfig,
    pub dev_mode: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub strict_rpm: u32,
    pub standard_rpm: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("TILL_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "till.db".to_string()),
            success_page_url: env::var("SUCCESS_PAGE_URL")
                .unwrap_or_else(|_| format!("{}/success", base_url)),
            cancel_page_url: env::var("CANCEL_PAGE_URL")
                .unwrap_or_else(|_| format!("{}/cancel", base_url)),
            credits_per_pack: env::var("TILL_CREDITS_PER_PACK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            pack_price_id: env::var("TILL_PACK_PRICE_ID").unwrap_or_default(),
            processor_secret_key: env::var("TILL_PROCESSOR_SECRET_KEY").unwrap_or_default(),
            processor_webhook_secret: env::var("TILL_PROCESSOR_WEBHOOK_SECRET")
                .unwrap_or_default(),
            rate_limit: RateLimitConfig {
                strict_rpm: env::var("RATE_LIMIT_STRICT_RPM")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
                standard_rpm: env::var("RATE_LIMIT_STANDARD_RPM")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            },
            base_url,
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
