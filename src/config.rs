use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Channel the finished listings are posted to.
    pub channel_id: i64,
    /// Chat where support tickets land and admin commands are accepted.
    pub admin_chat_id: i64,
}

#[derive(Deserialize, Clone)]
pub struct PaymentConfig {
    pub api_base: String,
    pub api_token: String,
    pub asset: String,
    pub premium_price: f64,
    pub poll_interval_secs: u64,
}

#[derive(Deserialize, Clone)]
pub struct CleanupConfig {
    pub conversation_ttl_hours: i64,
    pub support_session_ttl_hours: i64,
    pub ticket_retention_days: i64,
    pub message_cache_cap: usize,
    pub message_cache_trim_to: usize,
}

#[derive(Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub payment: PaymentConfig,
    pub cleanup: CleanupConfig,
}
