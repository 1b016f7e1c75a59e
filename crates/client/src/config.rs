// crates/client/src/config.rs

/// Configuration for the service API client.
pub struct ClientConfig {
    /// POLYDUB_API_BASE env var (e.g. https://openapi.example.com).
    pub base_url: String,
    /// POLYDUB_CLIENT_ID env var. Paired with the secret for getToken.
    pub client_id: Option<String>,
    /// POLYDUB_CLIENT_SECRET env var.
    pub client_secret: Option<String>,
    /// POLYDUB_API_TOKEN env var. Skips the getToken exchange when set.
    pub api_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("POLYDUB_API_BASE")
                .unwrap_or_else(|_| "https://openapi.akool.com".to_string()),
            client_id: std::env::var("POLYDUB_CLIENT_ID").ok(),
            client_secret: std::env::var("POLYDUB_CLIENT_SECRET").ok(),
            api_token: std::env::var("POLYDUB_API_TOKEN").ok(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}
