use std::time::Duration;

pub const LOGIN_POLICY: &str = "login";
pub const SMS_SEND_POLICY: &str = "sms-send";

/// A named sliding-window quota. Each policy owns the key prefix `{name}:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicy {
    pub name: String,
    pub max_requests: u64,
    pub window: Duration,
}

impl RatePolicy {
    pub fn new(name: impl Into<String>, max_requests: u64, window: Duration) -> Self {
        RatePolicy {
            name: name.into(),
            max_requests,
            window,
        }
    }

    pub fn key(&self, client_key: &str) -> String {
        format!("{}:{}", self.name, client_key)
    }

    pub fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}
