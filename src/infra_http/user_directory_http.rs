use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

pub const PASSWORD_LOGIN_PATH: &str = "/api/auth/login";
pub const SMS_LOGIN_PATH: &str = "/api/sms/login";

/// Envelope used by the business service: `{message, data: {user: {...}}}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    user: Option<UserRecord>,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: i64,
    // absent or null for accounts created through SMS
    #[serde(default)]
    username: Option<String>,
}

/// Credential checks delegated to the business service over HTTP.
pub struct HttpUserDirectory {
    client: Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn try_new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Identity, DirectoryError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(%url, "user directory request failed: {}", e);
                DirectoryError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        let envelope = serde_json::from_slice::<Envelope>(&bytes).ok();

        if status == StatusCode::OK {
            let user = envelope
                .and_then(|e| e.data)
                .and_then(|d| d.user)
                .ok_or_else(|| {
                    DirectoryError::Unavailable("user directory answered without a user".into())
                })?;
            return Ok(Identity::new(SubjectId(user.id), user.username.unwrap_or_default()));
        }

        let reason = envelope
            .and_then(|e| e.message.or(e.error))
            .unwrap_or_else(|| status.to_string());
        if status.is_client_error() {
            debug!(%url, %status, "credentials rejected: {}", reason);
            Err(DirectoryError::Rejected(reason))
        } else {
            warn!(%url, %status, "user directory error: {}", reason);
            Err(DirectoryError::Unavailable(reason))
        }
    }
}

#[async_trait::async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn authenticate(
        &self,
        credentials: &PasswordCredentials,
    ) -> Result<Identity, DirectoryError> {
        self.post(PASSWORD_LOGIN_PATH, credentials).await
    }

    async fn authenticate_sms(
        &self,
        credentials: &SmsCredentials,
    ) -> Result<Identity, DirectoryError> {
        self.post(SMS_LOGIN_PATH, credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warp::Filter;

    async fn serve(user: serde_json::Value) -> String {
        let reply = warp::post().map(move || warp::reply::json(&json!({ "data": { "user": user } })));
        let (addr, serving) = warp::serve(reply).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(serving);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn missing_or_null_username_becomes_empty() {
        let sms = SmsCredentials {
            phone: "13800000000".into(),
            code: "123456".into(),
        };

        let base = serve(json!({ "id": 7, "username": null })).await;
        let directory = HttpUserDirectory::try_new(&base, Duration::from_secs(2)).unwrap();
        let identity = directory.authenticate_sms(&sms).await.unwrap();
        assert_eq!(identity, Identity::new(SubjectId(7), ""));

        let base = serve(json!({ "id": 8 })).await;
        let directory = HttpUserDirectory::try_new(&base, Duration::from_secs(2)).unwrap();
        let identity = directory.authenticate_sms(&sms).await.unwrap();
        assert_eq!(identity.subject_id, SubjectId(8));
        assert!(identity.subject_name.is_empty());
    }
}
