use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;

/// Any phone number registered with the fake directory accepts this code.
pub const FAKE_SMS_CODE: &str = "123456";

#[derive(Debug, Clone)]
struct FakeUser {
    id: SubjectId,
    password: String,
    phone: Option<String>,
}

// In-process stand-in for the business service's user records.
// Good enough for local runs and the API tests; it never reports `Unavailable`.
#[derive(Debug, Default)]
pub struct FakeUserDirectory {
    users: DashMap<String, FakeUser>,
}

impl FakeUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, id: i64, username: &str, password: &str) -> Self {
        self.users.insert(
            username.to_string(),
            FakeUser {
                id: SubjectId(id),
                password: password.to_string(),
                phone: None,
            },
        );
        self
    }

    pub fn with_phone(self, username: &str, phone: &str) -> Self {
        if let Some(mut user) = self.users.get_mut(username) {
            user.phone = Some(phone.to_string());
        }
        self
    }
}

#[async_trait::async_trait]
impl UserDirectory for FakeUserDirectory {
    async fn authenticate(
        &self,
        credentials: &PasswordCredentials,
    ) -> Result<Identity, DirectoryError> {
        match self.users.get(&credentials.username) {
            Some(user) if user.password == credentials.password => {
                Ok(Identity::new(user.id, credentials.username.clone()))
            }
            _ => Err(DirectoryError::Rejected(
                "invalid username or password".into(),
            )),
        }
    }

    async fn authenticate_sms(
        &self,
        credentials: &SmsCredentials,
    ) -> Result<Identity, DirectoryError> {
        if credentials.code != FAKE_SMS_CODE {
            return Err(DirectoryError::Rejected("invalid verification code".into()));
        }
        self.users
            .iter()
            .find(|entry| entry.phone.as_deref() == Some(credentials.phone.as_str()))
            .map(|entry| Identity::new(entry.id, entry.key().clone()))
            .ok_or_else(|| DirectoryError::Rejected("unknown phone number".into()))
    }
}
