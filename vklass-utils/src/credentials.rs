use derive_more::{AsRef, Display, From};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

#[derive(Clone, Debug, Default, TypedBuilder, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    #[builder(setter(into))]
    pub username: Username,
    #[builder(setter(into))]
    pub password: Password,
}

impl Credentials {
    /// Both values are present.  An empty string counts as absent.
    pub fn is_complete(&self) -> bool {
        !self.username.0.is_empty() && !self.password.0.is_empty()
    }
}

#[derive(Clone, Default, PartialEq, Eq, Debug, From, AsRef, Display, Serialize, Deserialize)]
#[as_ref(forward)]
pub struct Username(String);

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Username {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Default, PartialEq, Eq, From, AsRef, Serialize, Deserialize)]
#[as_ref(forward)]
pub struct Password(String);

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Password {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}
