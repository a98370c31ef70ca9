use serde::{Deserialize, Serialize};

/// A chat participant as the service describes it.
///
/// Users appear as the sender of every [`Message`](crate::types::Message), in
/// the online roster, and as the response to `GET /api/users/me`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct User {
    /// Server-assigned user id.
    pub id: u64,

    /// Login name, unique per service.
    pub login: String,

    /// Given name.
    #[serde(default)]
    pub first_name: String,

    /// Family name.  May be empty.
    #[serde(default)]
    pub last_name: String,
}

impl User {
    /// Create a new user.
    pub fn new(
        id: u64,
        login: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            login: login.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// The name shown next to a message: "First Last", or the login when the
    /// service sent no names.
    pub fn display_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (true, true) => self.login.clone(),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (false, false) => format!("{} {}", self.first_name, self.last_name),
        }
    }

    /// Two-letter avatar initials.
    ///
    /// Uses the first letters of both names, or the first two letters of the
    /// first name when there is no last name.
    pub fn initials(&self) -> String {
        let mut first = self.first_name.chars();
        let initials: String = match self.last_name.chars().next() {
            Some(last) => first.next().into_iter().chain(Some(last)).collect(),
            None => first.take(2).collect(),
        };
        if initials.is_empty() {
            self.login.chars().take(2).collect::<String>().to_uppercase()
        } else {
            initials.to_uppercase()
        }
    }
}
