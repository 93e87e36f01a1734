//! Users: customers and the admin staff who also act as estheticians.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

string_enum! {
    pub enum Role {
        Admin => "admin",
        Customer => "customer",
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn register(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            email: email.into().trim().to_lowercase(),
            phone: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            role,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    /// Case-insensitive match on name, email or phone.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.email.contains(&needle)
            || self.phone.as_deref().is_some_and(|p| p.contains(query))
    }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_normalizes_email() {
        let user = User::register("Ana Souza", "  Ana@Example.COM ", Role::Customer);
        assert_eq!(user.email, "ana@example.com");
        assert!(user.active);
        assert!(!user.is_admin());
    }

    #[test]
    fn test_search_matching() {
        let mut user = User::register("Beatriz Lima", "bia@example.com", Role::Customer);
        user.phone = Some("11987654321".into());
        assert!(user.matches("beatriz"));
        assert!(user.matches("BIA@"));
        assert!(user.matches("98765"));
        assert!(!user.matches("carla"));
    }
}
