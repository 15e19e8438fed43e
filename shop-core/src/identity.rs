use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    Service,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            "SERVICE" => Ok(Role::Service),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::Service => "SERVICE",
        };
        f.write_str(s)
    }
}

/// Identity of whoever is acting. Passed explicitly into every order
/// operation; nothing in the order crates reads identity from ambient state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user(user_id: Uuid) -> Self {
        Self::new(user_id, Role::User)
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn service(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Service)
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Service)
    }

    /// User filter to apply to a read. Plain users are always pinned to
    /// themselves; privileged callers get whatever they asked for (`None`
    /// meaning every user).
    pub fn scope_user(&self, requested: Option<Uuid>) -> Option<Uuid> {
        if self.is_privileged() {
            requested
        } else {
            Some(self.user_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_users_are_pinned_to_themselves() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let caller = Caller::user(me);

        assert_eq!(caller.scope_user(Some(other)), Some(me));
        assert_eq!(caller.scope_user(None), Some(me));
    }

    #[test]
    fn test_privileged_callers_choose_scope() {
        let other = Uuid::new_v4();

        assert_eq!(Caller::admin(Uuid::new_v4()).scope_user(Some(other)), Some(other));
        assert_eq!(Caller::service(Uuid::new_v4()).scope_user(None), None);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("SERVICE".parse::<Role>(), Ok(Role::Service));
        assert!("root".parse::<Role>().is_err());
    }
}
