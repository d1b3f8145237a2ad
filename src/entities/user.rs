// Employee accounts and login sessions

use super::{is_valid_email, string_or_number};
use crate::error::{CrmError, CrmResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Administrador,
    Suporte,
    Desenvolvimento,
    Implantacao,
    Analista,
}

impl UserRole {
    pub const ALL: [UserRole; 5] = [
        UserRole::Administrador,
        UserRole::Suporte,
        UserRole::Desenvolvimento,
        UserRole::Implantacao,
        UserRole::Analista,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Administrador => "ADMINISTRADOR",
            UserRole::Suporte => "SUPORTE",
            UserRole::Desenvolvimento => "DESENVOLVIMENTO",
            UserRole::Implantacao => "IMPLANTACAO",
            UserRole::Analista => "ANALISTA",
        }
    }

    pub fn parse(s: &str) -> Option<UserRole> {
        let wanted = s.trim().to_uppercase();
        UserRole::ALL.into_iter().find(|r| r.as_str() == wanted)
    }
}

/// Logged-in employee. Password material never lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "required_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

fn required_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    string_or_number(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing user id"))
}

/// Result of a successful login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    pub user: User,
}

/// Sign-up form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

impl NewUser {
    pub fn validated(self, password_confirmation: &str) -> CrmResult<NewUser> {
        if self.name.trim().chars().count() < 3 {
            return Err(CrmError::validation("Nome deve ter pelo menos 3 caracteres"));
        }
        if !is_valid_email(self.email.trim()) {
            return Err(CrmError::validation("Email inválido"));
        }
        if self.password.chars().count() < 8 {
            return Err(CrmError::validation("Senha deve ter pelo menos 8 caracteres"));
        }
        if self.password != password_confirmation {
            return Err(CrmError::validation("As senhas não coincidem"));
        }

        Ok(NewUser {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            ..self
        })
    }
}
