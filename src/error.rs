use thiserror::Error;

/// Errors crossing the library seams: backend calls, the local store,
/// configuration and form validation.
#[derive(Error, Debug)]
pub enum CrmError {
    #[error("{0}")]
    Validation(String),

    #[error("not authenticated")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP transport error: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    #[error("database error: {source}")]
    Database {
        #[from]
        source: rusqlite::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("CSV error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CrmError {
    pub fn validation(message: impl Into<String>) -> Self {
        CrmError::Validation(message.into())
    }

    /// Text fit for a form or a toast: validation/lookup messages verbatim,
    /// infrastructure failures summarized
    pub fn user_message(&self) -> String {
        match self {
            CrmError::Validation(msg) | CrmError::NotFound(msg) | CrmError::Conflict(msg) => {
                msg.clone()
            }
            CrmError::Status { message, .. } => message.clone(),
            CrmError::Unauthorized => "Não autorizado".to_string(),
            CrmError::Transport { .. } => "Falha de conexão com o servidor".to_string(),
            _ => "Erro interno".to_string(),
        }
    }

    /// HTTP status this error maps to, for the dev server and for logs
    pub fn status_code(&self) -> u16 {
        match self {
            CrmError::Validation(_) => 400,
            CrmError::Unauthorized => 401,
            CrmError::NotFound(_) => 404,
            CrmError::Conflict(_) => 409,
            CrmError::Status { status, .. } => *status,
            CrmError::Transport { .. } => 502,
            CrmError::Config(_)
            | CrmError::Database { .. }
            | CrmError::Json { .. }
            | CrmError::Csv { .. }
            | CrmError::Io { .. }
            | CrmError::Internal(_) => 500,
        }
    }
}

pub type CrmResult<T> = std::result::Result<T, CrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CrmError::validation("Nome é obrigatório").status_code(), 400);
        assert_eq!(CrmError::Unauthorized.status_code(), 401);
        assert_eq!(CrmError::NotFound("client 9".into()).status_code(), 404);
        assert_eq!(
            CrmError::Status { status: 503, message: "down".into() }.status_code(),
            503
        );
    }

    #[test]
    fn test_user_message() {
        assert_eq!(CrmError::Conflict("CNPJ já cadastrado".into()).user_message(), "CNPJ já cadastrado");
        assert_eq!(CrmError::Unauthorized.user_message(), "Não autorizado");
        assert_eq!(CrmError::Internal("lock".into()).user_message(), "Erro interno");
    }

    #[test]
    fn test_validation_message_is_shown_verbatim() {
        let err = CrmError::validation("Email inválido");
        assert_eq!(err.to_string(), "Email inválido");
    }
}
