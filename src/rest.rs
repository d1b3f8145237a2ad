// REST client for the CRM backend + ViaCEP address lookup
//
// Blocking on purpose: every call is triggered by a keypress or a CLI
// command and the caller waits for the answer anyway.

use crate::backend::{AddressLookup, Backend};
use crate::config::Settings;
use crate::entities::{Address, Client, Contact, NewClient, NewContact, NewUser, Session, User};
use crate::error::{CrmError, CrmResult};
use crate::formatters::Mask;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// REST BACKEND
// ============================================================================

pub struct RestBackend {
    http: HttpClient,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

impl RestBackend {
    pub fn new(base_url: &str, timeout: Duration) -> CrmResult<Self> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: with_trailing_slash(base_url),
            token: None,
        })
    }

    pub fn from_settings(settings: &Settings) -> CrmResult<Self> {
        Self::new(
            &settings.api_url,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    /// Reuse a token obtained elsewhere (e.g. `CRM_TOKEN`)
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> CrmResult<RequestBuilder> {
        let token = self.token.as_deref().ok_or(CrmError::Unauthorized)?;
        Ok(request.bearer_auth(token))
    }

    fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> CrmResult<T> {
        let response = check_status(request.send()?)?;
        Ok(response.json()?)
    }

    fn execute(&self, request: RequestBuilder) -> CrmResult<()> {
        check_status(request.send()?)?;
        Ok(())
    }
}

impl Backend for RestBackend {
    fn login(&mut self, email: &str, password: &str) -> CrmResult<Session> {
        debug!(email, "logging in");
        let request = self
            .http
            .post(self.url("auth/login"))
            .json(&LoginRequest { email, password });

        let session: Session = self.fetch(request)?;
        self.token = Some(session.access_token.clone());
        Ok(session)
    }

    fn register(&mut self, new_user: &NewUser) -> CrmResult<()> {
        let form = [
            ("name", new_user.name.as_str()),
            ("email", new_user.email.as_str()),
            ("password", new_user.password.as_str()),
            ("role", new_user.role.as_str()),
        ];
        self.execute(self.http.post(self.url("auth/signup")).form(&form))
    }

    fn logout(&mut self) {
        self.token = None;
    }

    fn current_user(&self) -> CrmResult<User> {
        self.fetch(self.authorized(self.http.get(self.url("auth/me")))?)
    }

    fn list_clients(&self) -> CrmResult<Vec<Client>> {
        self.fetch(self.authorized(self.http.get(self.url("clients")))?)
    }

    fn create_client(&self, client: &NewClient) -> CrmResult<Client> {
        let request = self.http.post(self.url("clients")).json(client);
        self.fetch(self.authorized(request)?)
    }

    fn delete_client(&self, id: i64) -> CrmResult<()> {
        let request = self.http.delete(self.url(&format!("clients/{}", id)));
        self.execute(self.authorized(request)?)
    }

    fn list_contacts(&self) -> CrmResult<Vec<Contact>> {
        self.fetch(self.authorized(self.http.get(self.url("contacts")))?)
    }

    fn contacts_by_client(&self, client_id: i64) -> CrmResult<Vec<Contact>> {
        let request = self.http.get(self.url(&format!("contacts/client/{}", client_id)));
        self.fetch(self.authorized(request)?)
    }

    fn create_contact(&self, contact: &NewContact) -> CrmResult<Contact> {
        let request = self.http.post(self.url("contacts")).json(contact);
        self.fetch(self.authorized(request)?)
    }

    fn delete_contact(&self, id: i64) -> CrmResult<()> {
        let request = self.http.delete(self.url(&format!("contacts/{}", id)));
        self.execute(self.authorized(request)?)
    }
}

fn check_status(response: Response) -> CrmResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    warn!(status = status.as_u16(), "backend request failed");
    Err(error_from_status(status.as_u16(), &body))
}

/// Map a failed response to an error, preferring the body's `message`
pub fn error_from_status(status: u16, body: &str) -> CrmError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("API error: {}", status));

    match status {
        401 => CrmError::Unauthorized,
        404 => CrmError::NotFound(message),
        _ => CrmError::Status { status, message },
    }
}

fn with_trailing_slash(base: &str) -> String {
    let trimmed = base.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", with_trailing_slash(base), path.trim_start_matches('/'))
}

// ============================================================================
// VIACEP
// ============================================================================

pub struct ViaCep {
    http: HttpClient,
    base_url: String,
}

impl ViaCep {
    pub fn new(base_url: &str, timeout: Duration) -> CrmResult<Self> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: with_trailing_slash(base_url),
        })
    }

    pub fn from_settings(settings: &Settings) -> CrmResult<Self> {
        Self::new(
            &settings.cep_lookup_url,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }
}

impl AddressLookup for ViaCep {
    fn lookup(&self, cep: &str) -> CrmResult<Address> {
        let digits = Mask::Cep.normalize(cep);
        if digits.len() != Mask::Cep.max_digits() {
            return Err(CrmError::validation("CEP deve ter 8 dígitos"));
        }

        debug!(cep = %digits, "looking up address");
        let url = join_url(&self.base_url, &format!("{}/json/", digits));
        let response = check_status(self.http.get(url).send()?)?;
        parse_viacep(&response.text()?)
    }
}

pub fn parse_viacep(body: &str) -> CrmResult<Address> {
    let address: Address = serde_json::from_str(body)?;
    if address.erro == Some(true) {
        return Err(CrmError::NotFound("CEP não encontrado".to_string()));
    }
    Ok(address)
}
