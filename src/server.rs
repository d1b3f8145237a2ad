// CRM Admin - Development REST Server
// Serves the backend API over the local SQLite store, so the front end
// (and `RestBackend`) can be run without the real service.
//
// Routes mirror the production backend:
//   POST   /auth/login            JSON {email, password} -> {accessToken, user}
//   POST   /auth/signup           form {name, email, password, role}
//   GET    /auth/me
//   GET    /clients               POST /clients
//   DELETE /clients/:id
//   GET    /contacts              POST /contacts
//   GET    /contacts/client/:id
//   DELETE /contacts/:id
// Failures answer `{"message": "..."}` with the matching status.

use crate::db::Store;
use crate::entities::{Client, Contact, NewClient, NewContact, NewUser, Session, User, UserRole};
use crate::error::{CrmError, CrmResult};
use axum::{
    extract::{Form, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<Store>>,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> CrmResult<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| CrmError::Internal("store lock poisoned".to_string()))
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SignupForm {
    name: String,
    email: String,
    password: String,
    role: String,
}

// ============================================================================
// Error responses
// ============================================================================

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let message = if status.is_server_error() {
            "Erro interno do servidor".to_string()
        } else {
            self.user_message()
        };
        let body = serde_json::json!({ "message": message });
        (status, Json(body)).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn require_user(store: &Store, headers: &HeaderMap) -> CrmResult<User> {
    let token = bearer_token(headers).ok_or(CrmError::Unauthorized)?;
    store.user_for_token(token)?.ok_or(CrmError::Unauthorized)
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": crate::VERSION }))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> CrmResult<Json<Session>> {
    let store = state.lock()?;
    let user = store
        .authenticate(&req.email, &req.password)?
        .ok_or(CrmError::Unauthorized)?;
    let access_token = store.create_session(&user.id)?;

    info!(user = %user.email, "login");
    Ok(Json(Session { access_token, user }))
}

/// POST /auth/signup
async fn signup(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> CrmResult<(StatusCode, Json<User>)> {
    let role = UserRole::parse(&form.role).ok_or_else(|| CrmError::validation("Perfil inválido"))?;
    let new_user = NewUser {
        name: form.name,
        email: form.email,
        password: form.password.clone(),
        role,
    }
    .validated(&form.password)?;

    let user = state.lock()?.create_user(&new_user)?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /auth/me
async fn me(State(state): State<AppState>, headers: HeaderMap) -> CrmResult<Json<User>> {
    let store = state.lock()?;
    Ok(Json(require_user(&store, &headers)?))
}

/// GET /clients
async fn list_clients(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> CrmResult<Json<Vec<Client>>> {
    let store = state.lock()?;
    require_user(&store, &headers)?;
    Ok(Json(store.all_clients()?))
}

/// POST /clients
async fn create_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new_client): Json<NewClient>,
) -> CrmResult<(StatusCode, Json<Client>)> {
    let store = state.lock()?;
    let user = require_user(&store, &headers)?;
    let client = store.insert_client(&new_client, &user.email)?;

    info!(id = client.id, cnpj = %client.cnpj, "client created");
    Ok((StatusCode::CREATED, Json(client)))
}

/// DELETE /clients/:id
async fn delete_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> CrmResult<StatusCode> {
    let store = state.lock()?;
    let user = require_user(&store, &headers)?;
    store.delete_client(id, &user.email)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /contacts
async fn list_contacts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> CrmResult<Json<Vec<Contact>>> {
    let store = state.lock()?;
    require_user(&store, &headers)?;
    Ok(Json(store.all_contacts()?))
}

/// GET /contacts/client/:id
async fn contacts_by_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(client_id): Path<i64>,
) -> CrmResult<Json<Vec<Contact>>> {
    let store = state.lock()?;
    require_user(&store, &headers)?;
    Ok(Json(store.contacts_for_client(client_id)?))
}

/// POST /contacts
async fn create_contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new_contact): Json<NewContact>,
) -> CrmResult<(StatusCode, Json<Contact>)> {
    let store = state.lock()?;
    let user = require_user(&store, &headers)?;
    let contact = store.insert_contact(&new_contact, &user.email)?;

    info!(id = contact.id, "contact created");
    Ok((StatusCode::CREATED, Json(contact)))
}

/// DELETE /contacts/:id
async fn delete_contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> CrmResult<StatusCode> {
    let store = state.lock()?;
    let user = require_user(&store, &headers)?;
    store.delete_contact(id, &user.email)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(login))
        .route("/auth/signup", post(signup))
        .route("/auth/me", get(me))
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/:id", delete(delete_client))
        .route("/contacts", get(list_contacts).post(create_contact))
        .route("/contacts/client/:id", get(contacts_by_client))
        .route("/contacts/:id", delete(delete_contact))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let store = Store::open_in_memory().unwrap();
        store
            .create_user(&NewUser {
                name: "Admin".to_string(),
                email: "admin@empresa.com".to_string(),
                password: "segredo123".to_string(),
                role: UserRole::Administrador,
            })
            .unwrap();
        router(AppState::new(store))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn login_token(app: &Router) -> String {
        let (status, body) = send(
            app,
            json_request(
                "POST",
                "/auth/login",
                None,
                serde_json::json!({ "email": "admin@empresa.com", "password": "segredo123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["accessToken"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = send(&app, get_request("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_login_and_me() {
        let app = test_app();

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/auth/login",
                None,
                serde_json::json!({ "email": "admin@empresa.com", "password": "errada" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Não autorizado");

        let token = login_token(&app).await;
        let (status, body) = send(&app, get_request("/auth/me", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "admin@empresa.com");
        assert_eq!(body["role"], "ADMINISTRADOR");
    }

    #[tokio::test]
    async fn test_signup_form() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/auth/signup")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "name=Bia+Souza&email=bia%40empresa.com&password=outrasenha&role=SUPORTE",
            ))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["role"], "SUPORTE");

        let short = Request::builder()
            .method("POST")
            .uri("/auth/signup")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=Bo&email=bo%40empresa.com&password=outrasenha&role=SUPORTE"))
            .unwrap();
        let (status, body) = send(&app, short).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Nome deve ter pelo menos 3 caracteres");
    }

    #[tokio::test]
    async fn test_routes_require_token() {
        let app = test_app();
        let (status, _) = send(&app, get_request("/clients", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, get_request("/contacts", Some("not-a-token"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_client_and_contact_lifecycle() {
        let app = test_app();
        let token = login_token(&app).await;

        let (status, client) = send(
            &app,
            json_request(
                "POST",
                "/clients",
                Some(&token),
                serde_json::json!({ "ds_nome": "Padaria", "nr_cnpj": "12.345.678/0001-99" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(client["nr_cnpj"], "12345678000199");
        let client_id = client["id_cliente"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/clients",
                Some(&token),
                serde_json::json!({ "ds_nome": "Outra", "nr_cnpj": "12345678000199" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "CNPJ já cadastrado");

        let (status, contact) = send(
            &app,
            json_request(
                "POST",
                "/contacts",
                Some(&token),
                serde_json::json!({ "ds_nome": "Ana", "ds_email": "ana@padaria.com", "id_cliente": client_id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(contact["clientes"][0]["ds_nome"], "Padaria");

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/contacts",
                Some(&token),
                serde_json::json!({ "ds_nome": "Sem email", "ds_email": "" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email é obrigatório");

        let (_, list) = send(
            &app,
            get_request(&format!("/contacts/client/{}", client_id), Some(&token)),
        )
        .await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/clients/{}", client_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, clients) = send(&app, get_request("/clients", Some(&token))).await;
        assert!(clients.as_array().unwrap().is_empty());

        let (status, _) = send(&app, get_request("/contacts/client/999", Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
