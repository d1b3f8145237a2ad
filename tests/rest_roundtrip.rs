#![cfg(feature = "server")]

use axum::{extract::Path, routing::get, Json, Router};
use crm_admin::backend::{AddressLookup, Backend};
use crm_admin::db::Store;
use crm_admin::entities::{NewClient, NewContact, NewUser, UserRole};
use crm_admin::error::CrmError;
use crm_admin::rest::{RestBackend, ViaCep};
use crm_admin::server::{router, AppState};
use std::time::Duration;

/// Serve `app` on an ephemeral port from a background runtime; returns the base URL
fn spawn(app: Router) -> String {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("failed creating runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed binding test listener");
            tx.send(listener.local_addr().expect("no local addr"))
                .expect("test thread went away");
            axum::serve(listener, app).await.expect("server crashed");
        });
    });
    let addr = rx.recv().expect("server never started");
    format!("http://{}/", addr)
}

fn spawn_crm() -> String {
    let store = Store::open_in_memory().expect("failed opening store");
    store
        .create_user(&NewUser {
            name: "Admin".to_string(),
            email: "admin@empresa.com".to_string(),
            password: "segredo123".to_string(),
            role: UserRole::Administrador,
        })
        .expect("failed seeding user");
    spawn(router(AppState::new(store)))
}

fn client_for(base: &str) -> RestBackend {
    RestBackend::new(base, Duration::from_secs(5)).expect("failed building http client")
}

#[test]
fn login_is_required_and_remembered() {
    let base = spawn_crm();
    let mut backend = client_for(&base);

    assert!(matches!(backend.list_clients(), Err(CrmError::Unauthorized)));
    assert!(matches!(
        backend.login("admin@empresa.com", "errada"),
        Err(CrmError::Unauthorized)
    ));

    let session = backend.login("admin@empresa.com", "segredo123").unwrap();
    assert_eq!(session.user.role, UserRole::Administrador);
    assert_eq!(backend.token(), Some(session.access_token.as_str()));
    assert_eq!(backend.current_user().unwrap().email, "admin@empresa.com");

    // A token obtained once can be reused by a fresh client
    let reused = client_for(&base).with_token(session.access_token);
    assert!(reused.list_clients().unwrap().is_empty());
}

#[test]
fn register_then_login() {
    let base = spawn_crm();
    let mut backend = client_for(&base);

    let new_user = NewUser {
        name: "Bia Souza".to_string(),
        email: "bia@empresa.com".to_string(),
        password: "outrasenha".to_string(),
        role: UserRole::Suporte,
    };
    backend.register(&new_user).unwrap();

    match backend.register(&new_user) {
        Err(CrmError::Status { status, message }) => {
            assert_eq!(status, 409);
            assert_eq!(message, "Email já cadastrado");
        }
        other => panic!("unexpected: {:?}", other),
    }

    let session = backend.login("bia@empresa.com", "outrasenha").unwrap();
    assert_eq!(session.user.name, "Bia Souza");
}

#[test]
fn clients_and_contacts_round_trip() {
    let base = spawn_crm();
    let mut backend = client_for(&base);
    backend.login("admin@empresa.com", "segredo123").unwrap();

    let mut form = NewClient::new("Padaria", "12.345.678/0001-99");
    form.cep = Some("01310-100".to_string());
    form.city = Some("São Paulo".to_string());
    let client = backend.create_client(&form.validated().unwrap()).unwrap();
    assert_eq!(client.display_cnpj(), "12.345.678/0001-99");
    assert_eq!(client.display_cep(), "01310-100");

    match backend.create_client(&NewClient::new("Outra", "12345678000199")) {
        Err(CrmError::Status { status, message }) => {
            assert_eq!(status, 409);
            assert_eq!(message, "CNPJ já cadastrado");
        }
        other => panic!("unexpected: {:?}", other),
    }

    let mut contact = NewContact::new("Ana", "ana@padaria.com");
    contact.client_id = Some(client.id);
    contact.phone = Some("(11) 98765-4321".to_string());
    let created = backend.create_contact(&contact).unwrap();
    assert!(created.belongs_to(client.id));
    assert_eq!(created.display_phone(), "(11) 98765-4321");

    let for_client = backend.contacts_by_client(client.id).unwrap();
    assert_eq!(for_client.len(), 1);
    assert_eq!(for_client[0].client_names(), "Padaria");

    backend.delete_contact(created.id).unwrap();
    assert!(backend.list_contacts().unwrap().is_empty());
    assert!(matches!(backend.delete_contact(created.id), Err(CrmError::NotFound(_))));

    backend.delete_client(client.id).unwrap();
    assert!(backend.list_clients().unwrap().is_empty());
}

#[test]
fn viacep_lookup_over_http() {
    async fn answer(Path(cep): Path<String>) -> Json<serde_json::Value> {
        if cep == "01310100" {
            Json(serde_json::json!({
                "cep": "01310-100",
                "logradouro": "Avenida Paulista",
                "complemento": "",
                "bairro": "Bela Vista",
                "localidade": "São Paulo",
                "uf": "SP",
                "ibge": "3550308"
            }))
        } else {
            Json(serde_json::json!({ "erro": true }))
        }
    }

    let base = spawn(Router::new().route("/ws/:cep/json/", get(answer)));
    let lookup = ViaCep::new(&format!("{}ws/", base), Duration::from_secs(5)).unwrap();

    let address = lookup.lookup("01310-100").unwrap();
    assert_eq!(address.city, "São Paulo");
    assert_eq!(address.uf, "SP");

    assert!(matches!(lookup.lookup("99999999"), Err(CrmError::NotFound(_))));
}
