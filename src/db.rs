// Local SQLite store
//
// Backs offline mode, the CSV import and the development server.
// Indexed columns hold what the store needs to enforce (names, CNPJ
// uniqueness, active flag); everything else lives in a JSON `data` column
// so new backend fields don't need a migration.

use crate::backend::Backend;
use crate::entities::{
    Client, ClientRef, Contact, NewClient, NewContact, NewUser, Session, User, UserRole,
};
use crate::error::{CrmError, CrmResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info, warn};

// ============================================================================
// EVENTS (audit trail)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Outcome of a CSV import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

// ============================================================================
// STORE
// ============================================================================

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> CrmResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode for crash recovery (not available for in-memory databases)
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> CrmResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> CrmResult<Self> {
        setup_database(&conn)?;
        Ok(Self { conn })
    }

    // ------------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------------

    pub fn insert_client(&self, client: &NewClient, actor: &str) -> CrmResult<Client> {
        let client = client.clone().validated()?;
        let data = serde_json::to_string(&client)?;

        let result = self.conn.execute(
            "INSERT INTO clients (ds_nome, nr_cnpj, fl_ativo, data) VALUES (?1, ?2, ?3, ?4)",
            params![client.name, client.cnpj, client.active, data],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(CrmError::Conflict("CNPJ já cadastrado".to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        self.log_event(
            "client_created",
            "client",
            id,
            serde_json::json!({ "name": client.name, "cnpj": client.cnpj }),
            actor,
        );

        self.get_client(id)?
            .ok_or_else(|| CrmError::Internal(format!("client {} vanished after insert", id)))
    }

    pub fn get_client(&self, id: i64) -> CrmResult<Option<Client>> {
        let row = self
            .conn
            .query_row(
                "SELECT id_cliente, fl_ativo, data FROM clients WHERE id_cliente = ?1",
                params![id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;

        row.map(|(id, active, data)| client_from_row(id, active, &data))
            .transpose()
    }

    pub fn all_clients(&self) -> CrmResult<Vec<Client>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id_cliente, fl_ativo, data FROM clients ORDER BY id_cliente")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|(id, active, data)| client_from_row(*id, *active, data))
            .collect()
    }

    pub fn delete_client(&self, id: i64, actor: &str) -> CrmResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM clients WHERE id_cliente = ?1", params![id])?;

        if deleted == 0 {
            return Err(CrmError::NotFound(format!("cliente {}", id)));
        }

        self.log_event("client_deleted", "client", id, serde_json::json!({}), actor);
        Ok(())
    }

    pub fn count_clients(&self) -> CrmResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))?;
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------------

    pub fn insert_contact(&self, contact: &NewContact, actor: &str) -> CrmResult<Contact> {
        let contact = contact.clone().validated()?;

        if let Some(client_id) = contact.client_id {
            if self.get_client(client_id)?.is_none() {
                return Err(CrmError::NotFound(format!("cliente {}", client_id)));
            }
        }

        let data = serde_json::to_string(&NewContact {
            client_id: None,
            ..contact.clone()
        })?;

        self.conn.execute(
            "INSERT INTO contacts (ds_nome, ds_email, fl_ativo, data) VALUES (?1, ?2, ?3, ?4)",
            params![contact.name, contact.email, contact.active, data],
        )?;
        let id = self.conn.last_insert_rowid();

        if let Some(client_id) = contact.client_id {
            self.link_contact(id, client_id)?;
        }

        self.log_event(
            "contact_created",
            "contact",
            id,
            serde_json::json!({ "name": contact.name, "client_id": contact.client_id }),
            actor,
        );

        self.get_contact(id)?
            .ok_or_else(|| CrmError::Internal(format!("contact {} vanished after insert", id)))
    }

    pub fn link_contact(&self, contact_id: i64, client_id: i64) -> CrmResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO client_contacts (id_cliente, id_contato) VALUES (?1, ?2)",
            params![client_id, contact_id],
        )?;
        Ok(())
    }

    pub fn get_contact(&self, id: i64) -> CrmResult<Option<Contact>> {
        let row = self
            .conn
            .query_row(
                "SELECT id_contato, fl_ativo, data FROM contacts WHERE id_contato = ?1",
                params![id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;

        match row {
            Some((id, active, data)) => Ok(Some(self.contact_from_row(id, active, &data)?)),
            None => Ok(None),
        }
    }

    pub fn all_contacts(&self) -> CrmResult<Vec<Contact>> {
        self.contacts_where("SELECT id_contato, fl_ativo, data FROM contacts ORDER BY id_contato", None)
    }

    pub fn contacts_for_client(&self, client_id: i64) -> CrmResult<Vec<Contact>> {
        if self.get_client(client_id)?.is_none() {
            return Err(CrmError::NotFound(format!("cliente {}", client_id)));
        }

        self.contacts_where(
            "SELECT c.id_contato, c.fl_ativo, c.data
             FROM contacts c
             JOIN client_contacts l ON l.id_contato = c.id_contato
             WHERE l.id_cliente = ?1
             ORDER BY c.id_contato",
            Some(client_id),
        )
    }

    fn contacts_where(&self, sql: &str, client_id: Option<i64>) -> CrmResult<Vec<Contact>> {
        let mut stmt = self.conn.prepare(sql)?;
        let map = |row: &rusqlite::Row<'_>| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?, row.get::<_, String>(2)?))
        };

        let rows = match client_id {
            Some(id) => stmt.query_map(params![id], map)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?,
        };

        rows.iter()
            .map(|(id, active, data)| self.contact_from_row(*id, *active, data))
            .collect()
    }

    fn contact_from_row(&self, id: i64, active: bool, data: &str) -> CrmResult<Contact> {
        let mut value: serde_json::Value = serde_json::from_str(data)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("id_contato".to_string(), serde_json::json!(id));
            obj.insert("fl_ativo".to_string(), serde_json::json!(active));
        }

        let mut contact: Contact = serde_json::from_value(value)?;
        contact.clients = self.clients_of_contact(id)?;
        Ok(contact)
    }

    fn clients_of_contact(&self, contact_id: i64) -> CrmResult<Vec<ClientRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id_cliente, c.ds_nome
             FROM client_contacts l
             JOIN clients c ON c.id_cliente = l.id_cliente
             WHERE l.id_contato = ?1
             ORDER BY c.id_cliente",
        )?;

        let refs = stmt
            .query_map(params![contact_id], |row| {
                Ok(ClientRef {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(refs)
    }

    pub fn delete_contact(&self, id: i64, actor: &str) -> CrmResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM contacts WHERE id_contato = ?1", params![id])?;

        if deleted == 0 {
            return Err(CrmError::NotFound(format!("contato {}", id)));
        }

        self.log_event("contact_deleted", "contact", id, serde_json::json!({}), actor);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Users & sessions
    // ------------------------------------------------------------------------

    pub fn create_user(&self, user: &NewUser) -> CrmResult<User> {
        let salt = uuid::Uuid::new_v4().to_string();
        let hash = hash_password(&salt, &user.password);
        let email = user.email.trim().to_lowercase();

        let result = self.conn.execute(
            "INSERT INTO users (name, email, role, salt, password_hash) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user.name, email, user.role.as_str(), salt, hash],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(CrmError::Conflict("Email já cadastrado".to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        info!(user_id = id, email = %email, "user created");

        Ok(User {
            id: id.to_string(),
            name: user.name.clone(),
            email,
            role: user.role,
        })
    }

    /// `None` for unknown email or wrong password (callers shouldn't tell them apart)
    pub fn authenticate(&self, email: &str, password: &str) -> CrmResult<Option<User>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, email, role, salt, password_hash FROM users WHERE email = ?1",
                params![email.trim().to_lowercase()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, email, role, salt, stored_hash)) = row else {
            return Ok(None);
        };

        if hash_password(&salt, password) != stored_hash {
            warn!(email = %email, "wrong password");
            return Ok(None);
        }

        Ok(Some(user_from_parts(id, name, email, &role)?))
    }

    pub fn create_session(&self, user_id: &str) -> CrmResult<String> {
        let token = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, Utc::now().to_rfc3339()],
        )?;
        Ok(token)
    }

    pub fn user_for_token(&self, token: &str) -> CrmResult<Option<User>> {
        let row = self
            .conn
            .query_row(
                "SELECT u.id, u.name, u.email, u.role
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1",
                params![token],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, name, email, role)| user_from_parts(id, name, email, &role))
            .transpose()
    }

    pub fn delete_session(&self, token: &str) -> CrmResult<()> {
        self.conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Audit failures are logged, never propagated
    fn log_event(
        &self,
        event_type: &str,
        entity_type: &str,
        entity_id: i64,
        data: serde_json::Value,
        actor: &str,
    ) {
        let event = Event::new(event_type, entity_type, &entity_id.to_string(), data, actor);
        if let Err(e) = insert_event(&self.conn, &event) {
            warn!(error = %e, event_type, "failed to record audit event");
        }
    }

    pub fn events_for(&self, entity_type: &str, entity_id: i64) -> CrmResult<Vec<Event>> {
        get_events_for_entity(&self.conn, entity_type, &entity_id.to_string())
    }

    // ------------------------------------------------------------------------
    // Import
    // ------------------------------------------------------------------------

    /// Load clients from a CSV whose headers are the backend field names
    /// (`ds_nome`, `nr_cnpj`, `ds_cidade`, ...). CNPJ duplicates are skipped.
    pub fn import_clients_csv(&self, csv_path: &Path, actor: &str) -> CrmResult<ImportReport> {
        let mut rdr = csv::Reader::from_path(csv_path)?;
        let mut report = ImportReport::default();

        for (line, result) in rdr.deserialize::<NewClient>().enumerate() {
            let client = match result {
                Ok(c) => c,
                Err(e) => {
                    warn!(line = line + 2, error = %e, "unreadable CSV row");
                    report.invalid += 1;
                    continue;
                }
            };

            match self.insert_client(&client, actor) {
                Ok(_) => report.inserted += 1,
                Err(CrmError::Conflict(_)) => report.duplicates += 1,
                Err(CrmError::Validation(msg)) => {
                    warn!(line = line + 2, %msg, "invalid client row");
                    report.invalid += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            invalid = report.invalid,
            "client import finished"
        );
        Ok(report)
    }
}

// ============================================================================
// SCHEMA & ROW HELPERS
// ============================================================================

pub fn setup_database(conn: &Connection) -> CrmResult<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS clients (
            id_cliente INTEGER PRIMARY KEY AUTOINCREMENT,
            ds_nome TEXT NOT NULL,
            nr_cnpj TEXT UNIQUE NOT NULL,
            fl_ativo INTEGER NOT NULL DEFAULT 1,
            data TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS contacts (
            id_contato INTEGER PRIMARY KEY AUTOINCREMENT,
            ds_nome TEXT NOT NULL,
            ds_email TEXT NOT NULL,
            fl_ativo INTEGER NOT NULL DEFAULT 1,
            data TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Deleting either side drops the link
    conn.execute(
        "CREATE TABLE IF NOT EXISTS client_contacts (
            id_cliente INTEGER NOT NULL REFERENCES clients(id_cliente) ON DELETE CASCADE,
            id_contato INTEGER NOT NULL REFERENCES contacts(id_contato) ON DELETE CASCADE,
            PRIMARY KEY (id_cliente, id_contato)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            role TEXT NOT NULL,
            salt TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_client_contacts_contact ON client_contacts(id_contato)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

fn client_from_row(id: i64, active: bool, data: &str) -> CrmResult<Client> {
    let mut value: serde_json::Value = serde_json::from_str(data)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("id_cliente".to_string(), serde_json::json!(id));
        obj.insert("fl_ativo".to_string(), serde_json::json!(active));
    }
    Ok(serde_json::from_value(value)?)
}

fn user_from_parts(id: i64, name: String, email: String, role: &str) -> CrmResult<User> {
    let role = UserRole::parse(role)
        .ok_or_else(|| CrmError::Internal(format!("unknown role in database: {}", role)))?;
    Ok(User {
        id: id.to_string(),
        name,
        email,
        role,
    })
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", salt, password));
    format!("{:x}", hasher.finalize())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> CrmResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Events for one entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> CrmResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| {
            Ok(Event {
                event_id,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| CrmError::Internal(format!("bad event timestamp: {}", e)))?
                    .with_timezone(&Utc),
                event_type,
                entity_type,
                entity_id,
                data: serde_json::from_str(&data)?,
                actor,
            })
        })
        .collect()
}

// ============================================================================
// LOCAL BACKEND
// ============================================================================

/// `Backend` over the local store, with an in-process session
pub struct LocalBackend {
    store: Store,
    token: Option<String>,
}

impl LocalBackend {
    pub fn new(store: Store) -> Self {
        Self { store, token: None }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn session_user(&self) -> CrmResult<User> {
        let token = self.token.as_deref().ok_or(CrmError::Unauthorized)?;
        self.store
            .user_for_token(token)?
            .ok_or(CrmError::Unauthorized)
    }
}

impl Backend for LocalBackend {
    fn login(&mut self, email: &str, password: &str) -> CrmResult<Session> {
        let user = self
            .store
            .authenticate(email, password)?
            .ok_or(CrmError::Unauthorized)?;
        let token = self.store.create_session(&user.id)?;
        debug!(user = %user.email, "local session opened");

        self.token = Some(token.clone());
        Ok(Session {
            access_token: token,
            user,
        })
    }

    fn register(&mut self, new_user: &NewUser) -> CrmResult<()> {
        self.store.create_user(new_user)?;
        Ok(())
    }

    fn logout(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.store.delete_session(&token) {
                warn!(error = %e, "failed to drop local session");
            }
        }
    }

    fn current_user(&self) -> CrmResult<User> {
        self.session_user()
    }

    fn list_clients(&self) -> CrmResult<Vec<Client>> {
        self.session_user()?;
        self.store.all_clients()
    }

    fn create_client(&self, client: &NewClient) -> CrmResult<Client> {
        let user = self.session_user()?;
        self.store.insert_client(client, &user.email)
    }

    fn delete_client(&self, id: i64) -> CrmResult<()> {
        let user = self.session_user()?;
        self.store.delete_client(id, &user.email)
    }

    fn list_contacts(&self) -> CrmResult<Vec<Contact>> {
        self.session_user()?;
        self.store.all_contacts()
    }

    fn contacts_by_client(&self, client_id: i64) -> CrmResult<Vec<Contact>> {
        self.session_user()?;
        self.store.contacts_for_client(client_id)
    }

    fn create_contact(&self, contact: &NewContact) -> CrmResult<Contact> {
        let user = self.session_user()?;
        self.store.insert_contact(contact, &user.email)
    }

    fn delete_contact(&self, id: i64) -> CrmResult<()> {
        let user = self.session_user()?;
        self.store.delete_contact(id, &user.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn admin() -> NewUser {
        NewUser {
            name: "Admin".to_string(),
            email: "admin@empresa.com".to_string(),
            password: "segredo123".to_string(),
            role: UserRole::Administrador,
        }
    }

    #[test]
    fn test_insert_and_list_clients() {
        let store = test_store();

        let mut form = NewClient::new("Padaria", "12.345.678/0001-99");
        form.city = Some("Campinas".to_string());
        let created = store.insert_client(&form, "test").unwrap();

        assert_eq!(created.cnpj, "12345678000199");
        assert_eq!(created.city.as_deref(), Some("Campinas"));
        assert!(created.active);

        let all = store.all_clients().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], created);
    }

    #[test]
    fn test_duplicate_cnpj_is_conflict() {
        let store = test_store();
        store.insert_client(&NewClient::new("A", "12345678000199"), "test").unwrap();

        let err = store
            .insert_client(&NewClient::new("B", "12.345.678/0001-99"), "test")
            .unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));
        assert_eq!(store.count_clients().unwrap(), 1);
    }

    #[test]
    fn test_invalid_client_is_rejected() {
        let store = test_store();
        let err = store.insert_client(&NewClient::new("", ""), "test").unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[test]
    fn test_contacts_linked_to_client() {
        let store = test_store();
        let client = store.insert_client(&NewClient::new("Padaria", "12345678000199"), "test").unwrap();
        let other = store.insert_client(&NewClient::new("Mercado", "98765432000110"), "test").unwrap();

        let mut form = NewContact::new("Ana", "ana@padaria.com");
        form.client_id = Some(client.id);
        form.phone = Some("(11) 98765-4321".to_string());
        let ana = store.insert_contact(&form, "test").unwrap();

        store.insert_contact(&NewContact::new("Bia", "bia@mercado.com"), "test").unwrap();

        assert_eq!(ana.clients, vec![ClientRef { id: client.id, name: Some("Padaria".to_string()) }]);
        assert_eq!(ana.phone.as_deref(), Some("11987654321"));

        let for_client = store.contacts_for_client(client.id).unwrap();
        assert_eq!(for_client.len(), 1);
        assert_eq!(for_client[0].name, "Ana");

        assert!(store.contacts_for_client(other.id).unwrap().is_empty());
        assert!(matches!(store.contacts_for_client(999), Err(CrmError::NotFound(_))));
        assert_eq!(store.all_contacts().unwrap().len(), 2);
    }

    #[test]
    fn test_contact_for_unknown_client() {
        let store = test_store();
        let mut form = NewContact::new("Ana", "ana@padaria.com");
        form.client_id = Some(42);
        assert!(matches!(store.insert_contact(&form, "test"), Err(CrmError::NotFound(_))));
    }

    #[test]
    fn test_delete_client_drops_links_but_keeps_contacts() {
        let store = test_store();
        let client = store.insert_client(&NewClient::new("Padaria", "12345678000199"), "test").unwrap();
        let mut form = NewContact::new("Ana", "ana@padaria.com");
        form.client_id = Some(client.id);
        let ana = store.insert_contact(&form, "test").unwrap();

        store.delete_client(client.id, "test").unwrap();

        let ana = store.get_contact(ana.id).unwrap().unwrap();
        assert!(ana.clients.is_empty());
        assert!(matches!(store.delete_client(client.id, "test"), Err(CrmError::NotFound(_))));
    }

    #[test]
    fn test_delete_contact() {
        let store = test_store();
        let ana = store.insert_contact(&NewContact::new("Ana", "ana@padaria.com"), "test").unwrap();

        store.delete_contact(ana.id, "test").unwrap();
        assert!(store.get_contact(ana.id).unwrap().is_none());
        assert!(matches!(store.delete_contact(ana.id, "test"), Err(CrmError::NotFound(_))));
    }

    #[test]
    fn test_event_log() {
        let store = test_store();
        let client = store.insert_client(&NewClient::new("Padaria", "12345678000199"), "ana@empresa.com").unwrap();
        store.delete_client(client.id, "ana@empresa.com").unwrap();

        let events = store.events_for("client", client.id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "client_deleted");
        assert_eq!(events[1].event_type, "client_created");
        assert_eq!(events[1].data["cnpj"], "12345678000199");
        assert_eq!(events[0].actor, "ana@empresa.com");

        println!("✅ Event log test PASSED");
    }

    #[test]
    fn test_users_and_sessions() {
        let store = test_store();
        let user = store.create_user(&admin()).unwrap();

        assert!(matches!(store.create_user(&admin()), Err(CrmError::Conflict(_))));
        assert!(store.authenticate("admin@empresa.com", "errada").unwrap().is_none());
        assert!(store.authenticate("ninguem@empresa.com", "segredo123").unwrap().is_none());

        let found = store.authenticate(" ADMIN@empresa.com ", "segredo123").unwrap().unwrap();
        assert_eq!(found, user);

        let token = store.create_session(&user.id).unwrap();
        assert_eq!(store.user_for_token(&token).unwrap(), Some(user));

        store.delete_session(&token).unwrap();
        assert!(store.user_for_token(&token).unwrap().is_none());
    }

    #[test]
    fn test_import_clients_csv() {
        let store = test_store();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ds_nome,nr_cnpj,ds_cidade,ds_uf,fl_ativo").unwrap();
        writeln!(file, "Padaria,12.345.678/0001-99,Campinas,SP,true").unwrap();
        writeln!(file, "Mercado,98765432000110,Recife,PE,false").unwrap();
        writeln!(file, "Padaria de novo,12345678000199,Campinas,SP,true").unwrap();
        writeln!(file, "Sem CNPJ,,Campinas,SP,true").unwrap();

        let report = store.import_clients_csv(file.path(), "import").unwrap();
        assert_eq!(
            report,
            ImportReport { inserted: 2, duplicates: 1, invalid: 1 }
        );

        // Import twice: nothing new
        let again = store.import_clients_csv(file.path(), "import").unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(store.count_clients().unwrap(), 2);

        let clients = store.all_clients().unwrap();
        assert!(!clients[1].active);
        assert_eq!(clients[1].state.as_deref(), Some("PE"));
    }

    #[test]
    fn test_local_backend_requires_login() {
        let store = test_store();
        store.create_user(&admin()).unwrap();
        let mut backend = LocalBackend::new(store);

        assert!(matches!(backend.list_clients(), Err(CrmError::Unauthorized)));
        assert!(matches!(backend.login("admin@empresa.com", "nope"), Err(CrmError::Unauthorized)));

        let session = backend.login("admin@empresa.com", "segredo123").unwrap();
        assert_eq!(session.user.role, UserRole::Administrador);
        assert_eq!(backend.current_user().unwrap().email, "admin@empresa.com");

        let client = backend.create_client(&NewClient::new("Padaria", "12345678000199")).unwrap();
        assert_eq!(backend.list_clients().unwrap().len(), 1);

        let events = backend.store().events_for("client", client.id).unwrap();
        assert_eq!(events[0].actor, "admin@empresa.com");

        backend.logout();
        assert!(matches!(backend.current_user(), Err(CrmError::Unauthorized)));
    }
}
