// Backend contract - what the admin screens need from the REST service
//
// Two implementations:
//   - `rest::RestBackend`  talks HTTP to the real service
//   - `db::LocalBackend`   works against the local SQLite store (offline mode, tests)

use crate::entities::{Address, Client, Contact, NewClient, NewContact, NewUser, Session, User};
use crate::error::CrmResult;

pub trait Backend {
    /// Authenticate and remember the session for later calls
    fn login(&mut self, email: &str, password: &str) -> CrmResult<Session>;

    fn register(&mut self, new_user: &NewUser) -> CrmResult<()>;

    fn logout(&mut self);

    fn current_user(&self) -> CrmResult<User>;

    fn list_clients(&self) -> CrmResult<Vec<Client>>;

    fn create_client(&self, client: &NewClient) -> CrmResult<Client>;

    fn delete_client(&self, id: i64) -> CrmResult<()>;

    fn list_contacts(&self) -> CrmResult<Vec<Contact>>;

    fn contacts_by_client(&self, client_id: i64) -> CrmResult<Vec<Contact>>;

    fn create_contact(&self, contact: &NewContact) -> CrmResult<Contact>;

    fn delete_contact(&self, id: i64) -> CrmResult<()>;
}

/// Postal-code (CEP) to address lookup
pub trait AddressLookup {
    /// `cep` may carry punctuation; only complete 8-digit codes are looked up
    fn lookup(&self, cep: &str) -> CrmResult<Address>;
}
