// 👤 Contact Entity - people at client companies
//
// The backend has shipped two shapes for contacts:
//   - with a nested join list:   {"clientes": [{"id_cliente": 1, ...}]}
//   - with a direct foreign key: {"id_cliente": 1}
// Both are mapped into `Contact::clients` at deserialization time, so the
// rest of the app only ever sees one shape.

use super::{default_true, is_valid_email, non_blank, text, ClientContact};
use crate::error::{CrmError, CrmResult};
use crate::formatters::{display_phone, Mask};
use crate::search::{FieldValue, Record};
use serde::{Deserialize, Serialize};

pub const CONTACT_SEARCH_FIELDS: &[&str] = &["name", "email", "job_title", "phone"];

pub const CONTACT_SORT_FIELDS: &[&str] = &["name", "job_title", "email", "active"];

/// Job titles offered by the contact form ("Outro" means free text)
pub const JOB_TITLES: &[&str] = &[
    "Administrativo",
    "Analista de PCP",
    "Auxiliar Fiscal",
    "Comercial",
    "Compras",
    "Consultor",
    "Contador",
    "Controller",
    "Diretor",
    "Faturamento",
    "Faturista",
    "Financeiro",
    "Fiscal",
    "Gerente",
    "Gerente Administrativo",
    "Gerente Comercial",
    "Gerente de Produção",
    "Gerente Geral",
    "Gerente Industrial",
    "Laboratório",
    "PCP",
    "RH",
    "TI",
    "Vendas",
    "Outro",
];

// ============================================================================
// CONTACT
// ============================================================================

/// Link from a contact to one of its client companies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRef {
    #[serde(rename = "id_cliente")]
    pub id: i64,

    #[serde(rename = "ds_nome", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ContactPayload")]
pub struct Contact {
    #[serde(rename = "id_contato")]
    pub id: i64,

    #[serde(rename = "ds_nome")]
    pub name: String,

    #[serde(rename = "ds_cargo", skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,

    #[serde(rename = "fl_ativo")]
    pub active: bool,

    #[serde(rename = "tx_observacoes", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(rename = "ds_email", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Digits only
    #[serde(rename = "ds_telefone", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(rename = "fl_whatsapp")]
    pub whatsapp: bool,

    #[serde(rename = "clientes")]
    pub clients: Vec<ClientRef>,
}

impl Contact {
    pub fn display_phone(&self) -> String {
        display_phone(self.phone.as_deref().unwrap_or_default())
    }

    pub fn client_ids(&self) -> Vec<i64> {
        self.clients.iter().map(|c| c.id).collect()
    }

    pub fn belongs_to(&self, client_id: i64) -> bool {
        self.clients.iter().any(|c| c.id == client_id)
    }

    /// Comma-separated client names, falling back to ids
    pub fn client_names(&self) -> String {
        self.clients
            .iter()
            .map(|c| c.name.clone().unwrap_or_else(|| format!("#{}", c.id)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn status_label(&self) -> &'static str {
        if self.active {
            "Ativo"
        } else {
            "Inativo"
        }
    }
}

impl Record for Contact {
    fn active(&self) -> Option<bool> {
        Some(self.active)
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "id" => FieldValue::Number(self.id as f64),
            "name" => FieldValue::Text(&self.name),
            "job_title" => text(&self.job_title),
            "active" => FieldValue::Bool(self.active),
            "notes" => text(&self.notes),
            "email" => text(&self.email),
            "phone" => text(&self.phone),
            "whatsapp" => FieldValue::Bool(self.whatsapp),
            _ => FieldValue::Missing,
        }
    }
}

impl From<ClientContact> for Contact {
    fn from(c: ClientContact) -> Self {
        Contact {
            id: c.id,
            name: c.name,
            job_title: c.job_title,
            active: c.active,
            notes: c.notes,
            email: c.email,
            phone: c.phone,
            whatsapp: c.whatsapp,
            clients: vec![ClientRef {
                id: c.client_id,
                name: None,
            }],
        }
    }
}

// ============================================================================
// WIRE SHAPE (accepts both backend layouts)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ContactPayload {
    id_contato: i64,
    ds_nome: String,
    #[serde(default)]
    ds_cargo: Option<String>,
    #[serde(default = "default_true")]
    fl_ativo: bool,
    #[serde(default)]
    tx_observacoes: Option<String>,
    #[serde(default)]
    ds_email: Option<String>,
    #[serde(default)]
    ds_telefone: Option<String>,
    #[serde(default)]
    fl_whatsapp: bool,
    #[serde(default)]
    clientes: Vec<ClientRef>,
    #[serde(default)]
    id_cliente: Option<i64>,
}

impl From<ContactPayload> for Contact {
    fn from(p: ContactPayload) -> Self {
        let mut clients = p.clientes;
        if let Some(id) = p.id_cliente {
            if !clients.iter().any(|c| c.id == id) {
                clients.push(ClientRef { id, name: None });
            }
        }

        Contact {
            id: p.id_contato,
            name: p.ds_nome,
            job_title: p.ds_cargo,
            active: p.fl_ativo,
            notes: p.tx_observacoes,
            email: p.ds_email,
            phone: p.ds_telefone,
            whatsapp: p.fl_whatsapp,
            clients,
        }
    }
}

// ============================================================================
// NEW CONTACT (add form payload)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContact {
    #[serde(rename = "ds_nome")]
    pub name: String,

    #[serde(rename = "ds_email")]
    pub email: String,

    #[serde(rename = "ds_cargo", default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,

    #[serde(rename = "ds_telefone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(rename = "fl_ativo", default = "default_true")]
    pub active: bool,

    #[serde(rename = "fl_whatsapp", default)]
    pub whatsapp: bool,

    #[serde(rename = "tx_observacoes", default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(rename = "id_cliente", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
}

impl Default for NewContact {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            job_title: None,
            phone: None,
            active: true,
            whatsapp: false,
            notes: None,
            client_id: None,
        }
    }
}

impl NewContact {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            ..Self::default()
        }
    }

    pub fn validated(self) -> CrmResult<NewContact> {
        if self.name.trim().is_empty() {
            return Err(CrmError::validation("Nome é obrigatório"));
        }

        let email = self.email.trim().to_string();
        if email.is_empty() {
            return Err(CrmError::validation("Email é obrigatório"));
        }
        if !is_valid_email(&email) {
            return Err(CrmError::validation("Email inválido"));
        }

        let phone = self
            .phone
            .map(|p| Mask::Phone.normalize(&p))
            .filter(|p| !p.is_empty());

        Ok(NewContact {
            name: self.name.trim().to_string(),
            email,
            phone,
            job_title: non_blank(self.job_title),
            notes: non_blank(self.notes),
            ..self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{filter_records, FilterQuery};
    use serde_json::json;

    #[test]
    fn test_nested_join_shape() {
        let contact: Contact = serde_json::from_value(json!({
            "id_contato": 1,
            "ds_nome": "Ana",
            "ds_cargo": "Financeiro",
            "fl_ativo": true,
            "ds_email": "ana@empresa.com",
            "ds_telefone": "11987654321",
            "fl_whatsapp": true,
            "clientes": [
                {"id_cliente": 10, "ds_nome": "Padaria", "nr_cnpj": "12345678000199"},
                {"id_cliente": 11, "ds_nome": "Mercado"}
            ]
        }))
        .unwrap();

        assert_eq!(contact.client_ids(), vec![10, 11]);
        assert_eq!(contact.client_names(), "Padaria, Mercado");
        assert_eq!(contact.display_phone(), "(11) 98765-4321");
        assert!(contact.belongs_to(11));
    }

    #[test]
    fn test_direct_foreign_key_shape() {
        let contact: Contact = serde_json::from_value(json!({
            "id_contato": 2,
            "ds_nome": "Bia",
            "fl_ativo": false,
            "id_cliente": 10
        }))
        .unwrap();

        assert_eq!(contact.client_ids(), vec![10]);
        assert_eq!(contact.client_names(), "#10");
        assert_eq!(contact.display_phone(), "-");
        assert_eq!(contact.active(), Some(false));
    }

    #[test]
    fn test_serialized_contact_reads_back() {
        let contact: Contact = serde_json::from_value(json!({
            "id_contato": 3,
            "ds_nome": "Caio",
            "id_cliente": 4
        }))
        .unwrap();

        let body = serde_json::to_value(&contact).unwrap();
        assert_eq!(body["clientes"][0]["id_cliente"], 4);

        let back: Contact = serde_json::from_value(body).unwrap();
        assert_eq!(back, contact);
    }

    #[test]
    fn test_from_client_contact() {
        let embedded = ClientContact {
            id: 5,
            name: "Duda".to_string(),
            job_title: None,
            active: true,
            notes: None,
            email: Some("duda@empresa.com".to_string()),
            phone: None,
            whatsapp: false,
            client_id: 9,
        };

        let contact = Contact::from(embedded);
        assert_eq!(contact.client_ids(), vec![9]);
        assert_eq!(contact.field("email"), FieldValue::Text("duda@empresa.com"));
    }

    #[test]
    fn test_new_contact_validation_messages() {
        let err = NewContact::new(" ", "ana@empresa.com").validated().unwrap_err();
        assert_eq!(err.to_string(), "Nome é obrigatório");

        let err = NewContact::new("Ana", "").validated().unwrap_err();
        assert_eq!(err.to_string(), "Email é obrigatório");

        let err = NewContact::new("Ana", "ana@empresa").validated().unwrap_err();
        assert_eq!(err.to_string(), "Email inválido");
    }

    #[test]
    fn test_new_contact_normalizes_phone() {
        let mut form = NewContact::new("Ana", " ana@empresa.com ");
        form.phone = Some("(11) 98765-4321".to_string());
        form.job_title = Some(String::new());

        let contact = form.validated().unwrap();
        assert_eq!(contact.email, "ana@empresa.com");
        assert_eq!(contact.phone.as_deref(), Some("11987654321"));
        assert_eq!(contact.job_title, None);
    }

    #[test]
    fn test_search_finds_contact_by_phone_digits() {
        let contacts: Vec<Contact> = serde_json::from_value(json!([
            {"id_contato": 1, "ds_nome": "Ana", "ds_telefone": "11987654321"},
            {"id_contato": 2, "ds_nome": "Bia", "ds_telefone": "1133334444"},
            {"id_contato": 3, "ds_nome": "Caio"}
        ]))
        .unwrap();

        let query = FilterQuery::new("98765", CONTACT_SEARCH_FIELDS, true);
        let found = filter_records(&contacts, &query);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Ana");

        let query = FilterQuery::new("3333", CONTACT_SEARCH_FIELDS, true);
        assert_eq!(filter_records(&contacts, &query)[0].name, "Bia");
    }

    #[test]
    fn test_job_titles_end_with_free_text_option() {
        assert_eq!(JOB_TITLES.last(), Some(&"Outro"));
        assert!(JOB_TITLES.contains(&"Financeiro"));
    }
}
