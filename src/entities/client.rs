// 🏢 Client Entity - companies served by the support team
//
// `Client` is what the backend returns, `NewClient` is what the add form sends.
// CNPJ and CEP are always stored as digits; punctuation is display-only.

use super::{default_true, non_blank, number, string_or_number, text};
use crate::error::{CrmError, CrmResult};
use crate::formatters::{format_cep, format_cnpj, Mask};
use crate::search::{FieldValue, Record};
use serde::{Deserialize, Serialize};

/// Fields the client list searches by default
pub const CLIENT_SEARCH_FIELDS: &[&str] = &["name", "corporate_name", "cnpj", "city", "state"];

/// Fields the client list can be sorted by (cycled with `s` in the TUI)
pub const CLIENT_SORT_FIELDS: &[&str] = &["name", "corporate_name", "city", "state", "active"];

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    #[serde(rename = "id_cliente")]
    pub id: i64,

    #[serde(rename = "fl_ativo", default = "default_true")]
    pub active: bool,

    #[serde(rename = "ds_nome")]
    pub name: String,

    #[serde(rename = "ds_razao_social", default, skip_serializing_if = "Option::is_none")]
    pub corporate_name: Option<String>,

    /// Digits only
    #[serde(rename = "nr_cnpj", default)]
    pub cnpj: String,

    #[serde(
        rename = "nr_inscricao_estadual",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub state_registration: Option<String>,

    #[serde(rename = "ds_site", default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    // ========================================================================
    // ADDRESS
    // ========================================================================
    #[serde(rename = "ds_endereco", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(
        rename = "ds_cep",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub cep: Option<String>,

    #[serde(rename = "ds_uf", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(rename = "ds_cidade", default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(rename = "ds_bairro", default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(
        rename = "nr_numero",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub number: Option<String>,

    #[serde(rename = "ds_complemento", default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,

    #[serde(
        rename = "nr_codigo_ibge",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub ibge_code: Option<String>,

    #[serde(rename = "nr_latitude", default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(rename = "nr_longitude", default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(rename = "nr_distancia_km", default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,

    // ========================================================================
    // CONTRACT & NOTES
    // ========================================================================
    #[serde(rename = "tx_observacoes", default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(rename = "ds_situacao", default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<String>,

    #[serde(rename = "ds_sistema", default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(rename = "ds_contrato", default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,

    #[serde(rename = "dt_data", default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<String>,

    #[serde(rename = "contatos", default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<ClientContact>,
}

impl Client {
    pub fn display_cnpj(&self) -> String {
        format_cnpj(&self.cnpj)
    }

    pub fn display_cep(&self) -> String {
        self.cep.as_deref().map(format_cep).unwrap_or_default()
    }

    /// "City/UF", or whichever half is known
    pub fn location(&self) -> String {
        match (self.city.as_deref(), self.state.as_deref()) {
            (Some(city), Some(uf)) => format!("{}/{}", city, uf),
            (Some(city), None) => city.to_string(),
            (None, Some(uf)) => uf.to_string(),
            (None, None) => String::new(),
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.active {
            "Ativo"
        } else {
            "Inativo"
        }
    }
}

impl Record for Client {
    fn active(&self) -> Option<bool> {
        Some(self.active)
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "id" => FieldValue::Number(self.id as f64),
            "active" => FieldValue::Bool(self.active),
            "name" => FieldValue::Text(&self.name),
            "corporate_name" => text(&self.corporate_name),
            "cnpj" => FieldValue::Text(&self.cnpj),
            "state_registration" => text(&self.state_registration),
            "site" => text(&self.site),
            "address" => text(&self.address),
            "cep" => text(&self.cep),
            "state" => text(&self.state),
            "city" => text(&self.city),
            "district" => text(&self.district),
            "number" => text(&self.number),
            "complement" => text(&self.complement),
            "ibge_code" => text(&self.ibge_code),
            "latitude" => number(self.latitude),
            "longitude" => number(self.longitude),
            "distance_km" => number(self.distance_km),
            "notes" => text(&self.notes),
            "situation" => text(&self.situation),
            "system" => text(&self.system),
            "contract" => text(&self.contract),
            _ => FieldValue::Missing,
        }
    }
}

/// Contact as embedded in a client payload (`contatos`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientContact {
    #[serde(rename = "id_contato")]
    pub id: i64,

    #[serde(rename = "ds_nome")]
    pub name: String,

    #[serde(rename = "ds_cargo", default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,

    #[serde(rename = "fl_ativo", default = "default_true")]
    pub active: bool,

    #[serde(rename = "tx_observacoes", default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(rename = "ds_email", default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(rename = "ds_telefone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(rename = "fl_whatsapp", default)]
    pub whatsapp: bool,

    #[serde(rename = "id_cliente")]
    pub client_id: i64,
}

// ============================================================================
// ADDRESS LOOKUP RESULT
// ============================================================================

/// Address returned by a postal-code lookup (ViaCEP field names)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub cep: String,

    #[serde(rename = "logradouro", default)]
    pub street: String,

    #[serde(rename = "complemento", default)]
    pub complement: String,

    #[serde(rename = "bairro", default)]
    pub district: String,

    #[serde(rename = "localidade", default)]
    pub city: String,

    #[serde(default)]
    pub uf: String,

    #[serde(default)]
    pub ibge: String,

    /// ViaCEP answers `{"erro": true}` for unknown codes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erro: Option<bool>,
}

// ============================================================================
// NEW CLIENT (add form payload)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClient {
    #[serde(rename = "ds_nome")]
    pub name: String,

    #[serde(rename = "ds_razao_social", default, skip_serializing_if = "Option::is_none")]
    pub corporate_name: Option<String>,

    #[serde(rename = "nr_cnpj")]
    pub cnpj: String,

    #[serde(rename = "nr_inscricao_estadual", default, skip_serializing_if = "Option::is_none")]
    pub state_registration: Option<String>,

    #[serde(rename = "ds_site", default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    #[serde(rename = "tx_observacoes", default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(rename = "fl_ativo", default = "default_true")]
    pub active: bool,

    #[serde(rename = "ds_cep", default, skip_serializing_if = "Option::is_none")]
    pub cep: Option<String>,

    #[serde(rename = "ds_uf", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(rename = "ds_cidade", default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(rename = "ds_bairro", default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(rename = "ds_endereco", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(rename = "nr_numero", default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,

    #[serde(rename = "ds_complemento", default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,

    #[serde(rename = "nr_codigo_ibge", default, skip_serializing_if = "Option::is_none")]
    pub ibge_code: Option<String>,

    #[serde(rename = "nr_latitude", default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(rename = "nr_longitude", default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(rename = "nr_distancia_km", default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl Default for NewClient {
    fn default() -> Self {
        Self {
            name: String::new(),
            corporate_name: None,
            cnpj: String::new(),
            state_registration: None,
            site: None,
            notes: None,
            active: true,
            cep: None,
            state: None,
            city: None,
            district: None,
            address: None,
            number: None,
            complement: None,
            ibge_code: None,
            latitude: None,
            longitude: None,
            distance_km: None,
        }
    }
}

impl NewClient {
    pub fn new(name: &str, cnpj: &str) -> Self {
        Self {
            name: name.to_string(),
            cnpj: cnpj.to_string(),
            ..Self::default()
        }
    }

    /// Check required fields and normalize masked values to digits
    pub fn validated(self) -> CrmResult<NewClient> {
        let cnpj = Mask::Cnpj.normalize(&self.cnpj);
        if self.name.trim().is_empty() || cnpj.is_empty() {
            return Err(CrmError::validation("Nome e CNPJ são obrigatórios"));
        }

        let cep = self
            .cep
            .map(|c| Mask::Cep.normalize(&c))
            .filter(|c| !c.is_empty());

        Ok(NewClient {
            name: self.name.trim().to_string(),
            cnpj,
            cep,
            corporate_name: non_blank(self.corporate_name),
            state_registration: non_blank(self.state_registration),
            site: non_blank(self.site),
            notes: non_blank(self.notes),
            state: non_blank(self.state),
            city: non_blank(self.city),
            district: non_blank(self.district),
            address: non_blank(self.address),
            number: non_blank(self.number),
            complement: non_blank(self.complement),
            ibge_code: non_blank(self.ibge_code),
            ..self
        })
    }

    /// Fill address fields from a postal-code lookup.
    /// Empty lookup values keep whatever the form already had.
    pub fn apply_address(&mut self, found: &Address) {
        fn pick(found: &str, current: &mut Option<String>) {
            if !found.trim().is_empty() {
                *current = Some(found.trim().to_string());
            }
        }

        pick(&found.street, &mut self.address);
        pick(&found.district, &mut self.district);
        pick(&found.city, &mut self.city);
        pick(&found.uf, &mut self.state);
        pick(&found.complement, &mut self.complement);
        pick(&found.ibge, &mut self.ibge_code);
    }
}
