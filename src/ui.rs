use anyhow::Result;
use crm_admin::backend::{AddressLookup, Backend};
use crm_admin::entities::{
    Address, Client, Contact, NewClient, NewContact, User, CLIENT_SEARCH_FIELDS,
    CLIENT_SORT_FIELDS, CONTACT_SEARCH_FIELDS, CONTACT_SORT_FIELDS, JOB_TITLES,
};
use crm_admin::error::CrmError;
use crm_admin::formatters::{Mask, MaskedInput};
use crm_admin::search::{SearchState, SortSpec};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::io;
use tracing::{debug, info};

// ============================================================================
// SCREENS & PAGES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Clients,
    Contacts,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Clients => Page::Contacts,
            Page::Contacts => Page::Clients,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Clients => "Clientes",
            Page::Contacts => "Contatos",
        }
    }

    fn sort_fields(&self) -> &'static [&'static str] {
        match self {
            Page::Clients => CLIENT_SORT_FIELDS,
            Page::Contacts => CONTACT_SORT_FIELDS,
        }
    }
}

fn field_label(field: &str) -> &str {
    match field {
        "name" => "Nome",
        "corporate_name" => "Razão Social",
        "cnpj" => "CNPJ",
        "city" => "Cidade",
        "state" => "UF",
        "active" => "Status",
        "job_title" => "Cargo",
        "email" => "Email",
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Password,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub focus: LoginField,
    pub error: Option<String>,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            focus: LoginField::Email,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flash {
    pub text: String,
    pub error: bool,
}

// ============================================================================
// ADD FORMS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceOption {
    pub label: String,
    pub id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text(String),
    Masked(MaskedInput),
    Check(bool),
    /// First option is always the "none" placeholder
    Choice { options: Vec<ChoiceOption>, selected: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub kind: FieldKind,
}

impl FormField {
    fn text(key: &'static str, label: &'static str) -> Self {
        Self { key, label, required: false, kind: FieldKind::Text(String::new()) }
    }

    fn masked(key: &'static str, label: &'static str, mask: Mask) -> Self {
        Self { key, label, required: false, kind: FieldKind::Masked(MaskedInput::new(mask)) }
    }

    fn check(key: &'static str, label: &'static str, value: bool) -> Self {
        Self { key, label, required: false, kind: FieldKind::Check(value) }
    }

    fn choice(key: &'static str, label: &'static str, mut options: Vec<ChoiceOption>) -> Self {
        options.insert(0, ChoiceOption { label: "(nenhum)".to_string(), id: None });
        Self { key, label, required: false, kind: FieldKind::Choice { options, selected: 0 } }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn display(&self) -> String {
        match &self.kind {
            FieldKind::Text(s) => s.clone(),
            FieldKind::Masked(input) => input.display(),
            FieldKind::Check(true) => "[x]".to_string(),
            FieldKind::Check(false) => "[ ]".to_string(),
            FieldKind::Choice { options, selected } => {
                let label = options.get(*selected).map(|o| o.label.as_str()).unwrap_or("");
                format!("‹ {} ›", label)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    None,
    Submit,
    Cancel,
    /// A full CEP was just typed
    CepComplete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityForm {
    pub page: Page,
    pub fields: Vec<FormField>,
    pub focus: usize,
    pub error: Option<String>,
    ibge_code: Option<String>,
}

impl EntityForm {
    pub fn client() -> Self {
        let fields = vec![
            FormField::text("name", "Nome").required(),
            FormField::text("corporate_name", "Razão Social"),
            FormField::masked("cnpj", "CNPJ", Mask::Cnpj).required(),
            FormField::text("state_registration", "Inscrição Estadual"),
            FormField::text("site", "Site"),
            FormField::masked("cep", "CEP", Mask::Cep),
            FormField::text("address", "Endereço"),
            FormField::text("number", "Número"),
            FormField::text("complement", "Complemento"),
            FormField::text("district", "Bairro"),
            FormField::text("city", "Cidade"),
            FormField::text("state", "UF"),
            FormField::text("notes", "Observações"),
            FormField::check("active", "Ativo", true),
        ];
        Self { page: Page::Clients, fields, focus: 0, error: None, ibge_code: None }
    }

    pub fn contact(clients: &[Client]) -> Self {
        let titles = JOB_TITLES
            .iter()
            .map(|t| ChoiceOption { label: t.to_string(), id: None })
            .collect();
        let client_options = clients
            .iter()
            .map(|c| ChoiceOption { label: c.name.clone(), id: Some(c.id) })
            .collect();

        let fields = vec![
            FormField::text("name", "Nome").required(),
            FormField::text("email", "Email").required(),
            FormField::choice("job_title", "Cargo", titles),
            FormField::masked("phone", "Telefone", Mask::Phone),
            FormField::check("whatsapp", "WhatsApp", false),
            FormField::choice("client", "Cliente", client_options),
            FormField::text("notes", "Observações"),
            FormField::check("active", "Ativo", true),
        ];
        Self { page: Page::Contacts, fields, focus: 0, error: None, ibge_code: None }
    }

    pub fn title(&self) -> &str {
        match self.page {
            Page::Clients => " Novo Cliente ",
            Page::Contacts => " Novo Contato ",
        }
    }

    fn field(&self, key: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.key == key)
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut FormField> {
        self.fields.iter_mut().find(|f| f.key == key)
    }

    /// Text as typed; masked fields give their digits
    pub fn text(&self, key: &str) -> String {
        match self.field(key).map(|f| &f.kind) {
            Some(FieldKind::Text(s)) => s.clone(),
            Some(FieldKind::Masked(input)) => input.digits().to_string(),
            _ => String::new(),
        }
    }

    pub fn checked(&self, key: &str) -> bool {
        matches!(self.field(key).map(|f| &f.kind), Some(FieldKind::Check(true)))
    }

    /// `None` while the placeholder is selected
    pub fn chosen(&self, key: &str) -> Option<&ChoiceOption> {
        match self.field(key).map(|f| &f.kind) {
            Some(FieldKind::Choice { options, selected }) if *selected > 0 => options.get(*selected),
            _ => None,
        }
    }

    pub fn set_text(&mut self, key: &str, value: &str) {
        if let Some(field) = self.field_mut(key) {
            match &mut field.kind {
                FieldKind::Text(s) => *s = value.to_string(),
                FieldKind::Masked(input) => *input = MaskedInput::with_value(input.mask(), value),
                _ => {}
            }
        }
    }

    /// Fill address fields from a CEP lookup; blank answers keep what was typed
    pub fn fill_address(&mut self, found: &Address) {
        let mut draft = self.to_new_client();
        draft.apply_address(found);

        let filled = [
            ("address", draft.address),
            ("complement", draft.complement),
            ("district", draft.district),
            ("city", draft.city),
            ("state", draft.state),
        ];
        for (key, value) in filled {
            if let Some(value) = value {
                self.set_text(key, &value);
            }
        }
        self.ibge_code = draft.ibge_code;
    }

    pub fn to_new_client(&self) -> NewClient {
        NewClient {
            name: self.text("name"),
            corporate_name: Some(self.text("corporate_name")),
            cnpj: self.text("cnpj"),
            state_registration: Some(self.text("state_registration")),
            site: Some(self.text("site")),
            notes: Some(self.text("notes")),
            active: self.checked("active"),
            cep: Some(self.text("cep")),
            state: Some(self.text("state")),
            city: Some(self.text("city")),
            district: Some(self.text("district")),
            address: Some(self.text("address")),
            number: Some(self.text("number")),
            complement: Some(self.text("complement")),
            ibge_code: self.ibge_code.clone(),
            ..NewClient::default()
        }
    }

    pub fn to_new_contact(&self) -> NewContact {
        NewContact {
            name: self.text("name"),
            email: self.text("email"),
            job_title: self.chosen("job_title").map(|o| o.label.clone()),
            phone: Some(self.text("phone")),
            active: self.checked("active"),
            whatsapp: self.checked("whatsapp"),
            notes: Some(self.text("notes")),
            client_id: self.chosen("client").and_then(|o| o.id),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> FormAction {
        let count = self.fields.len();
        match key.code {
            KeyCode::Esc => return FormAction::Cancel,
            KeyCode::Enter => return FormAction::Submit,
            KeyCode::Tab | KeyCode::Down => self.focus = (self.focus + 1) % count,
            KeyCode::BackTab | KeyCode::Up => self.focus = (self.focus + count - 1) % count,
            code => {
                let Some(field) = self.fields.get_mut(self.focus) else {
                    return FormAction::None;
                };
                match (&mut field.kind, code) {
                    (FieldKind::Text(s), KeyCode::Char(c)) => s.push(c),
                    (FieldKind::Text(s), KeyCode::Backspace) => {
                        s.pop();
                    }
                    (FieldKind::Masked(input), KeyCode::Char(c)) => {
                        if input.push(c) && input.mask() == Mask::Cep && input.is_full() {
                            return FormAction::CepComplete;
                        }
                    }
                    (FieldKind::Masked(input), KeyCode::Backspace) => {
                        input.pop();
                    }
                    (FieldKind::Check(value), KeyCode::Char(' ')) => *value = !*value,
                    (FieldKind::Choice { options, selected }, KeyCode::Right) => {
                        *selected = (*selected + 1) % options.len();
                    }
                    (FieldKind::Choice { options, selected }, KeyCode::Left) => {
                        *selected = (*selected + options.len() - 1) % options.len();
                    }
                    _ => {}
                }
            }
        }
        FormAction::None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Browse,
    Search,
    Form(EntityForm),
    ConfirmDelete { id: i64, name: String },
}

// ============================================================================
// APP
// ============================================================================

pub struct App {
    backend: Box<dyn Backend>,
    lookup: Option<Box<dyn AddressLookup>>,
    pub screen: Screen,
    pub login: LoginForm,
    pub user: Option<User>,
    pub page: Page,
    pub sidebar_open: bool,
    pub clients: Vec<Client>,
    pub contacts: Vec<Contact>,
    pub client_search: SearchState,
    pub contact_search: SearchState,
    pub visible_clients: Vec<Client>,
    pub visible_contacts: Vec<Contact>,
    pub state: TableState,
    pub mode: Mode,
    pub show_detail: bool,
    pub detail_contacts: Vec<Contact>,
    detail_client: Option<i64>,
    pub flash: Option<Flash>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        backend: Box<dyn Backend>,
        lookup: Option<Box<dyn AddressLookup>>,
        show_inactive: bool,
    ) -> Self {
        Self {
            backend,
            lookup,
            screen: Screen::Login,
            login: LoginForm::default(),
            user: None,
            page: Page::Clients,
            sidebar_open: true,
            clients: Vec::new(),
            contacts: Vec::new(),
            client_search: SearchState::new(CLIENT_SEARCH_FIELDS, show_inactive)
                .with_sort(SortSpec::asc("name")),
            contact_search: SearchState::new(CONTACT_SEARCH_FIELDS, show_inactive)
                .with_sort(SortSpec::asc("name")),
            visible_clients: Vec::new(),
            visible_contacts: Vec::new(),
            state: TableState::default(),
            mode: Mode::Browse,
            show_detail: false,
            detail_contacts: Vec::new(),
            detail_client: None,
            flash: None,
            should_quit: false,
        }
    }

    /// Skip the login screen when the backend already holds a valid session
    pub fn resume_session(&mut self) -> bool {
        match self.backend.current_user() {
            Ok(user) => {
                self.enter_dashboard(user);
                true
            }
            Err(e) => {
                debug!(error = %e, "no session to resume");
                false
            }
        }
    }

    fn enter_dashboard(&mut self, user: User) {
        info!(user = %user.email, "signed in");
        self.user = Some(user);
        self.screen = Screen::Dashboard;
        self.login = LoginForm::default();
        self.reload();
    }

    pub fn reload(&mut self) {
        let loaded = self
            .backend
            .list_clients()
            .and_then(|clients| Ok((clients, self.backend.list_contacts()?)));

        match loaded {
            Ok((clients, contacts)) => {
                debug!(clients = clients.len(), contacts = contacts.len(), "lists loaded");
                self.clients = clients;
                self.contacts = contacts;
                self.detail_client = None;
                self.refresh();
            }
            Err(e) => self.fail(e),
        }
    }

    /// Re-apply search and sort to the loaded lists
    fn refresh(&mut self) {
        self.visible_clients = self.client_search.apply(&self.clients);
        self.visible_contacts = self.contact_search.apply(&self.contacts);

        let len = self.visible_len();
        match self.state.selected() {
            _ if len == 0 => self.state.select(None),
            Some(i) if i >= len => self.state.select(Some(len - 1)),
            None => self.state.select(Some(0)),
            _ => {}
        }
        self.sync_detail();
    }

    fn fail(&mut self, err: CrmError) {
        if matches!(err, CrmError::Unauthorized) {
            self.backend.logout();
            self.user = None;
            self.screen = Screen::Login;
            self.mode = Mode::Browse;
            self.login.error = Some("Sessão expirada, faça login novamente".to_string());
            return;
        }
        self.flash = Some(Flash { text: err.user_message(), error: true });
    }

    fn success(&mut self, text: &str) {
        self.flash = Some(Flash { text: text.to_string(), error: false });
    }

    pub fn search(&self) -> &SearchState {
        match self.page {
            Page::Clients => &self.client_search,
            Page::Contacts => &self.contact_search,
        }
    }

    fn search_mut(&mut self) -> &mut SearchState {
        match self.page {
            Page::Clients => &mut self.client_search,
            Page::Contacts => &mut self.contact_search,
        }
    }

    pub fn visible_len(&self) -> usize {
        match self.page {
            Page::Clients => self.visible_clients.len(),
            Page::Contacts => self.visible_contacts.len(),
        }
    }

    pub fn total_len(&self) -> usize {
        match self.page {
            Page::Clients => self.clients.len(),
            Page::Contacts => self.contacts.len(),
        }
    }

    pub fn selected_client(&self) -> Option<&Client> {
        self.state.selected().and_then(|i| self.visible_clients.get(i))
    }

    pub fn selected_contact(&self) -> Option<&Contact> {
        self.state.selected().and_then(|i| self.visible_contacts.get(i))
    }

    pub fn next(&mut self) {
        let len = self.visible_len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
        self.sync_detail();
    }

    pub fn previous(&mut self) {
        let len = self.visible_len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
        self.sync_detail();
    }

    fn select_first(&mut self) {
        if self.visible_len() > 0 {
            self.state.select(Some(0));
            self.sync_detail();
        }
    }

    fn select_last(&mut self) {
        let len = self.visible_len();
        if len > 0 {
            self.state.select(Some(len - 1));
            self.sync_detail();
        }
    }

    fn switch_page(&mut self) {
        self.page = self.page.next();
        self.show_detail = false;
        self.state.select(None);
        self.refresh();
    }

    /// `s`: move to the next sortable column, ascending
    fn cycle_sort(&mut self) {
        let fields = self.page.sort_fields();
        let search = self.search_mut();
        let next = match &search.sort {
            Some(spec) => fields
                .iter()
                .position(|f| *f == spec.field)
                .map(|i| fields[(i + 1) % fields.len()])
                .unwrap_or(fields[0]),
            None => fields[0],
        };
        search.sort = Some(SortSpec::asc(next));
        self.refresh();
    }

    /// `S`: flip direction of the current column
    fn flip_sort(&mut self) {
        let fields = self.page.sort_fields();
        let search = self.search_mut();
        let field = search
            .sort
            .as_ref()
            .map(|s| s.field.clone())
            .unwrap_or_else(|| fields[0].to_string());
        search.toggle_sort(&field);
        self.refresh();
    }

    fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
        self.sync_detail();
    }

    /// Keep the detail panel's contact list on the selected client
    fn sync_detail(&mut self) {
        let wanted = if self.show_detail && self.page == Page::Clients {
            self.selected_client().map(|c| c.id)
        } else {
            None
        };
        if wanted == self.detail_client {
            return;
        }

        self.detail_client = wanted;
        self.detail_contacts.clear();
        let Some(id) = wanted else {
            return;
        };
        match self.backend.contacts_by_client(id) {
            Ok(contacts) => self.detail_contacts = contacts,
            Err(e) => {
                self.detail_client = None;
                self.fail(e);
            }
        }
    }

    fn open_form(&mut self) {
        let form = match self.page {
            Page::Clients => EntityForm::client(),
            Page::Contacts => EntityForm::contact(&self.clients),
        };
        self.mode = Mode::Form(form);
    }

    fn ask_delete(&mut self) {
        let target = match self.page {
            Page::Clients => self.selected_client().map(|c| (c.id, c.name.clone())),
            Page::Contacts => self.selected_contact().map(|c| (c.id, c.name.clone())),
        };
        if let Some((id, name)) = target {
            self.mode = Mode::ConfirmDelete { id, name };
        }
    }

    fn logout(&mut self) {
        self.backend.logout();
        self.user = None;
        self.screen = Screen::Login;
        self.clients.clear();
        self.contacts.clear();
        self.refresh();
    }

    // ------------------------------------------------------------------------
    // Key handling
    // ------------------------------------------------------------------------

    pub fn handle_key(&mut self, key: KeyEvent) {
        match self.screen {
            Screen::Login => self.handle_login_key(key),
            Screen::Dashboard => {
                self.flash = None;
                match std::mem::replace(&mut self.mode, Mode::Browse) {
                    Mode::Browse => self.handle_browse_key(key),
                    Mode::Search => self.handle_search_key(key),
                    Mode::Form(form) => self.handle_form_key(form, key),
                    Mode::ConfirmDelete { id, name } => self.handle_confirm_key(id, name, key),
                }
            }
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        let login = &mut self.login;
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                login.focus = match login.focus {
                    LoginField::Email => LoginField::Password,
                    LoginField::Password => LoginField::Email,
                };
            }
            KeyCode::Enter => self.submit_login(),
            KeyCode::Backspace => {
                match login.focus {
                    LoginField::Email => login.email.pop(),
                    LoginField::Password => login.password.pop(),
                };
            }
            KeyCode::Char(c) => match login.focus {
                LoginField::Email => login.email.push(c),
                LoginField::Password => login.password.push(c),
            },
            _ => {}
        }
    }

    fn submit_login(&mut self) {
        let email = self.login.email.trim().to_string();
        let password = self.login.password.clone();

        if email.is_empty() || password.is_empty() {
            self.login.error = Some("Preencha todos os campos".to_string());
            return;
        }

        match self.backend.login(&email, &password) {
            Ok(session) => self.enter_dashboard(session.user),
            Err(CrmError::Unauthorized) => {
                self.login.error = Some("Email ou senha inválidos".to_string());
            }
            Err(e) => self.login.error = Some(e.user_message()),
        }
    }

    fn handle_browse_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc => {
                self.show_detail = false;
                self.sync_detail();
            }
            KeyCode::Tab | KeyCode::BackTab => self.switch_page(),
            KeyCode::Char('b') => self.sidebar_open = !self.sidebar_open,
            KeyCode::Char('/') => self.mode = Mode::Search,
            KeyCode::Char('i') => {
                self.search_mut().toggle_inactive();
                self.refresh();
            }
            KeyCode::Char('s') => self.cycle_sort(),
            KeyCode::Char('S') => self.flip_sort(),
            KeyCode::Enter => self.toggle_detail(),
            KeyCode::Char('n') => self.open_form(),
            KeyCode::Char('d') => self.ask_delete(),
            KeyCode::Char('r') => self.reload(),
            KeyCode::Char('L') => self.logout(),
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::Home => self.select_first(),
            KeyCode::End => self.select_last(),
            _ => {}
        }
    }

    /// Typing filters live; Enter keeps the term, Esc clears it
    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => return,
            KeyCode::Esc => {
                self.search_mut().term.clear();
                self.refresh();
                return;
            }
            KeyCode::Backspace => {
                self.search_mut().term.pop();
            }
            KeyCode::Char(c) => self.search_mut().term.push(c),
            _ => {}
        }
        self.mode = Mode::Search;
        self.refresh();
    }

    fn handle_form_key(&mut self, mut form: EntityForm, key: KeyEvent) {
        match form.handle_key(key) {
            FormAction::Cancel => {}
            FormAction::Submit => self.submit_form(form),
            FormAction::CepComplete => {
                self.lookup_cep(&mut form);
                self.mode = Mode::Form(form);
            }
            FormAction::None => self.mode = Mode::Form(form),
        }
    }

    fn lookup_cep(&self, form: &mut EntityForm) {
        let Some(lookup) = self.lookup.as_ref() else {
            return;
        };
        match lookup.lookup(&form.text("cep")) {
            Ok(address) => {
                form.fill_address(&address);
                form.error = None;
            }
            Err(e) => form.error = Some(e.user_message()),
        }
    }

    fn submit_form(&mut self, mut form: EntityForm) {
        let result = match form.page {
            Page::Clients => form
                .to_new_client()
                .validated()
                .and_then(|c| self.backend.create_client(&c))
                .map(|c| info!(id = c.id, "client created")),
            Page::Contacts => form
                .to_new_contact()
                .validated()
                .and_then(|c| self.backend.create_contact(&c))
                .map(|c| info!(id = c.id, "contact created")),
        };

        match result {
            Ok(()) => {
                self.success(match form.page {
                    Page::Clients => "Cliente cadastrado com sucesso!",
                    Page::Contacts => "Contato cadastrado com sucesso!",
                });
                self.reload();
            }
            Err(CrmError::Unauthorized) => self.fail(CrmError::Unauthorized),
            Err(e) => {
                form.error = Some(e.user_message());
                self.mode = Mode::Form(form);
            }
        }
    }

    fn handle_confirm_key(&mut self, id: i64, name: String, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('s') => {
                let result = match self.page {
                    Page::Clients => self.backend.delete_client(id),
                    Page::Contacts => self.backend.delete_contact(id),
                };
                match result {
                    Ok(()) => {
                        self.show_detail = false;
                        self.success(match self.page {
                            Page::Clients => "Cliente excluído com sucesso!",
                            Page::Contacts => "Contato excluído com sucesso!",
                        });
                        self.reload();
                    }
                    Err(e) => self.fail(e),
                }
            }
            KeyCode::Char('n') | KeyCode::Esc => {}
            _ => self.mode = Mode::ConfirmDelete { id, name },
        }
    }
}

// ============================================================================
// TERMINAL LOOP
// ============================================================================

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                app.handle_key(key);
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

// ============================================================================
// DRAWING
// ============================================================================

const LABEL: Style = Style::new().fg(Color::Cyan).add_modifier(Modifier::BOLD);
const KEY: Style = Style::new().fg(Color::Yellow);

fn ui(f: &mut Frame, app: &mut App) {
    match app.screen {
        Screen::Login => render_login(f, app),
        Screen::Dashboard => render_dashboard(f, app),
    }
}

fn render_login(f: &mut Frame, app: &App) {
    let area = centered_rect(50, 40, f.size());
    let login = &app.login;

    let field_style = |focused: bool| {
        if focused {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default()
        }
    };

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "  CRM Admin",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Email: ", LABEL),
            Span::styled(login.email.clone(), field_style(login.focus == LoginField::Email)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Senha: ", LABEL),
            Span::styled(
                "*".repeat(login.password.chars().count()),
                field_style(login.focus == LoginField::Password),
            ),
        ]),
        Line::from(""),
    ];

    if let Some(err) = &login.error {
        lines.push(Line::from(Span::styled(format!("  {}", err), Style::default().fg(Color::Red))));
        lines.push(Line::from(""));
    }

    lines.push(Line::from(vec![
        Span::styled("  Tab", KEY),
        Span::raw(" Campo | "),
        Span::styled("Enter", KEY),
        Span::raw(" Entrar | "),
        Span::styled("Esc", Style::default().fg(Color::Red)),
        Span::raw(" Sair"),
    ]));

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Entrar "),
    );

    f.render_widget(Clear, area);
    f.render_widget(panel, area);
}

fn render_dashboard(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Top bar
            Constraint::Min(0),    // Sidebar + content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_top_bar(f, chunks[0], app);

    let content = if app.sidebar_open {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(22), Constraint::Min(0)])
            .split(chunks[1]);
        render_sidebar(f, body[0], app);
        body[1]
    } else {
        chunks[1]
    };

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(content);

    render_search_bar(f, sections[0], app);

    if app.show_detail {
        let split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(sections[1]);
        render_table(f, split[0], app);
        render_detail_panel(f, split[1], app);
    } else {
        render_table(f, sections[1], app);
    }

    render_status_bar(f, chunks[2], app);

    match &app.mode {
        Mode::Form(form) => render_form(f, form),
        Mode::ConfirmDelete { name, .. } => render_confirm(f, app.page, name),
        Mode::Browse | Mode::Search => {}
    }
}

fn render_top_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(" CRM Admin ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::raw(" │ "),
        Span::styled(app.page.title().to_string(), LABEL),
        Span::raw(" │ "),
        Span::raw(format!("{} de {}", app.visible_len(), app.total_len())),
    ];

    if let Some(user) = &app.user {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(user.name.clone(), Style::default().fg(Color::Green)));
        spans.push(Span::styled(
            format!(" ({})", user.role.as_str()),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let bar = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(bar, area);
}

fn render_sidebar(f: &mut Frame, area: Rect, app: &App) {
    let mut lines = vec![Line::from("")];
    for page in [Page::Clients, Page::Contacts] {
        let style = if page == app.page {
            Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        lines.push(Line::from(Span::styled(format!("  {:<16}", page.title()), style)));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![Span::styled("  L", KEY), Span::raw(" Sair da conta")]));
    lines.push(Line::from(vec![Span::styled("  b", KEY), Span::raw(" Recolher menu")]));

    let sidebar = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Menu "),
    );
    f.render_widget(sidebar, area);
}

fn render_search_bar(f: &mut Frame, area: Rect, app: &App) {
    let search = app.search();
    let searching = app.mode == Mode::Search;

    let mut spans = vec![
        Span::styled(" Buscar: ", LABEL),
        Span::styled(
            if searching { format!("{}▏", search.term) } else { search.term.clone() },
            if searching {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default()
            },
        ),
        Span::raw("  │ "),
        Span::styled(
            if search.show_inactive { "[x] Mostrar inativos" } else { "[ ] Mostrar inativos" },
            Style::default().fg(Color::Green),
        ),
    ];

    if let Some(sort) = &search.sort {
        spans.push(Span::raw("  │ Ordem: "));
        spans.push(Span::styled(
            format!("{} {}", field_label(&sort.field), sort.direction.arrow()),
            Style::default().fg(Color::Magenta),
        ));
    }

    let bar = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if searching { Color::Cyan } else { Color::White })),
    );
    f.render_widget(bar, area);
}

fn header_cell(label: &str, field: Option<&str>, sort: &Option<SortSpec>) -> Cell<'static> {
    let text = match (field, sort) {
        (Some(field), Some(spec)) if spec.field == field => {
            format!("{} {}", label, spec.direction.arrow())
        }
        _ => label.to_string(),
    };
    Cell::from(text).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
}

fn status_cell(active: bool, label: &'static str) -> Cell<'static> {
    Cell::from(label).style(Style::default().fg(if active { Color::Green } else { Color::Red }))
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let sort = app.search().sort.clone();

    let (header, rows, widths): (Vec<Cell>, Vec<Row>, Vec<Constraint>) = match app.page {
        Page::Clients => (
            vec![
                header_cell("Nome", Some("name"), &sort),
                header_cell("Razão Social", Some("corporate_name"), &sort),
                header_cell("CNPJ", None, &sort),
                header_cell("Cidade/UF", Some("city"), &sort),
                header_cell("Status", Some("active"), &sort),
            ],
            app.visible_clients
                .iter()
                .map(|c| {
                    Row::new(vec![
                        Cell::from(truncate(&c.name, 28)),
                        Cell::from(truncate(c.corporate_name.as_deref().unwrap_or("-"), 28)),
                        Cell::from(c.display_cnpj()),
                        Cell::from(truncate(&c.location(), 24)),
                        status_cell(c.active, c.status_label()),
                    ])
                })
                .collect(),
            vec![
                Constraint::Length(30),
                Constraint::Length(30),
                Constraint::Length(20),
                Constraint::Length(26),
                Constraint::Length(9),
            ],
        ),
        Page::Contacts => (
            vec![
                header_cell("Nome", Some("name"), &sort),
                header_cell("Cargo", Some("job_title"), &sort),
                header_cell("Email", Some("email"), &sort),
                header_cell("Telefone", None, &sort),
                header_cell("Clientes", None, &sort),
                header_cell("Status", Some("active"), &sort),
            ],
            app.visible_contacts
                .iter()
                .map(|c| {
                    Row::new(vec![
                        Cell::from(truncate(&c.name, 24)),
                        Cell::from(truncate(c.job_title.as_deref().unwrap_or("-"), 20)),
                        Cell::from(truncate(c.email.as_deref().unwrap_or("-"), 28)),
                        Cell::from(c.display_phone()),
                        Cell::from(truncate(&c.client_names(), 24)),
                        status_cell(c.active, c.status_label()),
                    ])
                })
                .collect(),
            vec![
                Constraint::Length(26),
                Constraint::Length(22),
                Constraint::Length(30),
                Constraint::Length(17),
                Constraint::Length(26),
                Constraint::Length(9),
            ],
        ),
    };

    let empty = rows.is_empty();
    let table = Table::new(rows, widths)
        .header(Row::new(header).style(Style::default().bg(Color::DarkGray)).height(1))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(format!(" {} ", app.page.title())),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);

    if empty {
        let msg = if app.search().is_searching() {
            "Nenhum resultado para a busca"
        } else {
            "Nenhum registro"
        };
        let inner = Rect { x: area.x + 2, y: area.y + 2, width: area.width.saturating_sub(4), height: 1 };
        f.render_widget(
            Paragraph::new(msg).style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC)),
            inner,
        );
    }
}

fn detail_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![Span::styled(format!("  {}: ", label), LABEL), Span::raw(value)])
}

fn or_dash(value: &Option<String>) -> String {
    value.clone().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| "-".to_string())
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let section = |title: &str| {
        Line::from(Span::styled(
            format!("  {}", title),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        ))
    };

    let lines: Vec<Line> = match app.page {
        Page::Clients => match app.selected_client() {
            None => vec![Line::from("  Nenhum cliente selecionado")],
            Some(c) => {
                let mut lines = vec![
                    Line::from(""),
                    detail_line("Nome", c.name.clone()),
                    detail_line("Razão Social", or_dash(&c.corporate_name)),
                    detail_line("CNPJ", c.display_cnpj()),
                    detail_line("Inscrição Estadual", or_dash(&c.state_registration)),
                    detail_line("Site", or_dash(&c.site)),
                    detail_line("Status", c.status_label().to_string()),
                    Line::from(""),
                    section("ENDEREÇO"),
                    detail_line("CEP", c.display_cep()),
                    detail_line("Endereço", or_dash(&c.address)),
                    detail_line("Número", or_dash(&c.number)),
                    detail_line("Bairro", or_dash(&c.district)),
                    detail_line("Cidade/UF", c.location()),
                    Line::from(""),
                    section("CONTATOS"),
                ];
                if app.detail_contacts.is_empty() {
                    lines.push(Line::from("  Nenhum contato vinculado"));
                }
                for contact in &app.detail_contacts {
                    lines.push(Line::from(format!(
                        "  • {} ({}) {}",
                        contact.name,
                        contact.job_title.as_deref().unwrap_or("-"),
                        contact.display_phone()
                    )));
                }
                if let Some(notes) = c.notes.as_deref().filter(|n| !n.trim().is_empty()) {
                    lines.push(Line::from(""));
                    lines.push(section("OBSERVAÇÕES"));
                    lines.push(Line::from(format!("  {}", notes)));
                }
                lines
            }
        },
        Page::Contacts => match app.selected_contact() {
            None => vec![Line::from("  Nenhum contato selecionado")],
            Some(c) => {
                let mut lines = vec![
                    Line::from(""),
                    detail_line("Nome", c.name.clone()),
                    detail_line("Cargo", or_dash(&c.job_title)),
                    detail_line("Email", or_dash(&c.email)),
                    detail_line("Telefone", c.display_phone()),
                    detail_line("WhatsApp", if c.whatsapp { "Sim" } else { "Não" }.to_string()),
                    detail_line("Status", c.status_label().to_string()),
                    Line::from(""),
                    section("CLIENTES"),
                    Line::from(format!("  {}", if c.clients.is_empty() { "-".to_string() } else { c.client_names() })),
                ];
                if let Some(notes) = c.notes.as_deref().filter(|n| !n.trim().is_empty()) {
                    lines.push(Line::from(""));
                    lines.push(section("OBSERVAÇÕES"));
                    lines.push(Line::from(format!("  {}", notes)));
                }
                lines
            }
        },
    };

    let panel = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Detalhes "),
    );
    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let line = if let Some(flash) = &app.flash {
        Line::from(Span::styled(
            format!(" {} ", flash.text),
            Style::default().fg(if flash.error { Color::Red } else { Color::Green }).add_modifier(Modifier::BOLD),
        ))
    } else {
        let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
        let mut spans = vec![Span::styled(
            format!(" Linha: {}/{} ", selected, app.visible_len()),
            Style::default().fg(Color::Cyan),
        )];
        for (key, label) in [
            ("/", "Buscar"),
            ("i", "Inativos"),
            ("s/S", "Ordenar"),
            ("Enter", "Detalhes"),
            ("n", "Novo"),
            ("d", "Excluir"),
            ("r", "Recarregar"),
            ("Tab", "Página"),
        ] {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled(key, KEY));
            spans.push(Span::raw(format!(" {}", label)));
        }
        spans.push(Span::raw(" | "));
        spans.push(Span::styled("q", Style::default().fg(Color::Red)));
        spans.push(Span::raw(" Sair"));
        Line::from(spans)
    };

    let bar = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(bar, area);
}

fn render_form(f: &mut Frame, form: &EntityForm) {
    let area = centered_rect(60, 80, f.size());

    let mut lines = vec![Line::from("")];
    for (i, field) in form.fields.iter().enumerate() {
        let focused = i == form.focus;
        let label = if field.required { format!("{} *", field.label) } else { field.label.to_string() };
        let value_style = if focused {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<20}", label), LABEL),
            Span::styled(format!(" {} ", field.display()), value_style),
        ]));
    }

    lines.push(Line::from(""));
    if let Some(err) = &form.error {
        lines.push(Line::from(Span::styled(format!("  {}", err), Style::default().fg(Color::Red))));
        lines.push(Line::from(""));
    }
    lines.push(Line::from(vec![
        Span::styled("  Tab", KEY),
        Span::raw(" Campo | "),
        Span::styled("Espaço", KEY),
        Span::raw(" Marcar | "),
        Span::styled("←/→", KEY),
        Span::raw(" Opção | "),
        Span::styled("Enter", KEY),
        Span::raw(" Salvar | "),
        Span::styled("Esc", Style::default().fg(Color::Red)),
        Span::raw(" Cancelar"),
    ]));

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(form.title().to_string()),
    );

    f.render_widget(Clear, area);
    f.render_widget(panel, area);
}

fn render_confirm(f: &mut Frame, page: Page, name: &str) {
    let area = centered_rect(40, 20, f.size());
    let what = match page {
        Page::Clients => "o cliente",
        Page::Contacts => "o contato",
    };

    let lines = vec![
        Line::from(""),
        Line::from(format!("  Excluir {} \"{}\"?", what, name)),
        Line::from(""),
        Line::from(vec![
            Span::styled("  y", Style::default().fg(Color::Red)),
            Span::raw(" Excluir | "),
            Span::styled("n", KEY),
            Span::raw(" Cancelar"),
        ]),
    ];

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title(" Confirmar exclusão "),
    );

    f.render_widget(Clear, area);
    f.render_widget(panel, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

/// Char-based, so accented names never split mid-codepoint
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
