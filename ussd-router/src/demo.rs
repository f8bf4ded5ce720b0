//! A small banking menu used by the bundled binary and the integration tests.
//!
//! ```text
//! welcome
//! ├── 1 account
//! │   ├── 1 balance    ── # account
//! │   ├── 2 statement  ── # account
//! │   ├── 3 transfer   ── # account
//! │   └── # welcome
//! └── # exit
//! ```

use ussd_common::util::new_line_strings;
use ussd_common::Result;

use crate::menu::MenuOption;
use crate::request::UssdRequest;
use crate::response::TemplateValues;
use crate::session::Session;
use crate::template::TemplateRegistry;

pub const MAIN_TEMPLATE: &str = "main.tmpl";
pub const ACCOUNT_TEMPLATE: &str = "account.tmpl";
pub const BALANCE_TEMPLATE: &str = "balance.tmpl";
pub const STATEMENT_TEMPLATE: &str = "statement.tmpl";
pub const TRANSFER_CONFIRM_TEMPLATE: &str = "transfer/confirm.tmpl";

const TRANSFER_STEP: &str = "transferStep";
const TRANSFER_ACCOUNT: &str = "transferAccount";
const TRANSFER_AMOUNT: &str = "transferAmount";

/// Built-in template sources, by name.
pub fn template_sources() -> Vec<(&'static str, String)> {
    vec![
        (
            MAIN_TEMPLATE,
            new_line_strings(&["Welcome {{Phone}}", "1. My account", "#. Exit"]),
        ),
        (
            ACCOUNT_TEMPLATE,
            new_line_strings(&[
                "Account {{Phone}}",
                "1. Balance",
                "2. Mini statement",
                "3. Transfer",
                "#. Back",
            ]),
        ),
        (
            BALANCE_TEMPLATE,
            new_line_strings(&["Balance for {{Phone}}: MWK 12,500.00", "#. Back"]),
        ),
        (
            STATEMENT_TEMPLATE,
            new_line_strings(&[
                "Last transactions for {{Phone}}",
                "01/10 Airtime -500.00",
                "03/10 Deposit +10,000.00",
                "#. Back",
            ]),
        ),
        (
            TRANSFER_CONFIRM_TEMPLATE,
            new_line_strings(&[
                "Send MWK {{Amount}} to {{Account}}?",
                "1. Confirm",
                "#. Cancel",
            ]),
        ),
    ]
}

/// Registry preloaded with [`template_sources`].
pub fn templates() -> Result<TemplateRegistry> {
    let mut registry = TemplateRegistry::new();
    for (name, source) in template_sources() {
        registry.register(name, &source)?;
    }
    Ok(registry)
}

/// The banking menu tree.
pub fn menu() -> Result<Vec<MenuOption>> {
    let account = MenuOption::new("1", "account", show_account)?
        .child(MenuOption::new("1", "balance", account_balance)?.child(back_to_account()?))
        .child(MenuOption::new("2", "statement", mini_statement)?.child(back_to_account()?))
        .child(MenuOption::new("3", "transfer", make_transfer)?.child(back_to_account()?))
        .child(MenuOption::new("#", "welcome", welcome_screen)?);

    let root = MenuOption::new("", "welcome", welcome_screen)?
        .child(account)
        .child(MenuOption::new("#", "exit", end_session)?);

    Ok(vec![root])
}

fn back_to_account() -> Result<MenuOption> {
    MenuOption::new("#", "account", show_account)
}

fn phone_values(request: &UssdRequest<'_>) -> TemplateValues {
    let mut values = TemplateValues::new();
    values.insert("Phone".into(), request.msisdn().into());
    values
}

fn welcome_screen(request: &mut UssdRequest<'_>) -> bool {
    let values = phone_values(request);
    request.continue_with_template(MAIN_TEMPLATE, values);
    false
}

fn show_account(request: &mut UssdRequest<'_>) -> bool {
    let values = phone_values(request);
    request.continue_with_template(ACCOUNT_TEMPLATE, values);
    false
}

fn account_balance(request: &mut UssdRequest<'_>) -> bool {
    let values = phone_values(request);
    request.continue_with_template(BALANCE_TEMPLATE, values);
    false
}

fn mini_statement(request: &mut UssdRequest<'_>) -> bool {
    let values = phone_values(request);
    request.continue_with_template(STATEMENT_TEMPLATE, values);
    false
}

fn end_session(request: &mut UssdRequest<'_>) -> bool {
    let text = format!("Thank you {}. Please come again!", request.msisdn());
    request.end(text);
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferStep {
    ReadAccount,
    ReadAmount,
    Confirm,
}

impl TransferStep {
    fn load(session: &Session) -> Self {
        match session.get(TRANSFER_STEP).and_then(|v| v.as_i64()) {
            Some(1) => Self::ReadAmount,
            Some(2) => Self::Confirm,
            _ => Self::ReadAccount,
        }
    }

    fn store(self, session: &Session) {
        let code: i64 = match self {
            Self::ReadAccount => 0,
            Self::ReadAmount => 1,
            Self::Confirm => 2,
        };
        session.set(TRANSFER_STEP, code);
    }
}

fn confirm_values(session: &Session) -> Result<TemplateValues> {
    let mut values = TemplateValues::new();
    values.insert("Account".into(), session.get_required(TRANSFER_ACCOUNT)?);
    values.insert("Amount".into(), session.get_required(TRANSFER_AMOUNT)?);
    Ok(values)
}

fn prompt_confirmation(request: &mut UssdRequest<'_>) {
    match confirm_values(request.session()) {
        Ok(values) => request.prompt_with_template(TRANSFER_CONFIRM_TEMPLATE, values),
        Err(e) => {
            tracing::warn!(error = %e, "Transfer details missing");
            request.end("Transfer details were lost. Please start again");
        }
    }
}

fn clear_transfer(session: &Session) {
    for key in [TRANSFER_STEP, TRANSFER_ACCOUNT, TRANSFER_AMOUNT] {
        session.remove(key);
    }
}

/// Multi-step transfer. Keeps the account screen current for the whole
/// exchange and reads each answer as free-form input.
fn make_transfer(request: &mut UssdRequest<'_>) -> bool {
    let session = std::sync::Arc::clone(request.session());
    let input = request.input().to_string();

    match TransferStep::load(&session) {
        TransferStep::ReadAccount if input.is_empty() => {
            request.prompt("Enter recipient account number");
        }
        TransferStep::ReadAccount => {
            session.set(TRANSFER_ACCOUNT, input);
            TransferStep::ReadAmount.store(&session);
            request.prompt("Enter amount to transfer");
        }
        TransferStep::ReadAmount if input.is_empty() => {
            request.prompt("Enter amount to transfer");
        }
        TransferStep::ReadAmount => {
            session.set(TRANSFER_AMOUNT, input);
            TransferStep::Confirm.store(&session);
            prompt_confirmation(request);
        }
        TransferStep::Confirm => match input.as_str() {
            "" => prompt_confirmation(request),
            "1" => {
                let text = match confirm_values(&session) {
                    Ok(values) => format!(
                        "You transferred MWK {} to {}.",
                        values["Amount"], values["Account"]
                    ),
                    Err(_) => "Transfer details were lost. Please start again".to_string(),
                };
                clear_transfer(&session);
                request.end(text);
            }
            "#" => {
                clear_transfer(&session);
                request.end("Transfer cancelled. Thank you. Come again");
            }
            _ => {
                clear_transfer(&session);
                request.end("You entered a wrong option! Pay attention");
            }
        },
    }
    true
}
