//! Placeholder rendering for email subjects and bodies.
//!
//! Literal `{key}` text replacement, not a templating language: recipient
//! fields plus `{current_date}` are substituted, anything else is left
//! verbatim.

use chrono::NaiveDate;
use mailflow_core::types::Recipient;

/// Render `template` for one recipient. `today` formats as `YYYY-MM-DD`.
pub fn render(template: &str, recipient: &Recipient, today: NaiveDate) -> String {
    template
        .replace("{name}", recipient.name.as_deref().unwrap_or(""))
        .replace("{email}", &recipient.email)
        .replace("{current_date}", &today.format("%Y-%m-%d").to_string())
}
