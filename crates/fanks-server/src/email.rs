use std::str::FromStr;

use lettre::message::Mailbox;

/// Parse an RFC 5322 address and return the bare, lowercased address.
///
/// Accepts both `ada@example.com` and `Ada Lovelace <ada@example.com>`.
/// Returns `None` when the input is not a single valid mailbox.
pub fn normalize_email(input: &str) -> Option<String> {
    let mailbox = Mailbox::from_str(input.trim()).ok()?;
    Some(mailbox.email.to_string().to_lowercase())
}
