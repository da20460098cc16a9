//! # Output Formatting
//!
//! Errors reach the terminal through [`FormattedString`]: a colored header naming the failing
//! stage, followed by the error message and any causes it does not already mention.
//!
//! Regular command output (service names, method names, rendered definitions, JSON) is written
//! uncolored so it can be piped and compared byte for byte.
use colored::*;
use refscope_core::{
    error::InvalidMethodError, inspect::InspectError, session::DialError, target::TargetError,
};

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

/// The operation was interrupted by the user.
#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<&anyhow::Error> for FormattedString {
    fn from(err: &anyhow::Error) -> Self {
        let header = if err.is::<DialError>() {
            "Connection Error:"
        } else if err.is::<TargetError>() || err.is::<InvalidMethodError>() {
            "Usage Error:"
        } else if err.is::<InspectError>() {
            "Reflection Error:"
        } else if err.is::<Cancelled>() {
            "Cancelled:"
        } else {
            "Error:"
        };

        let mut text = format!("{} {}", header.red().bold(), message_chain(err));

        if let Some(dial) = err.downcast_ref::<DialError>()
            && dial.suggests_insecure()
        {
            text.push_str(&format!(
                "\n{} the server may not use TLS, retry with --insecure",
                "Hint:".yellow().bold()
            ));
        }

        FormattedString(text)
    }
}

/// Joins the error and its causes with `: `, skipping causes the outer messages already include.
fn message_chain(err: &anyhow::Error) -> String {
    let mut out = String::new();

    for cause in err.chain() {
        let message = cause.to_string();
        if out.is_empty() {
            out = message;
        } else if !out.contains(&message) {
            out.push_str(": ");
            out.push_str(&message);
        }
    }

    out
}
