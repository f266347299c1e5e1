//! The one-line transaction summary.

use std::path::Path;

use crate::config::Verbosity;
use crate::smtp::Transaction;

/// Build the log line for a transaction, or `None` when verbosity
/// suppresses it.
pub fn format_summary(
    transaction: &Transaction<'_>,
    path: Option<&Path>,
    verbosity: &Verbosity,
) -> Option<String> {
    if !verbosity.emits_line() {
        return None;
    }

    let mut line = format!(
        "remote: {}, MAIL From: <{}>, RCPT To: [{}]",
        transaction.remote,
        transaction.from,
        transaction.to.join(" ")
    );
    if let Some(path) = path {
        line.push_str(&format!(" mail data: \"{}\"", path.display()));
    }
    if verbosity.includes_body() {
        line.push('\n');
        line.push_str(&String::from_utf8_lossy(transaction.data));
        line.push_str(&verbosity.data_end);
    }
    Some(line)
}
