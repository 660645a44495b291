//! Extraction of payment fields from the prover's standard output.
//!
//! The prover prints lines such as:
//!
//! ```text
//! Extracted Transaction ID: T2409151234
//! Paid to name: Alice
//! Extracted Amount: 10.00
//! ```
//!
//! Fields are located by their literal prefix. The first occurrence wins and
//! the prefix may appear mid-line, so `Extracted Transaction ID:` also
//! satisfies `Transaction ID:`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Marker that must be present for the quick verdict.
const VERIFIED_TRANSACTION_MARKER: &str = "Extracted Transaction ID:";
/// Marker that must be present for the quick verdict.
const VERIFIED_AMOUNT_MARKER: &str = "Extracted Amount:";

/// A field printed by the prover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `Transaction ID:`
    TransactionId,
    /// `Paid to name:`
    PaidToName,
    /// `Extracted Amount:`
    Amount,
}

impl Field {
    /// All fields, in extraction order.
    pub const ALL: [Self; 3] = [Self::TransactionId, Self::PaidToName, Self::Amount];

    /// Literal prefix the prover prints before the value.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::TransactionId => "Transaction ID:",
            Self::PaidToName => "Paid to name:",
            Self::Amount => "Extracted Amount:",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TransactionId => "transaction id",
            Self::PaidToName => "paid-to name",
            Self::Amount => "amount",
        };
        f.write_str(name)
    }
}

/// Extraction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The prover output has no line carrying this field's prefix.
    #[error("prover output is missing the {0} field ({prefix:?})", prefix = .0.prefix())]
    MissingField(Field),
}

/// Structured outcome of a completed verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Transaction identifier.
    pub transaction_id: String,
    /// Name of the payee.
    pub paid_to_name: String,
    /// Extracted amount, as printed.
    pub amount: String,
    /// True when all three values are non-empty.
    pub verified: bool,
}

impl VerificationResult {
    /// Build a result, computing `verified` from the field values.
    #[must_use]
    pub fn new(transaction_id: String, paid_to_name: String, amount: String) -> Self {
        let verified =
            !transaction_id.is_empty() && !paid_to_name.is_empty() && !amount.is_empty();
        Self {
            transaction_id,
            paid_to_name,
            amount,
            verified,
        }
    }
}

/// Quick verdict based on the prover's success markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Both success markers were printed.
    Verified,
    /// At least one success marker is absent.
    NotVerified,
}

impl Verdict {
    /// Message returned to the uploader.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Verified => "DKIM Verification Result: Email is verified.",
            Self::NotVerified => "DKIM Verification Result: Email is not verified.",
        }
    }
}

/// Verdict and structured result computed from the same output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Marker-based verdict.
    pub verdict: Verdict,
    /// Extracted fields.
    pub result: VerificationResult,
}

/// Trimmed value following `field`'s prefix, up to the end of that line.
#[must_use]
pub fn find_field(output: &str, field: Field) -> Option<&str> {
    let prefix = field.prefix();
    let start = output.find(prefix)? + prefix.len();
    let rest = &output[start..];
    let line = rest.find('\n').map_or(rest, |end| &rest[..end]);
    Some(line.trim())
}

/// Extract all three fields.
///
/// # Errors
///
/// Returns [`ExtractionError::MissingField`] for the first absent field.
pub fn extract_result(output: &str) -> Result<VerificationResult, ExtractionError> {
    let field = |field: Field| {
        find_field(output, field)
            .map(str::to_string)
            .ok_or(ExtractionError::MissingField(field))
    };

    Ok(VerificationResult::new(
        field(Field::TransactionId)?,
        field(Field::PaidToName)?,
        field(Field::Amount)?,
    ))
}

/// Marker-based verdict.
#[must_use]
pub fn quick_verdict(output: &str) -> Verdict {
    if output.contains(VERIFIED_TRANSACTION_MARKER) && output.contains(VERIFIED_AMOUNT_MARKER) {
        Verdict::Verified
    } else {
        Verdict::NotVerified
    }
}

/// Compute the verdict and the structured result together.
///
/// # Errors
///
/// Fails if any field is missing; no partial result is produced.
pub fn evaluate(output: &str) -> Result<Evaluation, ExtractionError> {
    let result = extract_result(output)?;
    Ok(Evaluation {
        verdict: quick_verdict(output),
        result,
    })
}
