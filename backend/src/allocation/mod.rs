//! Payment allocation.
//!
//! A payment with an explicit target is mapped one-to-one. A bulk payment is
//! spread over the student's enrollments for the term; when none exist it is
//! spread over the configured default targets instead (an *imputed*
//! allocation). Amounts are integer minor units, and every allocation sums
//! exactly to the original total: each line gets the floor of `total / N`
//! and the rounding remainder goes on the last line.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::identifier::fields;
use crate::models::StageTable;

/// Target used when a payment has no enrollment and no default targets exist.
pub const UNALLOCATED: &str = "UNALLOCATED";

// =============================================================================
// Money
// =============================================================================

/// Why an amount could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("amount is empty")]
    Empty,
    #[error("'{0}' is not an amount")]
    Invalid(String),
    #[error("'{0}' has more than two decimal places")]
    TooPrecise(String),
    #[error("'{0}' is out of range")]
    Overflow(String),
}

/// An amount in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Parse `1,234.56`, `$100`, `100.5` or `-20`.
    pub fn parse(text: &str) -> Result<Self, MoneyError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(MoneyError::Empty);
        }
        let invalid = || MoneyError::Invalid(text.to_string());

        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        let body = body.strip_prefix('$').unwrap_or(body).trim_start();
        let body: String = body.chars().filter(|c| *c != ',').collect();

        let (whole, fraction) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body.as_str(), ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > 2 {
            return Err(MoneyError::TooPrecise(text.to_string()));
        }

        let overflow = || MoneyError::Overflow(text.to_string());
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(overflow)?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// =============================================================================
// Allocation results
// =============================================================================

/// How the targets of an allocation were decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMethod {
    /// The payment named its target.
    Direct,
    /// Targets found among the student's enrollments.
    Calculated,
    /// No authoritative targets; fallback set used.
    Imputed,
}

impl AllocationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Calculated => "calculated",
            Self::Imputed => "imputed",
        }
    }
}

/// One target's share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub target: String,
    pub amount: Money,
    /// Share of the total, 0-100.
    pub percentage: f64,
}

/// Outcome of allocating one payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub total: Money,
    pub lines: Vec<AllocationLine>,
    pub method: AllocationMethod,
    pub log: String,
}

impl AllocationResult {
    /// Sum of all lines; always equals `total`.
    pub fn allocated(&self) -> Money {
        Money(self.lines.iter().map(|l| l.amount.0).sum())
    }

    pub fn is_imputed(&self) -> bool {
        self.method == AllocationMethod::Imputed
    }
}

fn percentage(amount: Money, total: Money, n: usize) -> f64 {
    if total.0 == 0 {
        100.0 / n as f64
    } else {
        amount.0 as f64 * 100.0 / total.0 as f64
    }
}

/// Split `total` equally over `targets`, remainder on the last line.
///
/// An empty target list allocates everything to [`UNALLOCATED`].
pub fn allocate_equal(total: Money, targets: &[String]) -> AllocationResult {
    if targets.is_empty() {
        let mut result = allocate_direct(total, UNALLOCATED);
        result.method = AllocationMethod::Imputed;
        result.log = format!("no targets; {} left unallocated", total);
        return result;
    }

    let n = targets.len() as i64;
    let share = total.0.div_euclid(n);
    let remainder = total.0 - share * n;

    let lines = targets
        .iter()
        .enumerate()
        .map(|(i, target)| {
            let amount = if i as i64 == n - 1 {
                Money(share + remainder)
            } else {
                Money(share)
            };
            AllocationLine {
                target: target.clone(),
                amount,
                percentage: percentage(amount, total, targets.len()),
            }
        })
        .collect();

    AllocationResult {
        total,
        lines,
        method: AllocationMethod::Calculated,
        log: format!(
            "{} split equally across {} targets ({} each, remainder {} on last)",
            total,
            n,
            Money(share),
            Money(remainder)
        ),
    }
}

/// One-to-one allocation to an explicit target.
pub fn allocate_direct(total: Money, target: &str) -> AllocationResult {
    AllocationResult {
        total,
        lines: vec![AllocationLine {
            target: target.to_string(),
            amount: total,
            percentage: 100.0,
        }],
        method: AllocationMethod::Direct,
        log: format!("{} allocated directly to {}", total, target),
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Source of existing enrollments for a (student, term).
pub trait EnrollmentLookup {
    /// Distinct targets, in a stable order.
    fn targets(&self, student_id: &str, term_code: &str) -> Vec<String>;
}

/// Enrollment targets indexed by (student, term).
#[derive(Debug, Clone, Default)]
pub struct EnrollmentIndex {
    entries: BTreeMap<(String, String), BTreeSet<String>>,
}

impl EnrollmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, student_id: &str, term_code: &str, target: &str) {
        self.entries
            .entry((student_id.to_string(), term_code.to_string()))
            .or_default()
            .insert(target.to_string());
    }

    /// Build from a validated enrollment table. The target of each row is its
    /// standardized course code.
    pub fn from_table(table: &StageTable) -> Self {
        let mut index = Self::new();
        for record in &table.records {
            let student = StageTable::text(record, "student_id");
            let term = StageTable::text(record, "term_code");
            let target = StageTable::text(record, fields::STANDARDIZED_CODE)
                .filter(|t| !t.is_empty())
                .or_else(|| StageTable::text(record, "class_code"));
            if let (Some(student), Some(term), Some(target)) = (student, term, target) {
                index.insert(&student, &term, &target);
            }
        }
        index
    }

    /// Number of (student, term) pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EnrollmentLookup for EnrollmentIndex {
    fn targets(&self, student_id: &str, term_code: &str) -> Vec<String> {
        self.entries
            .get(&(student_id.to_string(), term_code.to_string()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// The fields of a payment the engine needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRef<'a> {
    pub receipt_no: &'a str,
    pub student_id: &'a str,
    pub term_code: &'a str,
    pub amount: Money,
    /// Explicit target, if the payment names one
    pub target: Option<&'a str>,
}

/// Allocation policy for one run.
#[derive(Debug, Clone, Default)]
pub struct AllocationEngine {
    default_targets: Vec<String>,
}

impl AllocationEngine {
    pub fn new(default_targets: Vec<String>) -> Self {
        Self { default_targets }
    }

    pub fn allocate(&self, payment: &PaymentRef<'_>, lookup: &dyn EnrollmentLookup) -> AllocationResult {
        if let Some(target) = payment.target.filter(|t| !t.trim().is_empty()) {
            return allocate_direct(payment.amount, target);
        }

        let found = lookup.targets(payment.student_id, payment.term_code);
        if !found.is_empty() {
            let mut result = allocate_equal(payment.amount, &found);
            result.log = format!(
                "{}: {} enrollment(s) for {} in {}; {}",
                payment.receipt_no,
                found.len(),
                payment.student_id,
                payment.term_code,
                result.log
            );
            return result;
        }

        let mut result = allocate_equal(payment.amount, &self.default_targets);
        result.method = AllocationMethod::Imputed;
        result.log = if self.default_targets.is_empty() {
            format!(
                "{}: no enrollments for {} in {} and no default targets; {} left unallocated",
                payment.receipt_no, payment.student_id, payment.term_code, payment.amount
            )
        } else {
            format!(
                "{}: no enrollments for {} in {}; imputed default targets; {}",
                payment.receipt_no, payment.student_id, payment.term_code, result.log
            )
        };
        result
    }
}
