use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ledger::{LedgerGuard, LedgerStore};

/// Leading letters of every invoice number.
pub const INVOICE_PREFIX: &str = "GH";

/// Minimum digits of the daily sequence; longer sequences are not truncated.
pub const SEQUENCE_WIDTH: usize = 2;

fn invoice_no_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^GH(\d{6})(\d{2,4})$").expect("invoice number pattern is valid")
    })
}

/// `GH` + `YYMMDD` for the given day.
pub fn day_prefix(date: NaiveDate) -> String {
    format!("{}{}", INVOICE_PREFIX, date.format("%y%m%d"))
}

/// Formats a prefix and sequence into an invoice number.
pub fn format_invoice_no(prefix: &str, sequence: u32) -> String {
    format!("{}{:0width$}", prefix, sequence, width = SEQUENCE_WIDTH)
}

/// Splits an invoice number into its date prefix and sequence.
///
/// Accepts 2 to 4 sequence digits so numbers issued with either width
/// are recognised.
pub fn parse_invoice_no(invoice_no: &str) -> Option<(String, u32)> {
    let captures = invoice_no_pattern().captures(invoice_no.trim())?;
    let prefix = format!("{}{}", INVOICE_PREFIX, captures.get(1)?.as_str());
    let sequence = captures.get(2)?.as_str().parse().ok()?;
    Some((prefix, sequence))
}

/// Next sequence for `prefix` given every known invoice number.
///
/// Returns 1 when none of the numbers belong to `prefix`.
pub fn next_sequence<'a, I>(numbers: I, prefix: &str) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    numbers
        .into_iter()
        .filter_map(parse_invoice_no)
        .filter(|(p, _)| p == prefix)
        .map(|(_, sequence)| sequence)
        .max()
        .map_or(1, |max| max + 1)
}

/// Result of an allocation, as returned by the next-number endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub invoice_number: String,
    pub today_prefix: String,
    pub next_sequence: u32,
}

/// Invoice numbers handed out but not yet committed to the ledger.
///
/// Entries expire after the configured TTL so abandoned forms do not
/// leave permanent gaps in the day's sequence.
#[derive(Debug, Clone)]
pub struct Reservations {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Reservations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Records `invoice_no` as handed out now.
    pub fn reserve(&self, invoice_no: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(invoice_no.to_string(), Instant::now());
    }

    /// Drops a reservation once its invoice is committed.
    pub fn release(&self, invoice_no: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(invoice_no);
    }

    /// Unexpired reservations; expired ones are pruned as a side effect.
    pub fn live(&self) -> Vec<String> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, reserved_at| reserved_at.elapsed() < ttl);
        entries.keys().cloned().collect()
    }
}

/// Allocates the next invoice number for `today`.
///
/// Must be called holding the ledger lock, which the guard argument
/// proves. The sequence is one past the highest of today's numbers found
/// in the ledger or among live reservations. An unreadable ledger falls
/// back to the reservations alone (sequence 1 on a quiet day); a
/// collision that causes is caught by the duplicate check on create.
///
/// # Arguments
///
/// * `guard` - Proof that the ledger lock is held
/// * `ledger` - Ledger to scan
/// * `reservations` - Numbers already handed out
/// * `today` - Server-local date deciding the prefix
pub async fn allocate_next(
    guard: &LedgerGuard,
    ledger: &LedgerStore,
    reservations: &Reservations,
    today: NaiveDate,
) -> Allocation {
    let prefix = day_prefix(today);

    let mut known: Vec<String> = match ledger.invoice_numbers(guard).await {
        Ok(numbers) => numbers,
        Err(e) => {
            warn!(
                "Ledger unreadable during allocation, starting {} from 1: {}",
                prefix, e
            );
            Vec::new()
        }
    };
    known.extend(reservations.live());

    let sequence = next_sequence(known.iter().map(String::as_str), &prefix);
    let invoice_number = format_invoice_no(&prefix, sequence);
    reservations.reserve(&invoice_number);

    info!("Allocated invoice number {}", invoice_number);

    Allocation {
        invoice_number,
        today_prefix: prefix,
        next_sequence: sequence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    #[test]
    fn test_day_prefix() {
        assert_eq!(day_prefix(jan_first()), "GH250101");
    }

    #[test]
    fn test_format_pads_to_two_digits() {
        assert_eq!(format_invoice_no("GH250101", 1), "GH25010101");
        assert_eq!(format_invoice_no("GH250101", 100), "GH250101100");
    }

    #[test]
    fn test_parse_accepts_two_and_four_digit_sequences() {
        assert_eq!(
            parse_invoice_no("GH25010107"),
            Some(("GH250101".to_string(), 7))
        );
        assert_eq!(
            parse_invoice_no("GH2501010012"),
            Some(("GH250101".to_string(), 12))
        );
        assert_eq!(parse_invoice_no("GH-3"), None);
        assert_eq!(parse_invoice_no("GH2501011"), None);
    }

    #[test]
    fn test_next_sequence_empty_starts_at_one() {
        assert_eq!(next_sequence(Vec::<&str>::new(), "GH250101"), 1);
    }

    #[test]
    fn test_next_sequence_ignores_other_days() {
        let numbers = ["GH24123105", "GH25010102", "GH25010109", "junk"];
        assert_eq!(next_sequence(numbers, "GH250101"), 10);
        assert_eq!(next_sequence(numbers, "GH250102"), 1);
    }

    #[test]
    fn test_reservations_expire() {
        let reservations = Reservations::new(Duration::from_millis(0));
        reservations.reserve("GH25010101");
        assert!(reservations.live().is_empty());

        let reservations = Reservations::new(Duration::from_secs(60));
        reservations.reserve("GH25010101");
        assert_eq!(reservations.live(), vec!["GH25010101".to_string()]);
        reservations.release("GH25010101");
        assert!(reservations.live().is_empty());
    }
}
