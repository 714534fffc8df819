use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::tax::round2;

const ONES: [&str; 20] = [
    "", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten", "Eleven",
    "Twelve", "Thirteen", "Fourteen", "Fifteen", "Sixteen", "Seventeen", "Eighteen", "Nineteen",
];

const TENS: [&str; 10] = [
    "", "", "Twenty", "Thirty", "Forty", "Fifty", "Sixty", "Seventy", "Eighty", "Ninety",
];

/// Spells out an amount in Indian numbering (Crore, Lakh, Thousand).
///
/// `210.00` becomes `"Two Hundred Ten Rupees Only"`, `1250.50` becomes
/// `"One Thousand Two Hundred Fifty Rupees and Fifty Paise Only"`.
pub fn amount_in_words(amount: Decimal) -> String {
    let amount = round2(amount.abs());
    let rupees = amount.trunc();
    let paise = ((amount - rupees) * Decimal::ONE_HUNDRED).to_u64().unwrap_or(0);
    let rupees = rupees.to_u64().unwrap_or(0);

    match (rupees, paise) {
        (0, 0) => "Zero Rupees Only".to_string(),
        (0, p) => format!("{} Paise Only", below_hundred(p)),
        (r, 0) => format!("{} Rupees Only", integer_in_words(r)),
        (r, p) => format!(
            "{} Rupees and {} Paise Only",
            integer_in_words(r),
            below_hundred(p)
        ),
    }
}

fn integer_in_words(n: u64) -> String {
    if n == 0 {
        return "Zero".to_string();
    }

    let crore = n / 10_000_000;
    let lakh = (n % 10_000_000) / 100_000;
    let thousand = (n % 100_000) / 1000;
    let rest = n % 1000;

    let mut parts = Vec::new();
    if crore > 0 {
        parts.push(format!("{} Crore", integer_in_words(crore)));
    }
    if lakh > 0 {
        parts.push(format!("{} Lakh", below_hundred(lakh)));
    }
    if thousand > 0 {
        parts.push(format!("{} Thousand", below_hundred(thousand)));
    }
    if rest > 0 {
        parts.push(below_thousand(rest));
    }
    parts.join(" ")
}

fn below_thousand(n: u64) -> String {
    let hundreds = n / 100;
    let rest = n % 100;
    match (hundreds, rest) {
        (0, r) => below_hundred(r),
        (h, 0) => format!("{} Hundred", ONES[h as usize]),
        (h, r) => format!("{} Hundred {}", ONES[h as usize], below_hundred(r)),
    }
}

fn below_hundred(n: u64) -> String {
    if n < 20 {
        ONES[n as usize].to_string()
    } else if n % 10 == 0 {
        TENS[(n / 10) as usize].to_string()
    } else {
        format!("{} {}", TENS[(n / 10) as usize], ONES[(n % 10) as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_zero() {
        assert_eq!(amount_in_words(dec!(0)), "Zero Rupees Only");
    }

    #[test]
    fn test_simple_amount() {
        assert_eq!(amount_in_words(dec!(210.00)), "Two Hundred Ten Rupees Only");
    }

    #[test]
    fn test_paise() {
        assert_eq!(
            amount_in_words(dec!(1250.50)),
            "One Thousand Two Hundred Fifty Rupees and Fifty Paise Only"
        );
        assert_eq!(amount_in_words(dec!(0.05)), "Five Paise Only");
    }

    #[test]
    fn test_lakh_and_crore() {
        assert_eq!(
            amount_in_words(dec!(12345678)),
            "One Crore Twenty Three Lakh Forty Five Thousand Six Hundred Seventy Eight Rupees Only"
        );
        assert_eq!(amount_in_words(dec!(100000)), "One Lakh Rupees Only");
    }

    #[test]
    fn test_teens_and_tens() {
        assert_eq!(amount_in_words(dec!(19)), "Nineteen Rupees Only");
        assert_eq!(amount_in_words(dec!(40)), "Forty Rupees Only");
        assert_eq!(amount_in_words(dec!(101)), "One Hundred One Rupees Only");
    }
}
