//! Comparator semantics over resolved operands.
//!
//! Every function here is total: an operand pair the comparator cannot
//! interpret yields `None`, which the caller turns into `false`. Negated
//! comparators negate only a definite answer, so an incomparable pair never
//! matches `NOT_*` either.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::schema::{Comparator, RuleValue};

/// Apply `comparator` to `left` and `right`. `None` means "not comparable".
pub(crate) fn compare(
    comparator: Comparator,
    left: &RuleValue,
    right: &RuleValue,
    now: DateTime<Utc>,
) -> Option<bool> {
    use Comparator::*;
    match comparator {
        Bigger => Some(left.as_number()? > right.as_number()?),
        Smaller => Some(left.as_number()? < right.as_number()?),
        Equals => equals(left, right),
        NotEquals => equals(left, right).map(|b| !b),
        Contains => contains_any(left, right),
        NotContains => contains_any(left, right).map(|b| !b),
        ContainsPartial => contains_partial(left, right),
        NotContainsPartial => contains_partial(left, right).map(|b| !b),
        ContainsAll => contains_all(left, right),
        NotContainsAll => contains_all(left, right).map(|b| !b),
        Before => Some(left.as_date()? < right.as_date()?),
        After => Some(left.as_date()? > right.as_date()?),
        InLast => {
            let date = left.as_date()?;
            let window = days(right.as_number()?)?;
            Some(date >= now.checked_sub_signed(window)? && date <= now)
        }
        InNext => {
            let date = left.as_date()?;
            let window = days(right.as_number()?)?;
            Some(date >= now && date <= now.checked_add_signed(window)?)
        }
        CountEquals => Some(count(left)? == right.as_number()?),
        CountNotEquals => Some(count(left)? != right.as_number()?),
        CountBigger => Some(count(left)? > right.as_number()?),
        CountSmaller => Some(count(left)? < right.as_number()?),
    }
}

/// `n` days as a duration; `None` when negative or out of range.
fn days(n: f64) -> Option<Duration> {
    let secs = (n * 86_400.0).round();
    if !secs.is_finite() || secs < 0.0 || secs >= i64::MAX as f64 {
        return None;
    }
    Duration::try_seconds(secs as i64)
}

fn count(value: &RuleValue) -> Option<f64> {
    match value {
        RuleValue::TextList(items) => Some(items.len() as f64),
        _ => None,
    }
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

fn folded_set(items: &[String]) -> HashSet<String> {
    items.iter().map(|s| fold(s)).collect()
}

/// Right operand as a list of folded strings; a single text is a list of one.
fn as_needles(value: &RuleValue) -> Option<Vec<String>> {
    match value {
        RuleValue::Text(s) => Some(vec![fold(s)]),
        RuleValue::TextList(items) => Some(items.iter().map(|s| fold(s)).collect()),
        _ => None,
    }
}

fn equals(left: &RuleValue, right: &RuleValue) -> Option<bool> {
    match (left, right) {
        (RuleValue::Number(a), RuleValue::Number(b)) => Some(a == b),
        (RuleValue::Bool(a), RuleValue::Bool(b)) => Some(a == b),
        (RuleValue::Text(a), RuleValue::Text(b)) => Some(fold(a) == fold(b)),
        // Calendar-day equality in UTC.
        (RuleValue::Date(a), RuleValue::Date(b)) => Some(a.date_naive() == b.date_naive()),
        (RuleValue::TextList(a), RuleValue::TextList(b)) => Some(folded_set(a) == folded_set(b)),
        (RuleValue::TextList(a), RuleValue::Text(b)) => {
            Some(a.len() == 1 && fold(&a[0]) == fold(b))
        }
        _ => None,
    }
}

/// List: exact (case-insensitive) membership of any needle.
/// Text: case-insensitive substring.
fn contains_any(left: &RuleValue, right: &RuleValue) -> Option<bool> {
    let needles = as_needles(right)?;
    match left {
        RuleValue::TextList(items) => {
            let haystack = folded_set(items);
            Some(needles.iter().any(|n| haystack.contains(n)))
        }
        RuleValue::Text(s) => {
            let hay = fold(s);
            Some(needles.iter().any(|n| hay.contains(n.as_str())))
        }
        _ => None,
    }
}

fn contains_all(left: &RuleValue, right: &RuleValue) -> Option<bool> {
    let needles = as_needles(right)?;
    match left {
        RuleValue::TextList(items) => {
            let haystack = folded_set(items);
            Some(needles.iter().all(|n| haystack.contains(n)))
        }
        RuleValue::Text(s) => {
            let hay = fold(s);
            Some(needles.iter().all(|n| hay.contains(n.as_str())))
        }
        _ => None,
    }
}

/// Substring match against any element (lists) or the whole text.
fn contains_partial(left: &RuleValue, right: &RuleValue) -> Option<bool> {
    let needles = as_needles(right)?;
    let hay: Vec<String> = match left {
        RuleValue::TextList(items) => items.iter().map(|s| fold(s)).collect(),
        RuleValue::Text(s) => vec![fold(s)],
        _ => return None,
    };
    Some(
        needles
            .iter()
            .any(|n| hay.iter().any(|h| h.contains(n.as_str()))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn list(items: &[&str]) -> RuleValue {
        RuleValue::TextList(items.iter().map(|s| s.to_string()).collect())
    }

    fn text(s: &str) -> RuleValue {
        RuleValue::Text(s.to_string())
    }

    fn num(n: f64) -> RuleValue {
        RuleValue::Number(n)
    }

    fn date(y: i32, m: u32, d: u32, h: u32) -> RuleValue {
        RuleValue::Date(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap())
    }

    fn check(c: Comparator, l: &RuleValue, r: &RuleValue) -> Option<bool> {
        compare(c, l, r, now())
    }

    #[test]
    fn numeric_ordering() {
        assert_eq!(check(Comparator::Bigger, &num(8.0), &num(7.0)), Some(true));
        assert_eq!(check(Comparator::Bigger, &num(7.0), &num(7.0)), Some(false));
        assert_eq!(check(Comparator::Smaller, &num(3.0), &num(7.0)), Some(true));
        assert_eq!(check(Comparator::Bigger, &text("8"), &num(7.0)), None);
    }

    #[test]
    fn equality_is_type_aware() {
        assert_eq!(check(Comparator::Equals, &text("Ended"), &text("ended")), Some(true));
        assert_eq!(check(Comparator::NotEquals, &num(1.0), &num(2.0)), Some(true));
        assert_eq!(
            check(Comparator::Equals, &list(&["b", "A"]), &list(&["a", "B", "a"])),
            Some(true)
        );
        assert_eq!(
            check(Comparator::Equals, &date(2024, 1, 1, 1), &date(2024, 1, 1, 23)),
            Some(true)
        );
        assert_eq!(check(Comparator::Equals, &num(1.0), &text("1")), None);
        assert_eq!(check(Comparator::NotEquals, &num(1.0), &text("1")), None);
    }

    #[test]
    fn contains_on_lists_is_exact_membership() {
        let genres = list(&["Action", "Drama"]);
        assert_eq!(check(Comparator::Contains, &genres, &text("action")), Some(true));
        assert_eq!(check(Comparator::Contains, &genres, &text("act")), Some(false));
        assert_eq!(
            check(Comparator::Contains, &genres, &list(&["Comedy", "Drama"])),
            Some(true)
        );
        assert_eq!(check(Comparator::NotContains, &genres, &text("Comedy")), Some(true));
        assert_eq!(
            check(Comparator::ContainsAll, &genres, &list(&["drama", "action"])),
            Some(true)
        );
        assert_eq!(
            check(Comparator::ContainsAll, &genres, &list(&["drama", "comedy"])),
            Some(false)
        );
        assert_eq!(
            check(Comparator::NotContainsAll, &genres, &list(&["drama", "comedy"])),
            Some(true)
        );
    }

    #[test]
    fn partial_matches_substrings() {
        let people = list(&["Robert De Niro", "Al Pacino"]);
        assert_eq!(check(Comparator::ContainsPartial, &people, &text("pacino")), Some(true));
        assert_eq!(
            check(Comparator::NotContainsPartial, &people, &text("Kilmer")),
            Some(true)
        );
        assert_eq!(
            check(Comparator::ContainsPartial, &text("/media/4k/heat.mkv"), &text("/4K/")),
            Some(true)
        );
    }

    #[test]
    fn date_ordering_and_windows() {
        let ten_days_ago = date(2024, 6, 5, 12);
        assert_eq!(check(Comparator::Before, &ten_days_ago, &date(2024, 6, 6, 0)), Some(true));
        assert_eq!(check(Comparator::After, &ten_days_ago, &date(2024, 6, 6, 0)), Some(false));

        assert_eq!(check(Comparator::InLast, &ten_days_ago, &num(30.0)), Some(true));
        assert_eq!(check(Comparator::InLast, &ten_days_ago, &num(10.0)), Some(true));
        assert_eq!(check(Comparator::InLast, &ten_days_ago, &num(9.0)), Some(false));
        assert_eq!(check(Comparator::InLast, &date(2024, 6, 20, 0), &num(30.0)), Some(false));

        assert_eq!(check(Comparator::InNext, &date(2024, 6, 20, 0), &num(7.0)), Some(true));
        assert_eq!(check(Comparator::InNext, &date(2024, 6, 30, 0), &num(7.0)), Some(false));
        assert_eq!(check(Comparator::InNext, &ten_days_ago, &num(7.0)), Some(false));
        assert_eq!(check(Comparator::InLast, &ten_days_ago, &num(-1.0)), None);
    }

    #[test]
    fn windows_past_the_calendar_fail_closed() {
        let ten_days_ago = date(2024, 6, 5, 12);
        for n in [100_000_000.0, 1e15, 1e300, f64::INFINITY] {
            assert_eq!(check(Comparator::InLast, &ten_days_ago, &num(n)), None, "{}", n);
            assert_eq!(check(Comparator::InNext, &ten_days_ago, &num(n)), None, "{}", n);
        }
        assert_eq!(days(f64::NAN), None);
        assert_eq!(days(1.5), Some(Duration::hours(36)));
    }

    #[test]
    fn counts_use_list_length() {
        let users = list(&["alice", "bob"]);
        assert_eq!(check(Comparator::CountEquals, &users, &num(2.0)), Some(true));
        assert_eq!(check(Comparator::CountNotEquals, &users, &num(2.0)), Some(false));
        assert_eq!(check(Comparator::CountBigger, &users, &num(1.0)), Some(true));
        assert_eq!(check(Comparator::CountSmaller, &list(&[]), &num(1.0)), Some(true));
        assert_eq!(check(Comparator::CountEquals, &text("alice"), &num(1.0)), None);
    }
}
