//! Version Identifiers - Sortable Timestamps
//!
//! Version ids are UTC timestamps (`20240102T0900`). "Latest" is decided
//! purely by natural ordering of the ids found on disk, so every id this
//! module produces must sort after the ids produced before it. Local time
//! repeats an hour when daylight saving ends, UTC never does.

use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resolution of generated version ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPrecision {
    /// `YYYYMMDDTHHMM`
    #[default]
    Minute,
    /// `YYYYMMDDTHHMMSS`
    Second,
}

impl VersionPrecision {
    fn format(&self) -> &'static str {
        match self {
            VersionPrecision::Minute => "%Y%m%dT%H%M",
            VersionPrecision::Second => "%Y%m%dT%H%M%S",
        }
    }
}

/// Version id for the current time.
pub fn new_version_id(precision: VersionPrecision) -> String {
    version_id_at(&Utc::now(), precision)
}

/// Version id of `time`, rendered in UTC whatever its offset.
pub fn version_id_at<Tz: TimeZone>(time: &DateTime<Tz>, precision: VersionPrecision) -> String {
    time.with_timezone(&Utc).format(precision.format()).to_string()
}

/// Import session id: date prefix plus a random UUID.
pub fn new_session_id() -> String {
    format!("{}-{}", Utc::now().format("%Y%m%d"), Uuid::new_v4())
}

/// Hidden upload filename for a scene file received at `time`.
///
/// The random suffix keeps uploads within the same second apart.
pub fn upload_filename_at<Tz: TimeZone>(time: &DateTime<Tz>) -> String {
    format!(
        ".{}-{}.blend",
        version_id_at(time, VersionPrecision::Second),
        Uuid::new_v4().simple()
    )
}

/// Numeric-aware string ordering.
///
/// Runs of ASCII digits compare by value, everything else by code point.
/// Equal values with different zero padding order the shorter run first.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let a_end = digit_run_end(a, i);
            let b_end = digit_run_end(b, j);
            let ord = cmp_digit_runs(&a[i..a_end], &b[j..b_end]);
            if ord != Ordering::Equal {
                return ord;
            }
            i = a_end;
            j = b_end;
        } else {
            match a[i].cmp(&b[j]) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                ord => return ord,
            }
        }
    }

    (a.len() - i).cmp(&(b.len() - j))
}

/// Sorts ascending by [`natural_cmp`].
pub fn natural_sort(ids: &mut [String]) {
    ids.sort_by(|a, b| natural_cmp(a, b));
}

fn digit_run_end(s: &[u8], start: usize) -> usize {
    s[start..]
        .iter()
        .position(|c| !c.is_ascii_digit())
        .map_or(s.len(), |p| start + p)
}

fn cmp_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let trim = |run: &[u8]| -> usize { run.iter().take_while(|&&c| c == b'0').count() };
    let (a_sig, b_sig) = (&a[trim(a)..], &b[trim(b)..]);

    a_sig
        .len()
        .cmp(&b_sig.len())
        .then_with(|| a_sig.cmp(b_sig))
        .then_with(|| a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_version_id_formats() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 9, 5, 7).unwrap();
        assert_eq!(version_id_at(&t, VersionPrecision::Minute), "20240102T0905");
        assert_eq!(version_id_at(&t, VersionPrecision::Second), "20240102T090507");
    }

    #[test]
    fn test_version_ids_keep_order_across_dst_fallback() {
        // 2024-11-03 in New York: 01:50 EDT, then 01:10 EST twenty minutes later.
        let edt = FixedOffset::west_opt(4 * 3600).unwrap();
        let est = FixedOffset::west_opt(5 * 3600).unwrap();
        let first = edt.with_ymd_and_hms(2024, 11, 3, 1, 50, 0).unwrap();
        let later = est.with_ymd_and_hms(2024, 11, 3, 1, 10, 0).unwrap();

        let first_id = version_id_at(&first, VersionPrecision::Minute);
        let later_id = version_id_at(&later, VersionPrecision::Minute);
        assert_eq!(first_id, "20241103T0550");
        assert_eq!(later_id, "20241103T0610");
        assert_eq!(natural_cmp(&first_id, &later_id), Ordering::Less);
    }

    #[test]
    fn test_upload_filenames_are_hidden_and_distinct() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 9, 5, 7).unwrap();
        let first = upload_filename_at(&t);
        let second = upload_filename_at(&t);

        assert!(first.starts_with(".20240102T090507-"), "{first}");
        assert!(first.ends_with(".blend"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id();
        let (date, rest) = id.split_at(8);
        assert!(date.chars().all(|c| c.is_ascii_digit()));
        assert!(rest.starts_with('-'));
        assert!(Uuid::parse_str(&rest[1..]).is_ok());
        assert_ne!(new_session_id(), id);
    }

    #[test]
    fn test_natural_orders_numeric_runs() {
        assert_eq!(natural_cmp("v9", "v10"), Ordering::Less);
        assert_eq!(natural_cmp("v10", "v9"), Ordering::Greater);
        assert_eq!(natural_cmp("20240101T1000-99", "20240101T1000-100"), Ordering::Less);
        assert_eq!(natural_cmp("abc", "abc"), Ordering::Equal);
        assert_eq!(natural_cmp("abc", "abcd"), Ordering::Less);
        assert_eq!(natural_cmp("a01", "a1"), Ordering::Greater);
    }

    #[test]
    fn test_natural_sort_timestamps() {
        let mut ids = vec![
            "20240102T0900".to_string(),
            "20240101T1005".to_string(),
            "20240101T1000".to_string(),
        ];
        natural_sort(&mut ids);
        assert_eq!(ids, ["20240101T1000", "20240101T1005", "20240102T0900"]);
    }

    #[test]
    fn test_second_precision_sorts_after_minute_of_same_minute() {
        let mut ids = vec!["20240101T100001".to_string(), "20240101T1000".to_string()];
        natural_sort(&mut ids);
        assert_eq!(ids[0], "20240101T1000");
    }
}
