use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Human-readable record numbers such as `VIS-20260114-3F9A2C`.
///
/// The suffix is taken from the record's UUID, so two records created in the
/// same instant still get distinct numbers.
pub fn human_readable_id(prefix: &str, date_format: &str, now: DateTime<Utc>, id: Uuid) -> String {
    let suffix: String = id.simple().to_string().chars().take(6).collect();
    format!("{}-{}-{}", prefix, now.format(date_format), suffix.to_ascii_uppercase())
}

pub fn visit_number(now: DateTime<Utc>, id: Uuid) -> String {
    human_readable_id("VIS", "%Y%m%d", now, id)
}

pub fn patient_number(now: DateTime<Utc>, id: Uuid) -> String {
    human_readable_id("PAT", "%y%m", now, id)
}

pub fn invoice_number(now: DateTime<Utc>, id: Uuid) -> String {
    human_readable_id("INV", "%Y%m%d", now, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> (DateTime<Utc>, Uuid) {
        let now = Utc.with_ymd_and_hms(2026, 1, 14, 9, 30, 0).unwrap();
        let id = Uuid::parse_str("3f9a2c10-0000-4000-8000-000000000000").unwrap();
        (now, id)
    }

    #[test]
    fn visit_numbers_use_full_date() {
        let (now, id) = fixed();
        assert_eq!(visit_number(now, id), "VIS-20260114-3F9A2C");
    }

    #[test]
    fn patient_numbers_use_year_month() {
        let (now, id) = fixed();
        assert_eq!(patient_number(now, id), "PAT-2601-3F9A2C");
    }

    #[test]
    fn invoice_numbers() {
        let (now, id) = fixed();
        assert_eq!(invoice_number(now, id), "INV-20260114-3F9A2C");
    }
}
