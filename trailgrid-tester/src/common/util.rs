use chrono::{SecondsFormat, Utc};

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Wall-clock stamp printed in report headers.
pub fn report_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
