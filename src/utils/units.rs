use std::time::Duration;

pub const KB: u64 = 1024;
pub const MB: u64 = KB * 1024;
pub const GB: u64 = MB * 1024;
pub const TB: u64 = GB * 1024;

pub const SECOND: Duration = Duration::from_secs(1);
pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const DAY: Duration = Duration::from_secs(60 * 60 * 24);
pub const WEEK: Duration = Duration::from_secs(60 * 60 * 24 * 7);
pub const MONTH: Duration = Duration::from_secs(60 * 60 * 24 * 30);
pub const YEAR: Duration = Duration::from_secs(60 * 60 * 24 * 365);

const SIZES: [&str; 6] = ["b", "kb", "mb", "gb", "tb", "pb"];

/// Human readable byte size, e.g. `1.5kb`.
///
/// Trailing zeros after the decimal point are dropped, so `1024` renders as
/// `1kb` rather than `1.00kb`.
#[must_use]
pub fn fmt_bytes(bytes: u64, decimals: usize) -> String {
    if bytes == 0 {
        return "0b".to_string();
    }
    let mut i = 0;
    let mut size = bytes as f64;
    while size >= 1024.0 && i < SIZES.len() - 1 {
        size /= 1024.0;
        i += 1;
    }
    let mut num = format!("{size:.decimals$}");
    if num.contains('.') {
        num = num.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{num}{}", SIZES[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(0, 2), "0b");
        assert_eq!(fmt_bytes(512, 2), "512b");
        assert_eq!(fmt_bytes(1024, 2), "1kb");
        assert_eq!(fmt_bytes(1536, 2), "1.5kb");
        assert_eq!(fmt_bytes(64 * MB, 2), "64mb");
        assert_eq!(fmt_bytes(1234567, 1), "1.2mb");
    }

    #[test]
    fn test_time_units() {
        assert_eq!(HOUR.as_secs(), 3600);
        assert_eq!(MONTH, DAY * 30);
    }
}
