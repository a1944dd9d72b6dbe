//! Service registry listing (`launchctl list` style output)

/// Whether `label` appears in a registry listing.
///
/// Each line is `PID  STATUS  LABEL`; the label is the last column and must
/// match exactly. Header lines never match a real label.
pub fn is_listed(listing: &str, label: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .any(|candidate| candidate == label)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "PID\tStatus\tLabel\n\
        512\t0\tcom.example.orderbook\n\
        -\t78\tcom.example.orderbook.backfill\n\
        -\t0\tcom.apple.Finder\n";

    #[test]
    fn test_exact_label_match() {
        assert!(is_listed(LISTING, "com.example.orderbook"));
        assert!(is_listed(LISTING, "com.example.orderbook.backfill"));
    }

    #[test]
    fn test_prefix_does_not_match() {
        assert!(!is_listed(LISTING, "com.example"));
        assert!(!is_listed(LISTING, "orderbook"));
    }

    #[test]
    fn test_empty_listing() {
        assert!(!is_listed("", "com.example.orderbook"));
    }
}
