//! Referral id extraction from `/start` arguments

/// Parse the referrer's external id from the start argument text.
///
/// Absent, malformed, non-positive, or self-referencing input means
/// "no referrer".
pub fn referrer_from_args(args: Option<&str>, user_id: i64) -> Option<i64> {
    let referrer = args?.trim().parse::<i64>().ok()?;
    (referrer > 0 && referrer != user_id).then_some(referrer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn numeric_argument_is_referrer() {
        assert_eq!(referrer_from_args(Some("7"), 42), Some(7));
        assert_eq!(referrer_from_args(Some("  7 "), 42), Some(7));
    }

    #[test]
    fn missing_or_malformed_is_none() {
        assert_eq!(referrer_from_args(None, 42), None);
        assert_eq!(referrer_from_args(Some(""), 42), None);
        assert_eq!(referrer_from_args(Some("ref_7"), 42), None);
        assert_eq!(referrer_from_args(Some("7 8"), 42), None);
        assert_eq!(referrer_from_args(Some("0"), 42), None);
        assert_eq!(referrer_from_args(Some("-7"), 42), None);
    }

    #[test]
    fn self_referral_is_ignored() {
        assert_eq!(referrer_from_args(Some("42"), 42), None);
    }

    proptest! {
        #[test]
        fn any_other_positive_id_round_trips(referrer in 1i64.., user in 1i64..) {
            prop_assume!(referrer != user);
            prop_assert_eq!(
                referrer_from_args(Some(&referrer.to_string()), user),
                Some(referrer)
            );
        }

        #[test]
        fn non_numeric_text_never_refers(text in "[^0-9]*") {
            prop_assert_eq!(referrer_from_args(Some(&text), 1), None);
        }
    }
}
