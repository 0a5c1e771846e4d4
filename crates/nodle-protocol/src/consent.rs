//! Answer matching for the account creation prompt.

/// Returns whether `answer` accepts the offer to create an account.
///
/// Only `YES` and `Y` count, compared case-insensitively against the whole
/// line. Anything else, including an empty line or surrounding spaces,
/// is a refusal.
pub fn is_affirmative(answer: &str) -> bool {
    let upper = answer.to_uppercase();
    upper == "YES" || upper == "Y"
}
