//! Short public identifier generation
//!
//! Surveys are addressed by a short random alphanumeric uid suitable for
//! inclusion in a URL. Generation is an explicit factory; uniqueness is
//! checked by the caller against existing uids, regenerating on collision.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of a survey uid
pub const UID_LENGTH: usize = 4;

/// Generate a random alphanumeric survey uid
pub fn new_survey_uid() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UID_LENGTH)
        .map(char::from)
        .collect()
}

/// Check that a string has the shape of a survey uid
pub fn is_valid_uid(uid: &str) -> bool {
    uid.len() == UID_LENGTH && uid.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uid_is_valid() {
        for _ in 0..100 {
            let uid = new_survey_uid();
            assert!(is_valid_uid(&uid), "bad uid: {uid}");
        }
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert!(!is_valid_uid(""));
        assert!(!is_valid_uid("abc"));
        assert!(!is_valid_uid("abcde"));
        assert!(!is_valid_uid("ab/!"));
    }
}
