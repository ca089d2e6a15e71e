use lazy_static::lazy_static;
use rand::{thread_rng, Rng};
use regex::Regex;

use crate::LinkCode;

/// Smallest code that still has the full number of digits
pub const LINK_CODE_MIN: LinkCode = 10_000_000;
pub const LINK_CODE_MAX: LinkCode = 99_999_999;

lazy_static! {
    /// Matches an optional http(s) scheme at the start of a url
    pub static ref URL_SCHEME_REGEX: Regex = Regex::new(r"^(https?://)?").unwrap();
    static ref MEDIA_ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// Returns an 8 digit link code. Uniqueness is up to the caller.
pub fn random_link_code() -> LinkCode {
    thread_rng().gen_range(LINK_CODE_MIN..=LINK_CODE_MAX)
}

/// Returns true if the id is safe to use as a file name
pub fn is_valid_media_id(id: &str) -> bool {
    MEDIA_ID_REGEX.is_match(id)
}

/// Makes sure a url has a scheme so it can be parsed
pub fn with_scheme(url: &str) -> String {
    URL_SCHEME_REGEX.replace(url.trim(), "https://").into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_link_codes_have_eight_digits() {
        for _ in 0..1000 {
            assert_eq!(random_link_code().to_string().len(), 8);
        }
    }

    #[test]
    fn test_media_ids() {
        assert!(is_valid_media_id("dQw4w9WgXcQ"));
        assert!(is_valid_media_id("-t-75CCdM2o"));
        assert!(!is_valid_media_id(""));
        assert!(!is_valid_media_id("../etc/passwd"));
        assert!(!is_valid_media_id("a b"));
    }

    #[test]
    fn test_with_scheme() {
        assert_eq!(with_scheme("youtu.be/abc"), "https://youtu.be/abc");
        assert_eq!(with_scheme("http://youtu.be/abc"), "https://youtu.be/abc");
        assert_eq!(with_scheme("https://youtu.be/abc"), "https://youtu.be/abc");
    }
}
