//! Randomness classifier.
//!
//! Flags strings that look like opaque machine-generated tokens (session
//! ids, CSRF tokens, nonces) rather than human text. The test is a
//! chi-squared goodness of fit against a uniform distribution over a few
//! alphabets; a token drawn uniformly from one of them fits well, while
//! words and repeated characters do not.
//!
//! This is a heuristic. False positives and negatives are expected.

/// Significance level of the goodness-of-fit test.
const SIGNIFICANCE: f64 = 0.05;

/// Strings at or below this length are never classified as random.
const MIN_LENGTH: usize = 4;

/// Minimum number of in-alphabet characters for a verdict.
const MIN_SAMPLE: usize = 4;

const LOWER_DIGITS: &str = "abcdefghijklmnopqrstuvwxyz0123456789";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";

/// Whether `text` looks like an opaque random token.
pub fn is_likely_random(text: &str) -> bool {
    if text.chars().count() <= MIN_LENGTH {
        return false;
    }

    [LOWER_DIGITS, LOWER, DIGITS]
        .into_iter()
        .any(|alphabet| fits_uniform(text, alphabet))
}

/// The critical value is taken at `|alphabet| - 1` degrees of freedom. That
/// keeps mixed-case tokens such as `ghfdsa7GADSUY8` in, at the price of
/// also admitting most short lowercase words (`keep-alive`, `hello`). Such
/// false positives are absorbed downstream: constant headers are never
/// searched, and a value only becomes a dependency once an earlier
/// response or input actually reproduces it.
fn fits_uniform(text: &str, alphabet: &str) -> bool {
    let (chi, n) = chi_squared(text, alphabet);
    let df = alphabet.chars().count() - 1;
    n >= MIN_SAMPLE && chi <= chi_critical_value(df as f64)
}

/// Chi-squared statistic of the case-folded `text` against the uniform
/// distribution over `alphabet`, with the number of characters that
/// belong to it. Characters outside the alphabet are ignored.
pub fn chi_squared(text: &str, alphabet: &str) -> (f64, usize) {
    let mut freq = [0usize; 128];
    let mut n = 0usize;
    for c in text.chars().flat_map(char::to_lowercase) {
        if alphabet.contains(c) {
            n += 1;
            freq[c as usize] += 1;
        }
    }
    if n == 0 {
        return (0.0, 0);
    }

    let t = alphabet.chars().count() as f64;
    let sum_sq: f64 = alphabet
        .chars()
        .map(|c| (freq[c as usize] as f64).powi(2))
        .sum();
    (sum_sq * t / n as f64 - n as f64, n)
}

/// Hoaglin's approximation of the chi-squared critical value at the 0.05
/// significance level for `df` degrees of freedom.
pub fn chi_critical_value(df: f64) -> f64 {
    let root = df.sqrt();
    let z = (-SIGNIFICANCE.log10()).sqrt();
    (-1.37266 + 1.06807 * root + (2.13161 - 0.04589 * root) * z).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_are_never_random() {
        for text in ["", "a", "x9", "k3j", "q8z1", "ZZZZ"] {
            assert!(!is_likely_random(text), "{text:?}");
        }
    }

    #[test]
    fn short_boilerplate_words_are_admitted() {
        for text in ["keep-alive", "max-age=0", "gzip, deflate, br", "hello", "no-cache"] {
            assert!(is_likely_random(text), "{text:?}");
        }
        // Just over the critical value for letters and digits, kept by
        // the letters-only alphabet
        let (chi, n) = chi_squared("keep-alive", LOWER_DIGITS);
        assert_eq!(n, 9);
        assert!(chi > chi_critical_value(35.0));
        assert!(fits_uniform("keep-alive", LOWER));
    }

    #[test]
    fn repeated_character_is_not_random() {
        assert!(!is_likely_random("AAAAAAAAAAA"));
    }

    #[test]
    fn mixed_token_is_random() {
        assert!(is_likely_random("ghfdsa7GADSUY8"));
    }

    #[test]
    fn alphanumeric_and_digit_tokens_are_random() {
        assert!(is_likely_random("k3j9x2m7q4w8"));
        assert!(is_likely_random("4815162342"));
    }

    #[test]
    fn low_entropy_text_is_not_random() {
        assert!(!is_likely_random("aaaaabbbbbaaaaabbbbb"));
        assert!(!is_likely_random("1111111111111111"));
    }

    #[test]
    fn case_is_folded() {
        assert_eq!(chi_squared("AbC", LOWER), chi_squared("abc", LOWER));
    }

    #[test]
    fn characters_outside_the_alphabet_are_ignored() {
        let (_, n) = chi_squared("a-b_c!", LOWER);
        assert_eq!(n, 3);
        assert_eq!(chi_squared("---", LOWER), (0.0, 0));
    }

    #[test]
    fn critical_value_tracks_the_table() {
        // Table values at p = 0.05: df 9 -> 16.92, df 25 -> 37.65, df 35 -> 49.80
        assert!((chi_critical_value(9.0) - 16.92).abs() < 0.5);
        assert!((chi_critical_value(25.0) - 37.65).abs() < 0.5);
        assert!((chi_critical_value(35.0) - 49.80).abs() < 0.5);
    }
}
