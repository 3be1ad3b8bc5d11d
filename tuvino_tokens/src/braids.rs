use aliri_braid::braid;
use std::fmt;

/// Implements redacting `Debug` and `Display` for a borrowed secret type
///
/// The plain forms print a fixed placeholder. The alternate forms (`{:#}` and
/// `{:#?}`) reveal a prefix of the secret, bounded by the formatter width when
/// one is given.
macro_rules! redacted_fmt {
    ($ty:ty: $label:literal, $prefix:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    let max = f.width().unwrap_or($prefix);
                    write!(f, "\"{}\"", Prefix(&self.0, max))
                } else {
                    f.write_str(concat!("***", $label, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    let max = f.width().unwrap_or(usize::MAX);
                    write!(f, "{}", Prefix(&self.0, max))
                } else {
                    f.write_str(concat!("***", $label, "***"))
                }
            }
        }
    };
}

/// At most `.1` characters of a secret, with an ellipsis marking truncation
struct Prefix<'a>(&'a str, usize);

impl fmt::Display for Prefix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Prefix(secret, max) = *self;
        if max <= 1 {
            return f.write_str("…");
        }

        if secret.chars().nth(max).is_none() {
            return f.write_str(secret);
        }

        match secret.char_indices().nth(max - 1) {
            Some((cut, _)) => {
                f.write_str(&secret[..cut])?;
                f.write_str("…")
            }
            None => f.write_str(secret),
        }
    }
}

/// A short-lived bearer credential authorizing API calls
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

redacted_fmt!(AccessTokenRef: "ACCESS TOKEN", 12);

/// A longer-lived credential exchanged for a new access token
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

redacted_fmt!(RefreshTokenRef: "REFRESH TOKEN", 4);

/// The backend's identifier for a user
#[braid(serde)]
pub struct UserId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_formatting_hides_the_secret() {
        let token = AccessToken::from_static("eyJhbGciOiJIUzI1NiJ9.payload.sig");

        assert_eq!(token.to_string(), "***ACCESS TOKEN***");
        assert_eq!(format!("{token:?}"), "***ACCESS TOKEN***");
    }

    #[test]
    fn alternate_debug_reveals_a_bounded_prefix() {
        let token = RefreshToken::from_static("validRefresh");

        assert_eq!(format!("{token:#?}"), "\"val…\"");
        assert_eq!(format!("{token:#8?}"), "\"validRe…\"");
    }

    #[test]
    fn alternate_display_reveals_short_secrets_whole() {
        let token = AccessToken::from_static("newTok");

        assert_eq!(format!("{token:#}"), "newTok");
    }

    #[test]
    fn width_of_one_prints_only_the_ellipsis() {
        let token = AccessToken::from_static("newTok");

        assert_eq!(format!("{token:#1}"), "…");
    }
}
