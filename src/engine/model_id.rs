use once_cell::sync::Lazy;
use regex::Regex;

use crate::runtime::DEFAULT_MODEL;

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 1024;

// `<digits><one non-digit><digits>` anywhere in the size segment; the
// canonical form is `512x768` but any single separator character works.
static SIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\D(\d+)").unwrap());

/// Generation parameters derived from a compound model identifier such as
/// `imagegen-2.1:512x768`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub model: String,
    pub width: u32,
    pub height: u32,
}

impl ModelSpec {
    /// Parses `"<name>"` or `"<name>:<W>x<H>"`. Never fails: a missing or
    /// malformed size segment falls back to 1024x1024, and parsed dimensions
    /// are rounded up to even because the backend rejects odd ones.
    pub fn parse(identifier: &str) -> Self {
        let (name, size) = match identifier.split_once(':') {
            Some((name, size)) => (name, Some(size)),
            None => (identifier, None),
        };
        let model = if name.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            name.to_string()
        };
        let (width, height) = size.map_or((DEFAULT_WIDTH, DEFAULT_HEIGHT), parse_dimensions);
        Self {
            model,
            width,
            height,
        }
    }
}

fn parse_dimensions(size: &str) -> (u32, u32) {
    let Some(caps) = SIZE_RE.captures(size) else {
        return (DEFAULT_WIDTH, DEFAULT_HEIGHT);
    };
    match (parse_even(&caps[1]), parse_even(&caps[2])) {
        (Some(width), Some(height)) => (width, height),
        _ => (DEFAULT_WIDTH, DEFAULT_HEIGHT),
    }
}

// Rounds up to the nearest even integer; `None` when the digits do not fit.
fn parse_even(digits: &str) -> Option<u32> {
    let n: u64 = digits.parse().ok()?;
    u32::try_from(n.div_ceil(2).checked_mul(2)?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_identifier() {
        let spec = ModelSpec::parse("imagegen-2.1:512x768");
        assert_eq!(spec.model, "imagegen-2.1");
        assert_eq!(spec.width, 512);
        assert_eq!(spec.height, 768);
    }

    #[test]
    fn rounds_odd_dimensions_up_to_even() {
        let spec = ModelSpec::parse("imagegen-2.1:511x767");
        assert_eq!(spec.width, 512);
        assert_eq!(spec.height, 768);

        let spec = ModelSpec::parse("imagegen-2.1:1x1");
        assert_eq!(spec.width, 2);
        assert_eq!(spec.height, 2);
    }

    #[test]
    fn defaults_without_size_segment() {
        let spec = ModelSpec::parse("imagegen-2.1");
        assert_eq!(spec.model, "imagegen-2.1");
        assert_eq!(spec.width, DEFAULT_WIDTH);
        assert_eq!(spec.height, DEFAULT_HEIGHT);
    }

    #[test]
    fn accepts_any_single_separator() {
        for id in ["m:640X480", "m:640*480", "m:640 480", "m:640-480"] {
            let spec = ModelSpec::parse(id);
            assert_eq!((spec.width, spec.height), (640, 480), "{id}");
        }
    }

    #[test]
    fn malformed_size_falls_back_to_defaults() {
        for id in [
            "m:banana",
            "m:123",
            "m:",
            "m:99999999999999999999x2",
            "m:18446744073709551615x2",
        ] {
            let spec = ModelSpec::parse(id);
            assert_eq!((spec.width, spec.height), (DEFAULT_WIDTH, DEFAULT_HEIGHT), "{id}");
        }
    }

    #[test]
    fn empty_name_falls_back_to_default_model() {
        assert_eq!(ModelSpec::parse("").model, DEFAULT_MODEL);
        let spec = ModelSpec::parse(":512x768");
        assert_eq!(spec.model, DEFAULT_MODEL);
        assert_eq!((spec.width, spec.height), (512, 768));
    }

    #[test]
    fn size_is_found_anywhere_in_the_segment() {
        let spec = ModelSpec::parse("imagegen-2.1:size=512x768,seed=1");
        assert_eq!((spec.width, spec.height), (512, 768));
    }
}
