//! The "legacy inventory name" fix-up, spec §4.C and §9.
//!
//! When the caller's inventory object is literally named `inventory`, older
//! tooling collided across namespaces; the fix is to append an 8-digit
//! zero-padded random suffix before the first store. Spec §9 flags the
//! source's global RNG seed as something to replace with an injected RNG so
//! tests can pin the suffix — [`NameSuffixSource`] is that seam.
use rand::Rng;

/// The name cli-utils historically defaulted inventory ConfigMaps to; any
/// inventory literally carrying this name gets a random suffix appended.
pub const LEGACY_NAME: &str = "inventory";

/// A source of the random suffix appended to [`LEGACY_NAME`].
///
/// Implement this with a fixed value in tests to make the fix-up
/// deterministic; the default implementation for `rand::rngs::ThreadRng`
/// draws a genuinely random 8-digit suffix.
pub trait NameSuffixSource {
    /// Produce an 8-digit, zero-padded suffix.
    fn next_suffix(&mut self) -> String;
}

impl<R: Rng + ?Sized> NameSuffixSource for R {
    fn next_suffix(&mut self) -> String {
        format!("{:08}", self.random_range(0..100_000_000u32))
    }
}

/// Apply the legacy-name fix-up to `name`, drawing a suffix from `source`
/// only when `name` is exactly [`LEGACY_NAME`].
pub fn fix_up_legacy_name(name: &str, source: &mut impl NameSuffixSource) -> String {
    if name == LEGACY_NAME {
        format!("{name}-{}", source.next_suffix())
    } else {
        name.to_string()
    }
}

/// A [`NameSuffixSource`] that always returns the same value, for tests that
/// need to pin the generated name.
pub struct FixedSuffix(pub String);

impl NameSuffixSource for FixedSuffix {
    fn next_suffix(&mut self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_other_names_untouched() {
        let mut source = FixedSuffix("00000001".into());
        assert_eq!(fix_up_legacy_name("my-app-inventory", &mut source), "my-app-inventory");
    }

    #[test]
    fn appends_suffix_to_legacy_name() {
        let mut source = FixedSuffix("00000042".into());
        assert_eq!(fix_up_legacy_name("inventory", &mut source), "inventory-00000042");
    }
}
