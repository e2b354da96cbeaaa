//! Detection of an initializer that is already present on the module type.

use crate::{
    cilassembly::MethodSummary,
    initializer::{INITIALIZER_FLAGS, INITIALIZER_NAME},
    Error, Result,
};

/// Fail if any of `methods` is an initializer like the one that would be injected.
///
/// A method conflicts when its name is `.cctor` in any casing and its flags carry every bit of
/// [`INITIALIZER_FLAGS`]. Same-named methods with fewer flags are logged and tolerated.
///
/// # Errors
/// Returns [`Error::DuplicateInitializer`] for the first conflicting method.
pub fn check_collision(methods: &[MethodSummary]) -> Result<()> {
    for method in methods {
        if !method.name.eq_ignore_ascii_case(INITIALIZER_NAME) {
            continue;
        }

        if method.flags & INITIALIZER_FLAGS == INITIALIZER_FLAGS {
            return Err(Error::DuplicateInitializer {
                name: method.name.clone(),
                token: method.token,
            });
        }

        log::warn!(
            "Module type already has '{}' ({}) with flags {:#06x}; it is not an initializer",
            method.name,
            method.token,
            method.flags
        );
    }
    Ok(())
}
