//! Error handling foundation.
//!
//! Only the `Result` type alias lives here. Domain crates define their own
//! error enums in their own error modules and attach layer-appropriate
//! context with rootcause's `.context()` while propagating.

use rootcause::Report;

/// Result alias over rootcause's `Report`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_alias_holds_values() {
        let value: Result<&str> = Ok("due");
        assert_eq!(value.expect("should be ok"), "due");
    }
}
