//! Forward-compatibility extension slot.
//!
//! Every operation of the public surface carries an `ext` parameter reserved
//! for future descriptor chains. No extension is recognized today: any value
//! other than [`Extension::None`] is rejected up front, before all other
//! validation, and is never interpreted.

use crate::error::{Error, Result};

/// Closed sum type for the extension slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Extension {
    /// No extension supplied.
    #[default]
    None,
    /// An extension descriptor the engine does not recognize; the payload is
    /// the descriptor's structure tag.
    Unrecognized(u32),
}

impl Extension {
    /// Rejects anything but [`Extension::None`].
    pub(crate) fn require_none(self) -> Result<()> {
        match self {
            Extension::None => Ok(()),
            Extension::Unrecognized(_) => Err(Error::UnrecognizedExtension),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn none_passes() {
        assert!(Extension::None.require_none().is_ok());
    }

    #[test]
    fn unrecognized_is_argument_error() {
        let err = Extension::Unrecognized(0x4001).require_none().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }

    #[test]
    fn default_is_none() {
        assert_eq!(Extension::default(), Extension::None);
    }
}
