//! Strongly-typed names for foreign-key configs.

use crate::newtype_string::define_newtype_string;

define_newtype_string! {
    /// Name of one foreign-key relationship within a domain (e.g. `plan`).
    pub struct ForeignKeyName;
}
