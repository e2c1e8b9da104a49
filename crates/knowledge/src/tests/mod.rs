//! In-crate tests spanning several modules.

pub(crate) mod support;

mod scenarios;
