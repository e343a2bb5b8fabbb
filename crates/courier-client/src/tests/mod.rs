//! Crate-level test doubles and behavioural tests.

pub(crate) mod support;

mod behaviour;
