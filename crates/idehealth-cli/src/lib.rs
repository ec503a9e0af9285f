//! Library half of the `idehealth` binary: pieces that are useful to test
//! without going through the command line.

pub mod probe;
pub mod root;
