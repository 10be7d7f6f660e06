//! peershare-ctl: the interactive peer client.

pub mod console;
