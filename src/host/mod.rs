pub mod args;
pub mod terminal;
