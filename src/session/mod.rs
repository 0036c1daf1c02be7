pub mod guard;

#[cfg(test)]
mod tests;

pub use guard::*;
