pub mod actions;
pub mod settings;
pub mod view;

#[cfg(test)]
mod tests;
