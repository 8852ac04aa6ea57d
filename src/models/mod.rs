pub mod driver;
pub mod merchant;
pub mod offer;
pub mod order;
