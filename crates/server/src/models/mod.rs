//! Domain models and their JSON representations.

pub mod cart;
pub mod category;
pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use cart::{CartLine, CartView};
pub use category::{Category, CategoryRef};
pub use order::{Order, OrderItem};
pub use product::Product;
pub use session::{CurrentAdmin, CurrentUser, keys as session_keys};
pub use user::{SafeUser, User};
