// server/src/models/mod.rs

//! Rows and views of the marketplace entities.

pub mod cart;
pub mod category;
pub mod comment;
pub mod order;
pub mod pagination;
pub mod product;
pub mod seller;
pub mod user;
pub mod wishlist;

pub use cart::{Cart, CartLine, CartLineView, CartView, MAX_LINE_QUANTITY};
pub use category::{Category, CategoryDetail, CategoryWithCounts, NewCategory};
pub use comment::{Comment, NewComment, RatingSummary};
pub use order::{NewOrder, NewOrderLine, Order, OrderLine, OrderQuery, OrderStatus, OrderWithLines};
pub use pagination::{PageMeta, PageParams};
pub use product::{
  NewProduct, Product, ProductFilter, ProductListing, ProductPatch, ProductSort, SortDirection, StockChange,
};
pub use seller::{NewSeller, Seller, SellerDetail, SellerPatch, SellerQuery, SellerWithStats};
pub use user::{Credentials, NewUser, Registration, Role, User, UserPatch, UserQuery};
pub use wishlist::{WishlistEntry, WishlistItem};
