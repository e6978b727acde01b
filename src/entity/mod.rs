pub mod audit_logs;
pub mod cart_items;
pub mod carts;
pub mod categories;
pub mod colors;
pub mod garments;
pub mod order_items;
pub mod orders;
pub mod product_garments;
pub mod products;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use categories::Entity as Categories;
pub use colors::Entity as Colors;
pub use garments::Entity as Garments;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use product_garments::Entity as ProductGarments;
pub use products::Entity as Products;
pub use users::Entity as Users;
