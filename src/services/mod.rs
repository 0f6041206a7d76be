// Core services
pub mod orders;
pub mod payments;

// Catalog and cart
pub mod commerce;
