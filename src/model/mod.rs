pub mod allocation;
pub mod entry;
pub mod identity;
pub mod member;
